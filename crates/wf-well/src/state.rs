//! Durable per-well state.
//!
//! Holds what survives across Newton iterations and timesteps: pressures,
//! reported rates, per-perforation reporting quantities and the injectivity
//! throughput accumulators. Everything is plain SI scalars so snapshots
//! serialize directly.

use serde::{Deserialize, Serialize};
use wf_core::Real;

/// Reporting and sub-model quantities for one perforation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PerfData {
    /// Hydrostatic pressure offset from the bottom-hole datum [Pa].
    pub pressure_diff: Real,
    /// Connection pressure `bhp + pressure_diff` at the last assembly [Pa].
    pub pressure: Real,
    /// Surface-condition component rates [sm³/s], before the efficiency
    /// factor is applied.
    pub phase_rates: Vec<Real>,
    /// Gas dissolved in the produced oil stream [sm³/s].
    pub dis_gas_rate: Real,
    /// Oil vaporized in the produced gas stream [sm³/s].
    pub vap_oil_rate: Real,
    pub polymer_rate: Real,
    pub solvent_rate: Real,
    pub brine_rate: Real,
    /// Water velocity unknown of the injectivity sub-model [m/s].
    pub water_velocity: Real,
    /// Skin pressure unknown of the injectivity sub-model [Pa].
    pub skin_pressure: Real,
    /// Accumulated injected water volume per flow area [m].
    pub water_throughput: Real,
    /// Connection-level productivity index per component.
    pub prod_index: Vec<Real>,
}

impl PerfData {
    pub fn new(n_comps: usize) -> Self {
        Self {
            phase_rates: vec![0.0; n_comps],
            prod_index: vec![0.0; n_comps],
            ..Self::default()
        }
    }
}

/// Snapshot of one well between Newton iterations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WellState {
    /// Bottom-hole pressure [Pa].
    pub bhp: Real,
    /// Tubing-head pressure [Pa]; zero when the well has no lift table.
    pub thp: Real,
    /// Surface-condition component rates [sm³/s]; negative for producers.
    pub surface_rates: Vec<Real>,
    /// Well total of the perforation dissolved-gas rates [sm³/s].
    pub dissolved_gas_rate: Real,
    /// Well total of the perforation vaporized-oil rates [sm³/s].
    pub vaporized_oil_rate: Real,
    /// Component rates the well could sustain at its pressure limits.
    pub potentials: Vec<Real>,
    /// Well-level productivity index per component.
    pub productivity_index: Vec<Real>,
    pub perf: Vec<PerfData>,
    /// Set by the driver; a stopped well keeps its state but is skipped by
    /// the local solve.
    pub stopped: bool,
}

impl WellState {
    pub fn new(n_comps: usize, n_perfs: usize) -> Self {
        Self {
            bhp: 0.0,
            thp: 0.0,
            surface_rates: vec![0.0; n_comps],
            dissolved_gas_rate: 0.0,
            vaporized_oil_rate: 0.0,
            potentials: vec![0.0; n_comps],
            productivity_index: vec![0.0; n_comps],
            perf: (0..n_perfs).map(|_| PerfData::new(n_comps)).collect(),
            stopped: false,
        }
    }

    /// Sum of the surface component rates.
    pub fn total_surface_rate(&self) -> Real {
        self.surface_rates.iter().sum()
    }
}
