//! Per-perforation snapshot of the connected reservoir cell.
//!
//! The simulator evaluates intensive quantities cell by cell and hands them
//! to the well model through this struct. Derivative-bearing fields carry
//! cell-unknown slots only; the well model widens them into the combined
//! cell+well slot space during assembly.

use crate::error::{PvtError, PvtResult};
use crate::phase::PhaseSet;
use wf_core::{Ad, Real};

/// Reservoir-cell quantities seen by one perforation.
///
/// `mobility` and `inv_b` are dense per active component. The scalar tail
/// (surface densities, saturated maxima, thermal fields, tracer
/// concentrations) feeds the density and transport paths that only need
/// values, not derivatives.
#[derive(Clone, Debug)]
pub struct PerfCell {
    /// Cell pressure [Pa].
    pub pressure: Ad,
    /// Phase mobility [1/(Pa·s)] per dense component.
    pub mobility: Vec<Ad>,
    /// Reciprocal formation volume factor per dense component.
    pub inv_b: Vec<Ad>,
    /// Dissolved gas-oil ratio at cell conditions.
    pub rs: Ad,
    /// Vaporized oil-gas ratio at cell conditions.
    pub rv: Ad,
    /// Saturated maximum of rs at cell conditions.
    pub rs_sat: Real,
    /// Saturated maximum of rv at cell conditions.
    pub rv_sat: Real,
    /// Rock-compaction multiplier on the connection transmissibility.
    pub trans_multiplier: Real,
    /// Surface density [kg/m³] per dense component.
    pub surface_density: Vec<Real>,
    /// Reservoir-condition phase enthalpy [J/kg]; empty unless energy
    /// transport is enabled.
    pub enthalpy: Vec<Real>,
    /// Reservoir-condition phase density [kg/m³]; empty unless energy
    /// transport is enabled.
    pub phase_density: Vec<Real>,
    /// Cell porosity, used by the shear-velocity estimate.
    pub porosity: Real,
    /// Water saturation, used by the shear-velocity estimate.
    pub water_saturation: Real,
    /// Polymer correction on the water viscosity.
    pub water_viscosity_correction: Real,
    /// Cell-side polymer concentration [kg/m³] for producing connections.
    pub polymer_concentration: Real,
    /// Shear correction on the transported polymer concentration.
    pub polymer_viscosity_correction: Real,
    /// Cell-side polymer molecular weight for producing connections.
    pub polymer_mole_weight: Real,
    /// Cell-side foam concentration for producing connections.
    pub foam_concentration: Real,
    /// Cell-side salt concentration [kg/m³] for producing connections.
    pub salt_concentration: Real,
    /// Solvent fraction of the dissolved-gas stream for producing
    /// connections.
    pub solvent_dissolved_fraction: Real,
    /// Solvent fraction of the free-gas stream for producing connections.
    pub solvent_free_fraction: Real,
    /// Pure-solvent reciprocal formation volume factor; blended into the
    /// gas entry for solvent injectors.
    pub solvent_inv_b: Real,
}

impl Default for PerfCell {
    fn default() -> Self {
        Self {
            pressure: Ad::constant(0.0),
            mobility: Vec::new(),
            inv_b: Vec::new(),
            rs: Ad::constant(0.0),
            rv: Ad::constant(0.0),
            rs_sat: 0.0,
            rv_sat: 0.0,
            trans_multiplier: 1.0,
            surface_density: Vec::new(),
            enthalpy: Vec::new(),
            phase_density: Vec::new(),
            porosity: 0.0,
            water_saturation: 0.0,
            water_viscosity_correction: 1.0,
            polymer_concentration: 0.0,
            polymer_viscosity_correction: 1.0,
            polymer_mole_weight: 0.0,
            foam_concentration: 0.0,
            salt_concentration: 0.0,
            solvent_dissolved_fraction: 0.0,
            solvent_free_fraction: 0.0,
            solvent_inv_b: 0.0,
        }
    }
}

impl PerfCell {
    /// Snapshot with the flow fields set and the scalar tail defaulted.
    pub fn new(pressure: Ad, mobility: Vec<Ad>, inv_b: Vec<Ad>) -> Self {
        Self {
            pressure,
            mobility,
            inv_b,
            ..Self::default()
        }
    }

    /// Sum of phase mobilities.
    pub fn total_mobility(&self) -> Ad {
        let mut total = Ad::constant(0.0);
        for mob in &self.mobility {
            total += mob;
        }
        total
    }

    /// Check per-component vector lengths against the active set and reject
    /// non-physical values.
    pub fn validate(&self, phases: &PhaseSet) -> PvtResult<()> {
        let nc = phases.n_phases();
        if self.mobility.len() != nc {
            return Err(PvtError::InvalidArg {
                what: "mobility length must match active components",
            });
        }
        if self.inv_b.len() != nc {
            return Err(PvtError::InvalidArg {
                what: "inv_b length must match active components",
            });
        }
        if !self.surface_density.is_empty() && self.surface_density.len() != nc {
            return Err(PvtError::InvalidArg {
                what: "surface_density length must match active components",
            });
        }
        for mob in &self.mobility {
            if !mob.value().is_finite() || mob.value() < 0.0 {
                return Err(PvtError::NonPhysical {
                    what: "phase mobility",
                });
            }
        }
        for b in &self.inv_b {
            if !b.value().is_finite() || b.value() < 0.0 {
                return Err(PvtError::NonPhysical {
                    what: "reciprocal formation volume factor",
                });
            }
        }
        if !self.pressure.value().is_finite() {
            return Err(PvtError::NonPhysical {
                what: "cell pressure",
            });
        }
        if !(self.trans_multiplier.is_finite() && self.trans_multiplier >= 0.0) {
            return Err(PvtError::NonPhysical {
                what: "transmissibility multiplier",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::Ad;

    fn three_phase_cell() -> PerfCell {
        PerfCell::new(
            Ad::variable(220e5, 0, 3),
            vec![
                Ad::constant(1e-10),
                Ad::constant(2e-10),
                Ad::constant(3e-10),
            ],
            vec![Ad::constant(1.0), Ad::constant(0.9), Ad::constant(120.0)],
        )
    }

    #[test]
    fn validate_accepts_consistent_cell() {
        let cell = three_phase_cell();
        assert!(cell.validate(&PhaseSet::all()).is_ok());
    }

    #[test]
    fn validate_rejects_wrong_lengths() {
        let mut cell = three_phase_cell();
        cell.mobility.pop();
        assert!(cell.validate(&PhaseSet::all()).is_err());
    }

    #[test]
    fn validate_rejects_negative_mobility() {
        let mut cell = three_phase_cell();
        cell.mobility[1] = Ad::constant(-1.0);
        assert!(cell.validate(&PhaseSet::all()).is_err());
    }

    #[test]
    fn total_mobility_sums_phases() {
        let cell = three_phase_cell();
        assert!((cell.total_mobility().value() - 6e-10).abs() < 1e-24);
    }
}
