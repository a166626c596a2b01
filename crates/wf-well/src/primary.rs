//! The well's local primary-variable vector.
//!
//! Layout, in derivative-slot order after the reservoir-cell unknowns:
//!
//! - slot 0: total surface-volume rate (signed; negative for producers)
//! - slots 1..nc: surface-volume fractions of the non-base components
//! - slot nc: bottom-hole pressure
//! - injectivity extras, when enabled: one water velocity per perforation,
//!   then one skin pressure per perforation
//!
//! The base component (oil when active, otherwise the first active
//! component) is implicit: its fraction is one minus the sum of the stored
//! fractions. Newton updates are damped and chopped here so the fractions
//! stay on the physical simplex.

use crate::config::{WellConfig, WellKind};
use crate::error::WellResult;
use crate::state::WellState;
use wf_core::{Ad, Real, ensure_finite};
use wf_pvt::{Phase, PhaseSet};

const Q_TOTAL: usize = 0;

/// Damping limits for the local Newton update.
#[derive(Clone, Copy, Debug)]
pub struct UpdateConfig {
    /// Largest fraction change taken in one update.
    pub df_limit: Real,
    /// Largest BHP change, relative to the current BHP.
    pub dbhp_limit_rel: Real,
    /// Relaxation factor for the injectivity extras.
    pub extras_relaxation: Real,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            df_limit: 0.2,
            dbhp_limit_rel: 1.0,
            extras_relaxation: 0.9,
        }
    }
}

/// Well unknowns plus the frozen accumulation reference.
#[derive(Clone, Debug)]
pub struct PrimaryVariables {
    values: Vec<Real>,
    /// Volume fractions at the timestep start, per dense component; the
    /// storage term differences against these.
    f0: Vec<Real>,
    phases: PhaseSet,
    n_res_eq: usize,
    n_perf: usize,
    has_injectivity: bool,
}

impl PrimaryVariables {
    pub fn new(phases: PhaseSet, n_res_eq: usize, n_perf: usize, has_injectivity: bool) -> Self {
        let nc = phases.n_phases();
        let n_well_eq = nc + 1 + if has_injectivity { 2 * n_perf } else { 0 };
        Self {
            values: vec![0.0; n_well_eq],
            f0: vec![0.0; nc],
            phases,
            n_res_eq,
            n_perf,
            has_injectivity,
        }
    }

    pub fn n_well_eq(&self) -> usize {
        self.values.len()
    }

    pub fn n_res_eq(&self) -> usize {
        self.n_res_eq
    }

    pub fn has_injectivity(&self) -> bool {
        self.has_injectivity
    }

    pub fn bhp_index(&self) -> usize {
        self.phases.n_phases()
    }

    pub fn water_velocity_index(&self, perf: usize) -> usize {
        debug_assert!(self.has_injectivity && perf < self.n_perf);
        self.bhp_index() + 1 + perf
    }

    pub fn skin_pressure_index(&self, perf: usize) -> usize {
        debug_assert!(self.has_injectivity && perf < self.n_perf);
        self.bhp_index() + 1 + self.n_perf + perf
    }

    /// Dense index of the implicit component.
    pub fn base_comp(&self) -> usize {
        if let Some(oil) = self.phases.comp_index(Phase::Oil) {
            return oil;
        }
        0
    }

    /// Storage slot of a non-base component's fraction.
    fn fraction_slot(&self, comp: usize) -> Option<usize> {
        let base = self.base_comp();
        if comp == base {
            return None;
        }
        let slot = if comp < base { comp } else { comp - 1 };
        Some(1 + slot)
    }

    pub fn q_total(&self) -> Real {
        self.values[Q_TOTAL]
    }

    pub fn bhp(&self) -> Real {
        self.values[self.bhp_index()]
    }

    pub fn water_velocity(&self, perf: usize) -> Real {
        self.values[self.water_velocity_index(perf)]
    }

    pub fn skin_pressure(&self, perf: usize) -> Real {
        self.values[self.skin_pressure_index(perf)]
    }

    /// Seed every unknown as a differentiable variable in the combined
    /// cell+well slot space.
    pub fn evaluate(&self) -> Vec<Ad> {
        let len = self.n_res_eq + self.values.len();
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| Ad::variable(*v, self.n_res_eq + i, len))
            .collect()
    }

    /// Surface-volume fraction per dense component, base implicit.
    pub fn volume_fractions(&self, eval: &[Ad]) -> Vec<Ad> {
        let nc = self.phases.n_phases();
        let base = self.base_comp();
        let mut fractions = vec![Ad::constant(0.0); nc];
        let mut base_fraction = Ad::constant(1.0);
        for comp in 0..nc {
            if let Some(slot) = self.fraction_slot(comp) {
                fractions[comp] = eval[slot].clone();
                base_fraction -= &eval[slot];
            }
        }
        fractions[base] = base_fraction;
        fractions
    }

    /// Value-space volume fractions.
    pub fn fraction_values(&self) -> Vec<Real> {
        let nc = self.phases.n_phases();
        let base = self.base_comp();
        let mut fractions = vec![0.0; nc];
        let mut base_fraction = 1.0;
        for comp in 0..nc {
            if let Some(slot) = self.fraction_slot(comp) {
                fractions[comp] = self.values[slot];
                base_fraction -= self.values[slot];
            }
        }
        fractions[base] = base_fraction;
        fractions
    }

    /// Surface rate of one component, `q_total * F_c`.
    pub fn surface_rate(&self, eval: &[Ad], fractions: &[Ad], comp: usize) -> Ad {
        &eval[Q_TOTAL] * &fractions[comp]
    }

    /// Accumulation reference for one component.
    pub fn f0(&self, comp: usize) -> Real {
        self.f0[comp]
    }

    /// Freeze the current fractions as the storage-term reference. Called
    /// once at the start of each timestep.
    pub fn reset_accumulation_reference(&mut self) {
        self.f0 = self.fraction_values();
    }

    /// Load the unknowns from durable state at the start of an iteration
    /// sequence.
    pub fn set_from_state(&mut self, state: &WellState, config: &WellConfig) {
        let total: Real = state.surface_rates.iter().sum();
        self.values[Q_TOTAL] = total;

        let nc = self.phases.n_phases();
        let mut fractions = vec![0.0; nc];
        if total != 0.0 {
            for comp in 0..nc {
                fractions[comp] = state.surface_rates[comp] / total;
            }
        } else {
            // No flow yet: start from the declared composition.
            let phase = match config.kind {
                WellKind::Injector => config.injection_phase.unwrap_or(config.preferred_phase),
                WellKind::Producer => config.preferred_phase,
            };
            if let Some(comp) = self.phases.comp_index(phase) {
                fractions[comp] = 1.0;
            }
        }
        for comp in 0..nc {
            if let Some(slot) = self.fraction_slot(comp) {
                self.values[slot] = fractions[comp];
            }
        }

        let bhp_index = self.bhp_index();
        self.values[bhp_index] = state.bhp;

        if self.has_injectivity {
            for perf in 0..self.n_perf {
                let wv_index = self.water_velocity_index(perf);
                self.values[wv_index] = state.perf[perf].water_velocity;
                let sp_index = self.skin_pressure_index(perf);
                self.values[sp_index] = state.perf[perf].skin_pressure;
            }
        }
    }

    /// Apply a damped Newton update `x -= dx`.
    ///
    /// Fraction moves share one relaxation factor keeping the largest step
    /// at `df_limit`; the BHP step is capped relative to the current BHP;
    /// injectivity extras take a fixed relaxation.
    pub fn apply_update(&mut self, dx: &[Real], config: &UpdateConfig) -> WellResult<()> {
        debug_assert_eq!(dx.len(), self.values.len());
        for v in dx {
            ensure_finite(*v, "well Newton update")?;
        }

        let nc = self.phases.n_phases();
        let mut max_df: Real = 0.0;
        for slot in 1..nc {
            max_df = max_df.max(dx[slot].abs());
        }
        let relax = if max_df > config.df_limit {
            config.df_limit / max_df
        } else {
            1.0
        };
        for slot in 1..nc {
            self.values[slot] -= relax * dx[slot];
        }
        self.process_fractions();

        self.values[Q_TOTAL] -= dx[Q_TOTAL];

        let bhp_index = self.bhp_index();
        let cap = config.dbhp_limit_rel * self.values[bhp_index].abs();
        let step = dx[bhp_index].clamp(-cap, cap);
        self.values[bhp_index] -= step;

        if self.has_injectivity {
            for i in bhp_index + 1..self.values.len() {
                self.values[i] -= config.extras_relaxation * dx[i];
            }
        }
        Ok(())
    }

    /// Chop negative fractions back onto the simplex, renormalizing the
    /// rest so the total stays one.
    fn process_fractions(&mut self) {
        let nc = self.phases.n_phases();
        let mut fractions = self.fraction_values();
        for comp in 0..nc {
            if fractions[comp] < 0.0 {
                let scale = 1.0 - fractions[comp];
                for (other, f) in fractions.iter_mut().enumerate() {
                    if other != comp {
                        *f /= scale;
                    }
                }
                fractions[comp] = 0.0;
            }
        }
        for comp in 0..nc {
            if let Some(slot) = self.fraction_slot(comp) {
                self.values[slot] = fractions[comp];
            }
        }
    }

    /// Write the unknowns back into durable state. The tubing-head
    /// pressure is refreshed separately through the lift table.
    pub fn update_state(&self, state: &mut WellState) {
        state.bhp = self.bhp();
        let fractions = self.fraction_values();
        let total = self.q_total();
        for (comp, f) in fractions.iter().enumerate() {
            state.surface_rates[comp] = total * f;
        }
        if self.has_injectivity {
            for perf in 0..self.n_perf {
                state.perf[perf].water_velocity = self.water_velocity(perf);
                state.perf[perf].skin_pressure = self.skin_pressure(perf);
            }
        }
    }
}
