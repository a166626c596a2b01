//! Scalar rate queries.
//!
//! Operability checks, potentials and reporting all need "what would this
//! well flow at pressure p" without touching the Jacobian. The answers run
//! the same perforation kernel as assembly, fed with constants, so a query
//! at the current BHP reproduces the assembled rates exactly.

use crate::config::WellConfig;
use crate::error::WellResult;
use crate::perf_flow::{self, PerfFlowContext};
use crate::state::WellState;
use wf_comm::WellComm;
use wf_core::{Ad, Real};
use wf_pvt::PerfCell;

/// Surface-volume composition of the wellbore mixture, from the current
/// rates, falling back to the declared phase when the well is at rest.
pub fn wellbore_composition(config: &WellConfig, state: &WellState) -> Vec<Real> {
    let nc = config.n_comps();
    let total = state.total_surface_rate();
    let mut cmix = vec![0.0; nc];
    if total != 0.0 {
        for comp in 0..nc {
            cmix[comp] = state.surface_rates[comp] / total;
        }
    } else {
        let phase = if config.kind.is_injector() {
            config.injection_phase.unwrap_or(config.preferred_phase)
        } else {
            config.preferred_phase
        };
        if let Some(comp) = config.phases.comp_index(phase) {
            cmix[comp] = 1.0;
        }
    }
    cmix
}

/// One scalar pass over the local perforations at trial pressure `bhp`,
/// summed across the group. Crossflow is allowed either by configuration
/// or to sidestep a singular flow direction at the current state.
pub(crate) fn scalar_rate_loop(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    bhp: Real,
    cmix: &[Real],
    comm: &dyn WellComm,
) -> WellResult<Vec<Real>> {
    let nc = config.n_comps();
    let allow_cf = config.allow_crossflow
        || crate::operability::open_crossflow_to_avoid_singularity(config, state, cells, comm);

    let bhp_ad = Ad::constant(bhp);
    let cmix_ad: Vec<Ad> = cmix.iter().map(|c| Ad::constant(*c)).collect();
    let mut totals = vec![0.0; nc];
    for (perf, perf_cfg) in config.perfs.iter().enumerate() {
        let cell = &cells[perf];
        let ctx = PerfFlowContext {
            well_name: &config.name,
            kind: config.kind,
            phases: config.phases,
            cell,
            bhp: &bhp_ad,
            tw: perf_cfg.connection_factor * cell.trans_multiplier,
            pressure_diff: state.perf[perf].pressure_diff,
            skin_pressure: Ad::constant(state.perf[perf].skin_pressure),
            allow_crossflow: allow_cf,
            cmix_s: &cmix_ad,
        };
        let mut mob = cell.mobility.clone();
        if let Some(polymer) = &config.tracers.polymer {
            perf_flow::apply_polymer_mobility_corrections(
                polymer,
                &ctx,
                perf_cfg.contact_area(),
                perf_cfg.bore_diameter.value,
                &mut mob,
            )?;
        }
        let rates = perf_flow::compute_perf_rate(&ctx, &mob)?;
        for comp in 0..nc {
            totals[comp] += rates.cq_s[comp].value();
        }
    }
    comm.sum_in_place(&mut totals);
    Ok(totals)
}

/// Component rates the well would flow at `bhp`, holding composition and
/// hydrostatic offsets at their current values.
pub fn well_rates_with_bhp(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    bhp: Real,
    comm: &dyn WellComm,
) -> WellResult<Vec<Real>> {
    let cmix = wellbore_composition(config, state);
    scalar_rate_loop(config, state, cells, bhp, &cmix, comm)
}

/// Component rates at the current bottom-hole pressure.
pub fn current_well_rates(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    comm: &dyn WellComm,
) -> WellResult<Vec<Real>> {
    well_rates_with_bhp(config, state, cells, state.bhp, comm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PerfConfig, WellKind};
    use wf_comm::SerialComm;
    use wf_core::{units, CellId, Id};
    use wf_pvt::{Phase, PhaseSet};

    fn water_oil() -> PhaseSet {
        PhaseSet::new(true, true, false).unwrap()
    }

    fn producer() -> WellConfig {
        WellConfig::new(
            "RP-1",
            Id::from_index(0),
            WellKind::Producer,
            water_oil(),
            Phase::Oil,
            vec![
                PerfConfig::new(CellId::from_index(0), 2.0, units::m(2000.0)),
                PerfConfig::new(CellId::from_index(1), 1.0, units::m(2001.0)),
            ],
        )
    }

    fn cell(pressure: Real, mob: &[Real]) -> PerfCell {
        PerfCell::new(
            Ad::constant(pressure),
            mob.iter().map(|m| Ad::constant(*m)).collect(),
            vec![Ad::constant(1.0); mob.len()],
        )
    }

    #[test]
    fn rates_scale_linearly_with_drawdown() {
        let config = producer();
        let mut state = WellState::new(2, 2);
        state.surface_rates = vec![-1.0, -3.0];
        let cells = vec![cell(100.0, &[1.0, 2.0]), cell(100.0, &[1.0, 1.0])];

        let at_90 = well_rates_with_bhp(&config, &state, &cells, 90.0, &SerialComm).unwrap();
        let at_80 = well_rates_with_bhp(&config, &state, &cells, 80.0, &SerialComm).unwrap();
        // Perf 0: tw 2, perf 1: tw 1; water mob 1 both: -(2+1)*dd.
        assert!((at_90[0] - (-30.0)).abs() < 1e-12);
        assert!((at_80[0] - (-60.0)).abs() < 1e-12);
        // Oil picks up the mobility difference.
        assert!((at_90[1] - (-(2.0 * 2.0 + 1.0) * 10.0)).abs() < 1e-12);
    }

    #[test]
    fn current_rates_use_the_state_bhp() {
        let config = producer();
        let mut state = WellState::new(2, 2);
        state.bhp = 95.0;
        state.surface_rates = vec![-1.0, -1.0];
        let cells = vec![cell(100.0, &[1.0, 1.0]), cell(100.0, &[1.0, 1.0])];
        let current = current_well_rates(&config, &state, &cells, &SerialComm).unwrap();
        let explicit =
            well_rates_with_bhp(&config, &state, &cells, 95.0, &SerialComm).unwrap();
        assert_eq!(current, explicit);
    }

    #[test]
    fn resting_well_uses_the_declared_composition() {
        let config = producer();
        let state = WellState::new(2, 2);
        let cmix = wellbore_composition(&config, &state);
        // Preferred phase oil sits at dense index 1 behind water.
        assert_eq!(cmix, vec![0.0, 1.0]);

        let mut flowing = WellState::new(2, 2);
        flowing.surface_rates = vec![-1.0, -3.0];
        let cmix = wellbore_composition(&config, &flowing);
        assert!((cmix[0] - 0.25).abs() < 1e-12);
        assert!((cmix[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn banned_crossflow_zeroes_backward_perforations() {
        let mut config = producer();
        config.allow_crossflow = false;
        let mut state = WellState::new(2, 2);
        state.bhp = 95.0;
        state.surface_rates = vec![-1.0, -1.0];
        // Perf 1 sits below the well pressure and would take fluid in.
        let cells = vec![cell(100.0, &[1.0, 1.0]), cell(90.0, &[1.0, 1.0])];
        let rates = current_well_rates(&config, &state, &cells, &SerialComm).unwrap();
        // Only perf 0 contributes: tw 2, dd 5.
        assert!((rates[0] - (-10.0)).abs() < 1e-12);
        assert!((rates[1] - (-10.0)).abs() < 1e-12);
    }
}
