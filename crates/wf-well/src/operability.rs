//! Operability classification.
//!
//! Between Newton iterations the driver asks whether a well can keep
//! operating under its current pressure limits. The answer comes from a
//! linear inflow approximation (rate ≈ a − b·bhp per component, rebuilt
//! from scratch on every call) plus two pressure checks through the lift
//! table. Nothing here stops a well; the flags feed the driver's
//! control-mode decision.

use crate::config::WellConfig;
use crate::error::WellResult;
use crate::rates::{well_rates_with_bhp, wellbore_composition};
use crate::state::WellState;
use tracing::{debug, warn};
use wf_comm::WellComm;
use wf_core::units::constants::ATM_PA;
use wf_core::Real;
use wf_pvt::{PerfCell, Phase};

/// Knobs of the operability checks.
#[derive(Clone, Copy, Debug)]
pub struct OperabilityConfig {
    /// BHP limits at or below this value are treated as defaulted; the
    /// deliberately loose factor mirrors schedule decks that leave the
    /// limit at one atmosphere.
    pub defaulted_bhp_threshold: Real,
    /// BHP search interval for the solve against the lift table [Pa].
    pub bhp_search_range: (Real, Real),
    /// Samples across the search interval before refinement.
    pub bhp_search_samples: usize,
}

impl Default for OperabilityConfig {
    fn default() -> Self {
        Self {
            defaulted_bhp_threshold: 1.5 * ATM_PA,
            bhp_search_range: (ATM_PA, 700e5),
            bhp_search_samples: 50,
        }
    }
}

/// Control-feasibility flags of one well.
///
/// All true at rest; each check can only pull its own flag down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperabilityStatus {
    /// The well can flow at its BHP limit for every active component.
    pub operable_under_bhp_limit: bool,
    /// Operating at the BHP limit keeps the tubing-head pressure above its
    /// target.
    pub obey_thp_limit_under_bhp_limit: bool,
    /// A BHP satisfying the THP target exists on the lift table.
    pub can_obtain_bhp_with_thp_limit: bool,
    /// That BHP also respects the BHP limit.
    pub obey_bhp_limit_with_thp_limit: bool,
}

impl Default for OperabilityStatus {
    fn default() -> Self {
        Self {
            operable_under_bhp_limit: true,
            obey_thp_limit_under_bhp_limit: true,
            can_obtain_bhp_with_thp_limit: true,
            obey_bhp_limit_with_thp_limit: true,
        }
    }
}

/// Where the flags place the well.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperabilityState {
    Operable,
    InoperableUnderBhpLimit,
    InoperableUnderThpLimit,
    Stopped,
}

impl OperabilityStatus {
    /// The well can run under at least one of its pressure constraints.
    pub fn is_operable(&self) -> bool {
        self.operable_under_bhp_limit
            && (self.obey_thp_limit_under_bhp_limit
                || (self.can_obtain_bhp_with_thp_limit && self.obey_bhp_limit_with_thp_limit))
    }

    /// Classify the flags; `stopped` is the driver's decision and wins.
    pub fn state(&self, stopped: bool) -> OperabilityState {
        if stopped {
            return OperabilityState::Stopped;
        }
        if !self.operable_under_bhp_limit {
            return OperabilityState::InoperableUnderBhpLimit;
        }
        if self.is_operable() {
            OperabilityState::Operable
        } else {
            OperabilityState::InoperableUnderThpLimit
        }
    }
}

/// Per-component inflow approximation `rate ≈ a − b·bhp`.
#[derive(Clone, Debug, PartialEq)]
pub struct IprCoefficients {
    pub a: Vec<Real>,
    pub b: Vec<Real>,
}

impl IprCoefficients {
    /// Rate of component `comp` at `bhp` under the linear approximation.
    pub fn rate_at(&self, comp: usize, bhp: Real) -> Real {
        self.a[comp] - self.b[comp] * bhp
    }
}

/// Rebuild the inflow-performance coefficients from current mobilities.
///
/// Per perforation and component, `b += tw·mob·invB` and
/// `a += tw·mob·invB·(p_cell − dp_perf)`; dissolved-gas and vaporized-oil
/// cross terms follow when both oil and gas are active. The sums run over
/// every completion of the well, so the final reduction is group-wide.
pub fn update_ipr(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    comm: &dyn WellComm,
) -> WellResult<IprCoefficients> {
    let nc = config.n_comps();
    let mut a = vec![0.0; nc];
    let mut b = vec![0.0; nc];

    let oil_gas = match (
        config.phases.comp_index(Phase::Oil),
        config.phases.comp_index(Phase::Gas),
    ) {
        (Some(oil), Some(gas)) => Some((oil, gas)),
        _ => None,
    };

    for (perf, cell) in cells.iter().enumerate() {
        let p_r = cell.pressure.value();
        // Cell pressure corrected to the datum; negative means even a zero
        // BHP cannot draw this connection down.
        let pressure_diff = p_r - state.perf[perf].pressure_diff;
        if pressure_diff <= 0.0 {
            warn!(
                well = %config.name,
                perf,
                pressure_diff,
                "non-positive drawdown while rebuilding inflow coefficients"
            );
        }

        let tw = config.perfs[perf].connection_factor * cell.trans_multiplier;
        let mut a_perf = vec![0.0; nc];
        let mut b_perf = vec![0.0; nc];
        for comp in 0..nc {
            let tw_mob = tw * cell.mobility[comp].value() * cell.inv_b[comp].value();
            a_perf[comp] = tw_mob * pressure_diff;
            b_perf[comp] = tw_mob;
        }

        if let Some((oil, gas)) = oil_gas {
            let rs = cell.rs.value();
            let rv = cell.rv.value();
            let dis_gas_a = rs * a_perf[oil];
            let vap_oil_a = rv * a_perf[gas];
            a_perf[gas] += dis_gas_a;
            a_perf[oil] += vap_oil_a;
            let dis_gas_b = rs * b_perf[oil];
            let vap_oil_b = rv * b_perf[gas];
            b_perf[gas] += dis_gas_b;
            b_perf[oil] += vap_oil_b;
        }

        for comp in 0..nc {
            a[comp] += a_perf[comp];
            b[comp] += b_perf[comp];
        }
    }

    comm.sum_in_place(&mut a);
    comm.sum_in_place(&mut b);
    Ok(IprCoefficients { a, b })
}

/// True when the drawdown at every completion of the well opposes its
/// declared role. One correctly oriented completion anywhere in the group
/// keeps the answer false.
pub fn all_drawdown_wrong_direction(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    comm: &dyn WellComm,
) -> bool {
    let mut all_wrong = true;
    for (perf, cell) in cells.iter().enumerate() {
        let well_pressure = state.bhp + state.perf[perf].pressure_diff;
        let drawdown = cell.pressure.value() - well_pressure;
        if (drawdown < 0.0 && config.kind.is_injector())
            || (drawdown > 0.0 && config.kind.is_producer())
        {
            all_wrong = false;
            break;
        }
    }
    comm.all(all_wrong)
}

/// A crossflow-banned well whose every completion points the wrong way
/// has a singular flow direction; letting crossflow through for this
/// iteration keeps the equations solvable.
pub fn open_crossflow_to_avoid_singularity(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    comm: &dyn WellComm,
) -> bool {
    !config.allow_crossflow && all_drawdown_wrong_direction(config, state, cells, comm)
}

fn has_thp_constraint(config: &WellConfig) -> bool {
    config.controls.thp_limit.is_some() && config.controls.vfp.is_some()
}

fn flow_sign_ok(config: &WellConfig, value: Real) -> bool {
    if config.kind.is_producer() {
        value < 0.0
    } else {
        value > 0.0
    }
}

/// The BHP-limit leg of the check.
fn check_under_bhp_limit(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    ipr: &IprCoefficients,
    op: &OperabilityConfig,
    comm: &dyn WellComm,
    status: &mut OperabilityStatus,
) -> WellResult<()> {
    let bhp_limit = config.controls.bhp_limit.value;
    let defaulted = bhp_limit <= op.defaulted_bhp_threshold;

    if config.kind.is_producer() && defaulted && has_thp_constraint(config) {
        // A defaulted limit sits near one atmosphere; after the hydrostatic
        // correction the lift-table lookup would run at a meaningless
        // negative pressure. Assume operable and let the THP leg rule.
        status.operable_under_bhp_limit = true;
        status.obey_thp_limit_under_bhp_limit = false;
        return Ok(());
    }

    for comp in 0..config.n_comps() {
        let margin = ipr.rate_at(comp, bhp_limit);
        let feasible = if config.kind.is_producer() {
            margin >= 0.0
        } else {
            margin <= 0.0
        };
        if !feasible {
            status.operable_under_bhp_limit = false;
            break;
        }
    }

    if !status.operable_under_bhp_limit {
        return Ok(());
    }
    if let (Some(vfp), Some(thp_limit)) =
        (config.controls.vfp.as_ref(), config.controls.thp_limit)
    {
        let rates = well_rates_with_bhp(config, state, cells, bhp_limit, comm)?;
        let flo: Real = rates.iter().sum::<Real>().abs();
        match vfp.implied_thp(flo, bhp_limit) {
            Some(thp) if thp >= thp_limit.value => {}
            Some(thp) => {
                debug!(
                    well = %config.name,
                    thp,
                    thp_limit = thp_limit.value,
                    "thp at the bhp limit falls below the target"
                );
                status.obey_thp_limit_under_bhp_limit = false;
            }
            None => {
                warn!(
                    well = %config.name,
                    "lift table has no thp matching the bhp limit"
                );
                status.obey_thp_limit_under_bhp_limit = false;
            }
        }
    }
    Ok(())
}

/// The THP-limit leg: solve for the BHP sustaining the THP target and
/// check it against the BHP limit.
fn check_under_thp_limit(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    op: &OperabilityConfig,
    comm: &dyn WellComm,
    status: &mut OperabilityStatus,
) -> WellResult<()> {
    match bhp_at_thp_limit(config, state, cells, op, comm)? {
        Some(bhp) => {
            status.can_obtain_bhp_with_thp_limit = true;
            let bhp_limit = config.controls.bhp_limit.value;
            status.obey_bhp_limit_with_thp_limit = if config.kind.is_producer() {
                bhp >= bhp_limit
            } else {
                bhp <= bhp_limit
            };
        }
        None => {
            status.can_obtain_bhp_with_thp_limit = false;
            status.obey_bhp_limit_with_thp_limit = false;
            if !state.stopped {
                warn!(
                    well = %config.name,
                    "no bhp found at the thp limit; the well may need to be shut"
                );
            }
        }
    }
    Ok(())
}

/// BHP at which the well meets its THP target, solved over the lift table
/// with the inflow evaluated at the current wellbore composition.
pub fn bhp_at_thp_limit(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    op: &OperabilityConfig,
    comm: &dyn WellComm,
) -> WellResult<Option<Real>> {
    let (Some(thp_limit), Some(vfp)) = (config.controls.thp_limit, config.controls.vfp.as_ref())
    else {
        return Ok(None);
    };
    let cmix = wellbore_composition(config, state);
    let root = vfp.bhp_at_thp_limit(
        thp_limit.value,
        op.bhp_search_range,
        op.bhp_search_samples,
        |bhp| {
            let rates = crate::rates::scalar_rate_loop(config, state, cells, bhp, &cmix, comm)
                .map_err(|e| wf_pvt::PvtError::from(wf_core::WfError::from(e)))?;
            Ok(rates.iter().sum::<Real>().abs())
        },
    )?;
    Ok(root)
}

/// Recompute the full operability status of one well.
///
/// Producers require a non-negative inflow margin at the BHP limit for
/// every active component; injectors run the same test with the
/// inequality reversed. The THP leg only runs when the well carries a
/// THP constraint, leaving the defaults in place otherwise.
pub fn update_well_operability(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    op: &OperabilityConfig,
    comm: &dyn WellComm,
) -> WellResult<OperabilityStatus> {
    let mut status = OperabilityStatus::default();
    let ipr = update_ipr(config, state, cells, comm)?;
    check_under_bhp_limit(config, state, cells, &ipr, op, comm, &mut status)?;
    if has_thp_constraint(config) {
        check_under_thp_limit(config, state, cells, op, comm, &mut status)?;
    }
    Ok(status)
}

/// Any component rate at the current BHP pointing the declared way.
pub fn can_flow_with_current_bhp(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    comm: &dyn WellComm,
) -> WellResult<bool> {
    let rates = well_rates_with_bhp(config, state, cells, state.bhp, comm)?;
    let can = rates.iter().any(|r| flow_sign_ok(config, *r));
    if !can {
        debug!(well = %config.name, "well cannot flow at its current bhp");
    }
    Ok(can)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PerfConfig, WellKind};
    use wf_comm::SerialComm;
    use wf_core::{units, Ad, CellId, Id};
    use wf_pvt::{PhaseSet, VfpTable};

    fn producer(n_perf: u32) -> WellConfig {
        let perfs = (0..n_perf)
            .map(|i| PerfConfig::new(CellId::from_index(i), 1.0, units::m(2000.0)))
            .collect();
        WellConfig::new(
            "OP-1",
            Id::from_index(0),
            WellKind::Producer,
            PhaseSet::new(true, true, false).unwrap(),
            Phase::Oil,
            perfs,
        )
    }

    fn cell(pressure: Real, mob: &[Real]) -> PerfCell {
        PerfCell::new(
            Ad::constant(pressure),
            mob.iter().map(|m| Ad::constant(*m)).collect(),
            vec![Ad::constant(1.0); mob.len()],
        )
    }

    /// bhp = thp + offset on a flat table.
    fn lift_table(offset: Real) -> VfpTable {
        let flo_axis = vec![0.0, 1000.0];
        let thp_axis = vec![1e5, 400e5];
        let bhp = flo_axis
            .iter()
            .map(|_| thp_axis.iter().map(|t| t + offset).collect())
            .collect();
        VfpTable::new(flo_axis, thp_axis, bhp).unwrap()
    }

    #[test]
    fn ipr_is_recomputed_identically() {
        let config = producer(2);
        let mut state = WellState::new(2, 2);
        state.perf[0].pressure_diff = 2.0;
        state.perf[1].pressure_diff = 3.0;
        let cells = vec![cell(100.0, &[2.0, 1.0]), cell(110.0, &[1.0, 1.0])];
        let first = update_ipr(&config, &state, &cells, &SerialComm).unwrap();
        let second = update_ipr(&config, &state, &cells, &SerialComm).unwrap();
        assert_eq!(first, second);
        // Perf 0: b = 2 + 1, a = 2*98 + 1*98; perf 1: b = 1 + 1, a = 107 each.
        assert!((first.b[0] - 3.0).abs() < 1e-12);
        assert!((first.a[0] - (2.0 * 98.0 + 107.0)).abs() < 1e-12);
    }

    #[test]
    fn ipr_cross_terms_vanish_without_dissolution() {
        let mut config = producer(1);
        config.phases = PhaseSet::new(false, true, true).unwrap();
        let state = WellState::new(2, 1);
        let cells = vec![cell(100.0, &[2.0, 3.0])];
        let ipr = update_ipr(&config, &state, &cells, &SerialComm).unwrap();
        assert!((ipr.b[0] - 2.0).abs() < 1e-12);
        assert!((ipr.b[1] - 3.0).abs() < 1e-12);

        let mut wet = cells;
        wet[0].rs = Ad::constant(0.5);
        wet[0].rv = Ad::constant(0.1);
        let ipr_wet = update_ipr(&config, &state, &wet, &SerialComm).unwrap();
        assert!((ipr_wet.b[1] - (3.0 + 0.5 * 2.0)).abs() < 1e-12);
        assert!((ipr_wet.b[0] - (2.0 + 0.1 * 3.0)).abs() < 1e-12);
    }

    #[test]
    fn inoperable_flags_a_negative_phase_margin() {
        let mut config = producer(1);
        config.controls.bhp_limit = units::pa(120.0);
        let mut state = WellState::new(2, 1);
        state.bhp = 90.0;
        // Cell pressure 100 < bhp limit 120: a - b*limit < 0 for every phase.
        let cells = vec![cell(100.0, &[2.0, 1.0])];
        let status =
            update_well_operability(&config, &state, &cells, &OperabilityConfig::default(), &SerialComm)
                .unwrap();
        assert!(!status.operable_under_bhp_limit);
        assert_eq!(
            status.state(false),
            OperabilityState::InoperableUnderBhpLimit
        );

        let ipr = update_ipr(&config, &state, &cells, &SerialComm).unwrap();
        assert!((0..2).any(|c| ipr.rate_at(c, 120.0) < 0.0));
    }

    #[test]
    fn operable_well_has_margin_on_every_phase() {
        let mut config = producer(1);
        config.controls.bhp_limit = units::pa(80.0);
        let mut state = WellState::new(2, 1);
        state.bhp = 90.0;
        let cells = vec![cell(100.0, &[2.0, 1.0])];
        let status =
            update_well_operability(&config, &state, &cells, &OperabilityConfig::default(), &SerialComm)
                .unwrap();
        assert!(status.operable_under_bhp_limit);
        assert_eq!(status.state(false), OperabilityState::Operable);

        let ipr = update_ipr(&config, &state, &cells, &SerialComm).unwrap();
        assert!((0..2).all(|c| ipr.rate_at(c, 80.0) >= 0.0));
    }

    #[test]
    fn defaulted_bhp_limit_defers_to_the_thp_leg() {
        let mut config = producer(1);
        // One atmosphere: below the 1.5 atm threshold.
        config.controls.bhp_limit = units::pa(ATM_PA);
        config.controls.thp_limit = Some(units::pa(20e5));
        config.controls.vfp = Some(lift_table(50e5));
        let mut state = WellState::new(2, 1);
        state.bhp = 150e5;
        state.surface_rates = vec![-0.01, -0.02];
        let cells = vec![cell(200e5, &[2.0, 1.0])];
        let status =
            update_well_operability(&config, &state, &cells, &OperabilityConfig::default(), &SerialComm)
                .unwrap();
        assert!(status.operable_under_bhp_limit);
        assert!(!status.obey_thp_limit_under_bhp_limit);
        // The THP leg still finds a bhp on the flat table.
        assert!(status.can_obtain_bhp_with_thp_limit);
        assert!(status.is_operable());
    }

    #[test]
    fn thp_leg_reports_the_solved_bhp_against_the_limit() {
        let mut config = producer(1);
        config.controls.bhp_limit = units::pa(60e5);
        config.controls.thp_limit = Some(units::pa(20e5));
        // bhp at thp limit = 70e5, above the bhp limit.
        config.controls.vfp = Some(lift_table(50e5));
        let mut state = WellState::new(2, 1);
        state.bhp = 150e5;
        state.surface_rates = vec![-0.01, -0.02];
        let cells = vec![cell(200e5, &[2e-9, 1e-9])];
        let op = OperabilityConfig::default();
        let bhp = bhp_at_thp_limit(&config, &state, &cells, &op, &SerialComm)
            .unwrap()
            .unwrap();
        assert!((bhp - 70e5).abs() < 1e3);
        let status =
            update_well_operability(&config, &state, &cells, &op, &SerialComm).unwrap();
        assert!(status.can_obtain_bhp_with_thp_limit);
        assert!(status.obey_bhp_limit_with_thp_limit);
    }

    #[test]
    fn wrong_direction_scan_needs_every_perforation() {
        let config = {
            let mut c = producer(2);
            c.allow_crossflow = false;
            c
        };
        let mut state = WellState::new(2, 2);
        state.bhp = 105.0;
        // Both cells below the well pressure: every drawdown injects.
        let cells = vec![cell(100.0, &[1.0, 1.0]), cell(101.0, &[1.0, 1.0])];
        assert!(all_drawdown_wrong_direction(&config, &state, &cells, &SerialComm));
        assert!(open_crossflow_to_avoid_singularity(&config, &state, &cells, &SerialComm));

        // One producing completion flips the verdict.
        let cells = vec![cell(100.0, &[1.0, 1.0]), cell(110.0, &[1.0, 1.0])];
        assert!(!all_drawdown_wrong_direction(&config, &state, &cells, &SerialComm));
        assert!(!open_crossflow_to_avoid_singularity(&config, &state, &cells, &SerialComm));
    }

    #[test]
    fn injector_operability_reverses_the_sign() {
        let mut config = producer(1);
        config.kind = WellKind::Injector;
        config.injection_phase = Some(Phase::Water);
        config.phases = PhaseSet::new(true, false, false).unwrap();
        config.preferred_phase = Phase::Water;
        let mut state = WellState::new(1, 1);
        state.bhp = 120.0;

        let cells = vec![cell(100.0, &[2.0])];
        // Upper bound above the cell pressure: injection feasible.
        config.controls.bhp_limit = units::pa(150.0);
        let status =
            update_well_operability(&config, &state, &cells, &OperabilityConfig::default(), &SerialComm)
                .unwrap();
        assert!(status.operable_under_bhp_limit);

        // Upper bound below the cell pressure: cannot push fluid in.
        config.controls.bhp_limit = units::pa(90.0);
        let status =
            update_well_operability(&config, &state, &cells, &OperabilityConfig::default(), &SerialComm)
                .unwrap();
        assert!(!status.operable_under_bhp_limit);
    }

    #[test]
    fn stopped_state_wins() {
        let status = OperabilityStatus::default();
        assert_eq!(status.state(true), OperabilityState::Stopped);
    }
}
