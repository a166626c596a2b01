//! Well-local nonlinear solve and its consumers.
//!
//! The reservoir unknowns stay frozen here: each pass assembles the well
//! equations, checks the reduced residual and, while it is off, solves the
//! diagonal block alone and applies a damped update. The driver runs this
//! to precondition a well before coupling it into the global system, and
//! the potentials calculation runs it on a throwaway copy of the well at
//! its pressure limits.

use crate::assembly::assemble_well_equations;
use crate::config::{ControlMode, WellConfig};
use crate::control::update_thp;
use crate::convergence::{well_convergence, ConvergenceReport, ConvergenceTolerances};
use crate::densities::update_connection_pressures;
use crate::error::WellResult;
use crate::linsys::LocalLinearSystem;
use crate::operability::{bhp_at_thp_limit, OperabilityConfig};
use crate::primary::{PrimaryVariables, UpdateConfig};
use crate::rates::current_well_rates;
use crate::state::WellState;
use tracing::{debug, warn};
use wf_comm::WellComm;
use wf_core::{units, Real};
use wf_pvt::{PerfCell, PvtEvaluator};

/// Limits of the well-local Newton loop.
#[derive(Clone, Copy, Debug)]
pub struct IterationConfig {
    pub max_iterations: usize,
    pub update: UpdateConfig,
    pub tolerances: ConvergenceTolerances,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            update: UpdateConfig::default(),
            tolerances: ConvergenceTolerances::default(),
        }
    }
}

/// Reset the explicit quantities at the start of a timestep: hydrostatic
/// offsets from the current mixture densities, unknowns from durable
/// state, and the storage-term reference fractions.
pub fn prepare_timestep(
    config: &WellConfig,
    primary: &mut PrimaryVariables,
    state: &mut WellState,
    cells: &[PerfCell],
    pvt: &dyn PvtEvaluator,
    gravity: Real,
    comm: &dyn WellComm,
) -> WellResult<()> {
    update_connection_pressures(config, state, cells, pvt, gravity, comm)?;
    primary.set_from_state(state, config);
    primary.reset_accumulation_reference();
    Ok(())
}

/// Newton on the well equations with frozen reservoir unknowns.
///
/// Stops at the first converged residual or after `max_iterations`; either
/// way the tubing-head pressure is refreshed and the last report returned.
/// Singular well blocks and non-finite updates abort with an error.
#[allow(clippy::too_many_arguments)]
pub fn iterate_to_convergence(
    config: &WellConfig,
    primary: &mut PrimaryVariables,
    cells: &[PerfCell],
    dt: Real,
    b_avg: &[Real],
    sys: &mut LocalLinearSystem,
    state: &mut WellState,
    it: &IterationConfig,
    comm: &dyn WellComm,
) -> WellResult<ConvergenceReport> {
    let mut report = ConvergenceReport::default();
    for iteration in 0..it.max_iterations {
        assemble_well_equations(config, primary, cells, dt, sys, state, comm)?;
        report = well_convergence(config, primary, sys, b_avg, &it.tolerances);
        if report.converged() {
            debug!(well = %config.name, iteration, "local well solve converged");
            update_thp(config, state);
            return Ok(report);
        }
        let dx = sys.solve_frozen()?;
        primary.apply_update(dx.as_slice(), &it.update)?;
        primary.update_state(state);
    }
    warn!(
        well = %config.name,
        iterations = it.max_iterations,
        failures = report.failures.len(),
        "local well solve did not converge"
    );
    update_thp(config, state);
    Ok(report)
}

/// Operating BHP for the potential calculation: the limit itself, or the
/// tighter of the limit and the THP-sustaining pressure.
fn potential_bhp(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    op: &OperabilityConfig,
    comm: &dyn WellComm,
) -> WellResult<Real> {
    let bhp_limit = config.controls.bhp_limit.value;
    if config.controls.thp_limit.is_none() {
        return Ok(bhp_limit);
    }
    match bhp_at_thp_limit(config, state, cells, op, comm)? {
        Some(bhp) if config.kind.is_producer() => Ok(bhp.max(bhp_limit)),
        Some(bhp) => Ok(bhp.min(bhp_limit)),
        None => {
            warn!(
                well = %config.name,
                "no bhp found at the thp limit; potential falls back to the bhp limit"
            );
            Ok(bhp_limit)
        }
    }
}

/// Component rates the well could sustain at its pressure limits.
///
/// Pressure-controlled wells that already flow report their current rates.
/// Otherwise a copy of the well is pinned to its operating BHP and solved
/// locally; a copy that fails to converge reports zero potential rather
/// than a half-iterated rate. Results are stored as positive magnitudes.
#[allow(clippy::too_many_arguments)]
pub fn well_potentials(
    config: &WellConfig,
    state: &mut WellState,
    cells: &[PerfCell],
    pvt: &dyn PvtEvaluator,
    gravity: Real,
    dt: Real,
    n_res_eq: usize,
    b_avg: &[Real],
    op: &OperabilityConfig,
    it: &IterationConfig,
    comm: &dyn WellComm,
) -> WellResult<Vec<Real>> {
    let nc = config.n_comps();
    if state.stopped {
        state.potentials = vec![0.0; nc];
        return Ok(state.potentials.clone());
    }

    let pressure_controlled = matches!(
        config.controls.mode,
        ControlMode::Bhp | ControlMode::Thp
    );
    if pressure_controlled && state.surface_rates.iter().any(|r| *r != 0.0) {
        let rates = current_well_rates(config, state, cells, comm)?;
        state.potentials = rates.iter().map(|r| r.abs()).collect();
        return Ok(state.potentials.clone());
    }

    let bhp = potential_bhp(config, state, cells, op, comm)?;

    let mut pinned = config.clone();
    pinned.controls.mode = ControlMode::Bhp;
    pinned.controls.bhp_limit = units::pa(bhp);

    let mut trial = state.clone();
    trial.bhp = bhp;
    update_connection_pressures(&pinned, &mut trial, cells, pvt, gravity, comm)?;

    let mut primary = PrimaryVariables::new(
        pinned.phases,
        n_res_eq,
        pinned.n_perfs(),
        pinned.has_injectivity(),
    );
    primary.set_from_state(&trial, &pinned);
    primary.reset_accumulation_reference();
    let mut sys = LocalLinearSystem::new(
        primary.n_well_eq(),
        n_res_eq,
        pinned.perfs.iter().map(|p| p.cell).collect(),
    );

    let report = iterate_to_convergence(
        &pinned,
        &mut primary,
        cells,
        dt,
        b_avg,
        &mut sys,
        &mut trial,
        it,
        comm,
    )?;
    if report.converged() {
        state.potentials = trial.surface_rates.iter().map(|r| r.abs()).collect();
    } else {
        warn!(
            well = %config.name,
            bhp,
            "potential solve did not converge; reporting zero potential"
        );
        state.potentials = vec![0.0; nc];
    }
    Ok(state.potentials.clone())
}
