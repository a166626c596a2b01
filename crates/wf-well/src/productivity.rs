//! Productivity and injectivity indices.
//!
//! Reporting-time linearization of the inflow: one coefficient per dense
//! component relating rate to drawdown. The conversion from mobility to a
//! connection coefficient is the driver's business (it owns the peaceman
//! radius and skin), so it arrives as a closure; this module supplies the
//! volume-factor weighting, the rs/rv cross terms and the reduction.

use crate::config::WellConfig;
use crate::error::{WellError, WellResult};
use crate::state::WellState;
use wf_comm::WellComm;
use wf_core::Real;
use wf_pvt::{PerfCell, Phase};

/// Connection index per component for a producing completion.
fn producer_connection_index<F>(
    config: &WellConfig,
    cell: &PerfCell,
    perf: usize,
    conn_index: &F,
) -> Vec<Real>
where
    F: Fn(usize, Real) -> Real,
{
    let nc = config.n_comps();
    let mut pi = vec![0.0; nc];
    for comp in 0..nc {
        pi[comp] = conn_index(perf, cell.mobility[comp].value()) * cell.inv_b[comp].value();
    }
    if let (Some(oil), Some(gas)) = (
        config.phases.comp_index(Phase::Oil),
        config.phases.comp_index(Phase::Gas),
    ) {
        let dis_gas = cell.rs.value() * pi[oil];
        let vap_oil = cell.rv.value() * pi[gas];
        pi[gas] += dis_gas;
        pi[oil] += vap_oil;
    }
    pi
}

/// Connection index for an injecting completion: the whole mobility goes
/// into the injected phase.
fn injector_connection_index<F>(
    config: &WellConfig,
    cell: &PerfCell,
    perf: usize,
    conn_index: &F,
) -> WellResult<Vec<Real>>
where
    F: Fn(usize, Real) -> Real,
{
    let phase = config
        .injection_phase
        .ok_or(WellError::Unsupported {
            what: "injectivity index for multi-phase injection",
        })?;
    let comp = config.phases.comp_index_checked(phase)?;
    let mut pi = vec![0.0; config.n_comps()];
    pi[comp] = conn_index(perf, cell.total_mobility().value()) * cell.inv_b[comp].value();
    Ok(pi)
}

/// Recompute per-connection and well-level productivity indices.
///
/// `conn_index` maps `(perf, mobility)` to the linear coefficient of that
/// connection. Connection values land in the perforation reporting state;
/// the well-level array is summed over the whole group.
pub fn update_productivity_index<F>(
    config: &WellConfig,
    state: &mut WellState,
    cells: &[PerfCell],
    conn_index: F,
    comm: &dyn WellComm,
) -> WellResult<()>
where
    F: Fn(usize, Real) -> Real,
{
    let nc = config.n_comps();
    let mut well_pi = vec![0.0; nc];
    for (perf, cell) in cells.iter().enumerate() {
        let pi = if config.kind.is_producer() {
            producer_connection_index(config, cell, perf, &conn_index)
        } else {
            injector_connection_index(config, cell, perf, &conn_index)?
        };
        for comp in 0..nc {
            well_pi[comp] += pi[comp];
        }
        state.perf[perf].prod_index = pi;
    }
    comm.sum_in_place(&mut well_pi);
    state.productivity_index = well_pi;
    Ok(())
}
