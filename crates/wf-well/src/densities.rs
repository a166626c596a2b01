//! Connection densities and hydrostatic pressure offsets.
//!
//! Rebuilt at the start of each timestep and after control switches. Three
//! steps: point PVT properties at the mean connection pressure, the
//! wellbore mixture density at every connection from the surface stream
//! flowing up past it, and the cumulative hydrostatic offset of every
//! connection relative to the datum depth. Each step runs its own
//! collectives, so all owners of a split well walk them together.

use crate::config::WellConfig;
use crate::error::WellResult;
use crate::state::WellState;
use tracing::debug;
use wf_comm::WellComm;
use wf_core::Real;
use wf_pvt::density::{free_surface_composition, mixture_density};
use wf_pvt::{PerfCell, Phase, PvtError, PvtEvaluator};

/// PVT properties of every locally owned connection, evaluated at the mean
/// of the connection pressure and the connection above.
pub struct ConnectionProps {
    /// Reciprocal formation volume factor, `[perf * nc + comp]`.
    pub inv_b: Vec<Real>,
    /// Saturated dissolved gas-oil ratio per perforation; empty unless
    /// both oil and gas are active.
    pub rs_max: Vec<Real>,
    /// Saturated vaporized oil-gas ratio per perforation.
    pub rv_max: Vec<Real>,
    /// Component surface density, `[perf * nc + comp]`.
    pub surface_density: Vec<Real>,
}

/// Evaluate formation volume factors and surface densities per connection.
///
/// The oil and gas factors are taken undersaturated when the well itself
/// produces the other phase, with rs/rv estimated from the produced ratio
/// and clamped at the saturated limit.
pub fn connection_properties(
    config: &WellConfig,
    state: &WellState,
    pvt: &dyn PvtEvaluator,
    comm: &dyn WellComm,
) -> WellResult<ConnectionProps> {
    let nc = config.n_comps();
    let n_perf = config.n_perfs();
    let phases = config.phases;
    debug_assert_eq!(state.perf.len(), n_perf);

    let mut props = ConnectionProps {
        inv_b: vec![0.0; n_perf * nc],
        rs_max: Vec::new(),
        rv_max: Vec::new(),
        surface_density: vec![0.0; n_perf * nc],
    };
    if phases.has_oil_gas() {
        props.rs_max = vec![0.0; n_perf];
        props.rv_max = vec![0.0; n_perf];
    }

    // Solvent leaves through the gas stream; take it out of the gas rate
    // before estimating rs/rv from produced ratios.
    let solvent_rate = if config.tracers.solvent.is_some() {
        comm.sum(state.perf.iter().map(|p| p.solvent_rate).sum::<Real>())
    } else {
        0.0
    };

    let perf_press: Vec<Real> = state.perf.iter().map(|p| p.pressure).collect();
    let p_above = comm.above_values(state.bhp, &perf_press);

    for perf in 0..n_perf {
        let cell = config.perfs[perf].cell.index() as usize;
        let p_avg = (perf_press[perf] + p_above[perf]) / 2.0;

        if let Some(water) = phases.comp_index(Phase::Water) {
            props.inv_b[perf * nc + water] = pvt.inv_b_water(cell, p_avg)?;
        }

        if let Some(gas) = phases.comp_index(Phase::Gas) {
            let gaspos = perf * nc + gas;
            if let Some(oil) = phases.comp_index(Phase::Oil) {
                // Magnitudes handle the negative rates of producers.
                let oil_rate = state.surface_rates[oil].abs();
                props.rv_max[perf] = pvt.rv_saturated(cell, p_avg)?;
                if oil_rate > 0.0 {
                    let gas_rate = state.surface_rates[gas].abs() - solvent_rate;
                    let mut rv = 0.0;
                    if gas_rate > 0.0 {
                        rv = oil_rate / gas_rate;
                    }
                    rv = rv.min(props.rv_max[perf]);
                    props.inv_b[gaspos] = pvt.inv_b_gas(cell, p_avg, rv, false)?;
                } else {
                    props.inv_b[gaspos] = pvt.inv_b_gas(cell, p_avg, 0.0, true)?;
                }
            } else {
                props.inv_b[gaspos] = pvt.inv_b_gas(cell, p_avg, 0.0, true)?;
            }
        }

        if let Some(oil) = phases.comp_index(Phase::Oil) {
            let oilpos = perf * nc + oil;
            if let Some(gas) = phases.comp_index(Phase::Gas) {
                props.rs_max[perf] = pvt.rs_saturated(cell, p_avg)?;
                let gas_rate = state.surface_rates[gas].abs() - solvent_rate;
                if gas_rate > 0.0 {
                    let oil_rate = state.surface_rates[oil].abs();
                    let mut rs = 0.0;
                    if oil_rate > 0.0 {
                        rs = gas_rate / oil_rate;
                    }
                    rs = rs.min(props.rs_max[perf]);
                    props.inv_b[oilpos] = pvt.inv_b_oil(cell, p_avg, rs, false)?;
                } else {
                    props.inv_b[oilpos] = pvt.inv_b_oil(cell, p_avg, 0.0, true)?;
                }
            } else {
                props.inv_b[oilpos] = pvt.inv_b_oil(cell, p_avg, 0.0, true)?;
            }
        }

        for (comp, phase) in phases.active().enumerate() {
            props.surface_density[perf * nc + comp] = pvt.surface_density(cell, phase)?;
        }
    }
    Ok(props)
}

/// Stand-in connection rates for a producer with no flow anywhere: per
/// perforation, the normalized mobility composition scaled by the
/// perforation's share of the well's connection transmissibility.
pub fn mobility_weighted_composition(
    config: &WellConfig,
    cells: &[PerfCell],
    comm: &dyn WellComm,
) -> Vec<Real> {
    let nc = config.n_comps();
    let local_tw: Real = config.perfs.iter().map(|p| p.connection_factor).sum();
    let total_tw = comm.sum(local_tw);
    let mut rates = vec![0.0; config.n_perfs() * nc];
    if !(total_tw > 0.0) {
        return rates;
    }
    for (perf, cell) in cells.iter().enumerate() {
        let tw_fraction = config.perfs[perf].connection_factor / total_tw;
        let total_mob: Real = cell.mobility.iter().map(|m| m.value()).sum();
        if total_mob <= 0.0 {
            continue;
        }
        for comp in 0..nc {
            rates[perf * nc + comp] = tw_fraction * cell.mobility[comp].value() / total_mob;
        }
    }
    rates
}

/// Wellbore mixture density at every locally owned connection.
pub fn connection_densities(
    config: &WellConfig,
    state: &WellState,
    cells: &[PerfCell],
    props: &ConnectionProps,
    comm: &dyn WellComm,
) -> WellResult<Vec<Real>> {
    let nc = config.n_comps();
    let n_perf = config.n_perfs();
    let phases = config.phases;
    debug_assert_eq!(cells.len(), n_perf);

    let mut perf_rates = vec![0.0; n_perf * nc];
    for (perf, pd) in state.perf.iter().enumerate() {
        perf_rates[perf * nc..(perf + 1) * nc].copy_from_slice(&pd.phase_rates);
    }

    let all_zero = comm.all(perf_rates.iter().all(|r| *r == 0.0));
    if all_zero && config.kind.is_producer() {
        perf_rates = mobility_weighted_composition(config, cells, comm);
    }

    // Surface flow past each connection on the way up: minus the suffix
    // sum of the connection rates from there to the well bottom.
    let mut local_totals = vec![0.0; nc];
    for perf in 0..n_perf {
        for comp in 0..nc {
            local_totals[comp] += perf_rates[perf * nc + comp];
        }
    }
    let mut suffix = comm.sum_deeper(&local_totals);
    let mut q_out = vec![0.0; n_perf * nc];
    for perf in (0..n_perf).rev() {
        for comp in 0..nc {
            suffix[comp] += perf_rates[perf * nc + comp];
            q_out[perf * nc + comp] = -suffix[comp];
        }
    }

    let injection_comp = config.injection_phase.and_then(|ph| phases.comp_index(ph));
    let preferred_comp = phases.comp_index(config.preferred_phase);

    let mut densities = vec![0.0; n_perf];
    let mut carried = vec![0.0; nc];
    for perf in 0..n_perf {
        let q = &q_out[perf * nc..(perf + 1) * nc];
        let mut mix = vec![0.0; nc];
        let tot: Real = q.iter().sum();
        if tot != 0.0 {
            for comp in 0..nc {
                mix[comp] = (q[comp] / tot).abs();
            }
        } else if nc == 1 {
            mix[0] = 1.0;
        } else if config.kind.is_injector() {
            if let Some(comp) = injection_comp {
                mix[comp] = 1.0;
            }
        } else if perf == 0 {
            if let Some(comp) = preferred_comp {
                mix[comp] = 1.0;
            }
        } else {
            // No flow here: reuse the composition carried down from the
            // connection above.
            mix.copy_from_slice(&carried);
        }

        let rs_max = (!props.rs_max.is_empty()).then(|| props.rs_max[perf]);
        let rv_max = (!props.rv_max.is_empty()).then(|| props.rv_max[perf]);
        let free = match free_surface_composition(&mix, rs_max, rv_max, &phases) {
            Ok(free) => free,
            Err(PvtError::NonPhysical { .. }) => {
                debug!(
                    well = %config.name,
                    perf,
                    "degenerate rs/rv partition in wellbore mixture, \
                     continuing without dissolution"
                );
                mix.clone()
            }
            Err(e) => return Err(e.into()),
        };
        let inv_b = &props.inv_b[perf * nc..(perf + 1) * nc];
        let surf = &props.surface_density[perf * nc..(perf + 1) * nc];
        densities[perf] = mixture_density(&mix, &free, inv_b, surf)?;
        carried = free;
    }
    Ok(densities)
}

/// Hydrostatic pressure offset of every locally owned connection relative
/// to the datum depth: the running sum of `dz * rho * g` segments down the
/// well, continued across segment owners.
pub fn connection_pressure_deltas(
    config: &WellConfig,
    densities: &[Real],
    gravity: Real,
    comm: &dyn WellComm,
) -> Vec<Real> {
    let depths: Vec<Real> = config.perfs.iter().map(|p| p.depth.value).collect();
    let z_above = comm.above_values(config.reference_depth.value, &depths);
    let mut dp: Vec<Real> = (0..depths.len())
        .map(|perf| (depths[perf] - z_above[perf]) * densities[perf] * gravity)
        .collect();
    let mut running = 0.0;
    for v in &mut dp {
        running += *v;
        *v = running;
    }
    let shallower = comm.sum_shallower(&[running]);
    if shallower[0] != 0.0 {
        for v in &mut dp {
            *v += shallower[0];
        }
    }
    dp
}

/// Rebuild the hydrostatic pressure offsets in `state` from the current
/// rates and PVT conditions.
pub fn update_connection_pressures(
    config: &WellConfig,
    state: &mut WellState,
    cells: &[PerfCell],
    pvt: &dyn PvtEvaluator,
    gravity: Real,
    comm: &dyn WellComm,
) -> WellResult<()> {
    let props = connection_properties(config, state, pvt, comm)?;
    let densities = connection_densities(config, state, cells, &props, comm)?;
    let dp = connection_pressure_deltas(config, &densities, gravity, comm);
    for (pd, dp) in state.perf.iter_mut().zip(dp) {
        pd.pressure_diff = dp;
    }
    Ok(())
}
