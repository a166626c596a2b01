//! Well equation assembly.
//!
//! One pass per Newton iteration: evaluate the flow kernel at every local
//! perforation, scatter the component fluxes into the local linear system
//! and into per-connection source terms for the reservoir equations, then
//! close the system with the storage term and the control equation. The
//! single cross-process reduction sits between the perforation loop and
//! the well-global terms, so every rank finishes with the same factorized
//! diagonal block.

use crate::config::{PolyMwConfig, PolymerConfig, WellConfig};
use crate::control::control_equation;
use crate::error::{WellError, WellResult};
use crate::injectivity;
use crate::linsys::LocalLinearSystem;
use crate::operability::open_crossflow_to_avoid_singularity;
use crate::perf_flow::{self, PerfFlowContext};
use crate::primary::PrimaryVariables;
use crate::state::WellState;
use crate::tracers;
use wf_comm::WellComm;
use wf_core::{Ad, CellId, Real};
use wf_pvt::{PerfCell, Phase};

/// Source terms one perforation feeds into its reservoir cell, restricted
/// to cell-unknown derivative slots. Rows cover the dense components and
/// any enabled transport units.
#[derive(Clone, Debug)]
pub struct PerfSourceTerms {
    pub cell: CellId,
    pub rates: Vec<(usize, Ad)>,
}

/// The polymer molecular-weight pair when the injectivity sub-model is on.
fn injectivity_config(config: &WellConfig) -> Option<(&PolymerConfig, &PolyMwConfig)> {
    if !config.kind.is_injector() {
        return None;
    }
    let polymer = config.tracers.polymer.as_ref()?;
    let mw = polymer.molecular_weight.as_ref()?;
    Some((polymer, mw))
}

/// Gas entry of the formation-volume factors blended with the pure
/// solvent for solvent injectors; `None` when nothing changes.
fn solvent_adjusted_cell(config: &WellConfig, cell: &PerfCell) -> WellResult<Option<PerfCell>> {
    let Some(solvent) = &config.tracers.solvent else {
        return Ok(None);
    };
    if !config.kind.is_injector() {
        return Ok(None);
    }
    let gas = config
        .phases
        .comp_index(Phase::Gas)
        .ok_or_else(|| WellError::InvalidConfig {
            what: format!(
                "well {}: solvent transport requires an active gas component",
                config.name
            ),
        })?;
    let ws = solvent.injection_fraction;
    let mut patched = cell.clone();
    patched.inv_b[gas] = &cell.inv_b[gas] * (1.0 - ws) + ws * cell.solvent_inv_b;
    Ok(Some(patched))
}

/// Assemble residual and Jacobian blocks at the current primary variables.
///
/// On return the system is reduced across ranks, closed with the storage
/// and control equations, and factorized; a singular diagonal block is a
/// fatal numerical condition for this iteration. Per-perforation rates and
/// the well's dissolved-gas/vaporized-oil totals are written into durable
/// state as a side effect.
#[allow(clippy::too_many_arguments)]
pub fn assemble_well_equations(
    config: &WellConfig,
    primary: &PrimaryVariables,
    cells: &[PerfCell],
    dt: Real,
    sys: &mut LocalLinearSystem,
    state: &mut WellState,
    comm: &dyn WellComm,
) -> WellResult<Vec<PerfSourceTerms>> {
    debug_assert_eq!(primary.has_injectivity(), config.has_injectivity());
    debug_assert_eq!(sys.n_well_eq(), primary.n_well_eq());
    if cells.len() != config.n_perfs() || state.perf.len() != config.n_perfs() {
        return Err(WellError::InvalidConfig {
            what: format!("well {}: one cell snapshot per perforation", config.name),
        });
    }
    if !(dt > 0.0) {
        return Err(WellError::InvalidConfig {
            what: format!("well {}: assembly needs a positive timestep", config.name),
        });
    }

    state.dissolved_gas_rate = 0.0;
    state.vaporized_oil_rate = 0.0;
    sys.clear();

    let nc = config.n_comps();
    let n_res = primary.n_res_eq();
    let efficiency = config.efficiency_factor.value;
    let bhp_value = state.bhp;
    let eval = primary.evaluate();
    let fractions = primary.volume_fractions(&eval);
    let bhp = &eval[primary.bhp_index()];
    let allow_cf = config.allow_crossflow
        || open_crossflow_to_avoid_singularity(config, state, cells, comm);

    let mut source_terms = Vec::with_capacity(config.n_perfs());
    for (perf, perf_cfg) in config.perfs.iter().enumerate() {
        let raw_cell = &cells[perf];
        let patched = solvent_adjusted_cell(config, raw_cell)?;
        let cell = patched.as_ref().unwrap_or(raw_cell);

        let tw = perf_cfg.connection_factor * cell.trans_multiplier;
        let skin_pressure = if primary.has_injectivity() {
            eval[primary.skin_pressure_index(perf)].clone()
        } else {
            Ad::constant(0.0)
        };
        let ctx = PerfFlowContext {
            well_name: &config.name,
            kind: config.kind,
            phases: config.phases.clone(),
            cell,
            bhp,
            tw,
            pressure_diff: state.perf[perf].pressure_diff,
            skin_pressure,
            allow_crossflow: allow_cf,
            cmix_s: &fractions,
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

        let mut rates = perf_flow::compute_perf_rate(&ctx, &mob)?;

        // The injectivity sub-model replaces the kernel's water rate with
        // the velocity-unknown form and closes the two extra equations
        // against the kernel flux it replaced.
        if let Some((polymer, mw)) = injectivity_config(config) {
            let water = config.phases.comp_index_checked(Phase::Water)?;
            let water_flux_s = rates.cq_s[water].clone();
            let velocity_pv = &eval[primary.water_velocity_index(perf)];
            let skin_pv = &eval[primary.skin_pressure_index(perf)];
            injectivity::override_water_rate(
                cell,
                perf_cfg.flow_area(),
                velocity_pv,
                water,
                &mut rates.cq_s,
            );
            let (eq_velocity, eq_skin) = injectivity::injectivity_equations(
                polymer,
                mw,
                &config.name,
                cell,
                perf_cfg.flow_area(),
                water,
                &water_flux_s,
                velocity_pv,
                skin_pv,
                state.perf[perf].water_throughput,
            )?;
            sys.add_flux(perf, primary.water_velocity_index(perf), &eq_velocity);
            sys.add_well_term(primary.skin_pressure_index(perf), &eq_skin);
        }

        if config.kind.is_producer() {
            state.dissolved_gas_rate += rates.dis_gas_rate;
            state.vaporized_oil_rate += rates.vap_oil_rate;
        }

        let pd = &mut state.perf[perf];
        let tracer = tracers::connection_tracer_rates(
            config,
            primary,
            &eval,
            perf,
            cell,
            &rates.cq_s,
            rates.dis_gas_rate,
            pd,
        )?;

        let mut rows = Vec::with_capacity(nc + tracer.rates.len());
        for comp in 0..nc {
            let cq_s_effective = &rates.cq_s[comp] * efficiency;
            sys.add_flux(perf, comp, &cq_s_effective);
            sys.add_cell_coupling(perf, comp, &cq_s_effective);
            rows.push((comp, cq_s_effective.restricted(n_res)));
            pd.phase_rates[comp] = rates.cq_s[comp].value();
        }
        if let (Some(coupling), Some(solvent)) =
            (&tracer.solvent_coupling, &config.tracers.solvent)
        {
            sys.add_cell_coupling(perf, solvent.cell_eq, coupling);
        }
        rows.extend(tracer.rates);

        pd.dis_gas_rate = rates.dis_gas_rate;
        pd.vap_oil_rate = rates.vap_oil_rate;
        pd.pressure = bhp_value + pd.pressure_diff;

        source_terms.push(PerfSourceTerms {
            cell: perf_cfg.cell,
            rates: rows,
        });
    }

    sys.reduce(comm);

    // Storage change plus the well's own offtake, identical on every rank.
    let volume = config.wellbore_volume.value;
    for comp in 0..nc {
        let mut res_loc = Ad::constant(0.0);
        if nc > 1 {
            res_loc += (&fractions[comp] - primary.f0(comp)) * (volume / dt);
        }
        res_loc -= primary.surface_rate(&eval, &fractions, comp) * efficiency;
        sys.add_well_term(comp, &res_loc);
    }

    let control = control_equation(config, primary, &eval, &fractions)?;
    sys.add_well_term(primary.bhp_index(), &control);

    sys.factorize(&config.name)?;
    Ok(source_terms)
}
