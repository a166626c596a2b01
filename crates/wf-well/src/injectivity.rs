//! Polymer injectivity sub-model.
//!
//! High-molecular-weight polymer injection damages the formation near the
//! wellbore; the damage depends on the accumulated water throughput and the
//! injection velocity. The sub-model adds two unknowns per perforation, a
//! sandface water velocity and a skin pressure, each closed by its own
//! equation against tabulated laboratory data. The skin pressure feeds back
//! into the drawdown of the flow kernel.

use crate::config::{PolyMwConfig, PolymerConfig, WellConfig};
use crate::error::{WellError, WellResult};
use crate::primary::PrimaryVariables;
use crate::state::WellState;
use wf_core::{Ad, Real};
use wf_pvt::PerfCell;

/// Skin pressure for plain water injection at the given throughput and
/// (non-negative) velocity.
pub fn skin_pressure_water(
    cfg: &PolyMwConfig,
    well: &str,
    throughput: Real,
    water_velocity: &Ad,
) -> WellResult<Ad> {
    let table = cfg
        .skin_water_table
        .as_ref()
        .ok_or_else(|| WellError::MissingTable {
            table: "water skin-pressure",
            well: well.to_string(),
        })?;
    Ok(table.eval_ad(throughput, water_velocity))
}

/// Signed skin pressure at the given polymer concentration.
///
/// The tables are built over velocity magnitudes; the sign of the velocity
/// carries through to the result. Between zero and the reference
/// concentration of the polymer table, the two tabulated curves are
/// interpolated linearly in concentration.
pub fn skin_pressure(
    cfg: &PolyMwConfig,
    well: &str,
    throughput: Real,
    water_velocity: &Ad,
    poly_concentration: Real,
) -> WellResult<Ad> {
    let sign = if water_velocity.value() >= 0.0 { 1.0 } else { -1.0 };
    let velocity_abs = water_velocity.abs();
    if poly_concentration == 0.0 {
        return Ok(sign * skin_pressure_water(cfg, well, throughput, &velocity_abs)?);
    }
    let poly = cfg
        .skin_poly_table
        .as_ref()
        .ok_or_else(|| WellError::MissingTable {
            table: "polymer skin-pressure",
            well: well.to_string(),
        })?;
    let pskin_poly = poly.table.eval_ad(throughput, &velocity_abs);
    if poly_concentration == poly.ref_concentration {
        return Ok(sign * pskin_poly);
    }
    let pskin_water = skin_pressure_water(cfg, well, throughput, &velocity_abs)?;
    let pskin =
        &pskin_water + (&pskin_poly - &pskin_water) / poly.ref_concentration * poly_concentration;
    Ok(sign * pskin)
}

/// Molecular weight of the injected polymer at the given throughput and
/// velocity; zero when the well injects no polymer.
pub fn injected_molecular_weight(
    polymer: &PolymerConfig,
    cfg: &PolyMwConfig,
    well: &str,
    throughput: Real,
    water_velocity: &Ad,
) -> WellResult<Ad> {
    let table = cfg.mw_table.as_ref().ok_or_else(|| WellError::MissingTable {
        table: "molecular-weight",
        well: well.to_string(),
    })?;
    if polymer.injection_concentration == 0.0 {
        return Ok(Ad::constant(0.0));
    }
    Ok(table.eval_ad(throughput, &water_velocity.abs()))
}

/// Replace the water connection rate with the velocity-unknown form
/// `area * v * b_w`, tying the rate to the velocity primary variable.
pub fn override_water_rate(
    cell: &PerfCell,
    flow_area: Real,
    water_velocity_pv: &Ad,
    water_comp: usize,
    cq_s: &mut [Ad],
) {
    cq_s[water_comp] = flow_area * (water_velocity_pv * &cell.inv_b[water_comp]);
}

/// Closure equations of the two injectivity unknowns at one perforation.
///
/// `water_flux_s` is the surface-condition water rate computed by the flow
/// kernel before the velocity override. The velocity equation couples to
/// the cell unknowns through that flux; the skin equation is well-local.
pub fn injectivity_equations(
    polymer: &PolymerConfig,
    cfg: &PolyMwConfig,
    well: &str,
    cell: &PerfCell,
    flow_area: Real,
    water_comp: usize,
    water_flux_s: &Ad,
    water_velocity_pv: &Ad,
    skin_pressure_pv: &Ad,
    throughput: Real,
) -> WellResult<(Ad, Ad)> {
    let water_flux_r = water_flux_s / &cell.inv_b[water_comp];
    let water_velocity = &water_flux_r / flow_area;
    let eq_wat_vel = water_velocity_pv - &water_velocity;

    let pskin = skin_pressure(
        cfg,
        well,
        throughput,
        water_velocity_pv,
        polymer.injection_concentration,
    )?;
    let eq_pskin = skin_pressure_pv - &pskin;
    Ok((eq_wat_vel, eq_pskin))
}

/// Accumulate water throughput over the accepted timestep. Velocity out of
/// the wellbore only; backflow does not add formation damage.
pub fn update_water_throughput(
    config: &WellConfig,
    primary: &PrimaryVariables,
    dt: Real,
    state: &mut WellState,
) {
    if !config.kind.is_injector() {
        return;
    }
    for (perf, pd) in state.perf.iter_mut().enumerate() {
        let velocity = primary.water_velocity(perf);
        if velocity > 0.0 {
            pd.water_throughput += velocity * dt;
        }
    }
}
