//! Perforation flow kernel.
//!
//! Computes the surface-condition component rates through a single
//! perforation from the drawdown between the connected cell and the
//! wellbore. The producing and injecting directions follow different
//! formulas: produced fluid carries the cell composition (with dissolved
//! gas and vaporized oil redistributed through rs/rv), injected fluid
//! carries the wellbore mixture, converted through a surface-to-reservoir
//! volume ratio. Everything runs on differentiable numbers; feeding
//! constants gives a plain scalar evaluation.

use crate::config::{PolymerConfig, WellKind};
use crate::error::{WellError, WellResult};
use wf_core::{Ad, Real};
use wf_pvt::{PerfCell, Phase, PhaseSet};

/// Per-perforation context shared by the rate kernel and its callers.
/// Mobility is passed separately so correction passes can rework it
/// between evaluations.
pub struct PerfFlowContext<'a> {
    pub well_name: &'a str,
    pub kind: WellKind,
    pub phases: PhaseSet,
    pub cell: &'a PerfCell,
    pub bhp: &'a Ad,
    /// Effective connection transmissibility [m³].
    pub tw: Real,
    /// Hydrostatic pressure offset of this perforation [Pa].
    pub pressure_diff: Real,
    /// Skin pressure of the injectivity sub-model; constant zero when the
    /// sub-model is off.
    pub skin_pressure: Ad,
    pub allow_crossflow: bool,
    /// Surface-volume composition of the wellbore mixture.
    pub cmix_s: &'a [Ad],
}

/// Rates produced by one perforation evaluation.
#[derive(Clone, Debug)]
pub struct PerfRates {
    /// Surface-condition rate per dense component [sm³/s].
    pub cq_s: Vec<Ad>,
    /// Gas dissolved in the produced oil stream [sm³/s]; producers only.
    pub dis_gas_rate: Real,
    /// Oil vaporized in the produced gas stream [sm³/s]; producers only.
    pub vap_oil_rate: Real,
}

impl PerfRates {
    fn zero(nc: usize) -> Self {
        Self {
            cq_s: vec![Ad::constant(0.0); nc],
            dis_gas_rate: 0.0,
            vap_oil_rate: 0.0,
        }
    }
}

/// Component rates through one perforation.
///
/// The drawdown sign picks the direction; when crossflow is disallowed and
/// the direction opposes the well's declared role, the rates are exactly
/// zero.
pub fn compute_perf_rate(ctx: &PerfFlowContext, mob: &[Ad]) -> WellResult<PerfRates> {
    let nc = ctx.phases.n_phases();
    let cell = ctx.cell;

    let well_pressure = ctx.bhp + ctx.pressure_diff;
    let mut drawdown = &cell.pressure - &well_pressure;
    if ctx.kind.is_injector() {
        drawdown += &ctx.skin_pressure;
    }

    let oil_gas = match (
        ctx.phases.comp_index(Phase::Oil),
        ctx.phases.comp_index(Phase::Gas),
    ) {
        (Some(oil), Some(gas)) => Some((oil, gas)),
        _ => None,
    };

    if drawdown.value() > 0.0 {
        // Producing direction.
        if !ctx.allow_crossflow && ctx.kind.is_injector() {
            return Ok(PerfRates::zero(nc));
        }

        let mut rates = PerfRates::zero(nc);
        for comp in 0..nc {
            let cq_p = -ctx.tw * (&mob[comp] * &drawdown);
            rates.cq_s[comp] = &cell.inv_b[comp] * &cq_p;
        }

        if let Some((oil, gas)) = oil_gas {
            let dis_gas = &cell.rs * &rates.cq_s[oil];
            let vap_oil = &cell.rv * &rates.cq_s[gas];
            rates.cq_s[gas] += &dis_gas;
            rates.cq_s[oil] += &vap_oil;
            if ctx.kind.is_producer() {
                rates.dis_gas_rate = dis_gas.value();
                rates.vap_oil_rate = vap_oil.value();
            }
        }
        Ok(rates)
    } else {
        // Injecting direction.
        if !ctx.allow_crossflow && ctx.kind.is_producer() {
            return Ok(PerfRates::zero(nc));
        }

        let mut total_mob = mob[0].clone();
        for m in &mob[1..] {
            total_mob += m;
        }
        let cqt_i = -ctx.tw * (&total_mob * &drawdown);

        // Surface-to-reservoir volume ratio of the injected mixture.
        let mut volume_ratio = Ad::constant(0.0);
        if let Some(water) = ctx.phases.comp_index(Phase::Water) {
            volume_ratio += &ctx.cmix_s[water] / &cell.inv_b[water];
        }
        if let Some((oil, gas)) = oil_gas {
            let d = 1.0 - &cell.rv * &cell.rs;
            if d.value() == 0.0 {
                return Err(WellError::NumericalIssue {
                    what: format!(
                        "zero rs/rv partition for well {} during flux calculation \
                         with rs {} and rv {}",
                        ctx.well_name,
                        cell.rs.value(),
                        cell.rv.value()
                    ),
                });
            }
            let tmp_oil = (&ctx.cmix_s[oil] - &cell.rv * &ctx.cmix_s[gas]) / &d;
            volume_ratio += &tmp_oil / &cell.inv_b[oil];
            let tmp_gas = (&ctx.cmix_s[gas] - &cell.rs * &ctx.cmix_s[oil]) / &d;
            volume_ratio += &tmp_gas / &cell.inv_b[gas];
        } else {
            if let Some(oil) = ctx.phases.comp_index(Phase::Oil) {
                volume_ratio += &ctx.cmix_s[oil] / &cell.inv_b[oil];
            }
            if let Some(gas) = ctx.phases.comp_index(Phase::Gas) {
                volume_ratio += &ctx.cmix_s[gas] / &cell.inv_b[gas];
            }
        }

        let cqt_is = &cqt_i / &volume_ratio;
        let mut rates = PerfRates::zero(nc);
        for comp in 0..nc {
            rates.cq_s[comp] = &ctx.cmix_s[comp] * &cqt_is;
        }

        // A producer in the injecting direction is crossflow; unmix the
        // reverse stream to keep the solution gas/oil bookkeeping right.
        if ctx.kind.is_producer() {
            if let Some((oil, gas)) = oil_gas {
                let rs = cell.rs.value();
                let rv = cell.rv.value();
                let d = 1.0 - rv * rs;
                let q_os = rates.cq_s[oil].value();
                let q_gs = rates.cq_s[gas].value();
                rates.vap_oil_rate = rv * (q_gs - rs * q_os) / d;
                rates.dis_gas_rate = rs * (q_os - rv * q_gs) / d;
            }
        }
        Ok(rates)
    }
}

/// Polymer corrections on the water mobility.
///
/// Injectors divide out the concentration-dependent viscosity multiplier
/// (full mixing in the wellbore); with a shear table, a trial rate
/// evaluation estimates the water velocity at the sandface and the
/// resulting shear factor thins the mobility further.
pub fn apply_polymer_mobility_corrections(
    polymer: &PolymerConfig,
    ctx: &PerfFlowContext,
    contact_area: Real,
    bore_diameter: Real,
    mob: &mut [Ad],
) -> WellResult<()> {
    let water = ctx
        .phases
        .comp_index(Phase::Water)
        .ok_or(WellError::Unsupported {
            what: "polymer requires an active water phase",
        })?;
    let cell = ctx.cell;

    if ctx.kind.is_injector() {
        if let Some(visc_mult) = &polymer.visc_mult {
            let mult = visc_mult.eval(cell.polymer_concentration, true);
            mob[water] = &mob[water] / (cell.water_viscosity_correction * mult);
        }
    }

    if let Some(shear) = &polymer.shear {
        if ctx.kind.is_injector() && polymer.injection_concentration == 0.0 {
            return Ok(());
        }

        // Water velocity from a trial rate evaluation without shear.
        let rates = compute_perf_rate(ctx, mob)?;
        let denom =
            (contact_area * cell.porosity * (cell.water_saturation - shear.swcr)).max(1e-12);
        let mut water_velocity = &rates.cq_s[water] / denom * &cell.inv_b[water];
        if let Some(shrate) = shear.shrate {
            water_velocity *= shrate / bore_diameter;
        }
        let factor = shear
            .factor_table
            .eval_ad(cell.polymer_concentration, &water_velocity);
        mob[water] = &mob[water] / &factor;
    }
    Ok(())
}
