//! Transport source terms of the optional physics units.
//!
//! Each enabled unit rides on a carrier component of the flow kernel:
//! polymer, brine and the molecular-weight tracer on water, foam and
//! solvent on gas, thermal energy on every active phase. The units do not
//! add well equations; they feed extra reservoir-equation rows of the
//! connected cell, restricted to cell-unknown derivative slots. The
//! solvent row is the one exception keeping its well-unknown coupling,
//! which the assembler scatters into the off-diagonal block.

use crate::config::{EnergyConfig, PolyMwConfig, PolymerConfig, WellConfig};
use crate::error::{WellError, WellResult};
use crate::injectivity::injected_molecular_weight;
use crate::primary::PrimaryVariables;
use crate::state::PerfData;
use wf_core::{Ad, Real};
use wf_pvt::{PerfCell, Phase};

/// Source terms one perforation feeds into the auxiliary reservoir rows.
#[derive(Debug, Default)]
pub struct TracerRates {
    /// `(reservoir equation row, rate)` pairs, restricted to cell slots.
    pub rates: Vec<(usize, Ad)>,
    /// Solvent rate with its well-unknown derivatives still attached.
    pub solvent_coupling: Option<Ad>,
}

fn carrier_comp(config: &WellConfig, phase: Phase, unit: &str) -> WellResult<usize> {
    config
        .phases
        .comp_index(phase)
        .ok_or_else(|| WellError::InvalidConfig {
            what: format!(
                "well {}: {unit} transport requires an active {} component",
                config.name,
                phase.name()
            ),
        })
}

/// Evaluate every enabled unit at one perforation.
///
/// `cq_s` are the surface-volume component rates of the flow kernel before
/// the efficiency factor; `dis_gas_rate` is the dissolved-gas part recorded
/// by the kernel. Durable per-perforation tracer rates are written before
/// the efficiency factor is applied, matching what the reporting layer
/// expects.
#[allow(clippy::too_many_arguments)]
pub fn connection_tracer_rates(
    config: &WellConfig,
    primary: &PrimaryVariables,
    eval: &[Ad],
    perf: usize,
    cell: &PerfCell,
    cq_s: &[Ad],
    dis_gas_rate: Real,
    perf_data: &mut PerfData,
) -> WellResult<TracerRates> {
    let mut out = TracerRates::default();
    let n_res = primary.n_res_eq();
    let efficiency = config.efficiency_factor.value;

    if let Some(energy) = &config.tracers.energy {
        let rate = thermal_rate(energy, config, cell, cq_s)?;
        out.rates.push((energy.cell_eq, rate.restricted(n_res)));
    }

    if let Some(polymer) = &config.tracers.polymer {
        let water = carrier_comp(config, Phase::Water, "polymer")?;
        let mut cq_s_poly = cq_s[water].clone();
        if config.kind.is_injector() {
            cq_s_poly = cq_s_poly * polymer.injection_concentration;
        } else {
            cq_s_poly =
                cq_s_poly * (cell.polymer_concentration * cell.polymer_viscosity_correction);
        }
        perf_data.polymer_rate = cq_s_poly.value();
        cq_s_poly = cq_s_poly * efficiency;
        out.rates
            .push((polymer.cell_eq, cq_s_poly.restricted(n_res)));

        if let Some(mw) = &polymer.molecular_weight {
            let rate = molecular_weight_rate(
                polymer,
                mw,
                config,
                primary,
                eval,
                perf,
                cell,
                perf_data.water_throughput,
                &cq_s_poly,
            )?;
            out.rates.push((mw.cell_eq, rate.restricted(n_res)));
        }
    }

    if let Some(foam) = &config.tracers.foam {
        let gas = carrier_comp(config, Phase::Gas, "foam")?;
        let mut cq_s_foam = &cq_s[gas] * efficiency;
        if config.kind.is_injector() {
            cq_s_foam = cq_s_foam * foam.injection_concentration;
        } else {
            cq_s_foam = cq_s_foam * cell.foam_concentration;
        }
        out.rates.push((foam.cell_eq, cq_s_foam.restricted(n_res)));
    }

    if let Some(solvent) = &config.tracers.solvent {
        let gas = carrier_comp(config, Phase::Gas, "solvent")?;
        let mut cq_s_solvent = cq_s[gas].clone();
        if config.kind.is_injector() {
            cq_s_solvent = cq_s_solvent * solvent.injection_fraction;
        } else if cq_s_solvent.value() != 0.0 {
            let dis_gas_frac = dis_gas_rate / cq_s_solvent.value();
            cq_s_solvent = cq_s_solvent
                * (dis_gas_frac * cell.solvent_dissolved_fraction
                    + (1.0 - dis_gas_frac) * cell.solvent_free_fraction);
        }
        perf_data.solvent_rate = cq_s_solvent.value();
        cq_s_solvent = cq_s_solvent * efficiency;
        out.rates
            .push((solvent.cell_eq, cq_s_solvent.restricted(n_res)));
        out.solvent_coupling = Some(cq_s_solvent);
    }

    if let Some(brine) = &config.tracers.brine {
        let water = carrier_comp(config, Phase::Water, "brine")?;
        let mut cq_s_salt = cq_s[water].clone();
        if config.kind.is_injector() {
            cq_s_salt = cq_s_salt * brine.injection_concentration;
        } else {
            cq_s_salt = cq_s_salt * cell.salt_concentration;
        }
        perf_data.brine_rate = cq_s_salt.value();
        cq_s_salt = cq_s_salt * efficiency;
        out.rates.push((brine.cell_eq, cq_s_salt.restricted(n_res)));
    }

    Ok(out)
}

/// Enthalpy flux of one perforation, summed over phases at reservoir
/// volume. Injected fluid entering the formation carries the injection
/// condition instead of the cell condition. The efficiency factor does not
/// apply to the thermal row.
fn thermal_rate(
    energy: &EnergyConfig,
    config: &WellConfig,
    cell: &PerfCell,
    cq_s: &[Ad],
) -> WellResult<Ad> {
    let phases = &config.phases;
    let nc = phases.n_phases();
    if cell.enthalpy.len() != nc || cell.phase_density.len() != nc {
        return Err(WellError::InvalidConfig {
            what: format!(
                "well {}: thermal transport needs cell enthalpy and density per component",
                config.name
            ),
        });
    }
    let injector = config.kind.is_injector();
    if injector && (energy.injection_enthalpy.len() != nc || energy.injection_density.len() != nc)
    {
        return Err(WellError::InvalidConfig {
            what: format!(
                "well {}: thermal transport needs injection enthalpy and density per component",
                config.name
            ),
        });
    }

    let mut total = Ad::constant(0.0);
    for (comp, phase) in phases.active().enumerate() {
        // Convert the surface rate to reservoir volume, unmixing dissolved
        // gas and vaporized oil when both phases are present.
        let cq_r = if phases.has_oil_gas() {
            let oil = phases.comp_index_checked(Phase::Oil)?;
            let gas = phases.comp_index_checked(Phase::Gas)?;
            let d = 1.0 - &cell.rv * &cell.rs;
            match phase {
                Phase::Water => &cq_s[comp] / &cell.inv_b[comp],
                Phase::Gas => (&cq_s[gas] - &cell.rs * &cq_s[oil]) / (&d * &cell.inv_b[comp]),
                Phase::Oil => (&cq_s[oil] - &cell.rv * &cq_s[gas]) / (&d * &cell.inv_b[comp]),
            }
        } else {
            &cq_s[comp] / &cell.inv_b[comp]
        };

        let (enthalpy, density) = if injector && cq_s[comp].value() > 0.0 {
            (energy.injection_enthalpy[comp], energy.injection_density[comp])
        } else {
            (cell.enthalpy[comp], cell.phase_density[comp])
        };
        total += cq_r * (enthalpy * density);
    }
    Ok(total)
}

/// Molecular-weight transport rides on the polymer rate. Injection below
/// zero velocity and production backflow both drop the term rather than
/// carry a weight from the wrong side of the sandface.
#[allow(clippy::too_many_arguments)]
fn molecular_weight_rate(
    polymer: &PolymerConfig,
    mw: &PolyMwConfig,
    config: &WellConfig,
    primary: &PrimaryVariables,
    eval: &[Ad],
    perf: usize,
    cell: &PerfCell,
    throughput: Real,
    cq_s_poly: &Ad,
) -> WellResult<Ad> {
    let mut cq_s_polymw = cq_s_poly.clone();
    if config.kind.is_injector() {
        let water_velocity = &eval[primary.water_velocity_index(perf)];
        if water_velocity.value() > 0.0 {
            let weight = injected_molecular_weight(
                polymer,
                mw,
                &config.name,
                throughput,
                water_velocity,
            )?;
            cq_s_polymw = cq_s_polymw * weight;
        } else {
            cq_s_polymw = Ad::constant(0.0);
        }
    } else if cq_s_polymw.value() < 0.0 {
        cq_s_polymw = cq_s_polymw * cell.polymer_mole_weight;
    } else {
        cq_s_polymw = Ad::constant(0.0);
    }
    Ok(cq_s_polymw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BrineConfig, FoamConfig, PerfConfig, SolventConfig, WellKind,
    };
    use wf_core::{CellId, Id, units};
    use wf_pvt::PhaseSet;

    const N_RES: usize = 5;

    fn base_config(kind: WellKind) -> WellConfig {
        let mut cfg = WellConfig::new(
            "T-1",
            Id::from_index(0),
            kind,
            PhaseSet::all(),
            Phase::Oil,
            vec![PerfConfig::new(CellId::from_index(0), 1e-12, units::m(2000.0))],
        );
        if kind.is_injector() {
            cfg.injection_phase = Some(Phase::Water);
        }
        cfg.efficiency_factor = units::unitless(0.5);
        cfg
    }

    fn primary(config: &WellConfig) -> PrimaryVariables {
        PrimaryVariables::new(config.phases.clone(), N_RES, config.n_perfs(), false)
    }

    /// Component rates as combined-slot variables so restriction has a
    /// tail to drop.
    fn rates(values: [Real; 3], n_well: usize) -> Vec<Ad> {
        let len = N_RES + n_well;
        values
            .iter()
            .enumerate()
            .map(|(c, v)| {
                let mut ad = Ad::variable(*v, c, len);
                ad += &Ad::variable(0.0, N_RES, len);
                ad
            })
            .collect()
    }

    fn three_phase_cell() -> PerfCell {
        let mut cell = PerfCell::new(
            Ad::constant(210e5),
            vec![Ad::constant(1e-10); 3],
            vec![
                Ad::constant(1.0),
                Ad::constant(0.9),
                Ad::constant(120.0),
            ],
        );
        cell.surface_density = vec![1000.0, 860.0, 0.97];
        cell
    }

    #[test]
    fn polymer_injection_scales_the_water_rate() {
        let mut config = base_config(WellKind::Injector);
        config.tracers.polymer = Some(PolymerConfig {
            cell_eq: 3,
            injection_concentration: 2.0,
            visc_mult: None,
            shear: None,
            molecular_weight: None,
        });
        let pv = primary(&config);
        let eval = pv.evaluate();
        let cq_s = rates([0.4, 0.0, 0.0], pv.n_well_eq());
        let mut pd = PerfData::new(3);
        let out = connection_tracer_rates(
            &config,
            &pv,
            &eval,
            0,
            &three_phase_cell(),
            &cq_s,
            0.0,
            &mut pd,
        )
        .unwrap();
        assert_eq!(out.rates.len(), 1);
        let (row, rate) = &out.rates[0];
        assert_eq!(*row, 3);
        // Recorded before the efficiency factor, emitted after.
        assert!((pd.polymer_rate - 0.8).abs() < 1e-12);
        assert!((rate.value() - 0.4).abs() < 1e-12);
        assert!(rate.n_derivs() <= N_RES);
    }

    #[test]
    fn polymer_production_carries_the_cell_concentration() {
        let mut config = base_config(WellKind::Producer);
        config.tracers.polymer = Some(PolymerConfig {
            cell_eq: 3,
            injection_concentration: 2.0,
            visc_mult: None,
            shear: None,
            molecular_weight: None,
        });
        let pv = primary(&config);
        let eval = pv.evaluate();
        let cq_s = rates([-0.4, 0.0, 0.0], pv.n_well_eq());
        let mut cell = three_phase_cell();
        cell.polymer_concentration = 3.0;
        cell.polymer_viscosity_correction = 0.5;
        let mut pd = PerfData::new(3);
        let out =
            connection_tracer_rates(&config, &pv, &eval, 0, &cell, &cq_s, 0.0, &mut pd).unwrap();
        assert!((pd.polymer_rate + 0.6).abs() < 1e-12);
        assert!((out.rates[0].1.value() + 0.3).abs() < 1e-12);
    }

    #[test]
    fn foam_rides_on_the_gas_component() {
        let mut config = base_config(WellKind::Producer);
        config.tracers.foam = Some(FoamConfig {
            cell_eq: 3,
            injection_concentration: 0.0,
        });
        let pv = primary(&config);
        let eval = pv.evaluate();
        let cq_s = rates([0.0, 0.0, -2.0], pv.n_well_eq());
        let mut cell = three_phase_cell();
        cell.foam_concentration = 0.25;
        let mut pd = PerfData::new(3);
        let out =
            connection_tracer_rates(&config, &pv, &eval, 0, &cell, &cq_s, 0.0, &mut pd).unwrap();
        assert!((out.rates[0].1.value() + 0.25).abs() < 1e-12);
    }

    #[test]
    fn produced_solvent_blends_the_two_gas_streams() {
        let mut config = base_config(WellKind::Producer);
        config.tracers.solvent = Some(SolventConfig {
            cell_eq: 4,
            injection_fraction: 0.0,
        });
        let pv = primary(&config);
        let eval = pv.evaluate();
        let cq_s = rates([0.0, 0.0, -2.0], pv.n_well_eq());
        let mut cell = three_phase_cell();
        cell.solvent_dissolved_fraction = 0.1;
        cell.solvent_free_fraction = 0.3;
        let mut pd = PerfData::new(3);
        // Dissolved gas is a quarter of the produced gas.
        let out = connection_tracer_rates(
            &config, &pv, &eval, 0, &cell, &cq_s, -0.5, &mut pd,
        )
        .unwrap();
        let expected = -2.0 * (0.25 * 0.1 + 0.75 * 0.3);
        assert!((pd.solvent_rate - expected).abs() < 1e-12);
        assert!((out.rates[0].1.value() - expected * 0.5).abs() < 1e-12);
        let coupling = out.solvent_coupling.unwrap();
        assert!(coupling.n_derivs() > N_RES);
    }

    #[test]
    fn injected_brine_uses_the_declared_salinity() {
        let mut config = base_config(WellKind::Injector);
        config.tracers.brine = Some(BrineConfig {
            cell_eq: 3,
            injection_concentration: 40.0,
        });
        let pv = primary(&config);
        let eval = pv.evaluate();
        let cq_s = rates([0.4, 0.0, 0.0], pv.n_well_eq());
        let mut pd = PerfData::new(3);
        let out = connection_tracer_rates(
            &config,
            &pv,
            &eval,
            0,
            &three_phase_cell(),
            &cq_s,
            0.0,
            &mut pd,
        )
        .unwrap();
        assert!((pd.brine_rate - 16.0).abs() < 1e-9);
        assert!((out.rates[0].1.value() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn thermal_rate_unmixes_the_blackoil_streams() {
        let mut config = base_config(WellKind::Producer);
        config.tracers.energy = Some(EnergyConfig {
            cell_eq: 4,
            injection_enthalpy: vec![],
            injection_density: vec![],
        });
        let pv = primary(&config);
        let eval = pv.evaluate();
        let cq_s = rates([-0.1, -0.2, -0.4], pv.n_well_eq());
        let mut cell = three_phase_cell();
        cell.rs = Ad::constant(0.5);
        cell.rv = Ad::constant(0.2);
        cell.enthalpy = vec![100e3, 200e3, 300e3];
        cell.phase_density = vec![1000.0, 700.0, 150.0];
        let mut pd = PerfData::new(3);
        let out =
            connection_tracer_rates(&config, &pv, &eval, 0, &cell, &cq_s, 0.0, &mut pd).unwrap();

        let d = 1.0 - 0.2 * 0.5;
        let water = -0.1 / 1.0 * 100e3 * 1000.0;
        let oil = (-0.2 - 0.2 * -0.4) / (d * 0.9) * 200e3 * 700.0;
        let gas = (-0.4 - 0.5 * -0.2) / (d * 120.0) * 300e3 * 150.0;
        assert!((out.rates[0].1.value() - (water + oil + gas)).abs() < 1.0);
    }

    #[test]
    fn injected_fluid_carries_injection_conditions() {
        let mut config = base_config(WellKind::Injector);
        config.phases = PhaseSet::new(true, false, false).unwrap();
        config.tracers.energy = Some(EnergyConfig {
            cell_eq: 2,
            injection_enthalpy: vec![50e3],
            injection_density: vec![980.0],
        });
        let pv = PrimaryVariables::new(config.phases.clone(), N_RES, 1, false);
        let eval = pv.evaluate();
        let len = N_RES + pv.n_well_eq();
        let cq_s = vec![Ad::variable(0.4, 0, len)];
        let mut cell = PerfCell::new(
            Ad::constant(210e5),
            vec![Ad::constant(1e-10)],
            vec![Ad::constant(1.25)],
        );
        cell.enthalpy = vec![999e3];
        cell.phase_density = vec![1.0];
        let mut pd = PerfData::new(1);
        let out =
            connection_tracer_rates(&config, &pv, &eval, 0, &cell, &cq_s, 0.0, &mut pd).unwrap();
        let expected = 0.4 / 1.25 * 50e3 * 980.0;
        assert!((out.rates[0].1.value() - expected).abs() < 1e-6);
    }

    #[test]
    fn produced_molecular_weight_drops_on_backflow() {
        let mut config = base_config(WellKind::Producer);
        config.tracers.polymer = Some(PolymerConfig {
            cell_eq: 3,
            injection_concentration: 0.0,
            visc_mult: None,
            shear: None,
            molecular_weight: Some(PolyMwConfig {
                cell_eq: 4,
                skin_water_table: None,
                skin_poly_table: None,
                mw_table: None,
            }),
        });
        let pv = primary(&config);
        let eval = pv.evaluate();
        let mut cell = three_phase_cell();
        cell.polymer_concentration = 1.0;
        cell.polymer_viscosity_correction = 1.0;
        cell.polymer_mole_weight = 7.0;

        let cq_s = rates([-0.4, 0.0, 0.0], pv.n_well_eq());
        let mut pd = PerfData::new(3);
        let out =
            connection_tracer_rates(&config, &pv, &eval, 0, &cell, &cq_s, 0.0, &mut pd).unwrap();
        let mw_row = out.rates.iter().find(|(row, _)| *row == 4).unwrap();
        assert!((mw_row.1.value() + 0.2 * 7.0).abs() < 1e-12);

        // Crossflow into the formation carries no produced weight.
        let cq_s = rates([0.4, 0.0, 0.0], pv.n_well_eq());
        let mut pd = PerfData::new(3);
        let out =
            connection_tracer_rates(&config, &pv, &eval, 0, &cell, &cq_s, 0.0, &mut pd).unwrap();
        let mw_row = out.rates.iter().find(|(row, _)| *row == 4).unwrap();
        assert_eq!(mw_row.1.value(), 0.0);
    }

    #[test]
    fn polymer_without_water_is_a_config_error() {
        let mut config = base_config(WellKind::Producer);
        config.phases = PhaseSet::new(false, true, true).unwrap();
        config.tracers.polymer = Some(PolymerConfig {
            cell_eq: 3,
            injection_concentration: 0.0,
            visc_mult: None,
            shear: None,
            molecular_weight: None,
        });
        let pv = PrimaryVariables::new(config.phases.clone(), N_RES, 1, false);
        let eval = pv.evaluate();
        let len = N_RES + pv.n_well_eq();
        let cq_s = vec![Ad::variable(0.0, 0, len), Ad::variable(0.0, 1, len)];
        let cell = PerfCell::new(
            Ad::constant(210e5),
            vec![Ad::constant(1e-10); 2],
            vec![Ad::constant(1.0); 2],
        );
        let mut pd = PerfData::new(2);
        let err = connection_tracer_rates(&config, &pv, &eval, 0, &cell, &cq_s, 0.0, &mut pd)
            .unwrap_err();
        assert!(matches!(err, WellError::InvalidConfig { .. }));
    }
}
