//! The well control equation.
//!
//! One equation closes the well system against the active target: a
//! pressure gap for BHP and THP control, a rate gap for the rate modes.
//! Rate targets are positive magnitudes; the declared role fixes the sign
//! the primary variables must meet. The THP target is translated to a
//! bottom-hole pressure through the lift table at the current rate, held
//! constant within the Newton iteration.

use crate::config::{ControlMode, WellConfig};
use crate::error::{WellError, WellResult};
use crate::primary::PrimaryVariables;
use crate::state::WellState;
use tracing::debug;
use wf_core::Ad;

/// Residual of the active control target in the combined slot space.
pub fn control_equation(
    config: &WellConfig,
    primary: &PrimaryVariables,
    eval: &[Ad],
    fractions: &[Ad],
) -> WellResult<Ad> {
    let bhp = &eval[primary.bhp_index()];
    let sign = config.kind.rate_sign();
    match &config.controls.mode {
        ControlMode::Bhp => Ok(bhp - config.controls.bhp_limit.value),
        ControlMode::Thp => {
            let thp_limit =
                config
                    .controls
                    .thp_limit
                    .ok_or_else(|| WellError::InvalidConfig {
                        what: format!("well {}: thp control without a thp limit", config.name),
                    })?;
            let vfp = config
                .controls
                .vfp
                .as_ref()
                .ok_or_else(|| WellError::InvalidConfig {
                    what: format!("well {}: thp control without a lift table", config.name),
                })?;
            let flo = primary.q_total().abs();
            let bhp_target = vfp.bhp(flo, thp_limit.value);
            Ok(bhp - bhp_target)
        }
        ControlMode::SurfaceRate { phase, target } => {
            let rate = match phase {
                Some(p) => {
                    let comp = config.phases.comp_index_checked(*p)?;
                    primary.surface_rate(eval, fractions, comp)
                }
                None => eval[0].clone(),
            };
            Ok(rate - sign * target.value)
        }
        ControlMode::ReservoirRate { target, factors } => {
            let mut rate = Ad::constant(0.0);
            for comp in 0..config.n_comps() {
                rate += primary.surface_rate(eval, fractions, comp) * factors[comp];
            }
            Ok(rate - sign * target.value)
        }
    }
}

/// Refresh the tubing-head pressure from the lift table at the current
/// rate and BHP. Wells without a lift table report zero.
pub fn update_thp(config: &WellConfig, state: &mut WellState) {
    let Some(vfp) = &config.controls.vfp else {
        state.thp = 0.0;
        return;
    };
    let flo = state.total_surface_rate().abs();
    match vfp.implied_thp(flo, state.bhp) {
        Some(thp) => state.thp = thp,
        None => {
            debug!(well = %config.name, "lift table has no thp matching the current bhp");
            state.thp = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PerfConfig, WellKind};
    use wf_core::{CellId, Id, Real, units};
    use wf_pvt::{Phase, PhaseSet, VfpTable};

    const N_RES: usize = 3;

    fn well(kind: WellKind) -> WellConfig {
        let mut cfg = WellConfig::new(
            "C-1",
            Id::from_index(0),
            kind,
            PhaseSet::all(),
            Phase::Oil,
            vec![PerfConfig::new(CellId::from_index(0), 1e-12, units::m(2000.0))],
        );
        if kind.is_injector() {
            cfg.injection_phase = Some(Phase::Water);
        }
        cfg
    }

    fn primary_at(rates: [Real; 3], bhp: Real, config: &WellConfig) -> PrimaryVariables {
        let mut pv = PrimaryVariables::new(PhaseSet::all(), N_RES, 1, false);
        let mut state = WellState::new(3, 1);
        state.surface_rates = rates.to_vec();
        state.bhp = bhp;
        pv.set_from_state(&state, config);
        pv
    }

    /// bhp = thp + 20e5 + 1e8 * flo on the tabulated grid.
    fn lift_table() -> VfpTable {
        let flo_axis = vec![0.0, 0.05, 0.2];
        let thp_axis = vec![10e5, 40e5];
        let bhp = flo_axis
            .iter()
            .map(|f| thp_axis.iter().map(|t| t + 20e5 + 1e8 * f).collect())
            .collect();
        VfpTable::new(flo_axis, thp_axis, bhp).unwrap()
    }

    #[test]
    fn bhp_mode_measures_the_pressure_gap() {
        let mut config = well(WellKind::Producer);
        config.controls.bhp_limit = units::pa(100e5);
        let pv = primary_at([-0.01, -0.02, -0.01], 150e5, &config);
        let eval = pv.evaluate();
        let fractions = pv.volume_fractions(&eval);
        let eq = control_equation(&config, &pv, &eval, &fractions).unwrap();
        assert!((eq.value() - 50e5).abs() < 1.0);
        assert_eq!(eq.deriv(N_RES + pv.bhp_index()), 1.0);
    }

    #[test]
    fn total_rate_target_is_met_at_the_declared_sign() {
        let mut config = well(WellKind::Producer);
        config.controls.mode = ControlMode::SurfaceRate {
            phase: None,
            target: units::m3ps(0.04),
        };
        let pv = primary_at([-0.01, -0.02, -0.01], 150e5, &config);
        let eval = pv.evaluate();
        let fractions = pv.volume_fractions(&eval);
        let eq = control_equation(&config, &pv, &eval, &fractions).unwrap();
        assert!(eq.value().abs() < 1e-12);
        assert_eq!(eq.deriv(N_RES), 1.0);
    }

    #[test]
    fn phase_rate_target_uses_the_fraction_split() {
        let mut config = well(WellKind::Producer);
        config.controls.mode = ControlMode::SurfaceRate {
            phase: Some(Phase::Oil),
            target: units::m3ps(0.02),
        };
        let pv = primary_at([-0.01, -0.02, -0.01], 150e5, &config);
        let eval = pv.evaluate();
        let fractions = pv.volume_fractions(&eval);
        let eq = control_equation(&config, &pv, &eval, &fractions).unwrap();
        // q_oil = -0.02 already meets the target.
        assert!(eq.value().abs() < 1e-12);
        // The oil fraction is implicit, so the residual moves with the
        // stored fractions as well as the total.
        assert!(eq.deriv(N_RES) != 0.0);
        assert!(eq.deriv(N_RES + 1) != 0.0);
    }

    #[test]
    fn reservoir_rate_applies_conversion_factors() {
        let mut config = well(WellKind::Injector);
        config.controls.mode = ControlMode::ReservoirRate {
            target: units::m3ps(0.05),
            factors: vec![1.1, 1.0, 1.0],
        };
        let pv = primary_at([0.04, 0.0, 0.0], 250e5, &config);
        let eval = pv.evaluate();
        let fractions = pv.volume_fractions(&eval);
        let eq = control_equation(&config, &pv, &eval, &fractions).unwrap();
        assert!((eq.value() - (0.044 - 0.05)).abs() < 1e-12);
    }

    #[test]
    fn thp_mode_translates_through_the_lift_table() {
        let mut config = well(WellKind::Producer);
        config.controls.mode = ControlMode::Thp;
        config.controls.thp_limit = Some(units::pa(25e5));
        config.controls.vfp = Some(lift_table());
        let pv = primary_at([-0.02, -0.05, -0.03], 150e5, &config);
        let eval = pv.evaluate();
        let fractions = pv.volume_fractions(&eval);
        let eq = control_equation(&config, &pv, &eval, &fractions).unwrap();
        let expected_target = 25e5 + 20e5 + 1e8 * 0.1;
        assert!((eq.value() - (150e5 - expected_target)).abs() < 1.0);
    }

    #[test]
    fn thp_mode_without_table_is_a_config_error() {
        let mut config = well(WellKind::Producer);
        config.controls.mode = ControlMode::Thp;
        config.controls.thp_limit = Some(units::pa(25e5));
        let pv = primary_at([-0.02, -0.05, -0.03], 150e5, &config);
        let eval = pv.evaluate();
        let fractions = pv.volume_fractions(&eval);
        assert!(control_equation(&config, &pv, &eval, &fractions).is_err());
    }

    #[test]
    fn thp_refresh_inverts_the_lift_table() {
        let mut config = well(WellKind::Producer);
        config.controls.vfp = Some(lift_table());
        let mut state = WellState::new(3, 1);
        state.surface_rates = vec![-0.02, -0.05, -0.03];
        state.bhp = 30e5 + 20e5 + 1e8 * 0.1;
        update_thp(&config, &mut state);
        assert!((state.thp - 30e5).abs() < 1.0);

        let mut bare = well(WellKind::Producer);
        bare.controls.vfp = None;
        update_thp(&bare, &mut state);
        assert_eq!(state.thp, 0.0);
    }
}
