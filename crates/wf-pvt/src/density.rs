//! Blackoil mixture density at a wellbore connection.
//!
//! The wellbore fluid at a connection is described by the normalized
//! surface-volume composition of the stream flowing up past it. Free and
//! dissolved amounts are separated through rs/rv before volumes are
//! converted to reservoir conditions.

use crate::error::{PvtError, PvtResult};
use crate::phase::{Phase, PhaseSet};
use wf_core::Real;

/// Composition fractions below this threshold cannot anchor an rs/rv ratio.
const MIX_EPS: Real = 1e-12;

/// Free surface-volume composition of a wellbore mixture.
///
/// `mix` holds non-negative surface-volume fractions per dense component;
/// `rs_max`/`rv_max` are the saturated limits (present only when both oil
/// and gas are active). The returned vector has dissolved gas removed from
/// the gas entry and vaporized oil removed from the oil entry. A partition
/// factor `1 - rs*rv <= 0` is reported as an error; callers choose whether
/// to treat it as fatal or fall back to the unpartitioned composition.
pub fn free_surface_composition(
    mix: &[Real],
    rs_max: Option<Real>,
    rv_max: Option<Real>,
    phases: &PhaseSet,
) -> PvtResult<Vec<Real>> {
    let mut x = mix.to_vec();
    if let (Some(oil), Some(gas)) = (
        phases.comp_index(Phase::Oil),
        phases.comp_index(Phase::Gas),
    ) {
        let mut rs = 0.0;
        let mut rv = 0.0;
        if let Some(rs_max) = rs_max {
            if mix[oil] > MIX_EPS {
                rs = (mix[gas] / mix[oil]).min(rs_max);
            }
        }
        if let Some(rv_max) = rv_max {
            if mix[gas] > MIX_EPS {
                rv = (mix[oil] / mix[gas]).min(rv_max);
            }
        }
        let d = 1.0 - rs * rv;
        if d <= 0.0 {
            return Err(PvtError::NonPhysical {
                what: "wellbore mixture unmixing (1 - rs*rv)",
            });
        }
        if rs > 0.0 {
            // The gas fraction that is actually free gas
            x[gas] = (mix[gas] - mix[oil] * rs) / d;
        }
        if rv > 0.0 {
            x[oil] = (mix[oil] - mix[gas] * rv) / d;
        }
    }
    Ok(x)
}

/// Density [kg/m³] of the wellbore mixture at one connection.
///
/// `mix` is the raw surface composition (carrying the surface mass),
/// `free` its unpartitioned counterpart from [`free_surface_composition`]
/// (carrying the reservoir volume), `inv_b` the reciprocal formation
/// volume factors at the connection pressure.
pub fn mixture_density(
    mix: &[Real],
    free: &[Real],
    inv_b: &[Real],
    surface_density: &[Real],
) -> PvtResult<Real> {
    let nc = mix.len();
    if free.len() != nc || inv_b.len() != nc || surface_density.len() != nc {
        return Err(PvtError::InvalidArg {
            what: "component vectors must match the active phase count",
        });
    }

    let mut volrat = 0.0;
    for comp in 0..nc {
        if inv_b[comp] <= 0.0 {
            return Err(PvtError::NonPhysical {
                what: "reciprocal formation volume factor",
            });
        }
        volrat += free[comp] / inv_b[comp];
    }
    if !(volrat.is_finite() && volrat > 0.0) {
        return Err(PvtError::NonPhysical {
            what: "connection volume ratio",
        });
    }

    let surface_mass: Real = mix
        .iter()
        .zip(surface_density)
        .map(|(m, rho)| m * rho)
        .sum();
    Ok(surface_mass / volrat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn density(
        mix: &[Real],
        inv_b: &[Real],
        rs_max: Option<Real>,
        rv_max: Option<Real>,
        surf: &[Real],
        phases: &PhaseSet,
    ) -> PvtResult<Real> {
        let free = free_surface_composition(mix, rs_max, rv_max, phases)?;
        mixture_density(mix, &free, inv_b, surf)
    }

    #[test]
    fn single_phase_water_density() {
        let phases = PhaseSet::new(true, false, false).unwrap();
        let inv_b = 1.0 / 1.02;
        let rho = density(&[1.0], &[inv_b], None, None, &[1000.0], &phases).unwrap();
        assert!((rho - 1000.0 * inv_b).abs() < 1e-9);
    }

    #[test]
    fn free_gas_reduced_by_dissolution() {
        let phases = PhaseSet::new(false, true, true).unwrap();
        // Equal oil/gas surface volumes, dissolution capped at rs = 0.5.
        let mix = [0.5, 0.5];
        let inv_b = [1.0, 100.0];
        let rho = density(
            &mix,
            &inv_b,
            Some(0.5),
            Some(0.0),
            &[800.0, 1.0],
            &phases,
        )
        .unwrap();
        // x_gas = (0.5 - 0.5*0.5)/1 = 0.25 free gas
        let volrat = 0.5 / 1.0 + 0.25 / 100.0;
        let expect = (0.5 * 800.0 + 0.5 * 1.0) / volrat;
        assert!((rho - expect).abs() < 1e-9);
    }

    #[test]
    fn no_unmixing_without_ratios() {
        let phases = PhaseSet::new(false, true, true).unwrap();
        let mix = [0.7, 0.3];
        let free = free_surface_composition(&mix, Some(0.0), Some(0.0), &phases).unwrap();
        assert_eq!(free, mix.to_vec());
        let inv_b = [0.9, 120.0];
        let rho = mixture_density(&mix, &free, &inv_b, &[850.0, 1.2]).unwrap();
        let volrat = 0.7 / 0.9 + 0.3 / 120.0;
        let expect = (0.7 * 850.0 + 0.3 * 1.2) / volrat;
        assert!((rho - expect).abs() < 1e-9);
    }

    #[test]
    fn degenerate_unmixing_is_an_error() {
        let phases = PhaseSet::new(false, true, true).unwrap();
        let err =
            free_surface_composition(&[0.5, 0.5], Some(10.0), Some(10.0), &phases).unwrap_err();
        assert!(matches!(err, PvtError::NonPhysical { .. }));
    }

    #[test]
    fn length_mismatch_rejected() {
        let err = mixture_density(&[1.0], &[1.0], &[1.0, 1.0], &[1000.0]);
        assert!(err.is_err());
    }
}
