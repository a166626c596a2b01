//! Per-well convergence check.
//!
//! Runs on the reduced residual, so every rank sees the same verdict.
//! Non-convergence is a report, not an error; the outer loop decides what
//! to do with it.

use crate::config::{ControlMode, WellConfig};
use crate::linsys::LocalLinearSystem;
use crate::primary::PrimaryVariables;
use wf_core::Real;

/// Residual tolerances of the well equations.
#[derive(Clone, Copy, Debug)]
pub struct ConvergenceTolerances {
    /// Scaled mass-balance and rate-control residual tolerance.
    pub tolerance_wells: Real,
    /// Pressure-control residual tolerance [Pa].
    pub tolerance_pressure: Real,
    /// Ceiling above which a residual is reported as too large regardless
    /// of tolerance.
    pub max_residual_allowed: Real,
}

impl Default for ConvergenceTolerances {
    fn default() -> Self {
        Self {
            tolerance_wells: 1e-4,
            tolerance_pressure: 1000.0,
            max_residual_allowed: 1e9,
        }
    }
}

/// Which well equation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WellEquation {
    /// Mass balance of one dense component.
    MassBalance(usize),
    Control,
    WaterVelocity(usize),
    SkinPressure(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    NotANumber,
    TooLarge,
    AboveTolerance,
}

#[derive(Clone, Copy, Debug)]
pub struct EquationFailure {
    pub eq: WellEquation,
    pub kind: FailureKind,
    /// The scaled residual that was compared against the tolerance.
    pub residual: Real,
}

/// Verdict of one check; empty failures means converged.
#[derive(Clone, Debug, Default)]
pub struct ConvergenceReport {
    pub failures: Vec<EquationFailure>,
}

impl ConvergenceReport {
    pub fn converged(&self) -> bool {
        self.failures.is_empty()
    }

    fn check(&mut self, eq: WellEquation, residual: Real, tolerance: Real, ceiling: Real) {
        let kind = if residual.is_nan() {
            FailureKind::NotANumber
        } else if residual > ceiling {
            FailureKind::TooLarge
        } else if residual > tolerance {
            FailureKind::AboveTolerance
        } else {
            return;
        };
        self.failures.push(EquationFailure { eq, kind, residual });
    }
}

/// Check the reduced well residual against the tolerances.
///
/// Mass-balance rows are scaled by the caller-supplied average reciprocal
/// formation-volume factors, putting them on a reservoir-volume footing
/// comparable across components. The control row takes the pressure
/// tolerance under pressure control and the rate tolerance otherwise. The
/// injectivity rows are only held below the ceiling; their magnitudes are
/// dominated by the tabulated closures and settle with the rest of the
/// system.
pub fn well_convergence(
    config: &WellConfig,
    primary: &PrimaryVariables,
    sys: &LocalLinearSystem,
    b_avg: &[Real],
    tol: &ConvergenceTolerances,
) -> ConvergenceReport {
    debug_assert_eq!(b_avg.len(), config.n_comps());
    let res = sys.residual();
    let mut report = ConvergenceReport::default();

    for comp in 0..config.n_comps() {
        let scaled = res[comp].abs() * b_avg[comp];
        report.check(
            WellEquation::MassBalance(comp),
            scaled,
            tol.tolerance_wells,
            tol.max_residual_allowed,
        );
    }

    let control = res[primary.bhp_index()].abs();
    let control_tol = match config.controls.mode {
        ControlMode::Bhp | ControlMode::Thp => tol.tolerance_pressure,
        ControlMode::SurfaceRate { .. } | ControlMode::ReservoirRate { .. } => {
            tol.tolerance_wells
        }
    };
    report.check(
        WellEquation::Control,
        control,
        control_tol,
        tol.max_residual_allowed,
    );

    if primary.has_injectivity() {
        for perf in 0..config.n_perfs() {
            report.check(
                WellEquation::WaterVelocity(perf),
                res[primary.water_velocity_index(perf)].abs(),
                tol.max_residual_allowed,
                tol.max_residual_allowed,
            );
            report.check(
                WellEquation::SkinPressure(perf),
                res[primary.skin_pressure_index(perf)].abs(),
                tol.max_residual_allowed,
                tol.max_residual_allowed,
            );
        }
    }
    report
}
