//! Bracketed scalar root finding.
//!
//! Regula falsi with the Illinois cut, falling back to bisection whenever
//! the secant step leaves the bracket. Used for the pressure solves against
//! lift-performance tables, where the residual is cheap but only available
//! through a fallible evaluation.

use crate::error::{WfError, WfResult};
use crate::numeric::Real;

/// Bracketed solve configuration.
#[derive(Clone, Copy, Debug)]
pub struct RootConfig {
    /// Maximum iterations
    pub max_iterations: u32,
    /// Absolute tolerance on the bracket width
    pub x_tol: Real,
    /// Absolute tolerance on the residual
    pub r_tol: Real,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            x_tol: 1e-8,
            r_tol: 1e-11,
        }
    }
}

/// Find a root of `f` inside `[lo, hi]`.
///
/// `f(lo)` and `f(hi)` must straddle zero; an endpoint that is already a
/// root is returned directly.
pub fn solve_bracketed<F>(mut f: F, lo: Real, hi: Real, config: RootConfig) -> WfResult<Real>
where
    F: FnMut(Real) -> WfResult<Real>,
{
    if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
        return Err(WfError::InvalidArg {
            what: "root bracket must be a finite non-empty interval".into(),
        });
    }

    let mut a = lo;
    let mut b = hi;
    let mut fa = f(a)?;
    let mut fb = f(b)?;
    if fa.abs() <= config.r_tol {
        return Ok(a);
    }
    if fb.abs() <= config.r_tol {
        return Ok(b);
    }
    if fa * fb > 0.0 {
        return Err(WfError::InvalidArg {
            what: "root bracket does not straddle zero".into(),
        });
    }

    // +1 when the upper endpoint was kept last, -1 for the lower one.
    let mut kept_side = 0_i8;

    for _ in 0..config.max_iterations {
        let mut x = (a * fb - b * fa) / (fb - fa);
        if !x.is_finite() || x <= a || x >= b {
            x = 0.5 * (a + b);
        }
        let fx = f(x)?;

        if fx.abs() <= config.r_tol || (b - a).abs() <= config.x_tol {
            return Ok(x);
        }

        if fa * fx < 0.0 {
            b = x;
            fb = fx;
            if kept_side == -1 {
                // Illinois cut: stop the retained endpoint from stalling
                fa *= 0.5;
            }
            kept_side = -1;
        } else {
            a = x;
            fa = fx;
            if kept_side == 1 {
                fb *= 0.5;
            }
            kept_side = 1;
        }
    }

    Err(WfError::NoConvergence {
        what: "bracketed root solve",
        iterations: config.max_iterations,
    })
}
