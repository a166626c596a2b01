//! Vertical lift performance table.
//!
//! Maps (flow rate, tubing-head pressure) to the bottom-hole pressure that
//! sustains the flow, with bilinear interpolation inside the grid and
//! constant clamping beyond it. Two solves are derived from the table: the
//! tubing-head pressure implied by a known BHP, and the BHP obeying a
//! tubing-head limit when the rate itself depends on BHP.

use crate::error::{PvtError, PvtResult};
use serde::{Deserialize, Serialize};
use wf_core::roots::{RootConfig, solve_bracketed};
use wf_core::{Real, WfError};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VfpTable {
    /// Strictly increasing flow-rate axis [sm³/s].
    flo_axis: Vec<Real>,
    /// Strictly increasing tubing-head pressure axis [Pa].
    thp_axis: Vec<Real>,
    /// `bhp[i][j]` for `flo_axis[i]`, `thp_axis[j]` [Pa].
    bhp: Vec<Vec<Real>>,
}

fn strictly_increasing(axis: &[Real]) -> bool {
    axis.windows(2).all(|w| w[1] > w[0])
}

/// Bracketing interval and interpolation weight for `x` on `axis`,
/// clamped to the axis range.
fn locate(axis: &[Real], x: Real) -> (usize, Real) {
    if axis.len() == 1 || x <= axis[0] {
        return (0, 0.0);
    }
    let last = axis.len() - 1;
    if x >= axis[last] {
        return (last - 1, 1.0);
    }
    let mut i = 0;
    while axis[i + 1] < x {
        i += 1;
    }
    let w = (x - axis[i]) / (axis[i + 1] - axis[i]);
    (i, w)
}

impl VfpTable {
    pub fn new(flo_axis: Vec<Real>, thp_axis: Vec<Real>, bhp: Vec<Vec<Real>>) -> PvtResult<Self> {
        if flo_axis.is_empty() || thp_axis.is_empty() {
            return Err(PvtError::InvalidArg {
                what: "lift table axes must be non-empty",
            });
        }
        if !strictly_increasing(&flo_axis) || !strictly_increasing(&thp_axis) {
            return Err(PvtError::InvalidArg {
                what: "lift table axes must be strictly increasing",
            });
        }
        if bhp.len() != flo_axis.len() {
            return Err(PvtError::InvalidArg {
                what: "lift table row count must match the flow axis",
            });
        }
        for row in &bhp {
            if row.len() != thp_axis.len() {
                return Err(PvtError::InvalidArg {
                    what: "lift table column count must match the thp axis",
                });
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(PvtError::InvalidArg {
                    what: "lift table values must be finite",
                });
            }
        }
        Ok(Self {
            flo_axis,
            thp_axis,
            bhp,
        })
    }

    /// Bottom-hole pressure sustaining `flo` at tubing-head pressure `thp`.
    pub fn bhp(&self, flo: Real, thp: Real) -> Real {
        let (i, wf) = locate(&self.flo_axis, flo);
        let (j, wt) = locate(&self.thp_axis, thp);
        let i1 = (i + 1).min(self.flo_axis.len() - 1);
        let j1 = (j + 1).min(self.thp_axis.len() - 1);
        let lo = self.bhp[i][j] * (1.0 - wt) + self.bhp[i][j1] * wt;
        let hi = self.bhp[i1][j] * (1.0 - wt) + self.bhp[i1][j1] * wt;
        lo * (1.0 - wf) + hi * wf
    }

    /// Tubing-head pressure at which the table reproduces `bhp` for `flo`.
    ///
    /// The table is piecewise linear along the thp axis, so each segment is
    /// solved directly; beyond the axis ends the terminal segment slope is
    /// extrapolated. `None` when the table is flat in thp and never crosses.
    pub fn implied_thp(&self, flo: Real, bhp: Real) -> Option<Real> {
        let n = self.thp_axis.len();
        let g: Vec<Real> = self
            .thp_axis
            .iter()
            .map(|&thp| self.bhp(flo, thp) - bhp)
            .collect();

        if n == 1 {
            return if g[0] == 0.0 {
                Some(self.thp_axis[0])
            } else {
                None
            };
        }

        for j in 0..n - 1 {
            if g[j] == 0.0 {
                return Some(self.thp_axis[j]);
            }
            if g[j] * g[j + 1] < 0.0 {
                let w = g[j] / (g[j] - g[j + 1]);
                return Some(self.thp_axis[j] + w * (self.thp_axis[j + 1] - self.thp_axis[j]));
            }
        }
        if g[n - 1] == 0.0 {
            return Some(self.thp_axis[n - 1]);
        }

        // Extrapolate from the nearer end.
        let (j0, j1) = if g[0].abs() <= g[n - 1].abs() {
            (0, 1)
        } else {
            (n - 2, n - 1)
        };
        let slope = (g[j1] - g[j0]) / (self.thp_axis[j1] - self.thp_axis[j0]);
        if slope == 0.0 || !slope.is_finite() {
            return None;
        }
        Some(self.thp_axis[j0] - g[j0] / slope)
    }

    /// BHP satisfying the tubing-head limit when the rate depends on BHP.
    ///
    /// `flo_at_bhp` evaluates the table's flow coordinate at a trial BHP.
    /// The residual `bhp - table(flo(bhp), thp_limit)` is sampled across
    /// `bhp_range` and the first sign change from the low end is refined;
    /// `None` when no sample pair straddles zero.
    pub fn bhp_at_thp_limit<F>(
        &self,
        thp_limit: Real,
        bhp_range: (Real, Real),
        samples: usize,
        mut flo_at_bhp: F,
    ) -> PvtResult<Option<Real>>
    where
        F: FnMut(Real) -> PvtResult<Real>,
    {
        let (lo, hi) = bhp_range;
        if !(lo.is_finite() && hi.is_finite()) || lo >= hi || samples < 2 {
            return Err(PvtError::InvalidArg {
                what: "bhp search range must be finite with at least two samples",
            });
        }

        let mut residual = |bhp: Real| -> PvtResult<Real> {
            let flo = flo_at_bhp(bhp)?;
            Ok(bhp - self.bhp(flo, thp_limit))
        };

        let step = (hi - lo) / (samples - 1) as Real;
        let mut prev_x = lo;
        let mut prev_r = residual(lo)?;
        for k in 1..samples {
            let x = lo + step * k as Real;
            let r = residual(x)?;
            if prev_r == 0.0 {
                return Ok(Some(prev_x));
            }
            if prev_r * r < 0.0 {
                let root = solve_bracketed(
                    |bhp| residual(bhp).map_err(WfError::from),
                    prev_x,
                    x,
                    RootConfig::default(),
                )?;
                return Ok(Some(root));
            }
            prev_x = x;
            prev_r = r;
        }
        if prev_r == 0.0 {
            return Ok(Some(prev_x));
        }
        Ok(None)
    }
}
