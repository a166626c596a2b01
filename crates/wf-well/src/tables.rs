//! Interpolation tables for the injectivity and mobility sub-models.
//!
//! Skin-pressure and molecular-weight tables are bilinear in (throughput,
//! velocity); the polymer viscosity multiplier is piecewise linear in
//! concentration. Evaluation carries derivatives through the second axis
//! only, which is the axis fed by a differentiable quantity.

use crate::error::{WellError, WellResult};
use serde::{Deserialize, Serialize};
use wf_core::{Ad, Real};

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

/// Piecewise-linear curve `y(x)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Table1d {
    x: Vec<Real>,
    y: Vec<Real>,
}

impl Table1d {
    pub fn new(x: Vec<Real>, y: Vec<Real>) -> WellResult<Self> {
        if x.len() < 2 || y.len() != x.len() {
            return Err(WellError::InvalidConfig {
                what: "curve needs at least two points and matching lengths".to_string(),
            });
        }
        if !strictly_increasing(&x) {
            return Err(WellError::InvalidConfig {
                what: "curve abscissae must be strictly increasing".to_string(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(WellError::InvalidConfig {
                what: "curve values must be finite".to_string(),
            });
        }
        Ok(Self { x, y })
    }

    /// Value at `x`; `extrapolate` continues the terminal segment slope
    /// beyond the axis ends instead of clamping.
    pub fn eval(&self, x: Real, extrapolate: bool) -> Real {
        if extrapolate {
            let last = self.x.len() - 1;
            if x < self.x[0] {
                let slope = (self.y[1] - self.y[0]) / (self.x[1] - self.x[0]);
                return self.y[0] + slope * (x - self.x[0]);
            }
            if x > self.x[last] {
                let slope =
                    (self.y[last] - self.y[last - 1]) / (self.x[last] - self.x[last - 1]);
                return self.y[last] + slope * (x - self.x[last]);
            }
        }
        let (i, w) = locate(&self.x, x);
        self.y[i] * (1.0 - w) + self.y[i + 1] * w
    }

    /// Differentiable evaluation; the derivative is the local segment slope
    /// chained through `x`.
    pub fn eval_ad(&self, x: &Ad, extrapolate: bool) -> Ad {
        let val = self.eval(x.value(), extrapolate);
        let slope = self.slope_at(x.value(), extrapolate);
        let der = (0..x.n_derivs()).map(|k| slope * x.deriv(k)).collect();
        Ad::with_derivatives(val, der)
    }

    fn slope_at(&self, x: Real, extrapolate: bool) -> Real {
        let last = self.x.len() - 1;
        if !extrapolate && (x <= self.x[0] || x >= self.x[last]) {
            return 0.0;
        }
        let (i, _) = locate(&self.x, x.clamp(self.x[0], self.x[last]));
        (self.y[i + 1] - self.y[i]) / (self.x[i + 1] - self.x[i])
    }
}

/// Bilinear surface `z(x, y)` with clamping beyond the grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Table2d {
    x_axis: Vec<Real>,
    y_axis: Vec<Real>,
    /// `z[i][j]` for `x_axis[i]`, `y_axis[j]`.
    z: Vec<Vec<Real>>,
}

impl Table2d {
    pub fn new(x_axis: Vec<Real>, y_axis: Vec<Real>, z: Vec<Vec<Real>>) -> WellResult<Self> {
        if x_axis.is_empty() || y_axis.is_empty() {
            return Err(WellError::InvalidConfig {
                what: "table axes must be non-empty".to_string(),
            });
        }
        if !strictly_increasing(&x_axis) || !strictly_increasing(&y_axis) {
            return Err(WellError::InvalidConfig {
                what: "table axes must be strictly increasing".to_string(),
            });
        }
        if z.len() != x_axis.len() || z.iter().any(|row| row.len() != y_axis.len()) {
            return Err(WellError::InvalidConfig {
                what: "table dimensions must match the axes".to_string(),
            });
        }
        if z.iter().flatten().any(|v| !v.is_finite()) {
            return Err(WellError::InvalidConfig {
                what: "table values must be finite".to_string(),
            });
        }
        Ok(Self { x_axis, y_axis, z })
    }

    pub fn eval(&self, x: Real, y: Real) -> Real {
        let (i, wx) = locate(&self.x_axis, x);
        let (j, wy) = locate(&self.y_axis, y);
        let i1 = (i + 1).min(self.x_axis.len() - 1);
        let j1 = (j + 1).min(self.y_axis.len() - 1);
        let lo = self.z[i][j] * (1.0 - wy) + self.z[i][j1] * wy;
        let hi = self.z[i1][j] * (1.0 - wy) + self.z[i1][j1] * wy;
        lo * (1.0 - wx) + hi * wx
    }

    /// Differentiable evaluation at scalar `x` and differentiable `y`.
    ///
    /// The chain rule runs through the y axis; outside the grid the clamped
    /// value is constant and the derivative vanishes.
    pub fn eval_ad(&self, x: Real, y: &Ad) -> Ad {
        let val = self.eval(x, y.value());
        let dy = self.dz_dy(x, y.value());
        let der = (0..y.n_derivs()).map(|k| dy * y.deriv(k)).collect();
        Ad::with_derivatives(val, der)
    }

    fn dz_dy(&self, x: Real, y: Real) -> Real {
        let last = self.y_axis.len() - 1;
        if y <= self.y_axis[0] || y >= self.y_axis[last] {
            return 0.0;
        }
        let (i, wx) = locate(&self.x_axis, x);
        let (j, _) = locate(&self.y_axis, y);
        let i1 = (i + 1).min(self.x_axis.len() - 1);
        let dy = self.y_axis[j + 1] - self.y_axis[j];
        let lo = (self.z[i][j + 1] - self.z[i][j]) / dy;
        let hi = (self.z[i1][j + 1] - self.z[i1][j]) / dy;
        lo * (1.0 - wx) + hi * wx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Table1d {
        Table1d::new(vec![0.0, 1.0, 2.0], vec![1.0, 2.0, 4.0]).unwrap()
    }

    #[test]
    fn curve_interpolates_and_clamps() {
        let t = ramp();
        assert_eq!(t.eval(0.5, false), 1.5);
        assert_eq!(t.eval(-1.0, false), 1.0);
        assert_eq!(t.eval(5.0, false), 4.0);
    }

    #[test]
    fn curve_extrapolates_terminal_slope() {
        let t = ramp();
        assert_eq!(t.eval(3.0, true), 6.0);
        assert_eq!(t.eval(-1.0, true), 0.0);
    }

    #[test]
    fn curve_derivative_is_segment_slope() {
        let t = ramp();
        let x = Ad::variable(1.5, 0, 1);
        let y = t.eval_ad(&x, false);
        assert_eq!(y.value(), 3.0);
        assert_eq!(y.deriv(0), 2.0);
    }

    #[test]
    fn rejects_non_monotone_axis() {
        assert!(Table1d::new(vec![0.0, 0.0, 1.0], vec![1.0, 2.0, 3.0]).is_err());
    }

    fn plane() -> Table2d {
        // z = 10 x + y
        Table2d::new(
            vec![0.0, 1.0],
            vec![0.0, 1.0, 2.0],
            vec![vec![0.0, 1.0, 2.0], vec![10.0, 11.0, 12.0]],
        )
        .unwrap()
    }

    #[test]
    fn surface_is_bilinear() {
        let t = plane();
        assert!((t.eval(0.5, 1.5) - 6.5).abs() < 1e-12);
    }

    #[test]
    fn surface_derivative_follows_y() {
        let t = plane();
        let y = Ad::variable(0.5, 0, 2);
        let z = t.eval_ad(0.5, &y);
        assert!((z.value() - 5.5).abs() < 1e-12);
        assert!((z.deriv(0) - 1.0).abs() < 1e-12);
        assert_eq!(z.deriv(1), 0.0);
    }

    #[test]
    fn surface_clamps_with_flat_derivative() {
        let t = plane();
        let y = Ad::variable(5.0, 0, 1);
        let z = t.eval_ad(1.0, &y);
        assert_eq!(z.value(), 12.0);
        assert_eq!(z.deriv(0), 0.0);
    }
}
