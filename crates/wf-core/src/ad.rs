//! Forward-mode automatic differentiation on dual numbers.
//!
//! `Ad` carries a value plus a vector of partial derivatives, one slot per
//! unknown of the enclosing local system. Arithmetic applies the chain rule
//! slot-wise. Two length conventions keep the kernels reusable:
//!
//! - an empty derivative vector means "constant everywhere"; a kernel fed
//!   only constants therefore runs as a plain scalar evaluation
//! - combining operands of different lengths zero-pads the shorter one,
//!   which is the embedding of cell-local derivative slots into the larger
//!   cell+well slot space

use crate::numeric::Real;
use core::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Dual number: value plus partial derivatives.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ad {
    val: Real,
    der: Vec<Real>,
}

impl Ad {
    /// A constant: zero derivative with respect to every unknown.
    pub fn constant(val: Real) -> Self {
        Self {
            val,
            der: Vec::new(),
        }
    }

    /// The unknown occupying `slot` out of `len` derivative slots.
    pub fn variable(val: Real, slot: usize, len: usize) -> Self {
        debug_assert!(slot < len, "derivative slot out of range");
        let mut der = vec![0.0; len];
        der[slot] = 1.0;
        Self { val, der }
    }

    /// Assemble from an explicit derivative vector.
    pub fn with_derivatives(val: Real, der: Vec<Real>) -> Self {
        Self { val, der }
    }

    #[inline]
    pub fn value(&self) -> Real {
        self.val
    }

    /// Partial derivative for `slot`; zero beyond the stored length.
    #[inline]
    pub fn deriv(&self, slot: usize) -> Real {
        self.der.get(slot).copied().unwrap_or(0.0)
    }

    /// Number of stored derivative slots (0 for constants).
    #[inline]
    pub fn n_derivs(&self) -> usize {
        self.der.len()
    }

    /// Grow the derivative vector to `len` slots, zero-filling the tail.
    ///
    /// Existing slots keep their position; `len` below the current length
    /// leaves the number unchanged.
    pub fn extended(&self, len: usize) -> Self {
        let mut der = self.der.clone();
        if der.len() < len {
            der.resize(len, 0.0);
        }
        Self { val: self.val, der }
    }

    /// Keep the leading `len` derivative slots, dropping the tail.
    pub fn restricted(&self, len: usize) -> Self {
        let mut der = self.der.clone();
        der.truncate(len);
        Self { val: self.val, der }
    }

    /// True when every derivative slot is zero or absent.
    pub fn is_constant(&self) -> bool {
        self.der.iter().all(|d| *d == 0.0)
    }

    /// Absolute value. Not differentiable at zero; the negative branch is
    /// used there, matching the subgradient convention of the flow kernels.
    pub fn abs(&self) -> Self {
        if self.val < 0.0 { -self } else { self.clone() }
    }

    fn merged_len(&self, other: &Ad) -> usize {
        self.der.len().max(other.der.len())
    }
}

fn binary(a: &Ad, b: &Ad, val: Real, df: impl Fn(Real, Real) -> Real) -> Ad {
    let len = a.merged_len(b);
    let mut der = Vec::with_capacity(len);
    for i in 0..len {
        der.push(df(a.deriv(i), b.deriv(i)));
    }
    Ad { val, der }
}

impl Add<&Ad> for &Ad {
    type Output = Ad;
    fn add(self, rhs: &Ad) -> Ad {
        binary(self, rhs, self.val + rhs.val, |da, db| da + db)
    }
}

impl Sub<&Ad> for &Ad {
    type Output = Ad;
    fn sub(self, rhs: &Ad) -> Ad {
        binary(self, rhs, self.val - rhs.val, |da, db| da - db)
    }
}

impl Mul<&Ad> for &Ad {
    type Output = Ad;
    fn mul(self, rhs: &Ad) -> Ad {
        // Product rule: (ab)' = a'b + ab'
        binary(self, rhs, self.val * rhs.val, |da, db| {
            da * rhs.val + self.val * db
        })
    }
}

impl Div<&Ad> for &Ad {
    type Output = Ad;
    fn div(self, rhs: &Ad) -> Ad {
        // Quotient rule via the result value: (a/b)' = (a' - (a/b) b') / b.
        // f64 semantics on a zero denominator; callers guard singular cases.
        let val = self.val / rhs.val;
        binary(self, rhs, val, |da, db| (da - val * db) / rhs.val)
    }
}

// Owned/borrowed combinations delegate to the reference impls.
macro_rules! forward_binop {
    ($trait:ident, $method:ident) => {
        impl $trait<Ad> for Ad {
            type Output = Ad;
            fn $method(self, rhs: Ad) -> Ad {
                (&self).$method(&rhs)
            }
        }
        impl $trait<&Ad> for Ad {
            type Output = Ad;
            fn $method(self, rhs: &Ad) -> Ad {
                (&self).$method(rhs)
            }
        }
        impl $trait<Ad> for &Ad {
            type Output = Ad;
            fn $method(self, rhs: Ad) -> Ad {
                self.$method(&rhs)
            }
        }
    };
}

forward_binop!(Add, add);
forward_binop!(Sub, sub);
forward_binop!(Mul, mul);
forward_binop!(Div, div);

// Scalar operands act as constants.
macro_rules! scalar_binop {
    ($trait:ident, $method:ident) => {
        impl $trait<Real> for &Ad {
            type Output = Ad;
            fn $method(self, rhs: Real) -> Ad {
                self.$method(&Ad::constant(rhs))
            }
        }
        impl $trait<Real> for Ad {
            type Output = Ad;
            fn $method(self, rhs: Real) -> Ad {
                (&self).$method(&Ad::constant(rhs))
            }
        }
        impl $trait<&Ad> for Real {
            type Output = Ad;
            fn $method(self, rhs: &Ad) -> Ad {
                (&Ad::constant(self)).$method(rhs)
            }
        }
        impl $trait<Ad> for Real {
            type Output = Ad;
            fn $method(self, rhs: Ad) -> Ad {
                (&Ad::constant(self)).$method(&rhs)
            }
        }
    };
}

scalar_binop!(Add, add);
scalar_binop!(Sub, sub);
scalar_binop!(Mul, mul);
scalar_binop!(Div, div);

impl Neg for &Ad {
    type Output = Ad;
    fn neg(self) -> Ad {
        Ad {
            val: -self.val,
            der: self.der.iter().map(|d| -d).collect(),
        }
    }
}

impl Neg for Ad {
    type Output = Ad;
    fn neg(self) -> Ad {
        -&self
    }
}

impl AddAssign<&Ad> for Ad {
    fn add_assign(&mut self, rhs: &Ad) {
        *self = &*self + rhs;
    }
}

impl AddAssign<Ad> for Ad {
    fn add_assign(&mut self, rhs: Ad) {
        *self += &rhs;
    }
}

impl SubAssign<&Ad> for Ad {
    fn sub_assign(&mut self, rhs: &Ad) {
        *self = &*self - rhs;
    }
}

impl SubAssign<Ad> for Ad {
    fn sub_assign(&mut self, rhs: Ad) {
        *self -= &rhs;
    }
}

impl MulAssign<Real> for Ad {
    fn mul_assign(&mut self, rhs: Real) {
        self.val *= rhs;
        for d in &mut self.der {
            *d *= rhs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_seeds_unit_derivative() {
        let x = Ad::variable(3.0, 1, 4);
        assert_eq!(x.value(), 3.0);
        assert_eq!(x.deriv(0), 0.0);
        assert_eq!(x.deriv(1), 1.0);
        assert_eq!(x.n_derivs(), 4);
    }

    #[test]
    fn polynomial_derivative() {
        // f(x) = x^2 + 3x, f'(2) = 7
        let x = Ad::variable(2.0, 0, 1);
        let f = &x * &x + &x * 3.0;
        assert_eq!(f.value(), 10.0);
        assert_eq!(f.deriv(0), 7.0);
    }

    #[test]
    fn quotient_rule() {
        // f(x) = 1 / x, f'(4) = -1/16
        let x = Ad::variable(4.0, 0, 1);
        let f = 1.0 / &x;
        assert_eq!(f.value(), 0.25);
        assert!((f.deriv(0) + 1.0 / 16.0).abs() < 1e-14);
    }

    #[test]
    fn constants_make_evaluation_scalar() {
        let a = Ad::constant(2.0);
        let b = Ad::constant(5.0);
        let f = &a * &b - &a / &b;
        assert_eq!(f.value(), 10.0 - 0.4);
        assert_eq!(f.n_derivs(), 0);
    }

    #[test]
    fn scalar_mode_matches_value_channel() {
        let eval = |x: &Ad, y: &Ad| x * y + x / (y - 1.0);
        let seeded = eval(&Ad::variable(3.0, 0, 2), &Ad::variable(5.0, 1, 2));
        let scalar = eval(&Ad::constant(3.0), &Ad::constant(5.0));
        assert_eq!(seeded.value(), scalar.value());
    }

    #[test]
    fn mixed_lengths_zero_pad() {
        // A 2-slot cell quantity combined with a 5-slot well quantity keeps
        // its derivatives in the low slots.
        let cell = Ad::variable(2.0, 1, 2);
        let well = Ad::variable(10.0, 4, 5);
        let f = &cell * &well;
        assert_eq!(f.n_derivs(), 5);
        assert_eq!(f.deriv(1), 10.0);
        assert_eq!(f.deriv(4), 2.0);
        assert_eq!(f.deriv(2), 0.0);
    }

    #[test]
    fn extended_pads_with_zeros() {
        let x = Ad::variable(1.5, 0, 2).extended(6);
        assert_eq!(x.n_derivs(), 6);
        assert_eq!(x.deriv(0), 1.0);
        assert_eq!(x.deriv(5), 0.0);
        assert_eq!(x.value(), 1.5);
    }

    #[test]
    fn restricted_drops_the_tail() {
        let x = Ad::variable(1.5, 4, 6).restricted(3);
        assert_eq!(x.n_derivs(), 3);
        assert_eq!(x.deriv(4), 0.0);
        assert_eq!(x.value(), 1.5);
    }

    #[test]
    fn abs_flips_the_negative_branch() {
        let x = Ad::variable(-2.0, 0, 1);
        let y = x.abs();
        assert_eq!(y.value(), 2.0);
        assert_eq!(y.deriv(0), -1.0);
        assert_eq!(Ad::variable(2.0, 0, 1).abs().deriv(0), 1.0);
    }

    #[test]
    fn neg_and_assign_ops() {
        let mut acc = Ad::constant(0.0);
        acc += Ad::variable(2.0, 0, 2);
        acc -= Ad::variable(0.5, 1, 2);
        let neg = -&acc;
        assert_eq!(neg.value(), -1.5);
        assert_eq!(neg.deriv(0), -1.0);
        assert_eq!(neg.deriv(1), 1.0);
    }
}
