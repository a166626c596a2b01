//! PVT evaluation seam.
//!
//! The simulator owns the real PVT machinery; the well model only needs a
//! handful of point evaluations when it rebuilds connection properties at
//! the start of a timestep. [`LinearPvt`] is a small analytic model for
//! tests and demos.

use crate::error::{PvtError, PvtResult};
use crate::phase::Phase;
use wf_core::Real;

/// Point PVT queries, keyed by the connected cell (region and temperature
/// dependence live behind the implementation).
pub trait PvtEvaluator: Send + Sync {
    /// Reciprocal water formation volume factor at `pressure`.
    fn inv_b_water(&self, cell: usize, pressure: Real) -> PvtResult<Real>;

    /// Reciprocal oil formation volume factor; `saturated` selects the
    /// saturated curve and ignores `rs`.
    fn inv_b_oil(&self, cell: usize, pressure: Real, rs: Real, saturated: bool) -> PvtResult<Real>;

    /// Reciprocal gas formation volume factor; `saturated` selects the
    /// saturated curve and ignores `rv`.
    fn inv_b_gas(&self, cell: usize, pressure: Real, rv: Real, saturated: bool) -> PvtResult<Real>;

    /// Saturated dissolved gas-oil ratio at `pressure`.
    fn rs_saturated(&self, cell: usize, pressure: Real) -> PvtResult<Real>;

    /// Saturated vaporized oil-gas ratio at `pressure`.
    fn rv_saturated(&self, cell: usize, pressure: Real) -> PvtResult<Real>;

    /// Component surface density [kg/m³].
    fn surface_density(&self, cell: usize, phase: Phase) -> PvtResult<Real>;
}

/// Compressibility-linear PVT: `b(p) = b_ref * (1 + c * (p - p_ref))`,
/// saturated ratios linear in pressure. Same curves in every cell.
#[derive(Clone, Debug)]
pub struct LinearPvt {
    pub p_ref: Real,
    /// Reference reciprocal formation volume factor per phase
    /// (water, oil, gas order).
    pub inv_b_ref: [Real; 3],
    /// Compressibility [1/Pa] per phase.
    pub compressibility: [Real; 3],
    /// d(rs_sat)/dp [sm³/sm³/Pa].
    pub rs_sat_slope: Real,
    /// d(rv_sat)/dp [sm³/sm³/Pa].
    pub rv_sat_slope: Real,
    /// Surface density per phase [kg/m³].
    pub surface_density: [Real; 3],
}

impl LinearPvt {
    /// Mild three-phase curves around 200 bar.
    pub fn standard() -> Self {
        Self {
            p_ref: 200e5,
            inv_b_ref: [1.0, 0.95, 110.0],
            compressibility: [4e-10, 1e-9, 3e-8],
            rs_sat_slope: 4e-6,
            rv_sat_slope: 1e-9,
            surface_density: [1000.0, 860.0, 0.97],
        }
    }

    fn phase_slot(phase: Phase) -> usize {
        match phase {
            Phase::Water => 0,
            Phase::Oil => 1,
            Phase::Gas => 2,
        }
    }

    fn inv_b(&self, phase: Phase, pressure: Real) -> PvtResult<Real> {
        let slot = Self::phase_slot(phase);
        let b = self.inv_b_ref[slot] * (1.0 + self.compressibility[slot] * (pressure - self.p_ref));
        if !(b.is_finite() && b > 0.0) {
            return Err(PvtError::NonPhysical {
                what: "reciprocal formation volume factor",
            });
        }
        Ok(b)
    }
}

impl PvtEvaluator for LinearPvt {
    fn inv_b_water(&self, _cell: usize, pressure: Real) -> PvtResult<Real> {
        self.inv_b(Phase::Water, pressure)
    }

    fn inv_b_oil(
        &self,
        _cell: usize,
        pressure: Real,
        _rs: Real,
        _saturated: bool,
    ) -> PvtResult<Real> {
        self.inv_b(Phase::Oil, pressure)
    }

    fn inv_b_gas(
        &self,
        _cell: usize,
        pressure: Real,
        _rv: Real,
        _saturated: bool,
    ) -> PvtResult<Real> {
        self.inv_b(Phase::Gas, pressure)
    }

    fn rs_saturated(&self, _cell: usize, pressure: Real) -> PvtResult<Real> {
        Ok((self.rs_sat_slope * pressure).max(0.0))
    }

    fn rv_saturated(&self, _cell: usize, pressure: Real) -> PvtResult<Real> {
        Ok((self.rv_sat_slope * pressure).max(0.0))
    }

    fn surface_density(&self, _cell: usize, phase: Phase) -> PvtResult<Real> {
        Ok(self.surface_density[Self::phase_slot(phase)])
    }
}
