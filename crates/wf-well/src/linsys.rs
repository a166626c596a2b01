//! Local well linear system and its Schur-complement elimination.
//!
//! One Newton iteration produces, per well, the block system
//!
//! ```text
//! | A  C | | dx_cell |   | res_cell |
//! | B  D | | dx_well | = | res_well |
//! ```
//!
//! where `A` and `res_cell` belong to the driver. This module owns the well
//! rows: the dense well block `D`, the per-perforation coupling blocks `B`
//! (well equation by cell unknown) and `C` (cell equation by well unknown),
//! and the well residual. Eliminating `dx_well` hands the driver the
//! corrections `-C D^-1 B` and `-C D^-1 res_well`; once the driver has
//! solved for `dx_cell`, back-substitution recovers
//! `dx_well = D^-1 (res_well - B dx_cell)` under the `x -= dx` update
//! convention.
//!
//! The well block and residual collect contributions from every completion
//! of the well; when those are spread over a process group, [`reduce`]
//! sums them group-wide in one collective. Elimination and back-substitution
//! read the reduced blocks, so they must run after that call.
//!
//! [`reduce`]: LocalLinearSystem::reduce

use crate::error::{WellError, WellResult};
use nalgebra::{DMatrix, DVector, LU};
use wf_comm::WellComm;
use wf_core::{Ad, CellId, Real};

/// One dense correction block for the driver's cell-to-cell matrix.
pub struct SchurBlock {
    /// Cell owning the corrected equation row.
    pub row_cell: CellId,
    /// Cell owning the corrected unknown column.
    pub col_cell: CellId,
    /// Correction to add onto the `(row_cell, col_cell)` block.
    pub block: DMatrix<Real>,
}

/// Well rows of the coupled Newton system for one well.
pub struct LocalLinearSystem {
    n_well_eq: usize,
    n_res_eq: usize,
    /// Connected cell per locally owned perforation.
    cells: Vec<CellId>,
    res: DVector<Real>,
    d: DMatrix<Real>,
    b: Vec<DMatrix<Real>>,
    c: Vec<DMatrix<Real>>,
    lu: Option<LU<Real, nalgebra::Dyn, nalgebra::Dyn>>,
}

impl LocalLinearSystem {
    pub fn new(n_well_eq: usize, n_res_eq: usize, cells: Vec<CellId>) -> Self {
        let n_perf = cells.len();
        Self {
            n_well_eq,
            n_res_eq,
            cells,
            res: DVector::zeros(n_well_eq),
            d: DMatrix::zeros(n_well_eq, n_well_eq),
            b: vec![DMatrix::zeros(n_well_eq, n_res_eq); n_perf],
            c: vec![DMatrix::zeros(n_res_eq, n_well_eq); n_perf],
            lu: None,
        }
    }

    pub fn n_well_eq(&self) -> usize {
        self.n_well_eq
    }

    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    pub fn residual(&self) -> &DVector<Real> {
        &self.res
    }

    /// Zero every block and drop the factorization.
    pub fn clear(&mut self) {
        self.res.fill(0.0);
        self.d.fill(0.0);
        for b in &mut self.b {
            b.fill(0.0);
        }
        for c in &mut self.c {
            c.fill(0.0);
        }
        self.lu = None;
    }

    /// Add a flux term into well equation `eq`. Derivative slots below
    /// `n_res_eq` are the perforated cell's unknowns and land in `B`; the
    /// slots above are the well unknowns and land in `D`.
    pub fn add_flux(&mut self, perf: usize, eq: usize, value: &Ad) {
        self.res[eq] += value.value();
        for pv in 0..self.n_well_eq {
            self.d[(eq, pv)] += value.deriv(self.n_res_eq + pv);
        }
        for pv in 0..self.n_res_eq {
            self.b[perf][(eq, pv)] += value.deriv(pv);
        }
    }

    /// Add a term that depends on well unknowns only (accumulation, control
    /// equation). No `B` coupling is written.
    pub fn add_well_term(&mut self, eq: usize, value: &Ad) {
        self.res[eq] += value.value();
        for pv in 0..self.n_well_eq {
            self.d[(eq, pv)] += value.deriv(self.n_res_eq + pv);
        }
    }

    /// Couple cell equation `cell_eq` of the perforated cell to the well
    /// unknowns: the well-slot derivatives of the cell's source term.
    pub fn add_cell_coupling(&mut self, perf: usize, cell_eq: usize, value: &Ad) {
        for pv in 0..self.n_well_eq {
            self.c[perf][(cell_eq, pv)] += value.deriv(self.n_res_eq + pv);
        }
    }

    /// Sum the well block and residual over the process group.
    ///
    /// `B` and `C` stay local: every completion is owned by exactly one
    /// rank, and its coupling blocks are consumed on that rank only. One
    /// flattened buffer keeps this a single collective.
    pub fn reduce(&mut self, comm: &dyn WellComm) {
        if comm.size() == 1 {
            return;
        }
        let n = self.n_well_eq;
        let mut buf = Vec::with_capacity(n * n + n);
        for eq in 0..n {
            for pv in 0..n {
                buf.push(self.d[(eq, pv)]);
            }
        }
        buf.extend(self.res.iter());
        comm.sum_in_place(&mut buf);
        let mut it = buf.into_iter();
        for eq in 0..n {
            for pv in 0..n {
                self.d[(eq, pv)] = it.next().unwrap_or(0.0);
            }
        }
        for eq in 0..n {
            self.res[eq] = it.next().unwrap_or(0.0);
        }
    }

    /// Factorize the well block. A singular block aborts the iteration.
    pub fn factorize(&mut self, well_name: &str) -> WellResult<()> {
        let lu = self.d.clone().lu();
        if !lu.is_invertible() {
            self.lu = None;
            return Err(WellError::NumericalIssue {
                what: format!("singular well equation block for well {well_name}"),
            });
        }
        self.lu = Some(lu);
        Ok(())
    }

    fn factorized(&self) -> WellResult<&LU<Real, nalgebra::Dyn, nalgebra::Dyn>> {
        self.lu.as_ref().ok_or_else(|| WellError::NumericalIssue {
            what: "well equations used before factorization".to_string(),
        })
    }

    /// Corrections to add onto the driver's cell-to-cell matrix:
    /// `-C_i D^-1 B_j` for every pair of locally owned perforations.
    pub fn matrix_correction(&self) -> WellResult<Vec<SchurBlock>> {
        let lu = self.factorized()?;
        let mut blocks = Vec::with_capacity(self.cells.len() * self.cells.len());
        for (j, b) in self.b.iter().enumerate() {
            let dinv_b = lu.solve(b).ok_or_else(|| WellError::NumericalIssue {
                what: "well block back-solve failed".to_string(),
            })?;
            for (i, c) in self.c.iter().enumerate() {
                blocks.push(SchurBlock {
                    row_cell: self.cells[i],
                    col_cell: self.cells[j],
                    block: -(c * &dinv_b),
                });
            }
        }
        Ok(blocks)
    }

    /// Corrections to add onto the driver's cell residuals:
    /// `-C_i D^-1 res_well` per locally owned perforation.
    pub fn residual_correction(&self) -> WellResult<Vec<(CellId, DVector<Real>)>> {
        let lu = self.factorized()?;
        let dinv_r = lu
            .solve(&self.res)
            .ok_or_else(|| WellError::NumericalIssue {
                what: "well block back-solve failed".to_string(),
            })?;
        Ok(self
            .c
            .iter()
            .zip(&self.cells)
            .map(|(c, cell)| (*cell, -(c * &dinv_r)))
            .collect())
    }

    /// Back-substitute the driver's cell increment into the well rows:
    /// `dx_well = D^-1 (res_well - B dx_cell)`.
    pub fn recover_well_increment<F>(&self, cell_dx: F) -> WellResult<DVector<Real>>
    where
        F: Fn(CellId) -> DVector<Real>,
    {
        let lu = self.factorized()?;
        let mut rhs = self.res.clone();
        for (b, cell) in self.b.iter().zip(&self.cells) {
            rhs -= b * cell_dx(*cell);
        }
        lu.solve(&rhs).ok_or_else(|| WellError::NumericalIssue {
            what: "well block back-solve failed".to_string(),
        })
    }

    /// Solve `D dx = res_well` directly, ignoring the cell coupling. Used
    /// by the well-local Newton loop, where cell unknowns are frozen.
    pub fn solve_frozen(&self) -> WellResult<DVector<Real>> {
        self.recover_well_increment(|_| DVector::zeros(self.n_res_eq))
    }
}
