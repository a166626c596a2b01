//! wf-pvt: the fluid-facing seam of the well model.
//!
//! Contains:
//! - phase (active phase set and dense component indexing)
//! - cell (per-perforation reservoir-cell snapshot with derivative channels)
//! - density (blackoil mixture density from a surface-volume composition)
//! - eval (point PVT queries for connection-property rebuilds)
//! - vfp (lift-performance table and the two pressure solves against it)
//! - error (fluid-side error types)

pub mod cell;
pub mod density;
pub mod error;
pub mod eval;
pub mod phase;
pub mod vfp;

pub use cell::PerfCell;
pub use error::{PvtError, PvtResult};
pub use eval::{LinearPvt, PvtEvaluator};
pub use phase::{Phase, PhaseSet};
pub use vfp::VfpTable;
