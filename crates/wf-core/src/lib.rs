//! wf-core: stable foundation for wellflow.
//!
//! Contains:
//! - units (uom SI types + constructors)
//! - numeric (Real + tolerances + float helpers)
//! - ids (stable compact IDs for wells and grid cells)
//! - ad (forward-mode dual numbers with a fixed-length derivative vector)
//! - roots (bracketed scalar root finding)
//! - error (shared error types)

pub mod ad;
pub mod error;
pub mod ids;
pub mod numeric;
pub mod roots;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use ad::Ad;
pub use error::{WfError, WfResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;
