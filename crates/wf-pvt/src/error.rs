//! Fluid-side error types.

use thiserror::Error;
use wf_core::WfError;

/// Result type for PVT and table operations.
pub type PvtResult<T> = Result<T, PvtError>;

/// Errors from phase bookkeeping, table lookups and mixture math.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PvtError {
    /// Non-physical values (negative mobility, vanishing volume ratio, etc.).
    #[error("Non-physical value for {what}")]
    NonPhysical { what: &'static str },

    /// Invalid argument.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// A phase the operation needs is not in the active set.
    #[error("Phase not active: {what}")]
    PhaseNotActive { what: &'static str },

    /// Numeric helper failure (root solves, non-finite checks).
    #[error("Numeric error: {0}")]
    Numeric(#[from] WfError),
}

impl From<PvtError> for WfError {
    fn from(e: PvtError) -> Self {
        match e {
            PvtError::NonPhysical { what } => WfError::Invariant {
                what: format!("Non-physical PVT value: {}", what),
            },
            PvtError::InvalidArg { what } => WfError::InvalidArg {
                what: format!("Invalid PVT argument: {}", what),
            },
            PvtError::PhaseNotActive { what } => WfError::InvalidArg {
                what: format!("Phase not active: {}", what),
            },
            PvtError::Numeric(e) => e,
        }
    }
}
