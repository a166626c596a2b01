//! Error types for the well model.

use thiserror::Error;
use wf_core::WfError;
use wf_pvt::PvtError;

/// Errors raised while assembling or updating a well.
#[derive(Error, Debug)]
pub enum WellError {
    /// Fatal numerical condition for the current Newton iteration
    /// (singular well block, degenerate rs/rv partition). The outer loop
    /// must retry with a smaller timestep or shut the well in.
    #[error("Numerical issue: {what}")]
    NumericalIssue { what: String },

    /// Configuration rejected at the point of use.
    #[error("Invalid well configuration: {what}")]
    InvalidConfig { what: String },

    /// A sub-model needs a table that was not supplied.
    #[error("Missing {table} table for well {well}")]
    MissingTable { table: &'static str, well: String },

    /// Request outside the supported feature set.
    #[error("Unsupported: {what}")]
    Unsupported { what: &'static str },

    #[error("Fluid error: {0}")]
    Pvt(#[from] PvtError),

    #[error("Numeric error: {0}")]
    Numeric(#[from] WfError),
}

pub type WellResult<T> = Result<T, WellError>;

impl From<WellError> for WfError {
    fn from(e: WellError) -> Self {
        match e {
            WellError::NumericalIssue { what } => WfError::Invariant { what },
            WellError::InvalidConfig { what } => WfError::InvalidArg { what },
            WellError::MissingTable { table, well } => WfError::InvalidArg {
                what: format!("Missing {} table for well {}", table, well),
            },
            WellError::Unsupported { what } => WfError::InvalidArg {
                what: what.to_string(),
            },
            WellError::Pvt(e) => e.into(),
            WellError::Numeric(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = WellError::NumericalIssue {
            what: "failed to invert local equations for well P-1".to_string(),
        };
        assert!(err.to_string().contains("P-1"));
    }

    #[test]
    fn conversion_keeps_context() {
        let err = WellError::MissingTable {
            table: "VFP",
            well: "P-1".to_string(),
        };
        let wf: WfError = err.into();
        assert!(matches!(wf, WfError::InvalidArg { .. }));
        assert!(wf.to_string().contains("VFP"));
        assert!(wf.to_string().contains("P-1"));
    }

    #[test]
    fn pvt_errors_convert() {
        let err: WellError = PvtError::NonPhysical { what: "volume ratio" }.into();
        assert!(matches!(err, WellError::Pvt(_)));
    }
}
