use thiserror::Error;

pub type WfResult<T> = Result<T, WfError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WfError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    /// Owned payload so downstream errors convert with their context
    /// intact.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Invariant violated: {what}")]
    Invariant { what: String },

    #[error("Iteration did not converge: {what} ({iterations} iterations)")]
    NoConvergence { what: &'static str, iterations: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_payloads_carry_context() {
        let err = WfError::Invariant {
            what: format!("well {} misbehaved", "X-9"),
        };
        assert!(err.to_string().contains("X-9"));
        assert_eq!(err.clone(), err);
    }
}
