//! wf-comm: collective reductions for wells whose completions are spread
//! over several owning processes.
//!
//! Every well-wide quantity (reduced equation blocks, rate sums, operability
//! votes) goes through the [`WellComm`] trait so the same assembly code runs
//! unchanged on a single process and inside a process group. Collectives
//! follow the usual group contract: every member calls the same collectives
//! in the same order.

pub mod group;
pub mod serial;

use wf_core::Real;

pub use group::{GroupComm, LocalGroup};
pub use serial::SerialComm;

/// Collective operations over the processes sharing one well.
///
/// Completions are distributed as contiguous, depth-ordered segments in
/// rank order; `above_values` relies on that ordering.
pub trait WellComm: Send + Sync {
    /// Rank of the calling process within the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Element-wise sum across the group, written back in place.
    ///
    /// All members must pass slices of the same length.
    fn sum_in_place(&self, values: &mut [Real]);

    /// Scalar minimum across the group.
    fn min(&self, value: Real) -> Real;

    /// Scalar maximum across the group.
    fn max(&self, value: Real) -> Real;

    /// For each locally owned completion, the value at the completion
    /// directly above it. The topmost completion of the well sees `first`.
    fn above_values(&self, first: Real, local: &[Real]) -> Vec<Real>;

    /// Element-wise sum of `totals` over the lower-ranked (shallower)
    /// segment owners. Feeds cumulative sums that run down the wellbore.
    fn sum_shallower(&self, totals: &[Real]) -> Vec<Real>;

    /// Element-wise sum of `totals` over the higher-ranked (deeper) segment
    /// owners. Feeds cumulative sums that run up the wellbore.
    fn sum_deeper(&self, totals: &[Real]) -> Vec<Real>;

    /// Scalar sum across the group.
    fn sum(&self, value: Real) -> Real {
        let mut buf = [value];
        self.sum_in_place(&mut buf);
        buf[0]
    }

    /// Group-wide logical AND, encoded as a min over {0, 1}.
    fn all(&self, value: bool) -> bool {
        self.min(if value { 1.0 } else { 0.0 }) > 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_min_over_group() {
        let comm = SerialComm;
        assert!(comm.all(true));
        assert!(!comm.all(false));
    }

    #[test]
    fn scalar_sum_uses_vector_path() {
        let comm = SerialComm;
        assert_eq!(comm.sum(4.25), 4.25);
    }
}
