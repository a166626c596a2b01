//! Single-process communicator: every reduction is an identity.

use crate::WellComm;
use wf_core::Real;

/// Communicator for a well owned entirely by the calling process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl WellComm for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum_in_place(&self, _values: &mut [Real]) {}

    fn min(&self, value: Real) -> Real {
        value
    }

    fn max(&self, value: Real) -> Real {
        value
    }

    fn above_values(&self, first: Real, local: &[Real]) -> Vec<Real> {
        let mut above = Vec::with_capacity(local.len());
        if local.is_empty() {
            return above;
        }
        above.push(first);
        above.extend_from_slice(&local[..local.len() - 1]);
        above
    }

    fn sum_shallower(&self, totals: &[Real]) -> Vec<Real> {
        vec![0.0; totals.len()]
    }

    fn sum_deeper(&self, totals: &[Real]) -> Vec<Real> {
        vec![0.0; totals.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions_are_identities() {
        let comm = SerialComm;
        let mut v = [1.0, 2.0, 3.0];
        comm.sum_in_place(&mut v);
        assert_eq!(v, [1.0, 2.0, 3.0]);
        assert_eq!(comm.min(-2.0), -2.0);
        assert_eq!(comm.max(7.5), 7.5);
    }

    #[test]
    fn above_values_shifts_down_by_one() {
        let comm = SerialComm;
        let above = comm.above_values(250e5, &[1.0, 2.0, 3.0]);
        assert_eq!(above, vec![250e5, 1.0, 2.0]);
    }

    #[test]
    fn above_values_empty_input() {
        let comm = SerialComm;
        assert!(comm.above_values(0.0, &[]).is_empty());
    }

    #[test]
    fn segment_totals_are_zero() {
        let comm = SerialComm;
        assert_eq!(comm.sum_shallower(&[1.0, 2.0]), vec![0.0, 0.0]);
        assert_eq!(comm.sum_deeper(&[1.0]), vec![0.0]);
    }
}
