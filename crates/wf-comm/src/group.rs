//! In-memory process group.
//!
//! [`LocalGroup::create`] hands out one [`GroupComm`] per simulated rank;
//! the handles are moved onto separate threads and exchange data through a
//! generation-counted all-gather. This is the reference implementation for
//! distributed-completion behavior and the backbone of the split-well
//! tests; an MPI-backed communicator would implement [`WellComm`] the same
//! way.

use crate::WellComm;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use wf_core::Real;

struct RoundState {
    /// Count of published rounds.
    generation: u64,
    slots: Vec<Option<Vec<Real>>>,
    deposited: usize,
    result: Option<Arc<Vec<Vec<Real>>>>,
    taken: usize,
}

struct Shared {
    state: Mutex<RoundState>,
    published: Condvar,
}

/// Factory for a fixed-size group of [`GroupComm`] handles.
pub struct LocalGroup;

impl LocalGroup {
    /// Create communicator handles for `size` ranks sharing one well.
    pub fn create(size: usize) -> Vec<GroupComm> {
        let shared = Arc::new(Shared {
            state: Mutex::new(RoundState {
                generation: 0,
                slots: vec![None; size],
                deposited: 0,
                result: None,
                taken: 0,
            }),
            published: Condvar::new(),
        });
        (0..size)
            .map(|rank| GroupComm {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

/// One rank's handle into a [`LocalGroup`].
pub struct GroupComm {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl GroupComm {
    fn locked(&self) -> MutexGuard<'_, RoundState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Deposit this rank's contribution and return all contributions in
    /// rank order once every member has deposited.
    fn all_gather(&self, data: Vec<Real>) -> Arc<Vec<Vec<Real>>> {
        let mut st = self.locked();
        let target = st.generation + 1;
        debug_assert!(
            st.slots[self.rank].is_none(),
            "collective re-entered before the previous round completed"
        );
        st.slots[self.rank] = Some(data);
        st.deposited += 1;
        if st.deposited == self.size {
            let gathered: Vec<Vec<Real>> = st.slots.iter_mut().filter_map(Option::take).collect();
            st.deposited = 0;
            st.taken = 0;
            st.result = Some(Arc::new(gathered));
            st.generation = target;
            self.shared.published.notify_all();
        }
        while st.generation < target {
            st = self
                .shared
                .published
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let result = match &st.result {
            Some(arc) => Arc::clone(arc),
            // Unreachable under the call-order contract: the result for a
            // round stays published until all members have taken it.
            None => Arc::new(Vec::new()),
        };
        st.taken += 1;
        if st.taken == self.size {
            st.result = None;
        }
        result
    }

    fn reduce_scalar(&self, value: Real, combine: impl Fn(Real, Real) -> Real) -> Real {
        let gathered = self.all_gather(vec![value]);
        let mut acc = value;
        for (rank, contribution) in gathered.iter().enumerate() {
            if rank != self.rank {
                acc = combine(acc, contribution[0]);
            }
        }
        acc
    }
}

impl WellComm for GroupComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn sum_in_place(&self, values: &mut [Real]) {
        let gathered = self.all_gather(values.to_vec());
        for (rank, contribution) in gathered.iter().enumerate() {
            if rank == self.rank {
                continue;
            }
            debug_assert_eq!(contribution.len(), values.len());
            for (v, c) in values.iter_mut().zip(contribution) {
                *v += c;
            }
        }
    }

    fn min(&self, value: Real) -> Real {
        self.reduce_scalar(value, Real::min)
    }

    fn max(&self, value: Real) -> Real {
        self.reduce_scalar(value, Real::max)
    }

    fn above_values(&self, first: Real, local: &[Real]) -> Vec<Real> {
        // Exchange segment boundary values: each rank publishes the value at
        // its deepest completion (empty segments publish nothing).
        let boundary = match local.last() {
            Some(last) => vec![*last],
            None => Vec::new(),
        };
        let gathered = self.all_gather(boundary);

        // The completion above this rank's first one is the deepest value of
        // the nearest lower rank owning any completions.
        let mut incoming = first;
        for contribution in gathered.iter().take(self.rank) {
            if let Some(last) = contribution.last() {
                incoming = *last;
            }
        }

        let mut above = Vec::with_capacity(local.len());
        if local.is_empty() {
            return above;
        }
        above.push(incoming);
        above.extend_from_slice(&local[..local.len() - 1]);
        above
    }

    fn sum_shallower(&self, totals: &[Real]) -> Vec<Real> {
        let gathered = self.all_gather(totals.to_vec());
        let mut acc = vec![0.0; totals.len()];
        for contribution in gathered.iter().take(self.rank) {
            for (a, c) in acc.iter_mut().zip(contribution) {
                *a += c;
            }
        }
        acc
    }

    fn sum_deeper(&self, totals: &[Real]) -> Vec<Real> {
        let gathered = self.all_gather(totals.to_vec());
        let mut acc = vec![0.0; totals.len()];
        for contribution in gathered.iter().skip(self.rank + 1) {
            for (a, c) in acc.iter_mut().zip(contribution) {
                *a += c;
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn run_two_ranks<F, T>(f: F) -> (T, T)
    where
        F: Fn(GroupComm) -> T + Send + Sync + Copy + 'static,
        T: Send + 'static,
    {
        let mut comms = LocalGroup::create(2);
        let c1 = comms.pop().unwrap();
        let c0 = comms.pop().unwrap();
        let h0 = thread::spawn(move || f(c0));
        let h1 = thread::spawn(move || f(c1));
        (h0.join().unwrap(), h1.join().unwrap())
    }

    #[test]
    fn sum_in_place_adds_both_ranks() {
        let (r0, r1) = run_two_ranks(|comm| {
            let mut v = if comm.rank() == 0 {
                vec![1.0, 10.0]
            } else {
                vec![2.0, 20.0]
            };
            comm.sum_in_place(&mut v);
            v
        });
        assert_eq!(r0, vec![3.0, 30.0]);
        assert_eq!(r1, vec![3.0, 30.0]);
    }

    #[test]
    fn min_max_across_ranks() {
        let (r0, r1) = run_two_ranks(|comm| {
            let local = if comm.rank() == 0 { -4.0 } else { 9.0 };
            (comm.min(local), comm.max(local))
        });
        assert_eq!(r0, (-4.0, 9.0));
        assert_eq!(r1, (-4.0, 9.0));
    }

    #[test]
    fn above_values_crosses_segment_boundary() {
        // Rank 0 owns completions [a, b], rank 1 owns [c, d].
        let (r0, r1) = run_two_ranks(|comm| {
            let local = if comm.rank() == 0 {
                vec![1.0, 2.0]
            } else {
                vec![3.0, 4.0]
            };
            comm.above_values(100.0, &local)
        });
        assert_eq!(r0, vec![100.0, 1.0]);
        assert_eq!(r1, vec![2.0, 3.0]);
    }

    #[test]
    fn above_values_skips_empty_segments() {
        let (r0, r1) = run_two_ranks(|comm| {
            let local = if comm.rank() == 0 {
                vec![]
            } else {
                vec![5.0, 6.0]
            };
            comm.above_values(77.0, &local)
        });
        assert!(r0.is_empty());
        assert_eq!(r1, vec![77.0, 5.0]);
    }

    #[test]
    fn directional_sums_split_by_rank() {
        let (r0, r1) = run_two_ranks(|comm| {
            let totals = if comm.rank() == 0 {
                vec![1.0, 10.0]
            } else {
                vec![2.0, 20.0]
            };
            (comm.sum_shallower(&totals), comm.sum_deeper(&totals))
        });
        assert_eq!(r0.0, vec![0.0, 0.0]);
        assert_eq!(r0.1, vec![2.0, 20.0]);
        assert_eq!(r1.0, vec![1.0, 10.0]);
        assert_eq!(r1.1, vec![0.0, 0.0]);
    }

    #[test]
    fn consecutive_rounds_stay_ordered() {
        let (r0, r1) = run_two_ranks(|comm| {
            let mut out = Vec::new();
            for round in 0..50 {
                out.push(comm.sum(round as Real + comm.rank() as Real));
            }
            out
        });
        for (round, (a, b)) in r0.iter().zip(&r1).enumerate() {
            let expect = 2.0 * round as Real + 1.0;
            assert_eq!(*a, expect);
            assert_eq!(*b, expect);
        }
    }
}
