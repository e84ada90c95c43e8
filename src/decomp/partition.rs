//! Block partitioning of the global index space across I/O ranks.

use serde::{Deserialize, Serialize};

use crate::error::ScatterError;

/// Which ranks of the group act as I/O ranks.
///
/// Rank `r` is an I/O rank when `r % io_stride == 0` and
/// `r / io_stride < num_io_tasks`. With `num_io_tasks = 4` and
/// `io_stride = 2`, the I/O ranks are 0, 2, 4 and 6.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IoPolicy {
    pub num_io_tasks: usize,
    pub io_stride: usize,
}

impl IoPolicy {
    pub const fn new(num_io_tasks: usize, io_stride: usize) -> Self {
        Self {
            num_io_tasks,
            io_stride,
        }
    }

    /// Reject policies that name no I/O ranks or more ranks than the group has.
    pub fn validate(&self, comm_size: usize) -> Result<(), ScatterError> {
        if self.num_io_tasks == 0
            || self.io_stride == 0
            || self
                .num_io_tasks
                .checked_mul(self.io_stride)
                .map_or(true, |span| span > comm_size)
        {
            return Err(ScatterError::InvalidPolicy {
                num_io_tasks: self.num_io_tasks,
                io_stride: self.io_stride,
                comm_size,
            });
        }
        Ok(())
    }

    /// The I/O-rank index of `rank`, if `rank` is an I/O rank under this policy.
    pub fn io_index(&self, rank: usize) -> Option<usize> {
        if self.io_stride == 0 || rank % self.io_stride != 0 {
            return None;
        }
        let idx = rank / self.io_stride;
        (idx < self.num_io_tasks).then_some(idx)
    }
}

/// Contiguous window of the global index space owned by `rank` when acting
/// as an I/O rank: `(io_start, io_count)`.
///
/// `n_global` elements are divided into `num_io_tasks` contiguous blocks.
/// The first `n_global % num_io_tasks` I/O ranks, in ascending I/O-rank
/// order, receive one extra element; `io_start` is the sum of the preceding
/// blocks. Ranks not chosen by the policy get `(0, 0)`.
pub fn io_elements(
    rank: usize,
    comm_size: usize,
    policy: IoPolicy,
    n_global: u64,
) -> Result<(u64, u64), ScatterError> {
    policy.validate(comm_size)?;

    let Some(idx) = policy.io_index(rank) else {
        return Ok((0, 0));
    };
    let idx = idx as u64;
    let ntasks = policy.num_io_tasks as u64;

    let base = n_global / ntasks;
    let remainder = n_global % ntasks;
    let count = if idx < remainder { base + 1 } else { base };
    let start = idx * base + idx.min(remainder);
    Ok((start, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn remainder_goes_to_lowest_io_ranks() {
        // Two I/O ranks splitting five elements: 3 on rank 0, 2 on rank 1.
        let p = IoPolicy::new(2, 1);
        assert_eq!(io_elements(0, 2, p, 5).unwrap(), (0, 3));
        assert_eq!(io_elements(1, 2, p, 5).unwrap(), (3, 2));
    }

    #[test]
    fn strided_ranks_and_bystanders() {
        let p = IoPolicy::new(2, 2);
        assert_eq!(io_elements(0, 4, p, 16).unwrap(), (0, 8));
        assert_eq!(io_elements(1, 4, p, 16).unwrap(), (0, 0));
        assert_eq!(io_elements(2, 4, p, 16).unwrap(), (8, 8));
        assert_eq!(io_elements(3, 4, p, 16).unwrap(), (0, 0));
    }

    #[test]
    fn oversubscribed_policy_is_rejected() {
        let p = IoPolicy::new(3, 2);
        let err = io_elements(0, 4, p, 16).unwrap_err();
        assert_eq!(
            err.kind(),
            crate::error::ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn zero_policy_fields_are_rejected() {
        assert!(io_elements(0, 4, IoPolicy::new(0, 1), 8).is_err());
        assert!(io_elements(0, 4, IoPolicy::new(1, 0), 8).is_err());
    }

    #[test]
    fn empty_global_space() {
        let p = IoPolicy::new(2, 1);
        assert_eq!(io_elements(0, 2, p, 0).unwrap(), (0, 0));
        assert_eq!(io_elements(1, 2, p, 0).unwrap(), (0, 0));
    }

    #[test]
    fn more_tasks_than_elements() {
        let p = IoPolicy::new(4, 1);
        assert_eq!(io_elements(0, 4, p, 2).unwrap(), (0, 1));
        assert_eq!(io_elements(1, 4, p, 2).unwrap(), (1, 1));
        assert_eq!(io_elements(2, 4, p, 2).unwrap(), (2, 0));
        assert_eq!(io_elements(3, 4, p, 2).unwrap(), (2, 0));
    }

    proptest! {
        /// The windows of all ranks tile [0, n_global) exactly once.
        #[test]
        fn windows_partition_the_global_space(
            comm_size in 1usize..=32,
            num_io_tasks in 1usize..=8,
            io_stride in 1usize..=4,
            n_global in 0u64..100_000,
        ) {
            let policy = IoPolicy::new(num_io_tasks, io_stride);
            prop_assume!(policy.validate(comm_size).is_ok());

            let mut windows: Vec<(u64, u64)> = (0..comm_size)
                .map(|r| io_elements(r, comm_size, policy, n_global).unwrap())
                .filter(|&(_, count)| count > 0)
                .collect();
            windows.sort_unstable();

            let mut next = 0u64;
            for (start, count) in windows {
                prop_assert_eq!(start, next);
                next = start + count;
            }
            prop_assert_eq!(next, n_global);
        }

        /// Block sizes differ by at most one, larger blocks first.
        #[test]
        fn block_sizes_are_balanced(
            num_io_tasks in 1usize..=16,
            n_global in 0u64..10_000,
        ) {
            let policy = IoPolicy::new(num_io_tasks, 1);
            let counts: Vec<u64> = (0..num_io_tasks)
                .map(|r| io_elements(r, num_io_tasks, policy, n_global).unwrap().1)
                .collect();
            let lo = n_global / num_io_tasks as u64;
            for w in counts.windows(2) {
                prop_assert!(w[0] >= w[1]);
            }
            for c in counts {
                prop_assert!(c == lo || c == lo + 1);
            }
        }
    }
}
