//! Decomposition of a globally indexed array between compute and I/O ranks.
//!
//! [`create_decomp`] is the collective entry point: every rank hands in the
//! global element IDs it holds in compute order plus an [`IoPolicy`], and
//! gets back a [`Decomp`] describing both its contiguous I/O window and the
//! two-way exchange plan connecting the layouts. The handle is immutable;
//! [`crate::decomp::transfer::transfer_field`] only reads it.

pub mod partition;
pub mod plan;
pub mod transfer;
pub mod triplet;

use crate::comm::collective::all_sum_u64;
use crate::comm::{CommTag, Communicator};
use crate::error::ScatterError;
use crate::wire;

pub use partition::{io_elements, IoPolicy};
pub use plan::build_exchange;
pub use transfer::{transfer_field, Direction};
pub use triplet::{Offset, Triplet, TripletField, TripletTable};

const TAG_N_GLOBAL: CommTag = CommTag::new(0x5100);

/// Mapping between compute elements and I/O elements for one rank.
///
/// Owns the two triplet tables of the exchange plan, each kept sorted by
/// peer rank with element IDs ascending within every peer block, plus the
/// rank's contiguous window of the global index space. Immutable after
/// construction.
#[derive(Debug)]
pub struct Decomp {
    comp_list: TripletTable,
    io_list: TripletTable,
    io_start: u64,
    io_count: u64,
}

impl Decomp {
    /// Compute-side plan: one triplet per element this rank holds.
    pub fn comp_list(&self) -> &TripletTable {
        &self.comp_list
    }

    /// I/O-side plan: one triplet per element in this rank's window.
    pub fn io_list(&self) -> &TripletTable {
        &self.io_list
    }

    /// First global element of this rank's I/O window (0 on non-I/O ranks).
    pub fn io_start(&self) -> u64 {
        self.io_start
    }

    /// Extent of this rank's I/O window (0 on non-I/O ranks).
    pub fn io_count(&self) -> u64 {
        self.io_count
    }

    /// Number of elements this rank holds on the compute side.
    pub fn n_compute(&self) -> usize {
        self.comp_list.len()
    }
}

/// Collectively build the mapping between compute elements and I/O elements.
///
/// The global index space is sized by summing `compute_ids.len()` over the
/// group, block-partitioned across the I/O ranks named by `policy`, and the
/// exchange plan is derived from the resulting windows. Every rank of the
/// group must call this in the same program order, including ranks that hold
/// no compute elements.
///
/// Fails with an invalid-argument error when the policy does not fit the
/// group or when the global ID set is not a bijection (an ID missing from
/// every rank's window, or held twice); with an allocation error when a
/// data-dependent buffer cannot be allocated; and with a communication error
/// when the transport fails.
pub fn create_decomp<C: Communicator>(
    comm: &C,
    compute_ids: &[Offset],
    policy: IoPolicy,
) -> Result<Decomp, ScatterError> {
    // The number of elements to read or write collectively equals the size
    // of the combined compute element set.
    let n_global = all_sum_u64(comm, compute_ids.len() as u64, TAG_N_GLOBAL)?;

    let (io_start, io_count) = io_elements(comm.rank(), comm.size(), policy, n_global)?;

    let mut io_ids = wire::try_vec_of::<Offset>(io_count as usize)?;
    for (j, id) in io_ids.iter_mut().enumerate() {
        *id = (io_start + j as u64) as Offset;
    }

    let (comp_list, io_list) = build_exchange(comm, compute_ids, &io_ids)?;

    Ok(Decomp {
        comp_list,
        io_list,
        io_start,
        io_count,
    })
}

/// Release a decomposition held in an `Option`, leaving `None` behind.
///
/// Dropping a [`Decomp`] releases it just as well; this exists for callers
/// that keep the handle in an optional slot and want release to be
/// idempotent. Calling it on an empty slot does nothing.
pub fn free_decomp(slot: &mut Option<Decomp>) {
    slot.take();
}
