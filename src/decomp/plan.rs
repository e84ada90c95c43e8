//! Collective construction of the exchange plan.
//!
//! Every rank contributes the global element IDs it holds on the compute
//! side and the IDs it serves on the I/O side. [`build_exchange`] works out,
//! for each element, which peer sits on the other side, and returns the two
//! triplet tables that drive [`crate::decomp::transfer::transfer_field`].
//!
//! The protocol is a fixed-order round-robin: at step `s`, each rank ships
//! its compute IDs to rank `(rank + s) % P` and takes the compute IDs of
//! rank `(rank - s) % P` in exchange. The receiving side matches the
//! incoming IDs against its own I/O window and sends back the subset it
//! claims, so after `P` steps both sides of every pairing are known. Each
//! step's peer choice is rank-independent, so the group stays in lockstep
//! without any negotiation.

use crate::comm::collective::{comm_err, exchange_bytes, exchange_u64};
use crate::comm::{CommTag, Communicator};
use crate::decomp::triplet::{Offset, Triplet, TripletField, TripletTable};
use crate::error::ScatterError;
use crate::wire;

const TAG_ID_COUNT: CommTag = CommTag::new(0x5200);
const TAG_ID_DATA: CommTag = TAG_ID_COUNT.offset(1);
const TAG_CLAIM_COUNT: CommTag = TAG_ID_COUNT.offset(2);
const TAG_CLAIM_DATA: CommTag = TAG_ID_COUNT.offset(3);

/// Build the compute-side and I/O-side triplet tables for this rank.
///
/// `compute_ids` are the global element IDs this rank holds in compute
/// order; `io_ids` are the IDs this rank serves on the I/O side (empty on
/// ranks that are not I/O ranks). Collective: every rank of the group must
/// call this in the same program order.
///
/// On success both tables are sorted by peer rank with element IDs ascending
/// within each peer block, the form the transfer engine consumes. An element
/// with no I/O owner, or one claimed twice, fails with an invalid-argument
/// error once the round-robin has run to completion, so a detecting rank
/// never leaves its peers stuck mid-protocol.
pub fn build_exchange<C: Communicator>(
    comm: &C,
    compute_ids: &[Offset],
    io_ids: &[Offset],
) -> Result<(TripletTable, TripletTable), ScatterError> {
    let me = comm.rank();
    let p = comm.size();

    // Local lookup tables, element-sorted for the binary searches below.
    let mut comp_index = TripletTable::with_capacity(compute_ids.len())?;
    for (i, &e) in compute_ids.iter().enumerate() {
        comp_index.push(Triplet::new(0, i as Offset, e));
    }
    comp_index.sort_by(TripletField::Elem);

    let mut io_index = TripletTable::with_capacity(io_ids.len())?;
    for (j, &e) in io_ids.iter().enumerate() {
        io_index.push(Triplet::new(0, j as Offset, e));
    }
    io_index.sort_by(TripletField::Elem);

    let mut comp_list = TripletTable::with_capacity(compute_ids.len())?;
    let mut io_list = TripletTable::with_capacity(io_ids.len())?;
    let mut comp_claimed = wire::try_vec_of::<bool>(compute_ids.len())?;
    let mut io_claimed = wire::try_vec_of::<bool>(io_ids.len())?;

    // First matching failure, reported only after the protocol completes.
    let mut first_err: Option<ScatterError> = None;

    for s in 0..p {
        let dst = (me + s) % p;
        let src = (me + p - s) % p;

        // Ship my compute IDs to dst, take src's in exchange.
        let n_theirs = exchange_u64(comm, dst, src, TAG_ID_COUNT, compute_ids.len() as u64)?;
        let theirs_bytes = exchange_bytes(
            comm,
            dst,
            src,
            TAG_ID_DATA,
            wire::cast_slice(compute_ids),
            n_theirs as usize * std::mem::size_of::<Offset>(),
        )?;
        let theirs: Vec<Offset> = wire::collect_pod(&theirs_bytes);
        if theirs.len() != n_theirs as usize {
            return Err(comm_err(src, "element ID payload has wrong length"));
        }

        // Claim every received ID that lands in this rank's I/O window.
        let mut claims: Vec<Offset> = Vec::new();
        claims
            .try_reserve(theirs.len().min(io_ids.len()))
            .map_err(|_| ScatterError::Allocation {
                bytes: theirs.len() * std::mem::size_of::<Offset>(),
            })?;
        for &e in &theirs {
            let Some(hit) = io_index.search(e, TripletField::Elem) else {
                continue;
            };
            let j = hit.slot as usize;
            if io_claimed[j] {
                if first_err.is_none() {
                    first_err = Some(ScatterError::DuplicateElement(e));
                }
                continue;
            }
            io_claimed[j] = true;
            io_list.push(Triplet::new(src as Offset, hit.slot, e));
            claims.push(e);
        }

        // Send the claims back to src; collect what dst claimed from us.
        let n_claimed = exchange_u64(comm, src, dst, TAG_CLAIM_COUNT, claims.len() as u64)?;
        let claimed_bytes = exchange_bytes(
            comm,
            src,
            dst,
            TAG_CLAIM_DATA,
            wire::cast_slice(&claims),
            n_claimed as usize * std::mem::size_of::<Offset>(),
        )?;
        let claimed_by_dst: Vec<Offset> = wire::collect_pod(&claimed_bytes);

        for &e in &claimed_by_dst {
            let Some(hit) = comp_index.search(e, TripletField::Elem) else {
                if first_err.is_none() {
                    first_err = Some(ScatterError::UnmatchedElement(e));
                }
                continue;
            };
            let i = hit.slot as usize;
            if comp_claimed[i] {
                if first_err.is_none() {
                    first_err = Some(ScatterError::DuplicateElement(e));
                }
                continue;
            }
            comp_claimed[i] = true;
            comp_list.push(Triplet::new(dst as Offset, hit.slot, e));
        }
    }

    if let Some(err) = first_err {
        return Err(err);
    }

    // Consistency check: the matching must be perfect on both sides.
    comp_list.sort_by(TripletField::Elem);
    for &e in compute_ids {
        if comp_list.search(e, TripletField::Elem).is_none() {
            return Err(ScatterError::UnmatchedElement(e));
        }
    }
    io_list.sort_by(TripletField::Elem);
    for &e in io_ids {
        if io_list.search(e, TripletField::Elem).is_none() {
            return Err(ScatterError::UnmatchedElement(e));
        }
    }

    // Stable re-sort by peer rank on top of the element sort. Both sides end
    // up with element IDs ascending within each peer block, which is what
    // makes sender and receiver agree byte-for-byte on packing order.
    comp_list.sort_by(TripletField::Peer);
    io_list.sort_by(TripletField::Peer);

    Ok((comp_list, io_list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;

    #[test]
    fn single_rank_identity_plan() {
        let ids = [0, 1, 2, 3];
        let (comp, io) = build_exchange(&NoComm, &ids, &ids).unwrap();
        assert_eq!(comp.len(), 4);
        assert_eq!(io.len(), 4);
        for t in &comp {
            assert_eq!(t.peer, 0);
            assert_eq!(t.slot, t.elem);
        }
    }

    #[test]
    fn single_rank_permuted_compute_order() {
        let compute = [3, 0, 2, 1];
        let io = [0, 1, 2, 3];
        let (comp, io_list) = build_exchange(&NoComm, &compute, &io).unwrap();

        // Element IDs ascend within the (single) peer block on both sides.
        let comp_elems: Vec<_> = comp.iter().map(|t| t.elem).collect();
        assert_eq!(comp_elems, vec![0, 1, 2, 3]);
        let io_elems: Vec<_> = io_list.iter().map(|t| t.elem).collect();
        assert_eq!(io_elems, vec![0, 1, 2, 3]);

        // Compute slots point back into the caller's buffer.
        let slots: Vec<_> = comp.iter().map(|t| t.slot).collect();
        assert_eq!(slots, vec![1, 3, 2, 0]);
    }

    #[test]
    fn single_rank_unmatched_element_fails() {
        let compute = [0, 1, 7];
        let io = [0, 1, 2];
        let err = build_exchange(&NoComm, &compute, &io).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn single_rank_duplicate_element_fails() {
        let compute = [0, 1, 1, 2];
        let io = [0, 1, 2, 3];
        let err = build_exchange(&NoComm, &compute, &io).unwrap_err();
        assert!(matches!(err, ScatterError::DuplicateElement(1)));
    }
}
