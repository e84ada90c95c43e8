//! Plan-driven movement of field bytes between compute and I/O layout.
//!
//! The engine is oblivious to element typing: callers hand it an element
//! size in bytes, which is the per-element scalar size multiplied by the
//! sizes of all non-decomposed inner dimensions.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::comm::collective::comm_err;
use crate::comm::{CommTag, Communicator, Wait};
use crate::decomp::triplet::Triplet;
use crate::decomp::Decomp;
use crate::error::ScatterError;
use crate::wire;

const TAG_FIELD: CommTag = CommTag::new(0x5300);

/// Switch packing below this many bytes to a plain serial loop.
const PAR_PACK_BYTES: usize = 1 << 20;

/// Which way a field moves through the exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Scatter from compute layout into the contiguous I/O windows.
    CompToIo,
    /// Gather from the I/O windows back into compute layout.
    IoToComp,
}

/// Move one field through the exchange described by `decomp`.
///
/// For [`Direction::CompToIo`], `in_field` holds this rank's compute
/// elements and `out_field` receives the rank's contiguous I/O window; for
/// [`Direction::IoToComp`] the roles swap. Both buffers are raw bytes,
/// `element_size` bytes per element. Collective: every rank of the group
/// must call this in the same program order.
pub fn transfer_field<C: Communicator>(
    comm: &C,
    decomp: &Decomp,
    direction: Direction,
    element_size: usize,
    in_field: &[u8],
    out_field: &mut [u8],
) -> Result<(), ScatterError> {
    if element_size == 0 {
        return Err(ScatterError::ZeroElementSize);
    }

    let (send_list, recv_list) = match direction {
        Direction::CompToIo => (decomp.comp_list(), decomp.io_list()),
        Direction::IoToComp => (decomp.io_list(), decomp.comp_list()),
    };

    let send_bytes = send_list.len() * element_size;
    if in_field.len() != send_bytes {
        return Err(ScatterError::BufferSizeMismatch {
            expected: send_bytes,
            got: in_field.len(),
        });
    }
    let recv_bytes = recv_list.len() * element_size;
    if out_field.len() != recv_bytes {
        return Err(ScatterError::BufferSizeMismatch {
            expected: recv_bytes,
            got: out_field.len(),
        });
    }

    let me = comm.rank();
    let send_runs = peer_runs(send_list.as_slice(), element_size);
    let recv_runs = peer_runs(recv_list.as_slice(), element_size);

    // Gather elements into per-peer regions, contiguous in peer-rank order.
    let mut send_buf = wire::try_vec(send_bytes)?;
    pack(send_list.as_slice(), element_size, in_field, &mut send_buf);
    let mut recv_buf = wire::try_vec(recv_bytes)?;

    let mut pending = Vec::with_capacity(recv_runs.len());
    for &(peer, off, len) in &recv_runs {
        if peer == me {
            continue;
        }
        let mut template = wire::try_vec(len)?;
        pending.push((peer, off, len, comm.irecv(peer, TAG_FIELD.as_u16(), &mut template)));
    }

    let mut sends = Vec::with_capacity(send_runs.len());
    for &(peer, off, len) in &send_runs {
        if peer != me {
            sends.push(comm.isend(peer, TAG_FIELD.as_u16(), &send_buf[off..off + len]));
        }
    }

    // Traffic addressed to this rank is a straight copy.
    let self_send = run_for(&send_runs, me);
    let self_recv = run_for(&recv_runs, me);
    let slen = self_send.map_or(0, |(_, len)| len);
    let rlen = self_recv.map_or(0, |(_, len)| len);
    if slen != rlen {
        return Err(ScatterError::BufferSizeMismatch {
            expected: rlen,
            got: slen,
        });
    }
    if let (Some((soff, len)), Some((roff, _))) = (self_send, self_recv) {
        recv_buf[roff..roff + len].copy_from_slice(&send_buf[soff..soff + len]);
    }

    for (peer, off, len, h) in pending {
        let raw = h
            .wait()
            .ok_or_else(|| comm_err(peer, "field receive returned nothing"))?;
        if raw.len() != len {
            return Err(comm_err(peer, "field message has wrong length"));
        }
        recv_buf[off..off + len].copy_from_slice(&raw);
    }
    for s in sends {
        let _ = s.wait();
    }

    // Scatter received elements to their local slots.
    for (chunk, t) in recv_buf.chunks_exact(element_size).zip(recv_list.iter()) {
        let o = t.slot as usize * element_size;
        out_field[o..o + element_size].copy_from_slice(chunk);
    }

    Ok(())
}

/// Per-peer runs of a peer-sorted table: `(peer, byte offset, byte length)`.
fn peer_runs(entries: &[Triplet], element_size: usize) -> Vec<(usize, usize, usize)> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let peer = entries[i].peer;
        let start = i;
        while i < entries.len() && entries[i].peer == peer {
            i += 1;
        }
        runs.push((peer as usize, start * element_size, (i - start) * element_size));
    }
    runs
}

fn run_for(runs: &[(usize, usize, usize)], peer: usize) -> Option<(usize, usize)> {
    runs.iter()
        .find(|&&(p, _, _)| p == peer)
        .map(|&(_, off, len)| (off, len))
}

fn pack(entries: &[Triplet], element_size: usize, src: &[u8], dst: &mut [u8]) {
    if dst.len() >= PAR_PACK_BYTES {
        dst.par_chunks_mut(element_size)
            .zip(entries.par_iter())
            .for_each(|(chunk, t)| {
                let o = t.slot as usize * element_size;
                chunk.copy_from_slice(&src[o..o + element_size]);
            });
    } else {
        for (chunk, t) in dst.chunks_exact_mut(element_size).zip(entries) {
            let o = t.slot as usize * element_size;
            chunk.copy_from_slice(&src[o..o + element_size]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::decomp::partition::IoPolicy;
    use crate::decomp::create_decomp;

    #[test]
    fn single_rank_round_trip_with_odd_element_size() {
        let compute_ids = [3, 0, 2, 1];
        let decomp = create_decomp(&NoComm, &compute_ids, IoPolicy::new(1, 1)).unwrap();

        let esize = 3usize;
        let input: Vec<u8> = (0..compute_ids.len() * esize).map(|b| b as u8).collect();
        let mut io_buf = vec![0u8; decomp.io_count() as usize * esize];
        transfer_field(&NoComm, &decomp, Direction::CompToIo, esize, &input, &mut io_buf).unwrap();

        // Element 3 sits in compute slot 0, so the I/O window ends with it.
        assert_eq!(&io_buf[9..12], &input[0..3]);

        let mut back = vec![0u8; input.len()];
        transfer_field(&NoComm, &decomp, Direction::IoToComp, esize, &io_buf, &mut back).unwrap();
        assert_eq!(back, input);
    }

    #[test]
    fn zero_element_size_is_rejected() {
        let decomp = create_decomp(&NoComm, &[0, 1], IoPolicy::new(1, 1)).unwrap();
        let err =
            transfer_field(&NoComm, &decomp, Direction::CompToIo, 0, &[], &mut []).unwrap_err();
        assert!(matches!(err, ScatterError::ZeroElementSize));
    }

    #[test]
    fn wrong_buffer_length_is_rejected() {
        let decomp = create_decomp(&NoComm, &[0, 1], IoPolicy::new(1, 1)).unwrap();
        let input = [0u8; 7];
        let mut out = [0u8; 16];
        let err = transfer_field(
            &NoComm,
            &decomp,
            Direction::CompToIo,
            8,
            &input,
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, ScatterError::BufferSizeMismatch { expected: 16, got: 7 }));
    }
}
