//! Collective protocols built on the point-to-point [`Communicator`] seam.
//!
//! Every rank of a group must enter each of these in the same program order.
//! Self-traffic (`peer == rank`) never touches the transport, so all of them
//! degenerate correctly at group size 1 under [`crate::comm::NoComm`].

use crate::comm::{CommTag, Communicator, Wait};
use crate::error::ScatterError;
use crate::wire;

pub(crate) fn comm_err(peer: usize, what: &str) -> ScatterError {
    ScatterError::Comm {
        peer,
        reason: what.to_string(),
    }
}

/// Sum one `u64` contribution over every rank of the group.
///
/// Realized as a symmetric exchange: each rank ships its value to every peer
/// and folds what it receives. Message volume is quadratic in the group size,
/// which is fine for the single scalar this crate reduces.
pub fn all_sum_u64<C: Communicator>(
    comm: &C,
    value: u64,
    tag: CommTag,
) -> Result<u64, ScatterError> {
    let me = comm.rank();
    let p = comm.size();

    let mut recvs = Vec::with_capacity(p.saturating_sub(1));
    for peer in 0..p {
        if peer == me {
            continue;
        }
        let mut buf = [0u8; 8];
        recvs.push((peer, comm.irecv(peer, tag.as_u16(), &mut buf)));
    }

    let bytes = value.to_le_bytes();
    let mut sends = Vec::with_capacity(p.saturating_sub(1));
    for peer in 0..p {
        if peer != me {
            sends.push(comm.isend(peer, tag.as_u16(), &bytes));
        }
    }

    let mut total = value;
    for (peer, h) in recvs {
        let raw = h
            .wait()
            .ok_or_else(|| comm_err(peer, "reduction receive returned nothing"))?;
        let arr: [u8; 8] = raw
            .as_slice()
            .try_into()
            .map_err(|_| comm_err(peer, "reduction message has wrong length"))?;
        total = total.wrapping_add(u64::from_le_bytes(arr));
    }
    for s in sends {
        let _ = s.wait();
    }
    Ok(total)
}

/// Paired shift exchange of one `u64`: send `value` to rank `to`, receive one
/// from rank `from`. `to` and `from` are either both this rank (pure local
/// step) or both remote.
pub fn exchange_u64<C: Communicator>(
    comm: &C,
    to: usize,
    from: usize,
    tag: CommTag,
    value: u64,
) -> Result<u64, ScatterError> {
    let me = comm.rank();
    if to == me && from == me {
        return Ok(value);
    }
    debug_assert!(to != me && from != me, "half-local shift exchange");

    let mut buf = [0u8; 8];
    let h = comm.irecv(from, tag.as_u16(), &mut buf);
    let s = comm.isend(to, tag.as_u16(), &value.to_le_bytes());
    let raw = h
        .wait()
        .ok_or_else(|| comm_err(from, "count receive returned nothing"))?;
    let arr: [u8; 8] = raw
        .as_slice()
        .try_into()
        .map_err(|_| comm_err(from, "count message has wrong length"))?;
    let _ = s.wait();
    Ok(u64::from_le_bytes(arr))
}

/// Paired shift exchange of a byte payload whose incoming length is already
/// known from a preceding [`exchange_u64`]. Zero-length messages are elided
/// on both sides.
pub fn exchange_bytes<C: Communicator>(
    comm: &C,
    to: usize,
    from: usize,
    tag: CommTag,
    send: &[u8],
    recv_len: usize,
) -> Result<Vec<u8>, ScatterError> {
    let me = comm.rank();
    if to == me && from == me {
        return Ok(send.to_vec());
    }
    debug_assert!(to != me && from != me, "half-local shift exchange");

    let mut template = wire::try_vec(recv_len)?;
    let h = if recv_len > 0 {
        Some(comm.irecv(from, tag.as_u16(), &mut template))
    } else {
        None
    };
    let s = if !send.is_empty() {
        Some(comm.isend(to, tag.as_u16(), send))
    } else {
        None
    };

    let out = match h {
        Some(h) => {
            let raw = h
                .wait()
                .ok_or_else(|| comm_err(from, "payload receive returned nothing"))?;
            if raw.len() != recv_len {
                return Err(comm_err(from, "payload message has wrong length"));
            }
            raw
        }
        None => Vec::new(),
    };
    if let Some(s) = s {
        let _ = s.wait();
    }
    Ok(out)
}
