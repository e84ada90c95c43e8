//! Byte-level helpers shared by the communication and transfer paths.
//!
//! All multi-byte integers exchanged between ranks are little-endian fixed
//! width. Payload slices travel as raw bytes through `bytemuck` casts; the
//! receiving side re-collects into an owned, correctly aligned `Vec`.

use bytemuck::Pod;

use crate::error::ScatterError;

/// View a `Pod` slice as raw bytes.
pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Re-collect received bytes into an owned `Vec<T>`.
///
/// Received buffers carry no alignment guarantee, so this copies rather than
/// reinterpreting in place.
pub fn collect_pod<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytemuck::pod_collect_to_vec(bytes)
}

/// Allocate a zeroed byte buffer, surfacing allocation failure as an error
/// instead of aborting.
pub fn try_vec(len: usize) -> Result<Vec<u8>, ScatterError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ScatterError::Allocation { bytes: len })?;
    v.resize(len, 0u8);
    Ok(v)
}

/// Allocate a defaulted buffer of `len` elements of `T`.
pub fn try_vec_of<T: Copy + Default>(len: usize) -> Result<Vec<T>, ScatterError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| ScatterError::Allocation {
        bytes: len * std::mem::size_of::<T>(),
    })?;
    v.resize(len, T::default());
    Ok(v)
}
