//! Triplet tables: the unit of the exchange plan.
//!
//! A [`Triplet`] ties together a peer rank, a position in a process-local
//! buffer, and a global element ID. A [`TripletTable`] is an ordered sequence
//! of triplets supporting an in-place stable sort by any one field and a
//! binary lookup by any one field once sorted.
//!
//! Two canonical orderings are used by the exchange engine: sorted by
//! [`TripletField::Elem`] for O(log n) lookups during plan construction, and
//! sorted by [`TripletField::Peer`] for laying out packed bytes contiguously
//! in peer-rank order. Because the sort is stable, sorting by `Elem` first
//! and re-sorting by `Peer` leaves element IDs ascending within every peer
//! block, which is the ordering the transfer engine relies on.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::error::ScatterError;

/// Signed 64-bit offset into a global or local index space.
pub type Offset = i64;

/// One entry of an exchange plan: `(peer_rank, local_slot, element_id)`.
///
/// The meaning of `slot` depends on the side of the exchange: on the
/// compute-side table it is the position in the caller's compute buffer; on
/// the I/O-side table it is the position in the contiguous I/O buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Triplet {
    pub peer: Offset,
    pub slot: Offset,
    pub elem: Offset,
}

impl Triplet {
    pub const fn new(peer: Offset, slot: Offset, elem: Offset) -> Self {
        Self { peer, slot, elem }
    }
}

/// Field selector for [`TripletTable::sort_by`] and [`TripletTable::search`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TripletField {
    Peer,
    Slot,
    Elem,
}

impl Triplet {
    #[inline]
    fn get(&self, field: TripletField) -> Offset {
        match field {
            TripletField::Peer => self.peer,
            TripletField::Slot => self.slot,
            TripletField::Elem => self.elem,
        }
    }
}

/// Ordered sequence of [`Triplet`]s, owned by exactly one decomposition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TripletTable {
    entries: Vec<Triplet>,
}

impl TripletTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size a table, surfacing allocation failure instead of aborting.
    pub fn with_capacity(n: usize) -> Result<Self, ScatterError> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(n)
            .map_err(|_| ScatterError::Allocation {
                bytes: n * std::mem::size_of::<Triplet>(),
            })?;
        Ok(Self { entries })
    }

    pub fn push(&mut self, t: Triplet) {
        self.entries.push(t);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[Triplet] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Triplet> {
        self.entries.iter()
    }

    /// In-place stable sort by the chosen field.
    ///
    /// Entries comparing equal on the chosen field keep their relative order,
    /// so compound orderings are produced by sorting the least significant
    /// key first and re-sorting by the more significant one.
    pub fn sort_by(&mut self, field: TripletField) {
        self.entries.sort_by_key(|t| t.get(field));
    }

    /// Binary search in a table sorted by `field`.
    ///
    /// Returns a reference to *some* triplet whose `field` equals `key`, or
    /// `None`. When several entries match, which one is returned is
    /// unspecified; callers rely only on existence.
    pub fn search(&self, key: Offset, field: TripletField) -> Option<&Triplet> {
        self.entries
            .binary_search_by(|t| t.get(field).cmp(&key))
            .ok()
            .map(|i| &self.entries[i])
    }
}

impl<'a> IntoIterator for &'a TripletTable {
    type Item = &'a Triplet;
    type IntoIter = std::slice::Iter<'a, Triplet>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Triplet> for TripletTable {
    fn from_iter<I: IntoIterator<Item = Triplet>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
