//! # scatter-io
//!
//! scatter-io is a decomposition-and-exchange middleware for parallel array
//! I/O. A large group of compute processes holds scattered pieces of a
//! globally indexed array; a smaller subset of the group acts as I/O
//! processes that read and write a shared file through a parallel
//! file-format backend. This crate owns the hard part in between: working
//! out a contiguous, disjoint partition of the global index space across the
//! I/O ranks, deriving the symmetric send/receive plan that connects the two
//! layouts, and executing that plan as a collective exchange with correct
//! packing, ordering and memory discipline.
//!
//! ## Features
//! - Triplet tables with field-selected stable sort and binary search, the
//!   foundation of the exchange plan
//! - A pure block partitioner mapping an I/O policy to per-rank windows
//! - A collective round-robin plan builder with perfect-matching validation
//! - A byte-oblivious field transfer engine for both exchange directions
//! - Pluggable communication backends (serial, threaded, MPI) behind a
//!   single [`comm::Communicator`] seam
//! - A thin file façade over a pluggable NetCDF-style backend, with an
//!   in-memory backend for tests
//!
//! ## Usage
//! Add `scatter-io` as a dependency and enable features as needed:
//!
//! ```toml
//! [dependencies]
//! scatter-io = "0.1"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! Every collective operation (decomposition creation, field transfer, file
//! access) must be entered by all ranks of a group in the same program
//! order. Within a rank everything is straight-line; the only suspension
//! points are inside the communicator.

pub mod comm;
pub mod decomp;
pub mod error;
pub mod file;
pub mod wire;

/// A convenient prelude importing the most-used traits and types.
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, NoComm, ThreadComm, Wait};
    pub use crate::decomp::{
        build_exchange, create_decomp, free_decomp, io_elements, transfer_field, Decomp,
        Direction, IoPolicy, Offset, Triplet, TripletField, TripletTable,
    };
    pub use crate::error::{ErrorKind, ScatterError};
    pub use crate::file::{File, IoBackend, MemBackend, Mode, VarType};
}
