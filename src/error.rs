//! `ScatterError`: unified error type for scatter-io public APIs.
//!
//! Every fallible operation in this crate returns `Result<_, ScatterError>`.
//! Callers that need the coarse return-coded contract of the C middlewares
//! this crate sits next to can classify any error with [`ScatterError::kind`].

use thiserror::Error;

/// Coarse classification of a [`ScatterError`].
///
/// The variants mirror the four failure kinds of the exchange core's
/// contract: bad input, exhausted memory, failed transport, and a failure
/// reported by a file backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A caller-supplied argument was rejected, or the global element ID set
    /// was found to be inconsistent during plan construction.
    InvalidArgument,
    /// A data-dependent allocation could not be satisfied.
    AllocationFailure,
    /// A point-to-point or collective communication primitive failed.
    CommFailure,
    /// The file backend reported a failure of its own.
    BackendFailure,
}

/// Unified error type for scatter-io operations.
#[derive(Debug, Error)]
pub enum ScatterError {
    /// The I/O task policy does not fit in the communicator group.
    #[error(
        "I/O policy ({num_io_tasks} tasks at stride {io_stride}) does not fit in a group of {comm_size}"
    )]
    InvalidPolicy {
        num_io_tasks: usize,
        io_stride: usize,
        comm_size: usize,
    },
    /// `transfer_field` was called with an element size of zero bytes.
    #[error("element size must be a non-zero number of bytes")]
    ZeroElementSize,
    /// A caller-supplied buffer does not match the size implied by the plan.
    #[error("buffer holds {got} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, got: usize },
    /// An element ID was not claimed by any peer during plan construction.
    #[error("element {0} has no matching owner on the other side of the exchange")]
    UnmatchedElement(i64),
    /// An element ID was claimed by more than one peer during plan construction.
    #[error("element {0} was claimed more than once")]
    DuplicateElement(i64),
    /// A data-dependent allocation failed.
    #[error("allocation of {bytes} bytes failed")]
    Allocation { bytes: usize },
    /// A communication primitive failed or returned a malformed message.
    #[error("communication with rank {peer} failed: {reason}")]
    Comm { peer: usize, reason: String },
    /// A dimension name was not found in the file.
    #[error("unknown dimension `{0}`")]
    UnknownDimension(String),
    /// A dimension with this name already exists in the file.
    #[error("dimension `{0}` is already defined")]
    DuplicateDimension(String),
    /// Zero-length dimensions are not representable in the backing format.
    #[error("dimension `{0}` must not have length zero")]
    ZeroLengthDimension(String),
    /// A variable name was not found in the file.
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    /// A variable with this name already exists in the file.
    #[error("variable `{0}` is already defined")]
    DuplicateVariable(String),
    /// A decomposition was supplied for a variable with no decomposable dimension.
    #[error("variable `{0}` has no non-record dimension to decompose")]
    NoDecomposedDimension(String),
    /// A hyperslab fell outside the current extent of a variable.
    #[error("hyperslab out of bounds for variable `{0}`")]
    HyperslabOutOfBounds(String),
    /// The file was opened read-only.
    #[error("file is open for reading only")]
    ReadOnly,
    /// The backend failed internally.
    #[error("file backend failure: {message}")]
    Backend { message: String },
}

impl ScatterError {
    /// Classify this error into the coarse return-coded contract.
    pub fn kind(&self) -> ErrorKind {
        use ScatterError::*;
        match self {
            InvalidPolicy { .. }
            | ZeroElementSize
            | BufferSizeMismatch { .. }
            | UnmatchedElement(_)
            | DuplicateElement(_)
            | UnknownDimension(_)
            | DuplicateDimension(_)
            | ZeroLengthDimension(_)
            | UnknownVariable(_)
            | DuplicateVariable(_)
            | NoDecomposedDimension(_)
            | HyperslabOutOfBounds(_)
            | ReadOnly => ErrorKind::InvalidArgument,
            Allocation { .. } => ErrorKind::AllocationFailure,
            Comm { .. } => ErrorKind::CommFailure,
            Backend { .. } => ErrorKind::BackendFailure,
        }
    }
}
