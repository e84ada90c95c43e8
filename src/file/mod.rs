//! File façade over a pluggable parallel file-format backend.
//!
//! The façade is deliberately thin: it resolves variable shapes into
//! hyperslabs, moves decomposed fields through
//! [`crate::decomp::transfer::transfer_field`], and passes everything else
//! straight to the [`IoBackend`]. Decomposed variables use the calling
//! rank's `(io_start, io_count)` window as the hyperslab of their first
//! non-record dimension; variables with an unlimited first dimension read
//! and write one record at the file's current frame.
//!
//! Like everything else in this crate, `put_var`, `get_var` and `sync` are
//! collective over the group.

pub mod backend;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::comm::Communicator;
use crate::decomp::transfer::{transfer_field, Direction};
use crate::decomp::Decomp;
use crate::error::ScatterError;
use crate::wire;

pub use backend::{DimInfo, IoBackend, VarInfo};
pub use memory::MemBackend;

/// Access mode of an open file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Create a fresh file, clobbering an existing one.
    Create,
    /// Open an existing file for reading and writing.
    Write,
    /// Open an existing file read-only.
    Read,
}

/// Scalar type of a variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarType {
    Real32,
    Real64,
    Int32,
    Char,
}

impl VarType {
    pub const fn size_bytes(self) -> usize {
        match self {
            VarType::Real32 | VarType::Int32 => 4,
            VarType::Real64 => 8,
            VarType::Char => 1,
        }
    }
}

/// An open file: an [`IoBackend`] plus the current record frame.
#[derive(Debug)]
pub struct File<B: IoBackend> {
    backend: B,
    mode: Mode,
    frame: u64,
}

impl<B: IoBackend> File<B> {
    /// Wrap a backend. The frame starts at record zero.
    pub fn open(backend: B, mode: Mode) -> Self {
        Self {
            backend,
            mode,
            frame: 0,
        }
    }

    /// Record index used by variables with an unlimited first dimension.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Aim subsequent record reads and writes at `frame`. Writing to an
    /// already written frame overwrites it.
    pub fn set_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Define a dimension; `None` defines the unlimited record dimension.
    pub fn define_dim(&mut self, name: &str, size: Option<u64>) -> Result<(), ScatterError> {
        self.check_writable()?;
        if size == Some(0) {
            return Err(ScatterError::ZeroLengthDimension(name.to_string()));
        }
        self.backend.define_dim(name, size)
    }

    pub fn inquire_dim(&self, name: &str) -> Result<DimInfo, ScatterError> {
        self.backend.inquire_dim(name)
    }

    pub fn define_var(
        &mut self,
        name: &str,
        vtype: VarType,
        dims: &[&str],
    ) -> Result<(), ScatterError> {
        self.check_writable()?;
        self.backend.define_var(name, vtype, dims)
    }

    pub fn inquire_var(&self, name: &str) -> Result<VarInfo, ScatterError> {
        self.backend.inquire_var(name)
    }

    /// Write a variable.
    ///
    /// With a decomposition, `buf` holds this rank's compute elements in
    /// compute order (`n_compute × element_size` bytes); the field is
    /// scattered to the I/O windows and each rank writes its window's
    /// hyperslab. Without one, every rank passes the same full-variable
    /// bytes and writes them collectively.
    pub fn put_var<C: Communicator>(
        &mut self,
        comm: &C,
        decomp: Option<&Decomp>,
        name: &str,
        buf: &[u8],
    ) -> Result<(), ScatterError> {
        self.check_writable()?;
        let lab = self.resolve(name, decomp)?;

        if let Some(decomp) = decomp {
            let expected = decomp.n_compute() * lab.element_size;
            if buf.len() != expected {
                return Err(ScatterError::BufferSizeMismatch {
                    expected,
                    got: buf.len(),
                });
            }
            let mut io_buf = wire::try_vec(decomp.io_count() as usize * lab.element_size)?;
            transfer_field(
                comm,
                decomp,
                Direction::CompToIo,
                lab.element_size,
                buf,
                &mut io_buf,
            )?;
            self.backend.put_vara(name, &lab.start, &lab.count, &io_buf)
        } else {
            self.backend.put_vara(name, &lab.start, &lab.count, buf)
        }
    }

    /// Read a variable; the exact inverse of [`File::put_var`].
    pub fn get_var<C: Communicator>(
        &mut self,
        comm: &C,
        decomp: Option<&Decomp>,
        name: &str,
        buf: &mut [u8],
    ) -> Result<(), ScatterError> {
        let lab = self.resolve(name, decomp)?;

        if let Some(decomp) = decomp {
            let expected = decomp.n_compute() * lab.element_size;
            if buf.len() != expected {
                return Err(ScatterError::BufferSizeMismatch {
                    expected,
                    got: buf.len(),
                });
            }
            let mut io_buf = wire::try_vec(decomp.io_count() as usize * lab.element_size)?;
            self.backend.get_vara(name, &lab.start, &lab.count, &mut io_buf)?;
            transfer_field(
                comm,
                decomp,
                Direction::IoToComp,
                lab.element_size,
                &io_buf,
                buf,
            )
        } else {
            self.backend.get_vara(name, &lab.start, &lab.count, buf)
        }
    }

    /// Flush buffered data to the backend's storage.
    pub fn sync(&mut self) -> Result<(), ScatterError> {
        self.backend.sync()
    }

    /// Flush and close the file.
    pub fn close(mut self) -> Result<(), ScatterError> {
        self.backend.sync()
    }

    fn check_writable(&self) -> Result<(), ScatterError> {
        if self.mode == Mode::Read {
            return Err(ScatterError::ReadOnly);
        }
        Ok(())
    }

    /// Resolve a variable into the hyperslab this rank touches.
    fn resolve(&self, name: &str, decomp: Option<&Decomp>) -> Result<Hyperslab, ScatterError> {
        let info = self.backend.inquire_var(name)?;
        let mut start = Vec::with_capacity(info.dims.len());
        let mut count = Vec::with_capacity(info.dims.len());
        let mut inner: u64 = 1;
        let mut decomposed = false;

        for dim_name in &info.dims {
            let dim = self.backend.inquire_dim(dim_name)?;
            if dim.is_unlimited {
                start.push(self.frame);
                count.push(1);
            } else if let Some(d) = decomp.filter(|_| !decomposed) {
                // Window of this rank; zero-extent on non-I/O ranks.
                decomposed = true;
                start.push(d.io_start());
                count.push(d.io_count());
            } else {
                start.push(0);
                count.push(dim.size);
                inner = inner.saturating_mul(dim.size);
            }
        }
        if decomp.is_some() && !decomposed {
            return Err(ScatterError::NoDecomposedDimension(name.to_string()));
        }

        Ok(Hyperslab {
            start,
            count,
            element_size: info.vtype.size_bytes() * inner as usize,
        })
    }
}

struct Hyperslab {
    start: Vec<u64>,
    count: Vec<u64>,
    element_size: usize,
}
