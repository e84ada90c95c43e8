//! Backend contract for the file façade.
//!
//! A backend is the parallel file-format library underneath the façade:
//! dimensions, typed multidimensional variables, an optional unlimited
//! record dimension, and collective hyperslab reads and writes. Every
//! method is collective over the group that shares the file; each rank
//! passes only its own hyperslab.

use crate::error::ScatterError;
use crate::file::VarType;

/// Shape and kind of one dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DimInfo {
    /// Current size. For the unlimited dimension this is the number of
    /// records written so far and can grow between calls.
    pub size: u64,
    pub is_unlimited: bool,
}

/// Type and shape of one variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarInfo {
    pub vtype: VarType,
    pub dims: Vec<String>,
}

/// Collective file-format backend.
pub trait IoBackend {
    /// Define a dimension. `None` defines the unlimited record dimension.
    fn define_dim(&mut self, name: &str, size: Option<u64>) -> Result<(), ScatterError>;

    fn inquire_dim(&self, name: &str) -> Result<DimInfo, ScatterError>;

    /// Define a variable over previously defined dimensions.
    fn define_var(
        &mut self,
        name: &str,
        vtype: VarType,
        dims: &[&str],
    ) -> Result<(), ScatterError>;

    fn inquire_var(&self, name: &str) -> Result<VarInfo, ScatterError>;

    /// Write the hyperslab `start`/`count` of a variable from flat bytes in
    /// row-major order.
    fn put_vara(
        &mut self,
        name: &str,
        start: &[u64],
        count: &[u64],
        data: &[u8],
    ) -> Result<(), ScatterError>;

    /// Read the hyperslab `start`/`count` of a variable into flat bytes in
    /// row-major order.
    fn get_vara(
        &self,
        name: &str,
        start: &[u64],
        count: &[u64],
        data: &mut [u8],
    ) -> Result<(), ScatterError>;

    /// Flush buffered data.
    fn sync(&mut self) -> Result<(), ScatterError>;
}
