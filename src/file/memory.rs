//! In-memory backend.
//!
//! One store is shared by every rank of a group through an `Arc`; each rank
//! writes only its own hyperslab, so the union of collective calls produces
//! the full variable, the same way a parallel file-format library would on
//! disk. Used as the test vehicle and as reference semantics for backends.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::error::ScatterError;
use crate::file::backend::{DimInfo, IoBackend, VarInfo};
use crate::file::VarType;

#[derive(Debug)]
struct MemDim {
    size: u64,
    unlimited: bool,
}

#[derive(Debug)]
struct MemVar {
    vtype: VarType,
    dims: Vec<String>,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemStore {
    dims: BTreeMap<String, MemDim>,
    vars: BTreeMap<String, MemVar>,
    unlimited: Option<String>,
}

/// Shared in-memory file store.
#[derive(Clone, Debug)]
pub struct MemBackend {
    store: Arc<Mutex<MemStore>>,
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemBackend {
    /// Create an empty store. Clone the handle to share it with the other
    /// ranks of the group.
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(MemStore::default())),
        }
    }
}

fn backend_err(message: impl Into<String>) -> ScatterError {
    ScatterError::Backend {
        message: message.into(),
    }
}

impl MemStore {
    fn var_shape(&self, var: &MemVar) -> Result<Vec<u64>, ScatterError> {
        var.dims
            .iter()
            .map(|d| {
                self.dims
                    .get(d)
                    .map(|dim| dim.size)
                    .ok_or_else(|| ScatterError::UnknownDimension(d.clone()))
            })
            .collect()
    }
}

impl IoBackend for MemBackend {
    fn define_dim(&mut self, name: &str, size: Option<u64>) -> Result<(), ScatterError> {
        let mut store = self.store.lock().expect("store poisoned");
        if store.dims.contains_key(name) {
            // Collective definition: every rank defines the same dimension,
            // so a repeat with identical size is the expected case.
            let dim = &store.dims[name];
            let same = match size {
                None => dim.unlimited,
                Some(s) => !dim.unlimited && dim.size == s,
            };
            return if same {
                Ok(())
            } else {
                Err(ScatterError::DuplicateDimension(name.to_string()))
            };
        }
        if size.is_none() {
            if let Some(existing) = &store.unlimited {
                return Err(backend_err(format!(
                    "unlimited dimension `{existing}` already defined"
                )));
            }
            store.unlimited = Some(name.to_string());
        }
        store.dims.insert(
            name.to_string(),
            MemDim {
                size: size.unwrap_or(0),
                unlimited: size.is_none(),
            },
        );
        Ok(())
    }

    fn inquire_dim(&self, name: &str) -> Result<DimInfo, ScatterError> {
        let store = self.store.lock().expect("store poisoned");
        let dim = store
            .dims
            .get(name)
            .ok_or_else(|| ScatterError::UnknownDimension(name.to_string()))?;
        Ok(DimInfo {
            size: dim.size,
            is_unlimited: dim.unlimited,
        })
    }

    fn define_var(
        &mut self,
        name: &str,
        vtype: VarType,
        dims: &[&str],
    ) -> Result<(), ScatterError> {
        let mut store = self.store.lock().expect("store poisoned");
        if let Some(existing) = store.vars.get(name) {
            let same = existing.vtype == vtype && existing.dims == dims;
            return if same {
                Ok(())
            } else {
                Err(ScatterError::DuplicateVariable(name.to_string()))
            };
        }
        let mut fixed_elems: u64 = 1;
        for (i, d) in dims.iter().enumerate() {
            let dim = store
                .dims
                .get(*d)
                .ok_or_else(|| ScatterError::UnknownDimension(d.to_string()))?;
            if dim.unlimited {
                if i != 0 {
                    return Err(backend_err(format!(
                        "record dimension `{d}` must come first in variable `{name}`"
                    )));
                }
            } else {
                fixed_elems = fixed_elems.saturating_mul(dim.size);
            }
        }
        let has_record = dims
            .first()
            .map_or(false, |d| store.dims[*d].unlimited);
        let data = if has_record {
            Vec::new()
        } else {
            vec![0u8; fixed_elems as usize * vtype.size_bytes()]
        };
        store.vars.insert(
            name.to_string(),
            MemVar {
                vtype,
                dims: dims.iter().map(|d| d.to_string()).collect(),
                data,
            },
        );
        Ok(())
    }

    fn inquire_var(&self, name: &str) -> Result<VarInfo, ScatterError> {
        let store = self.store.lock().expect("store poisoned");
        let var = store
            .vars
            .get(name)
            .ok_or_else(|| ScatterError::UnknownVariable(name.to_string()))?;
        Ok(VarInfo {
            vtype: var.vtype,
            dims: var.dims.clone(),
        })
    }

    fn put_vara(
        &mut self,
        name: &str,
        start: &[u64],
        count: &[u64],
        data: &[u8],
    ) -> Result<(), ScatterError> {
        let mut store = self.store.lock().expect("store poisoned");
        let var = store
            .vars
            .get(name)
            .ok_or_else(|| ScatterError::UnknownVariable(name.to_string()))?;
        if start.len() != var.dims.len() || count.len() != var.dims.len() {
            return Err(backend_err(format!(
                "hyperslab rank does not match variable `{name}`"
            )));
        }
        let esize = var.vtype.size_bytes();
        let mut shape = store.var_shape(var)?;

        let record = var
            .dims
            .first()
            .map_or(false, |d| store.dims[d].unlimited);
        if record {
            // Writing at or past the end grows the record dimension.
            let needed = start[0] + count[0];
            shape[0] = shape[0].max(needed);
            let total = shape.iter().product::<u64>() as usize * esize;
            let dim_name = var.dims[0].clone();
            let var = store.vars.get_mut(name).expect("var just looked up");
            if var.data.len() < total {
                var.data.resize(total, 0);
            }
            let dim = store.dims.get_mut(&dim_name).expect("dim just looked up");
            dim.size = dim.size.max(needed);
        }

        for (d, (&s, &c)) in start.iter().zip(count).enumerate() {
            if s + c > shape[d] {
                return Err(ScatterError::HyperslabOutOfBounds(name.to_string()));
            }
        }
        let total: u64 = count.iter().product();
        if data.len() != total as usize * esize {
            return Err(ScatterError::BufferSizeMismatch {
                expected: total as usize * esize,
                got: data.len(),
            });
        }

        let var = store.vars.get_mut(name).expect("var just looked up");
        let mut cursor = 0usize;
        walk_hyperslab(&shape, start, count, |off, run| {
            let bytes = run * esize;
            var.data[off * esize..off * esize + bytes]
                .copy_from_slice(&data[cursor..cursor + bytes]);
            cursor += bytes;
        });
        Ok(())
    }

    fn get_vara(
        &self,
        name: &str,
        start: &[u64],
        count: &[u64],
        data: &mut [u8],
    ) -> Result<(), ScatterError> {
        let store = self.store.lock().expect("store poisoned");
        let var = store
            .vars
            .get(name)
            .ok_or_else(|| ScatterError::UnknownVariable(name.to_string()))?;
        if start.len() != var.dims.len() || count.len() != var.dims.len() {
            return Err(backend_err(format!(
                "hyperslab rank does not match variable `{name}`"
            )));
        }
        let esize = var.vtype.size_bytes();
        let shape = store.var_shape(var)?;
        for (d, (&s, &c)) in start.iter().zip(count).enumerate() {
            if s + c > shape[d] {
                return Err(ScatterError::HyperslabOutOfBounds(name.to_string()));
            }
        }
        let total: u64 = count.iter().product();
        if data.len() != total as usize * esize {
            return Err(ScatterError::BufferSizeMismatch {
                expected: total as usize * esize,
                got: data.len(),
            });
        }

        // Records grown by another variable but never written here read back
        // as fill bytes, so copies are clamped to the written extent.
        let written = var.data.len();
        let mut cursor = 0usize;
        walk_hyperslab(&shape, start, count, |off, run| {
            let bytes = run * esize;
            let lo = (off * esize).min(written);
            let hi = (off * esize + bytes).min(written);
            let avail = hi - lo;
            data[cursor..cursor + avail].copy_from_slice(&var.data[lo..hi]);
            data[cursor + avail..cursor + bytes].fill(0);
            cursor += bytes;
        });
        Ok(())
    }

    fn sync(&mut self) -> Result<(), ScatterError> {
        Ok(())
    }
}

/// Visit the contiguous element runs of a row-major hyperslab.
///
/// Calls `f(flat_element_offset, run_length_in_elements)` once per run, in
/// the order the flat caller buffer is laid out.
fn walk_hyperslab(shape: &[u64], start: &[u64], count: &[u64], mut f: impl FnMut(usize, usize)) {
    let ndims = shape.len();
    if ndims == 0 {
        f(0, 1);
        return;
    }
    if count.iter().any(|&c| c == 0) {
        return;
    }
    let mut strides = vec![1u64; ndims];
    for d in (0..ndims - 1).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    let outer = ndims - 1;
    let run = count[outer] as usize;
    let mut idx = vec![0u64; outer];
    'runs: loop {
        let mut off = start[outer];
        for d in 0..outer {
            off += (start[d] + idx[d]) * strides[d];
        }
        f(off as usize, run);
        for pos in (0..outer).rev() {
            idx[pos] += 1;
            if idx[pos] < count[pos] {
                continue 'runs;
            }
            idx[pos] = 0;
        }
        break;
    }
}
