//! Part planning for chunked copies

use crate::types::PartSpec;
use cloud_proxy_core::{Error, Result};

/// Byte ranges covering an object, in index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlan {
    pub total_length: u64,
    pub part_size: u64,
    pub parts: Vec<PartSpec>,
}

impl CopyPlan {
    /// Split `total_length` bytes into parts of at least `base_chunk_size`
    ///
    /// The part size grows so that the part count stays within `max_parts`.
    /// Every part but the last is exactly `part_size` bytes; the last one
    /// absorbs the remainder and so is between `part_size` and
    /// `2 * part_size - 1` bytes (or the whole object when it is smaller than
    /// one part).
    pub fn new(total_length: u64, base_chunk_size: u64, max_parts: u32) -> Result<Self> {
        if total_length == 0 {
            return Err(Error::configuration("cannot plan a copy of zero bytes"));
        }
        if base_chunk_size == 0 {
            return Err(Error::configuration("base chunk size must be greater than zero"));
        }
        if max_parts == 0 {
            return Err(Error::configuration("max parts must be greater than zero"));
        }

        let part_size = base_chunk_size.max(total_length.div_ceil(u64::from(max_parts)));
        let count = (total_length / part_size).max(1);

        let mut parts = Vec::with_capacity(count as usize);
        for i in 0..count {
            let offset = i * part_size;
            let length = if i + 1 == count {
                total_length - offset
            } else {
                part_size
            };
            parts.push(PartSpec {
                index: (i + 1) as u32,
                offset,
                count: length,
            });
        }

        Ok(Self {
            total_length,
            part_size,
            parts,
        })
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
