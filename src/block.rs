// Copyright (c) 2025 Canopy Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Memory-mapped byte view over an index file.
//!
//! An index file can be larger than a single comfortable mapping, so the file
//! is stitched from one or more contiguous read-only mappings and exposed as
//! one logical little-endian address space indexed by a 64-bit offset. The
//! block size is always a whole multiple of the node size, which means a read
//! that starts inside a node can never cross a block boundary; callers only
//! ever read node-relative fields.
//!
//! # Safety
//!
//! [`BlockReader::f32_slice`] reinterprets mapped bytes as `&[f32]` without
//! copying. This is sound because:
//! - every mapping starts page-aligned and every read offset is a multiple
//!   of 4 (node sizes are multiples of 4, and all fields are 4-byte cells)
//! - the target platform is little-endian, matching the file format
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::fs::File;
//! use canopy::block::BlockReader;
//!
//! fn main() -> canopy::Result<()> {
//!     let file = File::open("points.annoy")?;
//!     let view = BlockReader::map(&file, 1 << 20)?;
//!     let descendants = view.read_i32(0);
//!     println!("first node has {} descendants", descendants);
//!     Ok(())
//! }
//! ```

use memmap2::{Mmap, MmapOptions};
use std::fs::File;

use crate::error::Result;

/// Read-only view of a file as one logical address space.
///
/// Holds one mapping per block; all blocks are exactly `block_bytes` long
/// except the last, which may be short.
#[derive(Debug)]
pub struct BlockReader {
    blocks: Vec<Mmap>,
    block_bytes: u64,
    len: u64,
}

impl BlockReader {
    /// Map `file` in blocks of `block_bytes` bytes.
    ///
    /// `block_bytes` must be a whole multiple of the node size so that
    /// node-relative reads never straddle two mappings; the loader upholds
    /// this. A file no larger than one block gets a single mapping.
    ///
    /// # Errors
    ///
    /// Returns `CanopyError::Io` if the file cannot be inspected or mapped.
    pub fn map(file: &File, block_bytes: u64) -> Result<Self> {
        let len = file.metadata()?.len();
        let mut blocks = Vec::with_capacity(len.div_ceil(block_bytes.max(1)) as usize);

        let mut position = 0u64;
        while position < len {
            let size = (len - position).min(block_bytes);
            // Safety: the mapping is read-only and the file is never
            // truncated while the view is alive (the index is immutable).
            let mmap = unsafe {
                MmapOptions::new()
                    .offset(position)
                    .len(size as usize)
                    .map(file)?
            };
            blocks.push(mmap);
            position += size;
        }

        Ok(Self {
            blocks,
            block_bytes,
            len,
        })
    }

    /// Total length of the underlying file in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file is empty (the loader rejects this before mapping).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of mappings backing the view.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes `[pos, pos + len)` of the logical address space.
    ///
    /// # Panics
    ///
    /// Panics if the range leaves the file or crosses a block boundary;
    /// offsets are validated at load, so either is a programmer error.
    #[inline]
    fn bytes(&self, pos: u64, len: usize) -> &[u8] {
        let block = (pos / self.block_bytes) as usize;
        let offset = (pos % self.block_bytes) as usize;
        &self.blocks[block][offset..offset + len]
    }

    /// Read a little-endian `i32` at `pos`.
    #[inline]
    pub fn read_i32(&self, pos: u64) -> i32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.bytes(pos, 4));
        i32::from_le_bytes(buf)
    }

    /// Read a little-endian IEEE-754 `f32` at `pos`.
    #[inline]
    pub fn read_f32(&self, pos: u64) -> f32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.bytes(pos, 4));
        f32::from_le_bytes(buf)
    }

    /// View `count` consecutive floats at `pos` without copying.
    ///
    /// # Panics
    ///
    /// Panics if the range leaves the file or crosses a block boundary.
    #[inline]
    pub fn f32_slice(&self, pos: u64, count: usize) -> &[f32] {
        let bytes = self.bytes(pos, count * std::mem::size_of::<f32>());
        debug_assert_eq!(bytes.as_ptr() as usize % std::mem::align_of::<f32>(), 0);
        // Safety: bounds checked by `bytes`; 4-byte alignment holds because
        // mappings are page-aligned and all offsets are multiples of 4; the
        // format and the platform are both little-endian.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, count) }
    }

    /// Copy `out.len()` consecutive floats at `pos` into `out`.
    #[inline]
    pub fn read_vector_into(&self, pos: u64, out: &mut [f32]) {
        out.copy_from_slice(self.f32_slice(pos, out.len()));
    }
}
