//! Segment buffers.
//!
//! An [`ElfBuffer`] stages one or more ELF segments in host memory, then
//! commits the staged bytes to a single device-resident allocation. The
//! staging copy may grow segment by segment; the device allocation is made
//! once, when the final size is known.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::DMA_ALIGN;
use crate::error::Result;
use crate::memory::{DmaAllocator, DmaHandle};

/// One per-image buffer holding the segments of a single kind.
///
/// Dropping the buffer returns the committed device allocation to its
/// allocator.
pub struct ElfBuffer {
    allocator: Arc<dyn DmaAllocator>,
    /// Committed device allocation, if any
    handle: Option<DmaHandle>,
    /// Staging copy of the segment bytes
    local: Vec<u8>,
    /// Number of segments staged into this buffer
    num_segments: u32,
}

impl ElfBuffer {
    /// Create an empty, uncommitted buffer.
    pub fn new(allocator: Arc<dyn DmaAllocator>) -> Self {
        Self {
            allocator,
            handle: None,
            local: Vec::new(),
            num_segments: 0,
        }
    }

    /// Stage one segment's bytes, zero-extended to `mem_size`.
    ///
    /// Each segment starts at a DMA-aligned offset within the buffer.
    /// Returns the offset the segment was placed at.
    pub fn push_segment(&mut self, bytes: &[u8], mem_size: usize) -> usize {
        let offset = align_up(self.local.len(), DMA_ALIGN);
        let total = offset + mem_size.max(bytes.len());

        self.local.resize(offset, 0);
        self.local.extend_from_slice(bytes);
        self.local.resize(total, 0);
        self.num_segments += 1;

        offset
    }

    /// Commit the staged bytes to a device-resident allocation.
    ///
    /// A buffer with nothing staged commits to nothing and stays without a
    /// device address. Committing twice is a no-op.
    pub fn commit(&mut self) -> Result<()> {
        if self.local.is_empty() || self.handle.is_some() {
            return Ok(());
        }

        let handle = self.allocator.allocate(self.local.len())?;
        handle.write(0, &self.local);
        self.handle = Some(handle);

        Ok(())
    }

    /// Device address of the committed allocation.
    pub fn iova(&self) -> Option<u64> {
        self.handle.map(|h| h.iova)
    }

    /// Size of the committed allocation, zero if uncommitted.
    pub fn committed_size(&self) -> usize {
        self.handle.map_or(0, |h| h.size)
    }

    /// Unaligned size of the staging copy.
    pub fn staged_len(&self) -> usize {
        self.local.len()
    }

    /// Number of segments staged into this buffer.
    pub fn num_segments(&self) -> u32 {
        self.num_segments
    }

    /// Committed bytes, if the buffer has been committed.
    pub fn committed_bytes(&self) -> Option<&[u8]> {
        self.handle.as_ref().map(|h| h.as_slice())
    }
}

impl Drop for ElfBuffer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.allocator.free(&handle);
        }
    }
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}
