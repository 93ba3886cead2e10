//! DMA-capable memory.
//!
//! Segment buffers must be visible to both the host (to fill them) and the
//! device (to execute from them). This module provides the allocator seam
//! used by the registry plus one concrete pool implementation.

pub mod pool;

pub use pool::DmaPool;

use crate::error::Result;

/// A device-visible buffer mapping.
///
/// Pairs the device (IOVA) address with the host virtual address of the
/// same bytes. Valid from [`DmaAllocator::allocate`] until the matching
/// [`DmaAllocator::free`].
#[derive(Debug, Clone, Copy)]
pub struct DmaHandle {
    /// IOVA the device uses to address the buffer
    pub iova: u64,
    /// Host virtual address of the buffer
    pub va: *mut u8,
    /// Allocation size in bytes (aligned)
    pub size: usize,
}

// A handle describes an exclusively-owned coherent allocation; the owner
// is responsible for synchronizing access to the bytes.
unsafe impl Send for DmaHandle {}
unsafe impl Sync for DmaHandle {}

impl DmaHandle {
    /// Copy `src` into the buffer at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + src.len()` exceeds the allocation.
    pub fn write(&self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= self.size);
        // SAFETY: range checked above; the allocation is exclusively owned
        // by the holder of this handle.
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), self.va.add(offset), src.len());
        }
    }

    /// View the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: va/size describe one live allocation owned by the holder.
        unsafe { core::slice::from_raw_parts(self.va, self.size) }
    }
}

/// Allocator of device-visible memory.
///
/// The registry is generic over where coherent memory comes from; platform
/// code supplies the real allocator, tests use [`DmaPool`].
pub trait DmaAllocator: Send + Sync {
    /// Allocate `size` zeroed bytes of device-visible memory.
    fn allocate(&self, size: usize) -> Result<DmaHandle>;

    /// Return a region produced by [`allocate`](Self::allocate).
    fn free(&self, handle: &DmaHandle);
}
