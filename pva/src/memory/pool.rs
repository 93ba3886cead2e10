//! Coherent memory pool.
//!
//! Hands out zeroed, aligned (virtual, IOVA) buffer pairs from a fixed
//! capacity budget. IOVAs are carved monotonically out of a device window
//! starting at [`DMA_IOVA_BASE`](crate::config::DMA_IOVA_BASE); the window
//! is not recycled, but freed bytes do return to the capacity budget.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};

use spin::Mutex;

use crate::config::{DMA_ALIGN, DMA_IOVA_BASE};
use crate::error::{PvaError, Result};
use crate::memory::{DmaAllocator, DmaHandle};

/// Fixed-budget coherent memory pool.
pub struct DmaPool {
    inner: Mutex<PoolInner>,
    capacity: usize,
}

struct PoolInner {
    /// Bytes currently allocated
    used: usize,
    /// Next IOVA to hand out
    next_iova: u64,
    /// Outstanding allocations
    live: usize,
}

impl DmaPool {
    /// Create a pool with a capacity budget in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                used: 0,
                next_iova: DMA_IOVA_BASE,
                live: 0,
            }),
            capacity,
        }
    }

    /// Bytes currently allocated.
    pub fn used(&self) -> usize {
        self.inner.lock().used
    }

    /// Number of outstanding allocations.
    pub fn live_allocations(&self) -> usize {
        self.inner.lock().live
    }

    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, DMA_ALIGN).ok()
    }
}

impl DmaAllocator for DmaPool {
    fn allocate(&self, size: usize) -> Result<DmaHandle> {
        // Round up so every allocation stays DMA-aligned end to end.
        let aligned = size
            .checked_add(DMA_ALIGN - 1)
            .ok_or(PvaError::OutOfMemory)?
            & !(DMA_ALIGN - 1);
        let aligned = aligned.max(DMA_ALIGN);

        let mut inner = self.inner.lock();
        if self.capacity.saturating_sub(inner.used) < aligned {
            return Err(PvaError::OutOfMemory);
        }
        let layout = Self::layout(aligned).ok_or(PvaError::OutOfMemory)?;

        // SAFETY: layout has nonzero size.
        let va = unsafe { alloc_zeroed(layout) };
        if va.is_null() {
            return Err(PvaError::OutOfMemory);
        }

        let iova = inner.next_iova;
        inner.next_iova += aligned as u64;
        inner.used += aligned;
        inner.live += 1;

        Ok(DmaHandle {
            iova,
            va,
            size: aligned,
        })
    }

    fn free(&self, handle: &DmaHandle) {
        let mut inner = self.inner.lock();
        inner.used = inner.used.saturating_sub(handle.size);
        inner.live = inner.live.saturating_sub(1);

        if let Some(layout) = Self::layout(handle.size) {
            // SAFETY: the handle came out of allocate() with this exact layout.
            unsafe { dealloc(handle.va, layout) };
        }
    }
}

impl Drop for DmaPool {
    fn drop(&mut self) {
        let inner = self.inner.lock();
        if inner.live != 0 {
            log::warn!(
                "dma pool dropped with {} live allocations ({} bytes)",
                inner.live,
                inner.used
            );
        }
    }
}
