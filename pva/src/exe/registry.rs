//! Image registry.
//!
//! The fixed-capacity table of loaded executables. A slot index is an
//! image's external identity; a 32-bit allocation bitmap tracks which
//! slots are in use. One mutex guards all structural mutation; the bitmap
//! is additionally mirrored through an atomic so registration queries
//! never take the lock.
//!
//! # Locking
//!
//! - `is_registered` is a lock-free atomic bit test.
//! - Everything that can race with unload's teardown (lookups, reference
//!   acquire/release) takes the registry mutex, so no caller ever observes
//!   an image mid-teardown.
//! - Unload re-checks the reference counters *after* taking the lock; an
//!   acquire that saw `registered == true` has therefore already counted.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use crate::config::MAX_VPU_EXECUTABLES;
use crate::error::{PvaError, Result};
use crate::exe::bin_info::VpuBinInfo;
use crate::exe::buffer::ElfBuffer;
use crate::exe::image::{ElfImage, RefSide};
use crate::memory::DmaAllocator;

/// Reference to an image in firmware-facing calls.
///
/// `None` means "no image": symbol resolution is skipped and the binary
/// info address resolves to the shared empty descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRef {
    /// No image; resolve to the no-op descriptor
    None,
    /// A loaded image by id
    Id(u16),
}

struct ImageSlots {
    images: [Option<ElfImage>; MAX_VPU_EXECUTABLES],
}

/// Registry of loaded VPU executables for one device context.
pub struct ElfContext {
    /// Slot table; all structural mutation happens under this lock
    slots: Mutex<ImageSlots>,
    /// Allocation bitmap: bit i set iff slot i is in use.
    /// Written only under the slot lock, read lock-free.
    alloctable: AtomicU32,
    /// Where device-visible buffers come from
    allocator: Arc<dyn DmaAllocator>,
    /// Shared empty descriptor for [`ImageRef::None`]
    noop_info: ElfBuffer,
}

const EMPTY_SLOT: Option<ElfImage> = None;

impl ElfContext {
    /// Create a registry, allocating the shared no-op descriptor.
    pub fn new(allocator: Arc<dyn DmaAllocator>) -> Result<Self> {
        let mut noop_info = ElfBuffer::new(allocator.clone());
        noop_info.push_segment(VpuBinInfo::default().as_bytes(), VpuBinInfo::SIZE);
        noop_info.commit()?;
        if noop_info.iova().is_none() {
            return Err(PvaError::OutOfMemory);
        }

        Ok(Self {
            slots: Mutex::new(ImageSlots {
                images: [EMPTY_SLOT; MAX_VPU_EXECUTABLES],
            }),
            alloctable: AtomicU32::new(0),
            allocator,
            noop_info,
        })
    }

    /// Load a VPU executable and register it.
    ///
    /// The slot is reserved first so no concurrent loader can claim the
    /// same id; parsing and buffer fill then run outside the lock. Any
    /// failure after reservation releases the slot and every
    /// partially-allocated buffer before returning.
    pub fn load_image(&self, raw: &[u8]) -> Result<u16> {
        let id = self.reserve_slot()?;

        let mut image = match ElfImage::load(id, raw, self.allocator.clone()) {
            Ok(image) => image,
            Err(err) => {
                self.release_slot(id);
                return Err(err);
            }
        };

        image.log_segments();
        let num_symbols = image.symbols().len();

        // Registration is the last step: once the image is visible in its
        // slot it is complete, and the id escapes only via our return.
        image.mark_registered();
        self.slots.lock().images[id as usize] = Some(image);

        log::debug!("loaded vpu exe {} ({} symbols)", id, num_symbols);
        Ok(id)
    }

    /// Unload a registered executable.
    ///
    /// Fails with [`PvaError::Busy`] while either reference counter is
    /// nonzero; the caller retries after draining. Fail-fast keeps the
    /// registry lock from being held across an unbounded wait.
    pub fn unload_image(&self, id: u16) -> Result<()> {
        let mut slots = self.slots.lock();

        if !self.is_registered(id) {
            return Err(PvaError::NotRegistered);
        }
        let Some(image) = &slots.images[id as usize] else {
            // Bit set but slot empty: a concurrent load still owns it.
            return Err(PvaError::NotRegistered);
        };

        // Re-check under the lock: any acquire that saw the image
        // registered has already incremented one of these.
        let (user, task) = (image.user_refs(), image.submit_refs());
        if task != 0 {
            log::warn!("vpu exe {}: unload blocked by {} task refs", id, task);
            return Err(PvaError::Busy);
        }
        if user != 0 {
            log::warn!("vpu exe {}: unload blocked by {} user refs", id, user);
            return Err(PvaError::Busy);
        }

        let image = slots.images[id as usize].take();
        self.alloctable.fetch_and(!(1 << id), Ordering::SeqCst);
        drop(slots);

        // The slot is vacated; device buffers go back outside the lock.
        drop(image);
        log::debug!("unloaded vpu exe {}", id);
        Ok(())
    }

    /// Force-unload every image at context teardown.
    ///
    /// Does not wait for in-flight references; teardown assumes no
    /// hardware activity remains.
    pub fn unload_all(&self) {
        let mut slots = self.slots.lock();
        let mut drained: Vec<ElfImage> = Vec::new();

        for slot in slots.images.iter_mut() {
            if let Some(image) = slot.take() {
                if !image.is_idle() {
                    log::warn!(
                        "force-unloading vpu exe {} (user={}, task={})",
                        image.id(),
                        image.user_refs(),
                        image.submit_refs(),
                    );
                }
                drained.push(image);
            }
        }
        self.alloctable.store(0, Ordering::SeqCst);
        drop(slots);

        drop(drained);
    }

    /// Lock-free registration test, safe for arbitrary untrusted ids.
    pub fn is_registered(&self, id: u16) -> bool {
        (id as usize) < MAX_VPU_EXECUTABLES
            && (self.alloctable.load(Ordering::SeqCst) >> id) & 1 == 1
    }

    /// Number of currently allocated slots.
    pub fn loaded_count(&self) -> u32 {
        self.alloctable.load(Ordering::SeqCst).count_ones()
    }

    /// Take a user-mode handle reference.
    pub fn acquire_user_ref(&self, id: u16) -> Result<()> {
        self.acquire_ref(id, RefSide::User)
    }

    /// Drop a user-mode handle reference.
    pub fn release_user_ref(&self, id: u16) -> Result<()> {
        self.release_ref(id, RefSide::User)
    }

    /// Take a task reference for a firmware submission.
    pub fn acquire_task_ref(&self, id: u16) -> Result<()> {
        self.acquire_ref(id, RefSide::Task)
    }

    /// Drop a task reference when the task completes or is aborted.
    pub fn release_task_ref(&self, id: u16) -> Result<()> {
        self.release_ref(id, RefSide::Task)
    }

    fn acquire_ref(&self, id: u16, side: RefSide) -> Result<()> {
        self.with_registered(id, |image| {
            image.acquire(side);
            Ok(())
        })
    }

    fn release_ref(&self, id: u16, side: RefSide) -> Result<()> {
        self.with_registered(id, |image| image.release(side))
    }

    /// Resolve a symbol name to its (id, size) pair.
    pub fn get_symbol(&self, id: u16, name: &str) -> Result<(u16, u32)> {
        self.with_registered(id, |image| {
            image
                .symbols()
                .find(name)
                .map(|sym| (sym.id, sym.size))
                .ok_or(PvaError::NotFound)
        })
    }

    /// VMEM address of a symbol by dense id.
    pub fn get_symbol_offset(&self, image: ImageRef, sym_id: u16) -> Result<u32> {
        match image {
            // No symbol resolution required.
            ImageRef::None => Ok(0),
            ImageRef::Id(id) => self.with_registered(id, |image| {
                image
                    .symbols()
                    .by_id(sym_id)
                    .map(|sym| sym.addr)
                    .ok_or(PvaError::NotFound)
            }),
        }
    }

    /// IOVA of the binary info descriptor firmware reads at submission.
    pub fn get_bin_info_addr(&self, image: ImageRef) -> Result<u64> {
        match image {
            ImageRef::None => self.noop_info.iova().ok_or(PvaError::OutOfMemory),
            ImageRef::Id(id) => self.with_registered(id, |image| {
                image.bin_info_iova().ok_or(PvaError::NotRegistered)
            }),
        }
    }

    /// Reserve the lowest free slot.
    fn reserve_slot(&self) -> Result<u16> {
        let _slots = self.slots.lock();
        let table = self.alloctable.load(Ordering::SeqCst);
        let id = (!table).trailing_zeros();
        if id as usize >= MAX_VPU_EXECUTABLES {
            return Err(PvaError::CapacityExhausted);
        }
        self.alloctable.store(table | (1 << id), Ordering::SeqCst);
        Ok(id as u16)
    }

    /// Release a slot reserved by [`reserve_slot`](Self::reserve_slot)
    /// whose load failed before installation.
    fn release_slot(&self, id: u16) {
        let _slots = self.slots.lock();
        self.alloctable.fetch_and(!(1 << id), Ordering::SeqCst);
    }

    /// Run `f` against a registered image, holding the registry lock.
    fn with_registered<R>(&self, id: u16, f: impl FnOnce(&ElfImage) -> Result<R>) -> Result<R> {
        let slots = self.slots.lock();
        let image = slots
            .images
            .get(id as usize)
            .and_then(|slot| slot.as_ref())
            .filter(|image| image.is_registered())
            .ok_or(PvaError::NotRegistered)?;
        f(image)
    }
}

impl Drop for ElfContext {
    fn drop(&mut self) {
        self.unload_all();
    }
}
