//! Loaded executable images.
//!
//! An [`ElfImage`] owns everything one loaded VPU executable needs on the
//! device: its segment buffers, its symbol table, and the binary info
//! descriptor firmware reads at task submission. Reference counts track
//! the two client categories that can keep an image alive.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{PvaError, Result};
use crate::exe::bin_info::VpuBinInfo;
use crate::exe::buffer::ElfBuffer;
use crate::exe::symbols::SymbolTable;
use crate::loader::elf::{VpuElfLoader, VpuSegmentKind, NUM_SEGMENT_KINDS};
use crate::memory::DmaAllocator;

/// Which client category holds a reference.
///
/// User handles and firmware task submissions have different release
/// paths; counting them separately keeps "who is blocking the unload"
/// answerable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSide {
    /// User-mode handle
    User,
    /// In-flight hardware task
    Task,
}

impl RefSide {
    pub fn name(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Task => "task",
        }
    }
}

/// One loaded VPU executable.
pub struct ElfImage {
    /// Slot index, doubling as the external id
    id: u16,
    /// True between successful load and the start of unload
    registered: bool,
    /// Outstanding user-mode handle references
    user_refs: AtomicU32,
    /// Outstanding hardware task references
    submit_refs: AtomicU32,
    /// Device buffer holding the binary info descriptor
    bin_info_buffer: ElfBuffer,
    /// Per-kind segment buffers (code, data, in_params)
    segment_buffers: [ElfBuffer; NUM_SEGMENT_KINDS],
    /// Exported symbols
    symbols: SymbolTable,
}

impl ElfImage {
    /// Parse `raw` and build a fully-populated, not-yet-registered image.
    ///
    /// On any failure the partially-built buffers are dropped, returning
    /// their device allocations; nothing leaks.
    pub(crate) fn load(id: u16, raw: &[u8], allocator: Arc<dyn DmaAllocator>) -> Result<Self> {
        let exe = VpuElfLoader::parse(raw)?;

        let mut segment_buffers = [
            ElfBuffer::new(allocator.clone()),
            ElfBuffer::new(allocator.clone()),
            ElfBuffer::new(allocator.clone()),
        ];
        for kind in VpuSegmentKind::ALL {
            let buffer = &mut segment_buffers[kind as usize];
            for segment in exe.segments_of(kind) {
                let bytes = VpuElfLoader::segment_data(raw, segment);
                buffer.push_segment(bytes, segment.mem_size as usize);
            }
            buffer.commit()?;
        }

        let mut symbols = SymbolTable::new();
        for sym in &exe.symbols {
            symbols.insert(&sym.name, sym.addr, sym.size)?;
        }

        let info = VpuBinInfo {
            code_base: segment_buffers[VpuSegmentKind::Code as usize]
                .iova()
                .unwrap_or(0),
            data_base: segment_buffers[VpuSegmentKind::Data as usize]
                .iova()
                .unwrap_or(0),
            params_base: segment_buffers[VpuSegmentKind::InParams as usize]
                .iova()
                .unwrap_or(0),
            code_size: segment_buffers[VpuSegmentKind::Code as usize].committed_size() as u32,
            data_size: segment_buffers[VpuSegmentKind::Data as usize].committed_size() as u32,
            params_size: segment_buffers[VpuSegmentKind::InParams as usize].committed_size()
                as u32,
            num_symbols: symbols.len() as u32,
        };
        let mut bin_info_buffer = ElfBuffer::new(allocator);
        bin_info_buffer.push_segment(info.as_bytes(), VpuBinInfo::SIZE);
        bin_info_buffer.commit()?;

        Ok(Self {
            id,
            registered: false,
            user_refs: AtomicU32::new(0),
            submit_refs: AtomicU32::new(0),
            bin_info_buffer,
            segment_buffers,
            symbols,
        })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// True between successful load and the start of unload.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn mark_registered(&mut self) {
        self.registered = true;
    }

    /// IOVA of the binary info descriptor.
    pub fn bin_info_iova(&self) -> Option<u64> {
        self.bin_info_buffer.iova()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// One of the per-kind segment buffers.
    pub fn segment_buffer(&self, kind: VpuSegmentKind) -> &ElfBuffer {
        &self.segment_buffers[kind as usize]
    }

    /// Take a reference on behalf of one client category.
    ///
    /// Callers must hold the registry lock and have checked registration;
    /// the increment itself can then not race with unload.
    pub(crate) fn acquire(&self, side: RefSide) {
        let counter = self.counter(side);
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop a reference previously taken with [`acquire`](Self::acquire).
    ///
    /// An underflowing release is a caller bug and is surfaced as
    /// [`PvaError::RefCountUnderflow`] without changing the counter.
    pub(crate) fn release(&self, side: RefSide) -> Result<()> {
        let counter = self.counter(side);
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .map_err(|_| {
                log::error!("vpu exe {}: {} refcount underflow", self.id, side.name());
                PvaError::RefCountUnderflow
            })?;
        Ok(())
    }

    /// Outstanding user-mode references.
    pub fn user_refs(&self) -> u32 {
        self.user_refs.load(Ordering::SeqCst)
    }

    /// Outstanding task references.
    pub fn submit_refs(&self) -> u32 {
        self.submit_refs.load(Ordering::SeqCst)
    }

    /// True when no client of either category holds a reference.
    pub fn is_idle(&self) -> bool {
        self.user_refs() == 0 && self.submit_refs() == 0
    }

    fn counter(&self, side: RefSide) -> &AtomicU32 {
        match side {
            RefSide::User => &self.user_refs,
            RefSide::Task => &self.submit_refs,
        }
    }

    /// Log the segment layout of this image.
    pub fn log_segments(&self) {
        for kind in VpuSegmentKind::ALL {
            let buffer = &self.segment_buffers[kind as usize];
            log::debug!(
                "vpu exe {}: {} segments={} size={} iova={:#x}",
                self.id,
                kind.name(),
                buffer.num_segments(),
                buffer.committed_size(),
                buffer.iova().unwrap_or(0),
            );
        }
    }
}
