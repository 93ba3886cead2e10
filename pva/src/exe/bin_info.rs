//! Binary info descriptor.
//!
//! The firmware-readable summary of a loaded executable. One descriptor is
//! written into its own device buffer per image; firmware receives the
//! buffer's IOVA at task submission and reads segment locations from it.

use core::mem::size_of;

/// Firmware view of a loaded executable's segments.
///
/// Field order keeps the struct free of internal padding; the layout is
/// shared with firmware and must not change.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VpuBinInfo {
    /// IOVA of the code buffer, zero if the image has no code segment
    pub code_base: u64,
    /// IOVA of the data buffer, zero if absent
    pub data_base: u64,
    /// IOVA of the symbol parameter buffer, zero if absent
    pub params_base: u64,
    /// Committed size of the code buffer
    pub code_size: u32,
    /// Committed size of the data buffer
    pub data_size: u32,
    /// Committed size of the symbol parameter buffer
    pub params_size: u32,
    /// Number of exported symbols
    pub num_symbols: u32,
}

impl VpuBinInfo {
    /// Descriptor size in bytes.
    pub const SIZE: usize = size_of::<Self>();

    /// Raw bytes of the descriptor, for writing into a device buffer.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C) with no internal padding; lifetime tied to self.
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, Self::SIZE) }
    }
}
