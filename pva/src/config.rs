//! PVA configuration constants.
//!
//! This module contains compile-time limits and memory layout parameters
//! for the VPU executable registry. Values here mirror hardware-imposed
//! bounds; changing them changes what firmware will accept.

/// Maximum number of concurrently loaded VPU executables.
///
/// The slot index doubles as the executable's external identity, so this
/// bound also caps the id space.
pub const MAX_VPU_EXECUTABLES: usize = 32;

/// Maximum number of exported symbols per executable.
pub const MAX_SYMBOLS: usize = 128;

/// Maximum length of an exported symbol name, in bytes.
pub const MAX_SYMBOL_NAME_LEN: usize = 64;

/// Alignment of device-visible buffer allocations, in bytes.
pub const DMA_ALIGN: usize = 64;

/// Base of the IOVA window device addresses are handed out from.
pub const DMA_IOVA_BASE: u64 = 0x4000_0000;
