//! VPU ELF Binary Loader
//!
//! This module parses and validates ELF64 binaries built for the VPU:
//! segment extraction (code, data, symbol parameters) and exported-symbol
//! resolution from the symbol table.
//!
//! # Validation
//!
//! - Validates all ELF headers and offsets with checked arithmetic
//! - Classifies `PT_LOAD` segments by their permission flags
//! - Rejects symbols with over-long names or addresses outside the
//!   32-bit VMEM space

pub mod elf;

#[cfg(test)]
pub mod testing;

pub use elf::{ElfParseError, ElfSymbol, VpuElfLoader, VpuExecutable, VpuSegment, VpuSegmentKind};
