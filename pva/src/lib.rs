//! PVA VPU executable image registry.
//!
//! This crate manages the executable images a PVA accelerator's vector
//! processing units run: user-mode registers ELF binaries, the registry
//! parses and validates their segments, places them in device-visible
//! memory, resolves exported symbols, and hands firmware a compact
//! binary info descriptor per image at task submission.
//!
//! # Architecture
//!
//! - [`loader`]: ELF64 parsing and segment/symbol extraction
//! - [`memory`]: the DMA allocator seam and a coherent pool
//! - [`exe`]: segment buffers, symbol tables, images, and the registry
//! - [`ioctl`]: the user-mode request surface
//!
//! # Concurrency
//!
//! One [`exe::ElfContext`] exists per device context and is shared by
//! user-mode handlers and firmware-completion paths. Slot allocation is
//! capped at [`config::MAX_VPU_EXECUTABLES`] images; unloading an image
//! with outstanding task references fails fast with
//! [`PvaError::Busy`] rather than blocking under the registry lock.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod exe;
pub mod ioctl;
pub mod loader;
pub mod memory;

pub use error::{PvaError, Result};
pub use exe::{ElfContext, ImageRef};
pub use memory::{DmaAllocator, DmaPool};
