//! VPU executable management.
//!
//! This module owns the lifecycle of loaded VPU executables:
//!
//! - **Segment buffers**: staging and device-resident copies of an image's
//!   code, data, and symbol parameter segments
//! - **Symbol tables**: name -> id/address resolution per image
//! - **Binary info descriptors**: the firmware-readable segment summary
//! - **The registry**: the fixed-capacity, reference-counted slot table
//!   user-mode registers into and firmware resolves against

pub mod bin_info;
pub mod buffer;
pub mod image;
pub mod registry;
pub mod symbols;

pub use bin_info::VpuBinInfo;
pub use buffer::ElfBuffer;
pub use image::{ElfImage, RefSide};
pub use registry::{ElfContext, ImageRef};
pub use symbols::{SymbolTable, VpuSymbol};
