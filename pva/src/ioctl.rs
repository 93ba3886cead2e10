//! User-mode request surface.
//!
//! The registry is driven from user-mode through a small request/response
//! protocol; this module is the dispatch layer between the two. Firmware
//! paths (task references, binary info, symbol offsets) call the registry
//! directly and do not go through here.

use crate::error::PvaError;
use crate::exe::registry::{ElfContext, ImageRef};

/// Reserved wire id meaning "no executable".
///
/// User-mode passes this where no image applies; it maps to
/// [`ImageRef::None`] and never collides with a slot index.
pub const NOOP_EXE_ID: u16 = u16::MAX;

/// Translate a wire-level executable id into a typed reference.
pub fn image_ref(wire_id: u16) -> ImageRef {
    if wire_id == NOOP_EXE_ID {
        ImageRef::None
    } else {
        ImageRef::Id(wire_id)
    }
}

/// Requests user-mode can issue against the registry.
#[derive(Debug, Clone, Copy)]
pub enum VpuRequest<'a> {
    // ==========================================
    // Executable lifecycle
    // ==========================================
    /// Register an executable from a raw ELF buffer.
    Register { data: &'a [u8] },
    /// Unregister an executable by id.
    Unregister { id: u16 },

    // ==========================================
    // Handle references
    // ==========================================
    /// Open a user handle to a registered executable.
    AcquireRef { id: u16 },
    /// Close a previously opened user handle.
    ReleaseRef { id: u16 },

    // ==========================================
    // Queries
    // ==========================================
    /// Resolve a symbol name to its numeric id and size.
    QuerySymbol { id: u16, name: &'a str },
}

/// Responses paired with [`VpuRequest`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpuResponse {
    /// Executable registered under the returned id
    Registered { id: u16 },
    /// Symbol resolved
    Symbol { id: u16, size: u32 },
    /// Request completed with no payload
    Done,
    /// Request failed
    Error(PvaError),
}

/// Dispatch one user-mode request against the registry.
pub fn dispatch(ctx: &ElfContext, request: VpuRequest<'_>) -> VpuResponse {
    let result = match request {
        VpuRequest::Register { data } => {
            return match ctx.load_image(data) {
                Ok(id) => VpuResponse::Registered { id },
                Err(err) => VpuResponse::Error(err),
            };
        }
        VpuRequest::Unregister { id } => ctx.unload_image(id),
        VpuRequest::AcquireRef { id } => ctx.acquire_user_ref(id),
        VpuRequest::ReleaseRef { id } => ctx.release_user_ref(id),
        VpuRequest::QuerySymbol { id, name } => {
            return match ctx.get_symbol(id, name) {
                Ok((sym_id, size)) => VpuResponse::Symbol { id: sym_id, size },
                Err(err) => VpuResponse::Error(err),
            };
        }
    };

    match result {
        Ok(()) => VpuResponse::Done,
        Err(err) => VpuResponse::Error(err),
    }
}
