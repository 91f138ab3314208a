/*!
# Galaxy 3D Binder

Resource binding and frame synchronization core of the Galaxy 3D renderer.

This crate is backend-agnostic: GPU objects are reached through the traits of
the graphics device seam, implemented by backend crates (Vulkan) and by the
mock device used in tests.

## Architecture

- **State tracker**: per-subresource access states, barriers and resolves
- **Descriptor heaps**: static and per-frame bump allocators of binding slots
- **Uniform allocator**: 256-byte aligned bump allocation in mapped buffers
- **Frame pipeline**: N frame slots on one timeline fence, plus an immediate
  context for one-off uploads
- **Pass bindings**: static/dynamic descriptor tiers driven by dirty flags
- **Renderer**: owns all of the above and records into the active frame
*/

// Internal modules
mod error;
mod engine;
mod config;
pub mod log;
pub mod descriptor;
pub mod graphics_device;
pub mod state;
pub mod uniform;
pub mod frame;
pub mod pass;
pub mod renderer;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::Engine;

    // Renderer orchestrator and its configuration
    pub use crate::renderer::Renderer;
    pub use crate::config::{
        Config, DebugMessageFilter, DebugOutput, DebugSeverity, FatalAction, MAX_FRAMES_IN_FLIGHT,
    };

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger, MemoryLogger};
    }

    // Render sub-module with all binding and synchronization types
    pub mod render {
        pub use crate::descriptor::*;
        pub use crate::frame::*;
        pub use crate::graphics_device::*;
        pub use crate::pass::*;
        pub use crate::renderer::*;
        pub use crate::state::*;
        pub use crate::uniform::*;
    }

    // Mock device sub-module (no GPU required)
    pub mod mock {
        pub use crate::graphics_device::mock_graphics_device::*;
    }
}
