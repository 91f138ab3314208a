/// Renderer module - orchestrator, resource registry and statistics

pub mod renderer;
pub mod resource_registry;
pub mod stats;

pub use renderer::*;
pub use resource_registry::*;
pub use stats::*;
