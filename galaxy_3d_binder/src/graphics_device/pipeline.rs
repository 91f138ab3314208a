/// Pipeline trait - opaque pipeline handle

use std::any::Any;

/// Kind of work a pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
}

/// Pipeline compiled outside of the binding layer
///
/// Shader compilation and pipeline creation belong to the caller; the
/// binding layer only binds the result. Backends wrap their native handle.
pub trait Pipeline: Send + Sync {
    fn bind_point(&self) -> PipelineBindPoint;

    /// Downcast hook for backends
    fn as_any(&self) -> &dyn Any;
}
