/// Fence trait - monotonically increasing GPU timeline

use std::any::Any;
use crate::error::Result;

/// GPU-signaled counter
///
/// The queue raises the counter to the value scheduled with
/// `GraphicsDevice::submit` once the submitted work has completed.
pub trait Fence: Send + Sync {
    /// Highest value signaled so far
    fn completed_value(&self) -> Result<u64>;

    /// Block until the counter reaches `value`
    ///
    /// Unbounded: there is no timeout and no cancellation.
    fn wait(&self, value: u64) -> Result<()>;

    /// Downcast hook for backends
    fn as_any(&self) -> &dyn Any;
}
