/// Swapchain trait - for window presentation

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{Texture, TextureFormat};

/// Swapchain for presenting rendered images to a window
///
/// Back buffers start in the `Present` state. The renderer moves the acquired
/// one to `ColorOutput` in `record_begin` and back in `record_end`.
pub trait Swapchain: Send + Sync {
    /// Acquire the next available back buffer index
    fn acquire_next_image(&mut self) -> Result<u32>;

    /// Back buffer texture at `index`
    fn back_buffer(&self, index: u32) -> Option<Arc<dyn Texture>>;

    /// Present the back buffer at `index`
    ///
    /// Must be called after the frame that rendered into it was submitted.
    fn present(&mut self, index: u32) -> Result<()>;

    /// Get the number of images in the swapchain
    fn image_count(&self) -> usize;

    /// Width and height of the back buffers in pixels
    fn extent(&self) -> (u32, u32);

    /// Get the pixel format of the back buffers
    fn format(&self) -> TextureFormat;
}
