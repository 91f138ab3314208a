/// GraphicsDevice trait - backend factory and queue

use std::sync::Arc;

use crate::descriptor::DescriptorHeapKind;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, BufferDesc, CommandList, DescriptorStorage, Fence, Texture, TextureDesc,
};

/// Graphics device trait
///
/// Factory for GPU objects plus the submission queue. Shared between the
/// renderer and external collaborators as `Arc<dyn GraphicsDevice>`, so every
/// method takes `&self`; backends lock internally where the native API needs it.
pub trait GraphicsDevice: Send + Sync {
    /// Backend name, for logs ("vulkan", "mock", ...)
    fn backend_name(&self) -> &str;

    /// Create a texture
    ///
    /// # Arguments
    ///
    /// * `desc` - Texture descriptor
    ///
    /// # Returns
    ///
    /// A shared pointer to the created texture
    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create a buffer
    ///
    /// # Arguments
    ///
    /// * `desc` - Buffer descriptor
    ///
    /// # Returns
    ///
    /// A shared pointer to the created buffer
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create the device-level binding slot array for one heap kind
    ///
    /// # Arguments
    ///
    /// * `kind` - Kind of slots
    /// * `capacity` - Number of slots
    fn create_descriptor_storage(&self, kind: DescriptorHeapKind, capacity: u32) -> Result<Arc<dyn DescriptorStorage>>;

    /// Create a fence starting at `initial_value`
    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn Fence>>;

    /// Create a command list
    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    /// Submit recorded command lists and schedule `fence` to reach `signal_value`
    /// once they complete
    ///
    /// Command lists must have been ended.
    fn submit(&self, command_lists: &[&dyn CommandList], fence: &dyn Fence, signal_value: u64) -> Result<()>;

    /// Submit the command lists of a frame
    ///
    /// Same as [`submit`](Self::submit), except that a frame submission is the
    /// one that renders into the swapchain image acquired last, if any.
    fn submit_frame(&self, command_lists: &[&dyn CommandList], fence: &dyn Fence, signal_value: u64) -> Result<()> {
        self.submit(command_lists, fence, signal_value)
    }

    /// Wait for all GPU operations to complete
    fn wait_idle(&self) -> Result<()>;
}
