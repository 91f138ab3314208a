/*!
# Galaxy 3D Binder - Vulkan Backend

Vulkan implementation of the `GraphicsDevice` contract of galaxy_3d_binder,
using Ash for the Vulkan bindings and gpu-allocator for memory management.

Descriptor storages map onto device-wide bindless arrays: one set holding
sampled images, storage images, uniform and storage buffers, one set holding
samplers. Attachment storages never reach the GPU and resolve to image views
at `begin_rendering`. Fences are timeline semaphores.

# Example

```no_run
use galaxy_3d_binder::galaxy3d::{Config, Engine, Renderer};
use galaxy_3d_binder_vulkan::galaxy3d::VulkanGraphicsDevice;
use std::sync::Arc;

let config = Config::default();
let device = VulkanGraphicsDevice::new(&config)?;
Engine::initialize()?;
Engine::create_renderer(Renderer::new(Arc::new(device), config)?)?;
# Ok::<(), galaxy_3d_binder::galaxy3d::Error>(())
```
*/

mod debug;
mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_context;
mod vulkan_descriptor;
mod vulkan_fence;
mod vulkan_format;
mod vulkan_graphics_device;
mod vulkan_pipeline;
mod vulkan_sampler;
mod vulkan_swapchain;
mod vulkan_texture;

/// Galaxy3D Vulkan namespace
pub mod galaxy3d {
    pub use crate::vulkan_buffer::VulkanBuffer;
    pub use crate::vulkan_command_list::VulkanCommandList;
    pub use crate::vulkan_context::GpuContext;
    pub use crate::vulkan_fence::VulkanFence;
    pub use crate::vulkan_graphics_device::VulkanGraphicsDevice;
    pub use crate::vulkan_pipeline::VulkanPipeline;
    pub use crate::vulkan_swapchain::VulkanSwapchain;
    pub use crate::vulkan_texture::VulkanTexture;

    // Debug utilities
    pub use crate::debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
}
