/// Graphics device module - traits implemented by backends

pub mod graphics_device;
pub mod texture;
pub mod buffer;
pub mod descriptor_storage;
pub mod fence;
pub mod command_list;
pub mod pipeline;
pub mod swapchain;

pub use graphics_device::*;
pub use texture::*;
pub use buffer::*;
pub use descriptor_storage::*;
pub use fence::*;
pub use command_list::*;
pub use pipeline::*;
pub use swapchain::*;

// Mock graphics device (no GPU required), public so integration tests and
// downstream crates can drive the renderer headless
pub mod mock_graphics_device;
