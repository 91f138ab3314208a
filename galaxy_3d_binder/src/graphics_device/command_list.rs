/// CommandList trait - for recording GPU commands

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::graphics_device::{Buffer, Pipeline, Texture};
use crate::state::ResourceAccessState;

/// Device object a barrier applies to
#[derive(Clone)]
pub enum GpuResource {
    Texture(Arc<dyn Texture>),
    Buffer(Arc<dyn Buffer>),
}

impl GpuResource {
    pub fn name(&self) -> &str {
        match self {
            GpuResource::Texture(texture) => &texture.info().name,
            GpuResource::Buffer(buffer) => buffer.name(),
        }
    }

    pub fn as_texture(&self) -> Option<&Arc<dyn Texture>> {
        match self {
            GpuResource::Texture(texture) => Some(texture),
            GpuResource::Buffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Arc<dyn Buffer>> {
        match self {
            GpuResource::Buffer(buffer) => Some(buffer),
            GpuResource::Texture(_) => None,
        }
    }
}

impl fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuResource::Texture(_) => write!(f, "Texture({})", self.name()),
            GpuResource::Buffer(_) => write!(f, "Buffer({})", self.name()),
        }
    }
}

/// State transition of one subresource
#[derive(Debug, Clone)]
pub struct Barrier {
    pub resource: GpuResource,
    pub slice: u32,
    pub mip: u32,
    pub before: ResourceAccessState,
    pub after: ResourceAccessState,
}

/// Root binding slots used by the renderer when binding pass tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSlot {
    /// Table of read bindings
    ReadTable,
    /// Table of write bindings
    WriteTable,
    /// Table of samplers
    SamplerTable,
}

impl BindingSlot {
    pub fn index(self) -> u32 {
        match self {
            BindingSlot::ReadTable => 0,
            BindingSlot::WriteTable => 1,
            BindingSlot::SamplerTable => 2,
        }
    }
}

/// Clear values applied when rendering begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
        }
    }
}

/// Attachments of a render pass, given as CPU descriptor addresses
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo {
    /// One CPU address per color attachment slot
    pub color_attachments: Vec<u64>,
    /// CPU address of the depth attachment slot
    pub depth_attachment: Option<u64>,
    /// Clear on load, or keep previous contents when `None`
    pub clear: Option<ClearValues>,
}

/// Command list for recording GPU commands
///
/// Commands are recorded and later submitted to the GPU via
/// `GraphicsDevice::submit()`.
pub trait CommandList: Send + Sync {
    /// Reset and begin recording commands
    fn begin(&mut self) -> Result<()>;

    /// End recording commands
    fn end(&mut self) -> Result<()>;

    /// Record a batch of state transitions
    fn resource_barriers(&mut self, barriers: &[Barrier]) -> Result<()>;

    /// Resolve a multisampled texture into a single-sampled one
    ///
    /// `src` must be in `ResolveSource` and `dst` in `ResolveDest`.
    fn resolve_texture(&mut self, src: &dyn Texture, dst: &dyn Texture) -> Result<()>;

    /// Clear a whole color texture currently in `ColorOutput`
    fn clear_color_target(&mut self, target: &dyn Texture, color: [f32; 4]) -> Result<()>;

    /// Begin rendering into the given attachments
    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()>;

    /// End the current rendering scope
    fn end_rendering(&mut self) -> Result<()>;

    /// Bind a pipeline created outside of the binding layer
    fn bind_pipeline(&mut self, pipeline: &dyn Pipeline) -> Result<()>;

    /// Bind a shader-visible descriptor table
    ///
    /// # Arguments
    ///
    /// * `slot` - Root binding slot
    /// * `gpu_address` - GPU address of the first slot of the table
    fn set_descriptor_table(&mut self, slot: BindingSlot, gpu_address: u64) -> Result<()>;

    /// Bind the GPU address of the uniform block
    fn set_uniform_address(&mut self, gpu_address: u64) -> Result<()>;

    /// Draw non-indexed geometry
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()>;

    /// Dispatch compute work groups
    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()>;

    /// Copy bytes between buffers
    fn copy_buffer(&mut self, src: &dyn Buffer, src_offset: u64, dst: &dyn Buffer, dst_offset: u64, size: u64) -> Result<()>;

    /// Copy tightly packed texels from a buffer into one (mip, slice) of a texture
    ///
    /// The texture subresource must be in `CopyDest`.
    fn copy_buffer_to_texture(&mut self, src: &dyn Buffer, src_offset: u64, dst: &dyn Texture, mip: u32, slice: u32) -> Result<()>;

    /// Downcast hooks for backends
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
