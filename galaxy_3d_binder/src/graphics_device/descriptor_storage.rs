/// Device-level descriptor storage and resource views
///
/// A `DescriptorStorage` is the backend's fixed-size array of binding slots of
/// one kind. Descriptor heaps are regions carved out of it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::DescriptorHeapKind;
use crate::error::Result;
use crate::graphics_device::{Buffer, Texture};

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Texture coordinate addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

/// Sampler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_mode: AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_filter: Filter::Linear,
            address_mode: AddressMode::Repeat,
        }
    }
}

/// What a binding slot points at
#[derive(Clone)]
pub enum ResourceView {
    /// Texture read through a sampler
    SampledTexture(Arc<dyn Texture>),
    /// Texture written through storage access
    StorageTexture(Arc<dyn Texture>),
    /// Uniform buffer range
    UniformBuffer { buffer: Arc<dyn Buffer>, offset: u64, size: u64 },
    /// Storage buffer range
    StorageBuffer { buffer: Arc<dyn Buffer>, offset: u64, size: u64 },
    /// Sampler state
    Sampler(SamplerDesc),
    /// One (mip, slice) of a texture as color attachment
    ColorAttachment { texture: Arc<dyn Texture>, mip: u32, slice: u32 },
    /// One (mip, slice) of a texture as depth attachment
    DepthAttachment { texture: Arc<dyn Texture>, mip: u32, slice: u32 },
}

impl ResourceView {
    /// Heap kind a slot must have to hold this view
    pub fn heap_kind(&self) -> DescriptorHeapKind {
        match self {
            ResourceView::SampledTexture(_)
            | ResourceView::StorageTexture(_)
            | ResourceView::UniformBuffer { .. }
            | ResourceView::StorageBuffer { .. } => DescriptorHeapKind::ShaderResource,
            ResourceView::Sampler(_) => DescriptorHeapKind::Sampler,
            ResourceView::ColorAttachment { .. } => DescriptorHeapKind::ColorAttachment,
            ResourceView::DepthAttachment { .. } => DescriptorHeapKind::DepthAttachment,
        }
    }

    /// Whether shaders may write through this view
    pub fn is_writable(&self) -> bool {
        matches!(self, ResourceView::StorageTexture(_) | ResourceView::StorageBuffer { .. })
    }

    /// Name of the viewed resource, for logs
    pub fn resource_name(&self) -> String {
        match self {
            ResourceView::SampledTexture(t)
            | ResourceView::StorageTexture(t)
            | ResourceView::ColorAttachment { texture: t, .. }
            | ResourceView::DepthAttachment { texture: t, .. } => t.info().name.clone(),
            ResourceView::UniformBuffer { buffer, .. } | ResourceView::StorageBuffer { buffer, .. } => {
                buffer.name().to_string()
            }
            ResourceView::Sampler(_) => "sampler".to_string(),
        }
    }
}

impl fmt::Debug for ResourceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceView::SampledTexture(t) => write!(f, "SampledTexture({})", t.info().name),
            ResourceView::StorageTexture(t) => write!(f, "StorageTexture({})", t.info().name),
            ResourceView::UniformBuffer { buffer, offset, size } => {
                write!(f, "UniformBuffer({}, {}..{})", buffer.name(), offset, offset + size)
            }
            ResourceView::StorageBuffer { buffer, offset, size } => {
                write!(f, "StorageBuffer({}, {}..{})", buffer.name(), offset, offset + size)
            }
            ResourceView::Sampler(desc) => write!(f, "Sampler({:?})", desc),
            ResourceView::ColorAttachment { texture, mip, slice } => {
                write!(f, "ColorAttachment({}, mip {}, slice {})", texture.info().name, mip, slice)
            }
            ResourceView::DepthAttachment { texture, mip, slice } => {
                write!(f, "DepthAttachment({}, mip {}, slice {})", texture.info().name, mip, slice)
            }
        }
    }
}

/// Backend array of binding slots of one kind
///
/// Slot `i` lives at `cpu_base() + i * increment()` for writes and at
/// `gpu_base() + i * increment()` for shader access. Attachment kinds are not
/// shader visible and report a GPU base of 0.
pub trait DescriptorStorage: Send + Sync {
    fn kind(&self) -> DescriptorHeapKind;

    /// Number of slots
    fn capacity(&self) -> u32;

    /// Distance in bytes between two consecutive slots
    fn increment(&self) -> u64;

    fn cpu_base(&self) -> u64;

    fn gpu_base(&self) -> u64;

    /// Point slot `index` at `view`
    fn write(&self, index: u32, view: &ResourceView) -> Result<()>;

    /// Copy `count` slots from `src` to `dst` inside this storage
    fn copy(&self, dst: u32, src: u32, count: u32) -> Result<()>;

    /// Downcast hook for backends
    fn as_any(&self) -> &dyn Any;
}
