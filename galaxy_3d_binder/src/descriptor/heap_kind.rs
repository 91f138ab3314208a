/// Descriptor heap kinds and per-kind tables

use std::fmt;
use std::ops::{Index, IndexMut};

/// Kind of binding slots a descriptor heap holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorHeapKind {
    /// Sampled textures, storage textures, uniform and storage buffers
    ShaderResource,
    /// Texture samplers
    Sampler,
    /// Color attachment views
    ColorAttachment,
    /// Depth/stencil attachment views
    DepthAttachment,
}

impl DescriptorHeapKind {
    /// All kinds, in storage order
    pub const ALL: [DescriptorHeapKind; 4] = [
        DescriptorHeapKind::ShaderResource,
        DescriptorHeapKind::Sampler,
        DescriptorHeapKind::ColorAttachment,
        DescriptorHeapKind::DepthAttachment,
    ];

    /// Dense index, usable for fixed-size per-kind arrays
    pub fn index(self) -> usize {
        match self {
            DescriptorHeapKind::ShaderResource => 0,
            DescriptorHeapKind::Sampler => 1,
            DescriptorHeapKind::ColorAttachment => 2,
            DescriptorHeapKind::DepthAttachment => 3,
        }
    }

    /// Whether shaders read this kind through a GPU address
    ///
    /// Attachment views are only consumed when a render pass begins, so
    /// their handles carry a CPU address only.
    pub fn is_shader_visible(self) -> bool {
        matches!(self, DescriptorHeapKind::ShaderResource | DescriptorHeapKind::Sampler)
    }
}

impl fmt::Display for DescriptorHeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DescriptorHeapKind::ShaderResource => "ShaderResource",
            DescriptorHeapKind::Sampler => "Sampler",
            DescriptorHeapKind::ColorAttachment => "ColorAttachment",
            DescriptorHeapKind::DepthAttachment => "DepthAttachment",
        };
        f.write_str(name)
    }
}

/// One value per descriptor heap kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerKind<T> {
    values: [T; 4],
}

impl<T: Copy> PerKind<T> {
    /// Same value for every kind
    pub fn splat(value: T) -> Self {
        Self { values: [value; 4] }
    }

    /// Values in `DescriptorHeapKind::ALL` order
    pub fn new(shader_resource: T, sampler: T, color_attachment: T, depth_attachment: T) -> Self {
        Self {
            values: [shader_resource, sampler, color_attachment, depth_attachment],
        }
    }

    pub fn get(&self, kind: DescriptorHeapKind) -> T {
        self.values[kind.index()]
    }

    pub fn set(&mut self, kind: DescriptorHeapKind, value: T) {
        self.values[kind.index()] = value;
    }

    /// Iterate `(kind, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (DescriptorHeapKind, T)> + '_ {
        DescriptorHeapKind::ALL.iter().map(move |&kind| (kind, self.values[kind.index()]))
    }
}

impl<T> Index<DescriptorHeapKind> for PerKind<T> {
    type Output = T;

    fn index(&self, kind: DescriptorHeapKind) -> &T {
        &self.values[kind.index()]
    }
}

impl<T> IndexMut<DescriptorHeapKind> for PerKind<T> {
    fn index_mut(&mut self, kind: DescriptorHeapKind) -> &mut T {
        &mut self.values[kind.index()]
    }
}

/// Slot counts per heap kind
pub type HeapBudget = PerKind<u32>;

impl HeapBudget {
    /// Sum over all kinds
    pub fn total(&self) -> u64 {
        self.values.iter().map(|&v| v as u64).sum()
    }
}
