/// Pass layout - how many bindings of each category a pass has

use crate::descriptor::DescriptorHeapKind;
use crate::pass::BindingCategory;

/// Shape of the descriptor tables of a pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PassLayout {
    pub name: String,
    /// Read-only shader resource slots
    pub read_slots: u32,
    /// Sampler slots (refreshed with the read category)
    pub sampler_slots: u32,
    /// Shader-writable slots
    pub write_slots: u32,
    /// Color attachments
    pub color_outputs: u32,
    pub has_depth: bool,
}

impl PassLayout {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            read_slots: 0,
            sampler_slots: 0,
            write_slots: 0,
            color_outputs: 0,
            has_depth: false,
        }
    }

    pub fn with_reads(mut self, count: u32) -> Self {
        self.read_slots = count;
        self
    }

    pub fn with_samplers(mut self, count: u32) -> Self {
        self.sampler_slots = count;
        self
    }

    pub fn with_writes(mut self, count: u32) -> Self {
        self.write_slots = count;
        self
    }

    pub fn with_color_outputs(mut self, count: u32) -> Self {
        self.color_outputs = count;
        self
    }

    pub fn with_depth(mut self) -> Self {
        self.has_depth = true;
        self
    }

    /// Whether the pass renders into attachments (otherwise it dispatches)
    pub fn is_graphics(&self) -> bool {
        self.color_outputs > 0 || self.has_depth
    }

    /// Non-empty tables as (heap kind, slot count), one entry per table
    pub fn tables(&self) -> impl Iterator<Item = (DescriptorHeapKind, u32)> {
        [
            (DescriptorHeapKind::ShaderResource, self.read_slots),
            (DescriptorHeapKind::Sampler, self.sampler_slots),
            (DescriptorHeapKind::ShaderResource, self.write_slots),
            (DescriptorHeapKind::ColorAttachment, self.color_outputs),
            (DescriptorHeapKind::DepthAttachment, self.has_depth as u32),
        ]
        .into_iter()
        .filter(|&(_, count)| count > 0)
    }

    /// Whether the layout has any table in `category` (uniforms excluded)
    pub fn has_tables(&self, category: BindingCategory) -> bool {
        match category {
            BindingCategory::Uniform => false,
            BindingCategory::Read => self.read_slots > 0 || self.sampler_slots > 0,
            BindingCategory::Write => self.write_slots > 0,
            BindingCategory::Output => self.color_outputs > 0 || self.has_depth,
        }
    }
}
