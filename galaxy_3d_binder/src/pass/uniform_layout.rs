/// Uniform block layouts

use crate::error::{Error, Result};

/// One named member of a uniform block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformField {
    pub name: &'static str,
    /// Byte offset from the start of the block
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

/// Byte layout of a uniform block, as the shaders see it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLayout {
    /// Total size in bytes (0: the pass has no uniform block)
    pub size: u32,
    /// Members sorted by offset
    pub fields: &'static [UniformField],
}

impl UniformLayout {
    /// Layout of a pass without uniforms
    pub const EMPTY: UniformLayout = UniformLayout { size: 0, fields: &[] };

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check that fields are sorted, disjoint and inside the block
    pub fn validate(&self) -> Result<()> {
        let mut end = 0u32;
        for field in self.fields {
            if field.size == 0 {
                return Err(Error::InvalidResource(format!("uniform field '{}' has size 0", field.name)));
            }
            if field.offset < end {
                return Err(Error::InvalidResource(format!(
                    "uniform field '{}' at {} overlaps the previous field (ends at {})",
                    field.name, field.offset, end
                )));
            }
            end = field.offset.saturating_add(field.size);
            if end > self.size {
                return Err(Error::InvalidResource(format!(
                    "uniform field '{}' ends at {} past the block size {}",
                    field.name, end, self.size
                )));
            }
        }
        Ok(())
    }
}

/// Plain-data uniform block type of a pass
///
/// ```no_run
/// use galaxy_3d_binder::galaxy3d::render::{UniformBlock, UniformField, UniformLayout};
///
/// #[repr(C)]
/// #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
/// struct Blur {
///     direction: [f32; 2],
///     radius: f32,
///     _pad: f32,
/// }
///
/// impl UniformBlock for Blur {
///     const LAYOUT: UniformLayout = UniformLayout {
///         size: 16,
///         fields: &[
///             UniformField { name: "direction", offset: 0, size: 8 },
///             UniformField { name: "radius", offset: 8, size: 4 },
///         ],
///     };
/// }
/// ```
pub trait UniformBlock: bytemuck::Pod + Send + Sync {
    const LAYOUT: UniformLayout;
}

impl UniformBlock for () {
    const LAYOUT: UniformLayout = UniformLayout::EMPTY;
}
