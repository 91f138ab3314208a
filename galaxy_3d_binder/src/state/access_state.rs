/// Access state of one subresource

use std::fmt;

/// How the GPU is currently allowed to use a subresource
///
/// A transition between two different states produces one barrier per
/// subresource. Backends map each state to their native layout/access/stage
/// triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAccessState {
    /// Sampled or read as a shader resource
    ShaderRead,
    /// Written through unordered/storage access
    ShaderWrite,
    /// Bound as a color attachment
    ColorOutput,
    /// Bound as a read-only depth attachment
    DepthRead,
    /// Bound as a writable depth attachment
    DepthWrite,
    /// Source of a copy
    CopySource,
    /// Destination of a copy
    CopyDest,
    /// Source of a multisample resolve
    ResolveSource,
    /// Destination of a multisample resolve
    ResolveDest,
    /// Ready for presentation
    Present,
    /// CPU-written upload memory
    Upload,
}

impl ResourceAccessState {
    /// Whether the GPU writes the subresource in this state
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceAccessState::ShaderWrite
                | ResourceAccessState::ColorOutput
                | ResourceAccessState::DepthWrite
                | ResourceAccessState::CopyDest
                | ResourceAccessState::ResolveDest
        )
    }

    /// Whether this state is only meaningful for depth formats
    pub fn is_depth(self) -> bool {
        matches!(self, ResourceAccessState::DepthRead | ResourceAccessState::DepthWrite)
    }
}

impl fmt::Display for ResourceAccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
