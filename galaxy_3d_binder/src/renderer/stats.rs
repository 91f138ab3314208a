/// Renderer and validation statistics

use crate::descriptor::PerKind;

/// Counters accumulated by the renderer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// Frames handed to the queue
    pub frames_submitted: u64,
    pub draw_calls: u64,
    pub dispatches: u64,
    /// Barriers recorded by transitions and resolves
    pub barriers: u64,
    /// Dynamic tables and uniform blocks allocated by pass flushes
    pub dynamic_allocations: u64,
    /// Static tiers rewritten at `begin_frame`
    pub static_refreshes: u64,
    /// Static heap slots in use, per kind
    pub static_heap_usage: PerKind<u32>,
    /// Dynamic heap slots used by the last submitted frame, per kind
    pub dynamic_heap_usage: PerKind<u32>,
    /// Dynamic uniform bytes used by the last submitted frame
    pub uniform_bytes_this_frame: u64,
}

/// Validation layer message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}
