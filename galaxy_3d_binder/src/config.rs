//! Renderer configuration
//!
//! Plain struct with defaults, no files and no environment lookups.
//! [`Config::validate`] is called by the renderer before anything is created.

use crate::descriptor::{DescriptorHeapKind, HeapBudget, StaticHeapEstimate};
use crate::error::{Error, Result};

/// Largest supported number of frames in flight
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// What the renderer does with a fatal error after logging it
///
/// Defaults to `Panic` in debug builds and `Abort` in release builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalAction {
    /// Return the error to the caller
    Propagate,
    /// Panic with the error message
    Panic,
    /// Terminate the process immediately (debugger break)
    Abort,
}

impl Default for FatalAction {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            FatalAction::Panic
        } else {
            FatalAction::Abort
        }
    }
}

/// Validation message severity filter (Vulkan backend)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// Where validation messages go (Vulkan backend)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    Console,
    File(String),
    Both(String),
}

/// Validation message category filter (Vulkan backend)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of frame slots pipelined ahead of the GPU (1..=4)
    pub frames_in_flight: usize,
    /// Static heap sizes per kind, for all frame slots together
    pub static_descriptors: HeapBudget,
    /// Dynamic heap sizes per kind, for one frame slot
    pub dynamic_descriptors_per_frame: HeapBudget,
    /// Dynamic uniform region size for one frame slot
    pub dynamic_uniform_bytes_per_frame: u64,
    /// Static uniform region size
    pub static_uniform_bytes: u64,
    /// Policy applied to fatal errors
    pub fatal_action: FatalAction,
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    pub debug_severity: DebugSeverity,
    pub debug_output: DebugOutput,
    pub debug_message_filter: DebugMessageFilter,
    /// Abort the process on validation errors
    pub break_on_validation_error: bool,
    /// Panic on validation errors
    pub panic_on_error: bool,
    /// Count validation messages (see `ValidationStats`)
    pub enable_validation_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            static_descriptors: HeapBudget::new(1024, 64, 64, 16),
            dynamic_descriptors_per_frame: HeapBudget::new(4096, 256, 64, 16),
            dynamic_uniform_bytes_per_frame: 1 << 20,
            static_uniform_bytes: 1 << 20,
            fatal_action: FatalAction::default(),
            enable_validation: cfg!(debug_assertions),
            app_name: "Galaxy3D Application".to_string(),
            app_version: (1, 0, 0),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_output: DebugOutput::Console,
            debug_message_filter: DebugMessageFilter::default(),
            break_on_validation_error: false,
            panic_on_error: false,
            enable_validation_stats: cfg!(debug_assertions),
        }
    }
}

impl Config {
    /// Size the static heaps from a capacity estimate
    pub fn with_static_estimate(mut self, estimate: &StaticHeapEstimate) -> Self {
        self.static_descriptors = estimate.to_budget(self.frames_in_flight);
        self
    }

    /// Total slots the device storage of `kind` must hold
    pub fn storage_capacity(&self, kind: DescriptorHeapKind) -> u64 {
        self.static_descriptors.get(kind) as u64
            + self.frames_in_flight as u64 * self.dynamic_descriptors_per_frame.get(kind) as u64
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::InitializationFailed(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }

        let alignment = crate::uniform::UNIFORM_ALIGNMENT;
        for (name, bytes) in [
            ("dynamic_uniform_bytes_per_frame", self.dynamic_uniform_bytes_per_frame),
            ("static_uniform_bytes", self.static_uniform_bytes),
        ] {
            if bytes == 0 || bytes % alignment != 0 {
                return Err(Error::InitializationFailed(format!(
                    "{} must be a non-zero multiple of {}, got {}",
                    name, alignment, bytes
                )));
            }
        }

        for kind in DescriptorHeapKind::ALL {
            if self.storage_capacity(kind) > u32::MAX as u64 {
                return Err(Error::InitializationFailed(format!(
                    "{} descriptor storage would exceed {} slots",
                    kind,
                    u32::MAX
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
