/// Buffer trait and buffer descriptor

use std::any::Any;
use bitflags::bitflags;
use crate::error::Result;

bitflags! {
    /// Ways a buffer may be used by the GPU
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const UNIFORM = 1 << 0;
        const STORAGE = 1 << 1;
        const VERTEX = 1 << 2;
        const INDEX = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

/// Memory placement of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Device-local, not CPU-visible
    GpuOnly,
    /// Persistently mapped, written by the CPU, read by the GPU
    CpuToGpu,
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
    /// Memory placement
    pub location: MemoryLocation,
}

/// Buffer resource trait
///
/// Implemented by backend-specific buffer types (e.g., VulkanBuffer).
/// The buffer is destroyed when the last reference is dropped.
pub trait Buffer: Send + Sync {
    /// Debug name given at creation
    fn name(&self) -> &str;

    /// Size in bytes
    fn size(&self) -> u64;

    /// Write bytes through the persistent mapping
    ///
    /// Fails for `MemoryLocation::GpuOnly` buffers and for writes past the end.
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset into the buffer in bytes
    /// * `data` - Data to write
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// GPU virtual address of the first byte
    fn gpu_address(&self) -> u64;

    /// Downcast hook for backends
    fn as_any(&self) -> &dyn Any;
}
