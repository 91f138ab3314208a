/// Uniform allocator - 256-byte aligned bump allocation in a mapped buffer

use std::sync::Arc;

use crate::descriptor::HeapFlavor;
use crate::error::{Error, Result};
use crate::graphics_device::{Buffer, BufferDesc, BufferUsage, GraphicsDevice, MemoryLocation};
use crate::{engine_raise, engine_trace};

const SOURCE: &str = "galaxy3d::UniformAllocator";

/// Alignment of every uniform allocation, in bytes
pub const UNIFORM_ALIGNMENT: u64 = 256;

/// Round `value` up to the next multiple of `alignment` (a power of two)
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Bytes reserved by one allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformAllocation {
    /// Offset from the start of the region
    pub offset: u64,
    /// GPU address of the first byte
    pub gpu_address: u64,
    /// Requested size
    pub size: u64,
    /// Region epoch the allocation was made in
    pub epoch: u64,
}

/// Bump allocator over a persistently mapped upload buffer
///
/// Offsets are rounded up to `UNIFORM_ALIGNMENT` before and after every
/// allocation. The CPU only writes; the frame fence is the only protection
/// against overwriting bytes the GPU still reads.
pub struct UniformAllocator {
    label: String,
    flavor: HeapFlavor,
    buffer: Arc<dyn Buffer>,
    capacity: u64,
    offset: u64,
    epoch: u64,
}

impl UniformAllocator {
    /// Create the backing buffer and the allocator over it
    pub fn new(device: &dyn GraphicsDevice, label: &str, flavor: HeapFlavor, capacity: u64) -> Result<Self> {
        let buffer = device.create_buffer(BufferDesc {
            name: label.to_string(),
            size: capacity,
            usage: BufferUsage::UNIFORM,
            location: MemoryLocation::CpuToGpu,
        })?;
        Self::from_buffer(label, flavor, buffer)
    }

    /// Allocator over an existing CPU-visible buffer
    pub fn from_buffer(label: &str, flavor: HeapFlavor, buffer: Arc<dyn Buffer>) -> Result<Self> {
        if buffer.gpu_address() % UNIFORM_ALIGNMENT != 0 {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: buffer address {:#x} is not {}-byte aligned",
                label,
                buffer.gpu_address(),
                UNIFORM_ALIGNMENT
            ))));
        }
        Ok(Self {
            label: label.to_string(),
            flavor,
            capacity: buffer.size(),
            buffer,
            offset: 0,
            epoch: 0,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn flavor(&self) -> HeapFlavor {
        self.flavor
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes consumed since the last reset, padding included
    pub fn used(&self) -> u64 {
        self.offset
    }

    pub fn remaining(&self) -> u64 {
        self.capacity - self.offset
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn base_address(&self) -> u64 {
        self.buffer.gpu_address()
    }

    pub fn buffer(&self) -> &Arc<dyn Buffer> {
        &self.buffer
    }

    /// Reserve `size` bytes at the next aligned offset
    ///
    /// # Errors
    ///
    /// - `InvalidResource` when `size` is 0
    /// - `CapacityExhausted` when the aligned request does not fit
    pub fn allocate(&mut self, size: u64) -> Result<UniformAllocation> {
        if size == 0 {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: cannot allocate 0 bytes",
                self.label
            ))));
        }

        let start = align_up(self.offset, UNIFORM_ALIGNMENT);
        let end = start.checked_add(size).filter(|&end| end <= self.capacity);
        let Some(end) = end else {
            return Err(engine_raise!(SOURCE, Error::capacity_exhausted(
                self.label.clone(),
                size,
                self.offset,
                self.capacity,
            )));
        };

        self.offset = align_up(end, UNIFORM_ALIGNMENT).min(self.capacity);
        engine_trace!(SOURCE, "{}: {} bytes at offset {}", self.label, size, start);

        Ok(UniformAllocation {
            offset: start,
            gpu_address: self.buffer.gpu_address() + start,
            size,
            epoch: self.epoch,
        })
    }

    /// Copy `bytes` into a previous allocation
    pub fn write(&self, allocation: &UniformAllocation, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u64 > allocation.size {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: {} bytes do not fit an allocation of {}",
                self.label,
                bytes.len(),
                allocation.size
            ))));
        }
        if !self.is_live(allocation) {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: allocation from epoch {} written in epoch {}",
                self.label, allocation.epoch, self.epoch
            ))));
        }
        self.buffer.update(allocation.offset, bytes)
    }

    /// Allocate and fill in one step
    pub fn allocate_bytes(&mut self, bytes: &[u8]) -> Result<UniformAllocation> {
        let allocation = self.allocate(bytes.len() as u64)?;
        self.write(&allocation, bytes)?;
        Ok(allocation)
    }

    /// Whether the bytes of `allocation` are still reserved
    pub fn is_live(&self, allocation: &UniformAllocation) -> bool {
        self.flavor == HeapFlavor::Static || allocation.epoch == self.epoch
    }

    /// Rewind to the start of the region (dynamic regions only)
    pub fn reset(&mut self) -> Result<()> {
        if self.flavor == HeapFlavor::Static {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(format!(
                "{}: the static uniform region is never reset",
                self.label
            ))));
        }
        self.offset = 0;
        self.epoch += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "uniform_allocator_tests.rs"]
mod tests;
