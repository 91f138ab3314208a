/// Buffer - Vulkan implementation of the Buffer trait

use ash::vk;
use galaxy_3d_binder::galaxy3d::render::{Buffer as BinderBuffer, BufferDesc, MemoryLocation};
use galaxy_3d_binder::galaxy3d::{Error, Result};
use galaxy_3d_binder::{engine_bail, engine_trace};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::{allocation_failure, lock, vk_failure, GpuContext, SOURCE};
use crate::vulkan_format::{buffer_usage_to_vk, memory_location_to_vk};

/// Vulkan buffer implementation
///
/// `CpuToGpu` buffers stay persistently mapped for their whole life; the
/// uniform regions of the frame pipeline are written through that mapping.
pub struct VulkanBuffer {
    /// Shared GPU context (device, allocator)
    ctx: Arc<GpuContext>,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    name: String,
    size: u64,
    location: MemoryLocation,
    /// Buffer device address
    address: u64,
}

impl VulkanBuffer {
    pub(crate) fn create(ctx: &Arc<GpuContext>, desc: &BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            engine_bail!(SOURCE, "Buffer '{}' has size 0", desc.name);
        }

        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| vk_failure!(e, "Failed to create buffer '{}' of {} bytes", desc.name, desc.size))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let allocation = lock(&*ctx.allocator, "allocator")?
                .allocate(&AllocationCreateDesc {
                    name: &desc.name,
                    requirements,
                    location: memory_location_to_vk(desc.location),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(allocation_failure(&desc.name, requirements.size, e));
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                lock(&*ctx.allocator, "allocator")?.free(allocation).ok();
                ctx.device.destroy_buffer(buffer, None);
                return Err(vk_failure!(e, "Failed to bind memory of buffer '{}'", desc.name));
            }

            let address = ctx.device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer));

            engine_trace!(SOURCE, "Buffer '{}' created ({} bytes at 0x{:x})", desc.name, desc.size, address);

            Ok(Self {
                ctx: Arc::clone(ctx),
                buffer,
                allocation: Some(allocation),
                name: desc.name.clone(),
                size: desc.size,
                location: desc.location,
                address,
            })
        }
    }
}

/// Downcast a binder buffer to the Vulkan one
pub(crate) fn as_vulkan(buffer: &dyn BinderBuffer) -> Result<&VulkanBuffer> {
    buffer.as_any().downcast_ref::<VulkanBuffer>().ok_or_else(|| {
        galaxy_3d_binder::engine_raise!(SOURCE, Error::InvalidResource(format!(
            "buffer '{}' was not created by the Vulkan device",
            buffer.name()
        )))
    })
}

impl BinderBuffer for VulkanBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if self.location != MemoryLocation::CpuToGpu {
            engine_bail!(SOURCE, "Buffer '{}' is not CPU-accessible", self.name);
        }
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > self.size) {
            engine_bail!(
                SOURCE,
                "Write of {} bytes at offset {} overflows buffer '{}' ({} bytes)",
                data.len(),
                offset,
                self.name,
                self.size
            );
        }

        let Some(mapped) = self.allocation.as_ref().and_then(|a| a.mapped_ptr()) else {
            engine_bail!(SOURCE, "Buffer '{}' has no mapping", self.name);
        };

        // In bounds per the check above; the mapping lives as long as the allocation
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (mapped.as_ptr() as *mut u8).add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    fn gpu_address(&self) -> u64 {
        self.address
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            // Don't panic if lock fails - we still need to destroy the buffer
            if let Ok(mut allocator) = self.ctx.allocator.lock() {
                allocator.free(allocation).ok();
            }
        }
        unsafe { self.ctx.device.destroy_buffer(self.buffer, None) };
    }
}
