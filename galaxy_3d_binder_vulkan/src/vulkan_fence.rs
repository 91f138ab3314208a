/// Fence - Vulkan timeline semaphore behind the Fence trait

use ash::vk;
use galaxy_3d_binder::galaxy3d::render::Fence as BinderFence;
use galaxy_3d_binder::galaxy3d::{Error, Result};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::{vk_failure, GpuContext, SOURCE};

/// Monotonic GPU timeline
pub struct VulkanFence {
    ctx: Arc<GpuContext>,
    pub(crate) semaphore: vk::Semaphore,
}

impl VulkanFence {
    pub(crate) fn create(ctx: &Arc<GpuContext>, initial_value: u64) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe {
            ctx.device
                .create_semaphore(&create_info, None)
                .map_err(|e| vk_failure!(e, "Failed to create timeline semaphore"))?
        };
        Ok(Self {
            ctx: Arc::clone(ctx),
            semaphore,
        })
    }
}

/// Downcast a binder fence to the Vulkan one
pub(crate) fn as_vulkan(fence: &dyn BinderFence) -> Result<&VulkanFence> {
    fence.as_any().downcast_ref::<VulkanFence>().ok_or_else(|| {
        galaxy_3d_binder::engine_raise!(
            SOURCE,
            Error::InvalidResource("fence was not created by the Vulkan device".to_string())
        )
    })
}

impl BinderFence for VulkanFence {
    fn completed_value(&self) -> Result<u64> {
        unsafe {
            self.ctx
                .device
                .get_semaphore_counter_value(self.semaphore)
                .map_err(|e| vk_failure!(e, "Failed to read timeline value"))
        }
    }

    fn wait(&self, value: u64) -> Result<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe {
            self.ctx
                .device
                .wait_semaphores(&wait_info, u64::MAX)
                .map_err(|e| vk_failure!(e, "Failed to wait for timeline value {}", value))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe { self.ctx.device.destroy_semaphore(self.semaphore, None) };
    }
}
