/// Pipeline - Vulkan implementation of the Pipeline trait

use ash::vk;
use galaxy_3d_binder::galaxy3d::render::{Pipeline as BinderPipeline, PipelineBindPoint};
use galaxy_3d_binder::galaxy3d::{Error, Result};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, SOURCE};
use crate::vulkan_graphics_device::VulkanGraphicsDevice;

/// Vulkan pipeline compiled by the application
///
/// The pipeline must have been created with
/// `VulkanGraphicsDevice::pipeline_layout()`; it is destroyed on drop.
pub struct VulkanPipeline {
    ctx: Arc<GpuContext>,
    pub(crate) pipeline: vk::Pipeline,
    bind_point: PipelineBindPoint,
}

impl VulkanPipeline {
    /// Take ownership of a pipeline handle
    ///
    /// # Safety
    ///
    /// `pipeline` must be a valid pipeline of `device`, built against the
    /// device's bindless pipeline layout, and must not be destroyed elsewhere.
    pub unsafe fn from_raw(device: &VulkanGraphicsDevice, pipeline: vk::Pipeline, bind_point: PipelineBindPoint) -> Self {
        Self {
            ctx: Arc::clone(device.context()),
            pipeline,
            bind_point,
        }
    }
}

pub(crate) fn vk_bind_point(bind_point: PipelineBindPoint) -> vk::PipelineBindPoint {
    match bind_point {
        PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
        PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
    }
}

/// Downcast a binder pipeline to the Vulkan one
pub(crate) fn as_vulkan(pipeline: &dyn BinderPipeline) -> Result<&VulkanPipeline> {
    pipeline.as_any().downcast_ref::<VulkanPipeline>().ok_or_else(|| {
        galaxy_3d_binder::engine_raise!(
            SOURCE,
            Error::InvalidResource("pipeline was not created for the Vulkan device".to_string())
        )
    })
}

impl BinderPipeline for VulkanPipeline {
    fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe { self.ctx.device.destroy_pipeline(self.pipeline, None) };
    }
}
