/// CommandList - Vulkan implementation of the CommandList trait
///
/// Records with dynamic rendering and synchronization2. Descriptor tables and
/// the uniform address are recorded into a push constant block, flushed
/// before each draw or dispatch.

use ash::vk;
use galaxy_3d_binder::galaxy3d::render::{
    Barrier, BindingSlot, Buffer as BinderBuffer, CommandList as BinderCommandList, GpuResource,
    Pipeline as BinderPipeline, PipelineBindPoint, RenderingInfo, ResourceAccessState,
    Texture as BinderTexture,
};
use galaxy_3d_binder::galaxy3d::{Error, Result};
use galaxy_3d_binder::{engine_bail, engine_trace};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_buffer;
use crate::vulkan_context::{lock, vk_failure, GpuContext, SOURCE};
use crate::vulkan_descriptor::{AttachmentView, PushConstants};
use crate::vulkan_format::{access_scope, mip_extent};
use crate::vulkan_pipeline::{self, vk_bind_point};
use crate::vulkan_texture::{self, ImageViewHandle};

/// Vulkan command list implementation
pub struct VulkanCommandList {
    ctx: Arc<GpuContext>,
    /// Command pool for allocating command buffers
    command_pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    is_recording: bool,
    /// Whether we're inside a rendering scope
    in_rendering: bool,
    bound_pipeline: Option<PipelineBindPoint>,
    push_constants: PushConstants,
    push_dirty: bool,
    /// Views recorded since the last `begin()`
    retained_views: Vec<Arc<ImageViewHandle>>,
    retained_attachments: Vec<AttachmentView>,
    retained_resources: Vec<GpuResource>,
}

impl VulkanCommandList {
    pub(crate) fn new(ctx: &Arc<GpuContext>) -> Result<Self> {
        unsafe {
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = ctx.device.create_command_pool(&command_pool_create_info, None)
                .map_err(|e| vk_failure!(e, "Failed to create command pool"))?;

            let command_buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffers = match ctx.device.allocate_command_buffers(&command_buffer_allocate_info) {
                Ok(buffers) => buffers,
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    return Err(vk_failure!(e, "Failed to allocate command buffer"));
                }
            };

            Ok(Self {
                ctx: Arc::clone(ctx),
                command_pool,
                command_buffer: command_buffers[0],
                is_recording: false,
                in_rendering: false,
                bound_pipeline: None,
                push_constants: PushConstants::default(),
                push_dirty: false,
                retained_views: Vec::new(),
                retained_attachments: Vec::new(),
                retained_resources: Vec::new(),
            })
        }
    }

    fn ensure_recording(&self) -> Result<()> {
        if !self.is_recording {
            engine_bail!(SOURCE, "Command list not recording");
        }
        Ok(())
    }

    fn ensure_outside_rendering(&self, what: &str) -> Result<()> {
        self.ensure_recording()?;
        if self.in_rendering {
            engine_bail!(SOURCE, "{} is not allowed inside a rendering scope", what);
        }
        Ok(())
    }

    fn flush_push_constants(&mut self) -> Result<()> {
        if self.bound_pipeline.is_none() {
            engine_bail!(SOURCE, "No pipeline bound");
        }
        if self.push_dirty {
            unsafe {
                self.ctx.device.cmd_push_constants(
                    self.command_buffer,
                    self.ctx.bindless.pipeline_layout,
                    vk::ShaderStageFlags::ALL,
                    0,
                    bytemuck::bytes_of(&self.push_constants),
                );
            }
            self.push_dirty = false;
        }
        Ok(())
    }

    fn image_barrier(&self, barrier: &Barrier, texture: &dyn BinderTexture) -> Result<vk::ImageMemoryBarrier2<'static>> {
        let vk_texture = vulkan_texture::as_vulkan(texture)?;
        let src = access_scope(barrier.before);
        let dst = access_scope(barrier.after);
        let old_layout = if vk_texture.take_undefined(barrier.mip, barrier.slice)? {
            vk::ImageLayout::UNDEFINED
        } else {
            src.layout
        };

        Ok(vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src.stage)
            .src_access_mask(src.access)
            .dst_stage_mask(dst.stage)
            .dst_access_mask(dst.access)
            .old_layout(old_layout)
            .new_layout(dst.layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(vk_texture.image)
            .subresource_range(vk_texture.layout_range(barrier.mip, barrier.slice)))
    }

    fn buffer_barrier(&self, barrier: &Barrier, buffer: &dyn BinderBuffer) -> Result<vk::BufferMemoryBarrier2<'static>> {
        let vk_buffer = vulkan_buffer::as_vulkan(buffer)?;
        let src = access_scope(barrier.before);
        let dst = access_scope(barrier.after);

        Ok(vk::BufferMemoryBarrier2::default()
            .src_stage_mask(src.stage)
            .src_access_mask(src.access)
            .dst_stage_mask(dst.stage)
            .dst_access_mask(dst.access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(vk_buffer.buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE))
    }

    /// Look up the attachment stored at a CPU descriptor address
    fn attachment(&self, cpu_address: u64, depth: bool) -> Result<AttachmentView> {
        let storage = {
            let registry = lock(&self.ctx.storages, "storage registry")?;
            if depth {
                registry.depth_attachments.upgrade()
            } else {
                registry.color_attachments.upgrade()
            }
        };
        match storage {
            Some(storage) => storage.resolve(cpu_address),
            None => Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::UseBeforeInit(format!(
                "no {} attachment storage exists",
                if depth { "depth" } else { "color" }
            )))),
        }
    }

    /// Begin a rendering scope over explicit views
    fn begin_rendering_views(
        &mut self,
        colors: &[(vk::ImageView, vk::Extent2D)],
        depth: Option<(vk::ImageView, vk::Extent2D)>,
        clear: Option<([f32; 4], f32)>,
    ) {
        let load_op = if clear.is_some() { vk::AttachmentLoadOp::CLEAR } else { vk::AttachmentLoadOp::LOAD };
        let (clear_color, clear_depth) = clear.unwrap_or(([0.0; 4], 1.0));

        let color_attachments: Vec<vk::RenderingAttachmentInfo> = colors
            .iter()
            .map(|(view, _)| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(*view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue { float32: clear_color },
                    })
            })
            .collect();
        let depth_attachment = depth.map(|(view, _)| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(load_op)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: clear_depth, stencil: 0 },
                })
        });

        // Render area is the intersection of every attachment
        let extent = colors
            .iter()
            .map(|(_, extent)| *extent)
            .chain(depth.map(|(_, extent)| extent))
            .reduce(|a, b| vk::Extent2D {
                width: a.width.min(b.width),
                height: a.height.min(b.height),
            })
            .unwrap_or_default();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }

        unsafe {
            let device = &self.ctx.device;
            device.cmd_begin_rendering(self.command_buffer, &rendering_info);

            let viewport = vk::Viewport::default()
                .x(0.0)
                .y(0.0)
                .width(extent.width as f32)
                .height(extent.height as f32)
                .min_depth(0.0)
                .max_depth(1.0);
            device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(self.command_buffer, 0, &[render_area]);
        }
        self.in_rendering = true;
    }
}

/// Downcast a binder command list to the Vulkan one
pub(crate) fn as_vulkan(list: &dyn BinderCommandList) -> Result<&VulkanCommandList> {
    list.as_any().downcast_ref::<VulkanCommandList>().ok_or_else(|| {
        galaxy_3d_binder::engine_raise!(
            SOURCE,
            Error::InvalidResource("command list was not created by the Vulkan device".to_string())
        )
    })
}

impl BinderCommandList for VulkanCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            engine_bail!(SOURCE, "Command list already recording");
        }

        unsafe {
            self.ctx.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| vk_failure!(e, "Failed to reset command buffer"))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            self.ctx.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| vk_failure!(e, "Failed to begin command buffer"))?;
        }

        // The previous recording has completed on the GPU
        self.retained_views.clear();
        self.retained_attachments.clear();
        self.retained_resources.clear();

        self.is_recording = true;
        self.in_rendering = false;
        self.bound_pipeline = None;
        self.push_constants = PushConstants::default();
        self.push_dirty = false;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.ensure_outside_rendering("Ending the command list")?;

        unsafe {
            self.ctx.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| vk_failure!(e, "Failed to end command buffer"))?;
        }
        self.is_recording = false;
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[Barrier]) -> Result<()> {
        self.ensure_outside_rendering("Recording barriers")?;
        if barriers.is_empty() {
            return Ok(());
        }

        let mut image_barriers = Vec::new();
        let mut buffer_barriers = Vec::new();
        for barrier in barriers {
            match &barrier.resource {
                GpuResource::Texture(texture) => image_barriers.push(self.image_barrier(barrier, texture.as_ref())?),
                GpuResource::Buffer(buffer) => buffer_barriers.push(self.buffer_barrier(barrier, buffer.as_ref())?),
            }
            self.retained_resources.push(barrier.resource.clone());
        }

        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers);
        unsafe {
            self.ctx.device.cmd_pipeline_barrier2(self.command_buffer, &dependency_info);
        }

        engine_trace!(
            SOURCE,
            "{} image and {} buffer barrier(s) recorded",
            image_barriers.len(),
            buffer_barriers.len()
        );
        Ok(())
    }

    fn resolve_texture(&mut self, src: &dyn BinderTexture, dst: &dyn BinderTexture) -> Result<()> {
        self.ensure_outside_rendering("Resolve")?;

        let src_info = src.info();
        let dst_info = dst.info();
        if !src_info.is_multisampled() || dst_info.is_multisampled() {
            engine_bail!(
                SOURCE,
                "Resolve needs a multisampled source and a single-sampled target ('{}' -> '{}')",
                src_info.name,
                dst_info.name
            );
        }
        if (src_info.width, src_info.height) != (dst_info.width, dst_info.height) {
            engine_bail!(SOURCE, "Resolve extent mismatch ('{}' -> '{}')", src_info.name, dst_info.name);
        }

        let vk_src = vulkan_texture::as_vulkan(src)?;
        let vk_dst = vulkan_texture::as_vulkan(dst)?;
        let layers = src_info.array_layers.min(dst_info.array_layers);
        let region = vk::ImageResolve::default()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk_src.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: layers,
            })
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk_dst.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: layers,
            })
            .extent(mip_extent(src_info.width, src_info.height, 0));

        unsafe {
            self.ctx.device.cmd_resolve_image(
                self.command_buffer,
                vk_src.image,
                access_scope(ResourceAccessState::ResolveSource).layout,
                vk_dst.image,
                access_scope(ResourceAccessState::ResolveDest).layout,
                &[region],
            );
        }
        Ok(())
    }

    fn clear_color_target(&mut self, target: &dyn BinderTexture, color: [f32; 4]) -> Result<()> {
        self.ensure_outside_rendering("Clear")?;

        let info = target.info();
        if info.format.is_depth() {
            engine_bail!(SOURCE, "'{}' is not a color texture", info.name);
        }

        let vk_texture = vulkan_texture::as_vulkan(target)?;
        for slice in 0..info.array_layers {
            for mip in 0..info.mip_levels {
                let view = vk_texture.subresource_view(mip, slice)?;
                let extent = mip_extent(info.width, info.height, mip);
                let extent = vk::Extent2D {
                    width: extent.width,
                    height: extent.height,
                };
                self.begin_rendering_views(&[(view.view, extent)], None, Some((color, 1.0)));
                unsafe { self.ctx.device.cmd_end_rendering(self.command_buffer) };
                self.in_rendering = false;
                self.retained_views.push(view);
            }
        }
        Ok(())
    }

    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<()> {
        self.ensure_outside_rendering("Beginning rendering")?;
        if info.color_attachments.is_empty() && info.depth_attachment.is_none() {
            engine_bail!(SOURCE, "Rendering needs at least one attachment");
        }

        let colors = info
            .color_attachments
            .iter()
            .map(|&address| self.attachment(address, false))
            .collect::<Result<Vec<_>>>()?;
        let depth = info
            .depth_attachment
            .map(|address| self.attachment(address, true))
            .transpose()?;

        let color_views: Vec<_> = colors.iter().map(|a| (a.view.view, a.extent)).collect();
        let depth_view = depth.as_ref().map(|a| (a.view.view, a.extent));
        let clear = info.clear.map(|c| (c.color, c.depth));
        self.begin_rendering_views(&color_views, depth_view, clear);

        self.retained_attachments.extend(colors);
        self.retained_attachments.extend(depth);
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        self.ensure_recording()?;
        if !self.in_rendering {
            engine_bail!(SOURCE, "Not inside a rendering scope");
        }
        unsafe { self.ctx.device.cmd_end_rendering(self.command_buffer) };
        self.in_rendering = false;
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &dyn BinderPipeline) -> Result<()> {
        self.ensure_recording()?;

        let vk_pipeline = vulkan_pipeline::as_vulkan(pipeline)?;
        let bind_point = vk_bind_point(pipeline.bind_point());

        let (shader_resource_set, sampler_set) = {
            let registry = lock(&self.ctx.storages, "storage registry")?;
            (registry.shader_resource_set, registry.sampler_set)
        };

        unsafe {
            let device = &self.ctx.device;
            device.cmd_bind_pipeline(self.command_buffer, bind_point, vk_pipeline.pipeline);

            let layout = self.ctx.bindless.pipeline_layout;
            match (shader_resource_set, sampler_set) {
                (Some(sr), Some(sampler)) => {
                    device.cmd_bind_descriptor_sets(self.command_buffer, bind_point, layout, 0, &[sr, sampler], &[]);
                }
                (Some(sr), None) => {
                    device.cmd_bind_descriptor_sets(self.command_buffer, bind_point, layout, 0, &[sr], &[]);
                }
                (None, Some(sampler)) => {
                    device.cmd_bind_descriptor_sets(self.command_buffer, bind_point, layout, 1, &[sampler], &[]);
                }
                (None, None) => {}
            }
        }

        self.bound_pipeline = Some(pipeline.bind_point());
        self.push_dirty = true;
        Ok(())
    }

    fn set_descriptor_table(&mut self, slot: BindingSlot, gpu_address: u64) -> Result<()> {
        self.ensure_recording()?;
        self.push_constants.set_table(slot, gpu_address);
        self.push_dirty = true;
        Ok(())
    }

    fn set_uniform_address(&mut self, gpu_address: u64) -> Result<()> {
        self.ensure_recording()?;
        self.push_constants.uniform_address = gpu_address;
        self.push_dirty = true;
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.ensure_recording()?;
        if !self.in_rendering {
            engine_bail!(SOURCE, "Draw outside of a rendering scope");
        }
        if self.bound_pipeline != Some(PipelineBindPoint::Graphics) {
            engine_bail!(SOURCE, "Draw needs a graphics pipeline");
        }
        self.flush_push_constants()?;
        unsafe {
            self.ctx.device.cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.ensure_outside_rendering("Dispatch")?;
        if self.bound_pipeline != Some(PipelineBindPoint::Compute) {
            engine_bail!(SOURCE, "Dispatch needs a compute pipeline");
        }
        self.flush_push_constants()?;
        unsafe { self.ctx.device.cmd_dispatch(self.command_buffer, x, y, z) };
        Ok(())
    }

    fn copy_buffer(&mut self, src: &dyn BinderBuffer, src_offset: u64, dst: &dyn BinderBuffer, dst_offset: u64, size: u64) -> Result<()> {
        self.ensure_outside_rendering("Buffer copy")?;
        if src_offset.saturating_add(size) > src.size() || dst_offset.saturating_add(size) > dst.size() {
            engine_bail!(
                SOURCE,
                "Copy of {} bytes out of range ('{}' at {}, '{}' at {})",
                size,
                src.name(),
                src_offset,
                dst.name(),
                dst_offset
            );
        }

        let vk_src = vulkan_buffer::as_vulkan(src)?;
        let vk_dst = vulkan_buffer::as_vulkan(dst)?;
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.ctx.device.cmd_copy_buffer(self.command_buffer, vk_src.buffer, vk_dst.buffer, &[region]);
        }
        Ok(())
    }

    fn copy_buffer_to_texture(&mut self, src: &dyn BinderBuffer, src_offset: u64, dst: &dyn BinderTexture, mip: u32, slice: u32) -> Result<()> {
        self.ensure_outside_rendering("Texture upload")?;

        let info = dst.info();
        if mip >= info.mip_levels || slice >= info.array_layers {
            engine_bail!(SOURCE, "'{}' has no subresource (mip {}, slice {})", info.name, mip, slice);
        }
        let extent = mip_extent(info.width, info.height, mip);
        let bytes = extent.width as u64 * extent.height as u64 * info.format.bytes_per_texel() as u64;
        if src_offset.saturating_add(bytes) > src.size() {
            engine_bail!(
                SOURCE,
                "Upload of {} bytes at offset {} overflows '{}' ({} bytes)",
                bytes,
                src_offset,
                src.name(),
                src.size()
            );
        }

        let vk_src = vulkan_buffer::as_vulkan(src)?;
        let vk_dst = vulkan_texture::as_vulkan(dst)?;
        let region = vk::BufferImageCopy::default()
            .buffer_offset(src_offset)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk_dst.aspect,
                mip_level: mip,
                base_array_layer: slice,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(extent);

        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                vk_src.buffer,
                vk_dst.image,
                access_scope(ResourceAccessState::CopyDest).layout,
                &[region],
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        // Destroying the pool frees the command buffer
        unsafe { self.ctx.device.destroy_command_pool(self.command_pool, None) };
    }
}
