/// Swapchain - Vulkan implementation of the Swapchain trait
///
/// Back buffers are exposed as textures. Acquiring an image arms the next
/// `submit` to wait for it and to signal the semaphore that `present` waits
/// on, so presentation needs no extra call from the renderer.

use ash::vk;
use galaxy_3d_binder::galaxy3d::render::{
    Swapchain as BinderSwapchain, Texture as BinderTexture, TextureFormat, TextureInfo, TextureUsage,
};
use galaxy_3d_binder::galaxy3d::{Error, Result};
use galaxy_3d_binder::{engine_bail, engine_info, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use crate::vulkan_context::{lock, vk_failure, GpuContext, PresentSync, SOURCE};
use crate::vulkan_format::vk_format_to_texture_format;
use crate::vulkan_graphics_device::VulkanGraphicsDevice;
use crate::vulkan_texture::VulkanTexture;

/// Vulkan swapchain implementation
pub struct VulkanSwapchain {
    ctx: Arc<GpuContext>,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    back_buffers: Vec<Arc<VulkanTexture>>,
    format: TextureFormat,
    extent: vk::Extent2D,

    /// Signaled by acquire, rotated per acquire
    image_available_semaphores: Vec<vk::Semaphore>,
    /// One per swapchain image, signaled by the submit rendering into it
    render_finished_semaphores: Vec<vk::Semaphore>,
    next_acquire: usize,
}

impl VulkanSwapchain {
    /// Create a swapchain for `window`
    ///
    /// The device must have been created with `VulkanGraphicsDevice::with_display`.
    ///
    /// # Arguments
    ///
    /// * `device` - Device owning the swapchain
    /// * `window` - Window providing the raw handles
    /// * `width` - Width used when the surface does not dictate one
    /// * `height` - Height used when the surface does not dictate one
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        device: &VulkanGraphicsDevice,
        window: &W,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let ctx = Arc::clone(device.context());

        let display_handle = window
            .display_handle()
            .map_err(|e| galaxy_3d_binder::engine_err!(SOURCE, "No display handle: {}", e))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| galaxy_3d_binder::engine_err!(SOURCE, "No window handle: {}", e))?;

        let surface = unsafe {
            ash_window::create_surface(
                &ctx.entry,
                &ctx.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| vk_failure!(e, "Failed to create window surface"))?
        };
        let surface_loader = ash::khr::surface::Instance::new(&ctx.entry, &ctx.instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);

        // From here on, Drop releases whatever was created
        let mut swapchain = Self {
            ctx,
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            back_buffers: Vec::new(),
            format: TextureFormat::B8G8R8A8_SRGB,
            extent: vk::Extent2D::default(),
            image_available_semaphores: Vec::new(),
            render_finished_semaphores: Vec::new(),
            next_acquire: 0,
        };
        unsafe { swapchain.create_swapchain(width, height)? };
        Ok(swapchain)
    }

    unsafe fn create_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let surface = self.surface;
        let surface_loader = &self.surface_loader;
        let supported = surface_loader
            .get_physical_device_surface_support(ctx.physical_device, ctx.graphics_queue_family, surface)
            .map_err(|e| vk_failure!(e, "Failed to query present support"))?;
        if !supported {
            return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::InitializationFailed(
                "graphics queue cannot present to this surface".to_string()
            )));
        }

        let surface_capabilities = surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, surface)
            .map_err(|e| vk_failure!(e, "Failed to get surface capabilities"))?;
        let surface_formats = surface_loader
            .get_physical_device_surface_formats(ctx.physical_device, surface)
            .map_err(|e| vk_failure!(e, "Failed to get surface formats"))?;

        // Prefer sRGB, accept any format the binder can name
        let surface_format = surface_formats
            .iter()
            .find(|f| f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
            .or_else(|| surface_formats.iter().find(|f| vk_format_to_texture_format(f.format).is_some()))
            .copied();
        let Some(surface_format) = surface_format else {
            return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::InitializationFailed(
                "no supported surface format".to_string()
            )));
        };
        let Some(format) = vk_format_to_texture_format(surface_format.format) else {
            return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::InitializationFailed(format!(
                "unsupported surface format {:?}",
                surface_format.format
            ))));
        };

        let extent = if surface_capabilities.current_extent.width != u32::MAX {
            surface_capabilities.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(
                    surface_capabilities.min_image_extent.width,
                    surface_capabilities.max_image_extent.width,
                ),
                height: height.clamp(
                    surface_capabilities.min_image_extent.height,
                    surface_capabilities.max_image_extent.height,
                ),
            }
        };

        let image_count = surface_capabilities.min_image_count + 1;
        let image_count = if surface_capabilities.max_image_count > 0 {
            image_count.min(surface_capabilities.max_image_count)
        } else {
            image_count
        };

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        self.swapchain = self
            .swapchain_loader
            .create_swapchain(&swapchain_create_info, None)
            .map_err(|e| vk_failure!(e, "Failed to create swapchain"))?;
        self.format = format;
        self.extent = extent;

        let images = self
            .swapchain_loader
            .get_swapchain_images(self.swapchain)
            .map_err(|e| vk_failure!(e, "Failed to get swapchain images"))?;

        for (i, &image) in images.iter().enumerate() {
            let info = TextureInfo {
                name: format!("back_buffer_{}", i),
                width: extent.width,
                height: extent.height,
                format,
                usage: TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_DST,
                array_layers: 1,
                mip_levels: 1,
                sample_count: 1,
            };
            let texture = VulkanTexture::from_swapchain_image(&ctx, image, surface_format.format, info)?;
            self.back_buffers.push(Arc::new(texture));
        }

        let semaphore_create_info = vk::SemaphoreCreateInfo::default();
        for _ in 0..images.len() {
            let semaphore = ctx.device.create_semaphore(&semaphore_create_info, None)
                .map_err(|e| vk_failure!(e, "Failed to create image-available semaphore"))?;
            self.image_available_semaphores.push(semaphore);
            let semaphore = ctx.device.create_semaphore(&semaphore_create_info, None)
                .map_err(|e| vk_failure!(e, "Failed to create render-finished semaphore"))?;
            self.render_finished_semaphores.push(semaphore);
        }

        engine_info!(
            SOURCE,
            "Swapchain created ({}x{}, {:?}, {} images)",
            extent.width,
            extent.height,
            format,
            images.len()
        );
        Ok(())
    }
}

impl BinderSwapchain for VulkanSwapchain {
    fn acquire_next_image(&mut self) -> Result<u32> {
        let acquire_semaphore = self.image_available_semaphores[self.next_acquire];

        let (image_index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, acquire_semaphore, vk::Fence::null())
                .map_err(|e| vk_failure!(e, "Failed to acquire next swapchain image"))?
        };
        if suboptimal {
            engine_warn!(SOURCE, "Swapchain is suboptimal for the surface");
        }
        self.next_acquire = (self.next_acquire + 1) % self.image_available_semaphores.len();

        let Some(&render_finished) = self.render_finished_semaphores.get(image_index as usize) else {
            engine_bail!(SOURCE, "Acquired image {} out of range", image_index);
        };
        *lock(&self.ctx.present_sync, "present sync")? = Some(PresentSync {
            wait: acquire_semaphore,
            signal: render_finished,
        });
        Ok(image_index)
    }

    fn back_buffer(&self, index: u32) -> Option<Arc<dyn BinderTexture>> {
        self.back_buffers
            .get(index as usize)
            .map(|texture| Arc::clone(texture) as Arc<dyn BinderTexture>)
    }

    fn present(&mut self, index: u32) -> Result<()> {
        let Some(&render_finished) = self.render_finished_semaphores.get(index as usize) else {
            engine_bail!(
                SOURCE,
                "present: image index {} out of range (count: {})",
                index,
                self.render_finished_semaphores.len()
            );
        };

        let swapchains = [self.swapchain];
        let image_indices = [index];
        let wait_semaphores = [render_finished];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let queue = lock(&self.ctx.graphics_queue, "graphics queue")?;
        match unsafe { self.swapchain_loader.queue_present(*queue, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) => {
                engine_warn!(SOURCE, "Swapchain is suboptimal for the surface");
                Ok(())
            }
            Err(e) => Err(vk_failure!(e, "Failed to present swapchain image {}", index)),
        }
    }

    fn image_count(&self) -> usize {
        self.back_buffers.len()
    }

    fn extent(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }

    fn format(&self) -> TextureFormat {
        self.format
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.ctx.device.device_wait_idle() {
                engine_warn!(SOURCE, "device_wait_idle failed while dropping the swapchain: {:?}", e);
            }

            if let Ok(mut present_sync) = self.ctx.present_sync.lock() {
                *present_sync = None;
            }
            for &semaphore in self.image_available_semaphores.iter().chain(&self.render_finished_semaphores) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }

            // Back buffer views go before the swapchain owning their images
            self.back_buffers.clear();
            // Null when creation failed early, which Vulkan accepts
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
