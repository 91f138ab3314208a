/// Texture - Vulkan implementation of the Texture trait

use ash::vk;
use galaxy_3d_binder::galaxy3d::render::{Texture as BinderTexture, TextureDesc, TextureInfo, TextureUsage};
use galaxy_3d_binder::galaxy3d::{Error, Result};
use galaxy_3d_binder::{engine_bail, engine_debug};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_context::{allocation_failure, lock, vk_failure, GpuContext, SOURCE};
use crate::vulkan_format::{aspect_mask, sample_count_to_vk, texture_format_to_vk, texture_usage_to_vk};

/// Image view destroyed when the last reference drops
///
/// Command lists keep the views they record with until they are reset, so a
/// view replaced in a descriptor slot outlives the frames still using it.
pub struct ImageViewHandle {
    ctx: Arc<GpuContext>,
    pub(crate) view: vk::ImageView,
}

impl Drop for ImageViewHandle {
    fn drop(&mut self) {
        unsafe { self.ctx.device.destroy_image_view(self.view, None) };
    }
}

/// Vulkan texture implementation
pub struct VulkanTexture {
    ctx: Arc<GpuContext>,
    /// Vulkan image
    pub(crate) image: vk::Image,
    /// View over every mip and layer, used for shader access
    pub(crate) view: Arc<ImageViewHandle>,
    /// GPU memory allocation (`None` for swapchain images)
    allocation: Option<Allocation>,
    pub(crate) format: vk::Format,
    pub(crate) aspect: vk::ImageAspectFlags,
    /// Read-only texture properties
    info: TextureInfo,
    /// Subresources whose contents are still undefined, indexed
    /// `slice * mip_levels + mip`
    undefined: Mutex<Vec<bool>>,
}

impl VulkanTexture {
    /// Create an image, bind device-local memory and create its full view
    pub(crate) fn create(ctx: &Arc<GpuContext>, desc: &TextureDesc) -> Result<Self> {
        let info = TextureInfo::from_desc(desc);
        if info.width == 0 || info.height == 0 {
            engine_bail!(SOURCE, "Texture '{}' has a zero extent ({}x{})", info.name, info.width, info.height);
        }
        let samples = match sample_count_to_vk(info.sample_count) {
            Some(samples) => samples,
            None => engine_bail!(SOURCE, "Texture '{}': unsupported sample count {}", info.name, info.sample_count),
        };
        if info.is_multisampled() && info.mip_levels > 1 {
            engine_bail!(SOURCE, "Texture '{}': multisampled textures cannot have mips", info.name);
        }

        let format = texture_format_to_vk(info.format);
        let aspect = aspect_mask(info.format);
        let mut usage = texture_usage_to_vk(info.usage);
        if info.is_multisampled() {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if info.usage.contains(TextureUsage::SAMPLED) {
            // Uploads go through copy commands
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: info.width,
                    height: info.height,
                    depth: 1,
                })
                .mip_levels(info.mip_levels)
                .array_layers(info.array_layers)
                .samples(samples)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_create_info, None)
                .map_err(|e| vk_failure!(e, "Failed to create image '{}'", info.name))?;

            let requirements = ctx.device.get_image_memory_requirements(image);
            let allocation = lock(&*ctx.allocator, "allocator")?
                .allocate(&AllocationCreateDesc {
                    name: &info.name,
                    requirements,
                    location: gpu_allocator::MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_image(image, None);
                    return Err(allocation_failure(&info.name, requirements.size, e));
                }
            };

            if let Err(e) = ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                lock(&*ctx.allocator, "allocator")?.free(allocation).ok();
                ctx.device.destroy_image(image, None);
                return Err(vk_failure!(e, "Failed to bind memory of image '{}'", info.name));
            }

            let view_type = if info.array_layers > 1 {
                vk::ImageViewType::TYPE_2D_ARRAY
            } else {
                vk::ImageViewType::TYPE_2D
            };
            let full_range = vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: info.mip_levels,
                base_array_layer: 0,
                layer_count: info.array_layers,
            };
            let view = match create_view(ctx, image, format, view_type, full_range) {
                Ok(view) => view,
                Err(e) => {
                    lock(&*ctx.allocator, "allocator")?.free(allocation).ok();
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            engine_debug!(
                SOURCE,
                "Texture '{}' created ({}x{}, {} mip(s), {} layer(s), {} sample(s))",
                info.name,
                info.width,
                info.height,
                info.mip_levels,
                info.array_layers,
                info.sample_count
            );

            Ok(Self {
                ctx: Arc::clone(ctx),
                image,
                view,
                allocation: Some(allocation),
                format,
                aspect,
                undefined: Mutex::new(vec![true; (info.mip_levels * info.array_layers) as usize]),
                info,
            })
        }
    }

    /// Wrap a swapchain image; the swapchain keeps ownership of the image
    pub(crate) fn from_swapchain_image(
        ctx: &Arc<GpuContext>,
        image: vk::Image,
        format: vk::Format,
        info: TextureInfo,
    ) -> Result<Self> {
        let aspect = vk::ImageAspectFlags::COLOR;
        let range = vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let view = create_view(ctx, image, format, vk::ImageViewType::TYPE_2D, range)?;
        Ok(Self {
            ctx: Arc::clone(ctx),
            image,
            view,
            allocation: None,
            format,
            aspect,
            undefined: Mutex::new(vec![true]),
            info,
        })
    }

    /// Single-subresource 2D view, for attachments
    pub(crate) fn subresource_view(&self, mip: u32, slice: u32) -> Result<Arc<ImageViewHandle>> {
        if mip >= self.info.mip_levels || slice >= self.info.array_layers {
            return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::InvalidResource(format!(
                "'{}' has no subresource (mip {}, slice {})",
                self.info.name, mip, slice
            ))));
        }
        let range = vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: mip,
            level_count: 1,
            base_array_layer: slice,
            layer_count: 1,
        };
        create_view(&self.ctx, self.image, self.format, vk::ImageViewType::TYPE_2D, range)
    }

    /// Whether this is the first transition of (mip, slice)
    ///
    /// Images are created in the undefined layout whatever state the binder
    /// tracks them in, so their first barrier must discard the contents.
    pub(crate) fn take_undefined(&self, mip: u32, slice: u32) -> Result<bool> {
        let index = (slice * self.info.mip_levels + mip) as usize;
        let mut undefined = lock(&self.undefined, "texture layouts")?;
        Ok(undefined.get_mut(index).map_or(false, std::mem::take))
    }

    pub(crate) fn layout_range(&self, mip: u32, slice: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: mip,
            level_count: 1,
            base_array_layer: slice,
            layer_count: 1,
        }
    }
}

fn create_view(
    ctx: &Arc<GpuContext>,
    image: vk::Image,
    format: vk::Format,
    view_type: vk::ImageViewType,
    range: vk::ImageSubresourceRange,
) -> Result<Arc<ImageViewHandle>> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(range);

    let view = unsafe {
        ctx.device
            .create_image_view(&create_info, None)
            .map_err(|e| vk_failure!(e, "Failed to create image view"))?
    };
    Ok(Arc::new(ImageViewHandle {
        ctx: Arc::clone(ctx),
        view,
    }))
}

/// Downcast a binder texture to the Vulkan one
pub(crate) fn as_vulkan(texture: &dyn BinderTexture) -> Result<&VulkanTexture> {
    texture.as_any().downcast_ref::<VulkanTexture>().ok_or_else(|| {
        galaxy_3d_binder::engine_raise!(SOURCE, Error::InvalidResource(format!(
            "texture '{}' was not created by the Vulkan device",
            texture.info().name
        )))
    })
}

impl BinderTexture for VulkanTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        // Swapchain images belong to the swapchain
        let Some(allocation) = self.allocation.take() else {
            return;
        };
        if let Ok(mut allocator) = self.ctx.allocator.lock() {
            allocator.free(allocation).ok();
        }
        unsafe { self.ctx.device.destroy_image(self.image, None) };
    }
}
