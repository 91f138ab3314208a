/// SamplerCache - internal VkSampler management for the Vulkan backend
///
/// Creates VkSampler objects the first time a sampler descriptor is written
/// and keeps them until the device is destroyed. Renderers only ever use a
/// handful of distinct sampler states.

use ash::vk;
use galaxy_3d_binder::galaxy3d::render::{Filter, SamplerDesc};
use galaxy_3d_binder::galaxy3d::Result;
use rustc_hash::FxHashMap;

use crate::vulkan_context::vk_failure;
use crate::vulkan_format::{address_mode_to_vk, filter_to_vk, mipmap_mode_to_vk};

pub(crate) struct SamplerCache {
    cache: FxHashMap<SamplerDesc, vk::Sampler>,
    /// Maximum anisotropy for linear samplers, `None` when the feature is off
    max_anisotropy: Option<f32>,
}

impl SamplerCache {
    pub(crate) fn new(max_anisotropy: Option<f32>) -> Self {
        Self {
            cache: FxHashMap::default(),
            max_anisotropy,
        }
    }

    /// Get or create the VkSampler for `desc`
    pub(crate) fn get(&mut self, device: &ash::Device, desc: SamplerDesc) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.cache.get(&desc) {
            return Ok(sampler);
        }

        let sampler = self.create_vk_sampler(device, &desc)?;
        self.cache.insert(desc, sampler);
        Ok(sampler)
    }

    pub(crate) fn len(&self) -> usize {
        self.cache.len()
    }

    /// Destroy every cached VkSampler; the device must still be alive
    pub(crate) fn destroy_all(&mut self, device: &ash::Device) {
        for (_, sampler) in self.cache.drain() {
            unsafe { device.destroy_sampler(sampler, None) };
        }
    }

    fn create_vk_sampler(&self, device: &ash::Device, desc: &SamplerDesc) -> Result<vk::Sampler> {
        let address = address_mode_to_vk(desc.address_mode);
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(desc.mag_filter))
            .min_filter(filter_to_vk(desc.min_filter))
            .mipmap_mode(mipmap_mode_to_vk(desc.mipmap_filter))
            .address_mode_u(address)
            .address_mode_v(address)
            .address_mode_w(address)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .unnormalized_coordinates(false);

        let linear = desc.min_filter == Filter::Linear && desc.mag_filter == Filter::Linear;
        create_info = match self.max_anisotropy {
            Some(max_aniso) if linear => create_info.anisotropy_enable(true).max_anisotropy(max_aniso),
            _ => create_info.anisotropy_enable(false).max_anisotropy(1.0),
        };

        unsafe {
            device
                .create_sampler(&create_info, None)
                .map_err(|e| vk_failure!(e, "Failed to create sampler {:?}", desc))
        }
    }
}
