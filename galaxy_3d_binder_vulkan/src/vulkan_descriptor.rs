/// Bindless descriptor storages for the Vulkan backend
///
/// Every descriptor heap kind maps to one device-wide array of slots:
///
/// - `ShaderResource`: descriptor set 0, one array per descriptor type
///   (sampled image, storage image, uniform buffer, storage buffer), all
///   indexed by the same slot number
/// - `Sampler`: descriptor set 1, one sampler array
/// - `ColorAttachment` / `DepthAttachment`: host-side image views consumed
///   by `begin_rendering`
///
/// Slot addresses are `(kind index + 1) << 32 | slot`, with an increment of
/// one. Shaders receive the slot number of each bound table, and the device
/// address of the uniform block, through push constants.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use galaxy_3d_binder::galaxy3d::render::{
    BindingSlot, DescriptorHeapKind, DescriptorStorage, PerKind, ResourceView, SamplerDesc, Texture,
};
use galaxy_3d_binder::galaxy3d::{Config, Error, Result};
use galaxy_3d_binder::{engine_bail, engine_debug};
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer;
use crate::vulkan_context::{lock, vk_failure, GpuContext, SOURCE};
use crate::vulkan_texture::{self, ImageViewHandle};

const SLOT_MASK: u64 = 0xFFFF_FFFF;

/// Bindings of the shader resource set
pub(crate) const SAMPLED_IMAGE_BINDING: u32 = 0;
pub(crate) const STORAGE_IMAGE_BINDING: u32 = 1;
pub(crate) const UNIFORM_BUFFER_BINDING: u32 = 2;
pub(crate) const STORAGE_BUFFER_BINDING: u32 = 3;

/// Base address of the storage of `kind`
pub(crate) fn storage_base(kind: DescriptorHeapKind) -> u64 {
    (kind.index() as u64 + 1) << 32
}

/// Slot number encoded in a descriptor address
pub(crate) fn slot_index(address: u64) -> u32 {
    (address & SLOT_MASK) as u32
}

/// Heap kind encoded in a descriptor address, `None` for foreign addresses
pub(crate) fn address_kind(address: u64) -> Option<DescriptorHeapKind> {
    let tag = (address >> 32) as usize;
    tag.checked_sub(1).and_then(|i| DescriptorHeapKind::ALL.get(i).copied())
}

// ============================================================================
// PUSH CONSTANTS
// ============================================================================

/// Per-draw block pushed to every shader stage
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct PushConstants {
    /// Device address of the uniform block
    pub uniform_address: u64,
    /// First slot of the read table in the shader resource set
    pub read_table: u32,
    /// First slot of the write table in the shader resource set
    pub write_table: u32,
    /// First slot of the sampler table in the sampler set
    pub sampler_table: u32,
    pub _pad: u32,
}

impl PushConstants {
    pub(crate) const SIZE: u32 = std::mem::size_of::<PushConstants>() as u32;

    pub(crate) fn set_table(&mut self, slot: BindingSlot, gpu_address: u64) {
        let index = slot_index(gpu_address);
        match slot {
            BindingSlot::ReadTable => self.read_table = index,
            BindingSlot::WriteTable => self.write_table = index,
            BindingSlot::SamplerTable => self.sampler_table = index,
        }
    }
}

// ============================================================================
// BINDLESS LAYOUT
// ============================================================================

/// Set layouts and the pipeline layout shared by every pipeline
pub(crate) struct BindlessLayout {
    pub(crate) shader_resource_layout: vk::DescriptorSetLayout,
    pub(crate) sampler_layout: vk::DescriptorSetLayout,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    /// Array sizes the layouts were created with
    pub(crate) capacities: PerKind<u32>,
}

impl BindlessLayout {
    /// Create the layouts sized from the configured descriptor budgets
    pub(crate) fn new(device: &ash::Device, config: &Config) -> Result<Self> {
        let mut capacities = PerKind::splat(1u32);
        for kind in DescriptorHeapKind::ALL {
            let wanted = config.storage_capacity(kind).clamp(1, u32::MAX as u64) as u32;
            capacities.set(kind, wanted);
        }

        let sr_count = capacities[DescriptorHeapKind::ShaderResource];
        let sr_types = [
            (SAMPLED_IMAGE_BINDING, vk::DescriptorType::SAMPLED_IMAGE),
            (STORAGE_IMAGE_BINDING, vk::DescriptorType::STORAGE_IMAGE),
            (UNIFORM_BUFFER_BINDING, vk::DescriptorType::UNIFORM_BUFFER),
            (STORAGE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER),
        ];
        let sr_bindings: Vec<vk::DescriptorSetLayoutBinding> = sr_types
            .iter()
            .map(|&(binding, ty)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(ty)
                    .descriptor_count(sr_count)
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect();
        let sampler_bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::SAMPLER)
            .descriptor_count(capacities[DescriptorHeapKind::Sampler])
            .stage_flags(vk::ShaderStageFlags::ALL)];

        unsafe {
            let shader_resource_layout = create_set_layout(device, &sr_bindings)?;
            let sampler_layout = match create_set_layout(device, &sampler_bindings) {
                Ok(layout) => layout,
                Err(e) => {
                    device.destroy_descriptor_set_layout(shader_resource_layout, None);
                    return Err(e);
                }
            };

            let set_layouts = [shader_resource_layout, sampler_layout];
            let push_constant_ranges = [vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::ALL,
                offset: 0,
                size: PushConstants::SIZE,
            }];
            let layout_create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts)
                .push_constant_ranges(&push_constant_ranges);

            let pipeline_layout = match device.create_pipeline_layout(&layout_create_info, None) {
                Ok(layout) => layout,
                Err(e) => {
                    device.destroy_descriptor_set_layout(sampler_layout, None);
                    device.destroy_descriptor_set_layout(shader_resource_layout, None);
                    return Err(vk_failure!(e, "Failed to create bindless pipeline layout"));
                }
            };

            engine_debug!(
                SOURCE,
                "Bindless layout created ({} shader resources, {} samplers)",
                sr_count,
                capacities[DescriptorHeapKind::Sampler]
            );

            Ok(Self {
                shader_resource_layout,
                sampler_layout,
                pipeline_layout,
                capacities,
            })
        }
    }

    pub(crate) fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_set_layout(self.sampler_layout, None);
            device.destroy_descriptor_set_layout(self.shader_resource_layout, None);
        }
    }
}

unsafe fn create_set_layout(
    device: &ash::Device,
    bindings: &[vk::DescriptorSetLayoutBinding],
) -> Result<vk::DescriptorSetLayout> {
    let binding_flags = vec![
        vk::DescriptorBindingFlags::PARTIALLY_BOUND | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND;
        bindings.len()
    ];
    let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default()
        .binding_flags(&binding_flags);
    let create_info = vk::DescriptorSetLayoutCreateInfo::default()
        .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
        .bindings(bindings)
        .push_next(&mut flags_info);

    device
        .create_descriptor_set_layout(&create_info, None)
        .map_err(|e| vk_failure!(e, "Failed to create descriptor set layout"))
}

// ============================================================================
// STORAGE CREATION
// ============================================================================

/// Create the storage of `kind`; each kind can have only one per device
pub(crate) fn create_storage(
    ctx: &Arc<GpuContext>,
    kind: DescriptorHeapKind,
    capacity: u32,
) -> Result<Arc<dyn DescriptorStorage>> {
    let layout_capacity = ctx.bindless.capacities[kind];
    if capacity == 0 || (kind.is_shader_visible() && capacity > layout_capacity) {
        return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::capacity_exhausted(
            format!("{} descriptor storage", kind),
            capacity as u64,
            0,
            layout_capacity as u64,
        )));
    }

    let mut registry = lock(&ctx.storages, "storage registry")?;
    if registry.created[kind] {
        engine_bail!(SOURCE, "A {} descriptor storage already exists on this device", kind);
    }

    let storage: Arc<dyn DescriptorStorage> = match kind {
        DescriptorHeapKind::ShaderResource => {
            let storage = ShaderResourceStorage::new(ctx, capacity)?;
            registry.shader_resource_set = Some(storage.set.set);
            Arc::new(storage)
        }
        DescriptorHeapKind::Sampler => {
            let storage = SamplerStorage::new(ctx, capacity)?;
            registry.sampler_set = Some(storage.set.set);
            Arc::new(storage)
        }
        DescriptorHeapKind::ColorAttachment => {
            let storage = Arc::new(AttachmentStorage::new(kind, capacity));
            registry.color_attachments = Arc::downgrade(&storage);
            storage
        }
        DescriptorHeapKind::DepthAttachment => {
            let storage = Arc::new(AttachmentStorage::new(kind, capacity));
            registry.depth_attachments = Arc::downgrade(&storage);
            storage
        }
    };
    registry.created[kind] = true;

    engine_debug!(SOURCE, "{} descriptor storage created ({} slots)", kind, capacity);
    Ok(storage)
}

fn check_range(kind: DescriptorHeapKind, capacity: u32, first: u32, count: u32) -> Result<()> {
    let end = first as u64 + count as u64;
    if end > capacity as u64 {
        return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::InvalidResource(format!(
            "{} slots {}..{} out of range (capacity {})",
            kind, first, end, capacity
        ))));
    }
    Ok(())
}

/// Pool plus the single set allocated from it
struct OwnedSet {
    ctx: Arc<GpuContext>,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

impl OwnedSet {
    fn new(
        ctx: &Arc<GpuContext>,
        layout: vk::DescriptorSetLayout,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let pool_create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .pool_sizes(pool_sizes)
            .max_sets(1);

        unsafe {
            let pool = ctx.device.create_descriptor_pool(&pool_create_info, None)
                .map_err(|e| vk_failure!(e, "Failed to create descriptor pool"))?;

            let layouts = [layout];
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);
            let sets = match ctx.device.allocate_descriptor_sets(&allocate_info) {
                Ok(sets) => sets,
                Err(e) => {
                    ctx.device.destroy_descriptor_pool(pool, None);
                    return Err(vk_failure!(e, "Failed to allocate bindless descriptor set"));
                }
            };

            Ok(Self {
                ctx: Arc::clone(ctx),
                pool,
                set: sets[0],
            })
        }
    }
}

impl Drop for OwnedSet {
    fn drop(&mut self) {
        // Freeing the pool frees the set
        unsafe { self.ctx.device.destroy_descriptor_pool(self.pool, None) };
    }
}

// ============================================================================
// SHADER RESOURCE STORAGE
// ============================================================================

/// Shader resource slots backed by descriptor set 0
///
/// Each slot keeps the view written into it, so the viewed resource lives at
/// least as long as the descriptor referencing it.
pub(crate) struct ShaderResourceStorage {
    set: OwnedSet,
    capacity: u32,
    views: Mutex<Vec<Option<ResourceView>>>,
}

impl ShaderResourceStorage {
    fn new(ctx: &Arc<GpuContext>, capacity: u32) -> Result<Self> {
        let count = ctx.bindless.capacities[DescriptorHeapKind::ShaderResource];
        let pool_sizes = [
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorType::STORAGE_IMAGE,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::STORAGE_BUFFER,
        ]
        .map(|ty| vk::DescriptorPoolSize { ty, descriptor_count: count });

        let set = OwnedSet::new(ctx, ctx.bindless.shader_resource_layout, &pool_sizes)?;
        Ok(Self {
            set,
            capacity,
            views: Mutex::new(vec![None; capacity as usize]),
        })
    }

    fn write_descriptor(&self, index: u32, view: &ResourceView) -> Result<()> {
        let device = &self.set.ctx.device;
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set.set)
            .dst_array_element(index);

        match view {
            ResourceView::SampledTexture(texture) | ResourceView::StorageTexture(texture) => {
                let (binding, ty, layout) = match view {
                    ResourceView::StorageTexture(_) => (
                        STORAGE_IMAGE_BINDING,
                        vk::DescriptorType::STORAGE_IMAGE,
                        vk::ImageLayout::GENERAL,
                    ),
                    _ => (
                        SAMPLED_IMAGE_BINDING,
                        vk::DescriptorType::SAMPLED_IMAGE,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    ),
                };
                let vk_texture = vulkan_texture::as_vulkan(texture.as_ref())?;
                let image_info = [vk::DescriptorImageInfo::default()
                    .image_view(vk_texture.view.view)
                    .image_layout(layout)];
                let write = write.dst_binding(binding).descriptor_type(ty).image_info(&image_info);
                unsafe { device.update_descriptor_sets(&[write], &[]) };
            }
            ResourceView::UniformBuffer { buffer, offset, size }
            | ResourceView::StorageBuffer { buffer, offset, size } => {
                let (binding, ty) = match view {
                    ResourceView::StorageBuffer { .. } => (STORAGE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER),
                    _ => (UNIFORM_BUFFER_BINDING, vk::DescriptorType::UNIFORM_BUFFER),
                };
                if offset.saturating_add(*size) > buffer.size() {
                    engine_bail!(
                        SOURCE,
                        "View {}..{} exceeds buffer '{}' ({} bytes)",
                        offset,
                        offset + size,
                        buffer.name(),
                        buffer.size()
                    );
                }
                let vk_buffer = vulkan_buffer::as_vulkan(buffer.as_ref())?;
                let buffer_info = [vk::DescriptorBufferInfo::default()
                    .buffer(vk_buffer.buffer)
                    .offset(*offset)
                    .range(*size)];
                let write = write.dst_binding(binding).descriptor_type(ty).buffer_info(&buffer_info);
                unsafe { device.update_descriptor_sets(&[write], &[]) };
            }
            other => {
                return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::InvalidResource(format!(
                    "{:?} cannot be written to a ShaderResource slot",
                    other
                ))));
            }
        }
        Ok(())
    }
}

impl DescriptorStorage for ShaderResourceStorage {
    fn kind(&self) -> DescriptorHeapKind {
        DescriptorHeapKind::ShaderResource
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn increment(&self) -> u64 {
        1
    }

    fn cpu_base(&self) -> u64 {
        storage_base(DescriptorHeapKind::ShaderResource)
    }

    fn gpu_base(&self) -> u64 {
        storage_base(DescriptorHeapKind::ShaderResource)
    }

    fn write(&self, index: u32, view: &ResourceView) -> Result<()> {
        check_range(self.kind(), self.capacity, index, 1)?;
        self.write_descriptor(index, view)?;
        lock(&self.views, "shader resource views")?[index as usize] = Some(view.clone());
        Ok(())
    }

    fn copy(&self, dst: u32, src: u32, count: u32) -> Result<()> {
        check_range(self.kind(), self.capacity, dst, count)?;
        check_range(self.kind(), self.capacity, src, count)?;

        let mut views = lock(&self.views, "shader resource views")?;
        let sources: Vec<Option<ResourceView>> = views[src as usize..(src + count) as usize].to_vec();
        for (i, view) in sources.into_iter().enumerate() {
            let index = dst + i as u32;
            if let Some(view) = &view {
                self.write_descriptor(index, view)?;
            }
            views[index as usize] = view;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// SAMPLER STORAGE
// ============================================================================

/// Sampler slots backed by descriptor set 1
pub(crate) struct SamplerStorage {
    set: OwnedSet,
    capacity: u32,
    descs: Mutex<Vec<Option<SamplerDesc>>>,
}

impl SamplerStorage {
    fn new(ctx: &Arc<GpuContext>, capacity: u32) -> Result<Self> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLER,
            descriptor_count: ctx.bindless.capacities[DescriptorHeapKind::Sampler],
        }];
        let set = OwnedSet::new(ctx, ctx.bindless.sampler_layout, &pool_sizes)?;
        Ok(Self {
            set,
            capacity,
            descs: Mutex::new(vec![None; capacity as usize]),
        })
    }

    fn write_sampler(&self, index: u32, sampler: vk::Sampler) {
        let image_info = [vk::DescriptorImageInfo::default().sampler(sampler)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set.set)
            .dst_binding(0)
            .dst_array_element(index)
            .descriptor_type(vk::DescriptorType::SAMPLER)
            .image_info(&image_info);
        unsafe { self.set.ctx.device.update_descriptor_sets(&[write], &[]) };
    }
}

impl DescriptorStorage for SamplerStorage {
    fn kind(&self) -> DescriptorHeapKind {
        DescriptorHeapKind::Sampler
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn increment(&self) -> u64 {
        1
    }

    fn cpu_base(&self) -> u64 {
        storage_base(DescriptorHeapKind::Sampler)
    }

    fn gpu_base(&self) -> u64 {
        storage_base(DescriptorHeapKind::Sampler)
    }

    fn write(&self, index: u32, view: &ResourceView) -> Result<()> {
        check_range(self.kind(), self.capacity, index, 1)?;
        let ResourceView::Sampler(desc) = view else {
            return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{:?} cannot be written to a Sampler slot",
                view
            ))));
        };
        let ctx = &self.set.ctx;
        let sampler = lock(&ctx.samplers, "sampler cache")?.get(&ctx.device, *desc)?;
        self.write_sampler(index, sampler);
        lock(&self.descs, "sampler descs")?[index as usize] = Some(*desc);
        Ok(())
    }

    fn copy(&self, dst: u32, src: u32, count: u32) -> Result<()> {
        check_range(self.kind(), self.capacity, dst, count)?;
        check_range(self.kind(), self.capacity, src, count)?;

        let ctx = &self.set.ctx;
        let mut descs = lock(&self.descs, "sampler descs")?;
        let mut samplers = lock(&ctx.samplers, "sampler cache")?;
        let sources: Vec<_> = descs[src as usize..(src + count) as usize].to_vec();
        for (i, desc) in sources.into_iter().enumerate() {
            let index = dst + i as u32;
            if let Some(desc) = desc {
                let sampler = samplers.get(&ctx.device, desc)?;
                self.write_sampler(index, sampler);
            }
            descs[index as usize] = desc;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// ATTACHMENT STORAGE
// ============================================================================

/// Attachment view held by a color or depth slot
#[derive(Clone)]
pub(crate) struct AttachmentView {
    pub view: Arc<ImageViewHandle>,
    /// Keeps the image alive while the view exists
    pub texture: Arc<dyn Texture>,
    pub extent: vk::Extent2D,
}

/// Host-side attachment slots, never visible to shaders
pub(crate) struct AttachmentStorage {
    kind: DescriptorHeapKind,
    capacity: u32,
    slots: Mutex<Vec<Option<AttachmentView>>>,
}

impl AttachmentStorage {
    fn new(kind: DescriptorHeapKind, capacity: u32) -> Self {
        Self {
            kind,
            capacity,
            slots: Mutex::new(vec![None; capacity as usize]),
        }
    }

    /// View stored at a CPU address of this storage
    pub(crate) fn resolve(&self, cpu_address: u64) -> Result<AttachmentView> {
        if address_kind(cpu_address) != Some(self.kind) {
            return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::InvalidResource(format!(
                "address 0x{:x} is not a {} slot",
                cpu_address, self.kind
            ))));
        }
        let index = slot_index(cpu_address);
        check_range(self.kind, self.capacity, index, 1)?;
        lock(&self.slots, "attachment slots")?[index as usize]
            .clone()
            .ok_or_else(|| {
                galaxy_3d_binder::engine_raise!(SOURCE, Error::InvalidResource(format!(
                    "{} slot {} is empty",
                    self.kind, index
                )))
            })
    }
}

impl DescriptorStorage for AttachmentStorage {
    fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn increment(&self) -> u64 {
        1
    }

    fn cpu_base(&self) -> u64 {
        storage_base(self.kind)
    }

    fn gpu_base(&self) -> u64 {
        0
    }

    fn write(&self, index: u32, view: &ResourceView) -> Result<()> {
        check_range(self.kind, self.capacity, index, 1)?;
        let (texture, mip, slice) = match (self.kind, view) {
            (DescriptorHeapKind::ColorAttachment, ResourceView::ColorAttachment { texture, mip, slice })
            | (DescriptorHeapKind::DepthAttachment, ResourceView::DepthAttachment { texture, mip, slice }) => {
                (texture, *mip, *slice)
            }
            _ => {
                return Err(galaxy_3d_binder::engine_raise!(SOURCE, Error::InvalidResource(format!(
                    "{:?} cannot be written to a {} slot",
                    view, self.kind
                ))));
            }
        };

        let vk_texture = vulkan_texture::as_vulkan(texture.as_ref())?;
        let info = texture.info();
        let extent = crate::vulkan_format::mip_extent(info.width, info.height, mip);
        let attachment = AttachmentView {
            view: vk_texture.subresource_view(mip, slice)?,
            texture: Arc::clone(texture),
            extent: vk::Extent2D {
                width: extent.width,
                height: extent.height,
            },
        };
        lock(&self.slots, "attachment slots")?[index as usize] = Some(attachment);
        Ok(())
    }

    fn copy(&self, dst: u32, src: u32, count: u32) -> Result<()> {
        check_range(self.kind, self.capacity, dst, count)?;
        check_range(self.kind, self.capacity, src, count)?;
        let mut slots = lock(&self.slots, "attachment slots")?;
        let sources: Vec<_> = slots[src as usize..(src + count) as usize].to_vec();
        for (i, slot) in sources.into_iter().enumerate() {
            slots[(dst + i as u32) as usize] = slot;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "vulkan_descriptor_tests.rs"]
mod tests;
