/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Creates the instance, picks the first GPU exposing the features the
/// binding model needs (timeline semaphores, descriptor indexing, buffer
/// device address, dynamic rendering, synchronization2) and owns the shared
/// `GpuContext`.

use ash::vk;
use galaxy_3d_binder::galaxy3d::render::{
    Buffer as BinderBuffer, BufferDesc, CommandList as BinderCommandList, DescriptorHeapKind,
    DescriptorStorage, Fence as BinderFence, GraphicsDevice, Texture as BinderTexture, TextureDesc,
};
use galaxy_3d_binder::galaxy3d::{Config, Error, Result};
use galaxy_3d_binder::{engine_debug, engine_info, engine_trace, engine_warn};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::HasDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_list::{self, VulkanCommandList};
use crate::vulkan_context::{lock, vk_failure, GpuContext, PresentSync, StorageRegistry, SOURCE};
use crate::vulkan_descriptor::{self, BindlessLayout};
use crate::vulkan_fence::{self, VulkanFence};
use crate::vulkan_sampler::SamplerCache;
use crate::vulkan_texture::VulkanTexture;

const BACKEND_NAME: &str = "vulkan";

fn init_failure(message: String) -> Error {
    galaxy_3d_binder::engine_raise!(SOURCE, Error::InitializationFailed(message))
}

/// Vulkan device implementation
///
/// Central object for creating resources and submitting commands.
/// Presentation lives in `VulkanSwapchain`.
pub struct VulkanGraphicsDevice {
    ctx: Arc<GpuContext>,
    device_name: String,
}

impl VulkanGraphicsDevice {
    /// Create a device without presentation support
    pub fn new(config: &Config) -> Result<Self> {
        Self::create(config, Vec::new())
    }

    /// Create a device able to present to windows of `display`
    pub fn with_display<D: HasDisplayHandle>(display: &D, config: &Config) -> Result<Self> {
        let display_handle = display
            .display_handle()
            .map_err(|e| init_failure(format!("Failed to get display handle: {}", e)))?;
        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| init_failure(format!("Failed to get required extensions: {}", e)))?
            .to_vec();
        Self::create(config, extensions)
    }

    /// Shared context, for objects created outside the trait
    pub(crate) fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Pipeline layout every pipeline must be created with
    ///
    /// Set 0 holds the shader resource arrays (bindings 0 sampled images,
    /// 1 storage images, 2 uniform buffers, 3 storage buffers), set 1 the
    /// sampler array. A 24-byte push constant block visible to all stages
    /// carries the uniform block address followed by the read, write and
    /// sampler table offsets.
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.ctx.bindless.pipeline_layout
    }

    /// Logical device, for pipeline creation
    pub fn raw_device(&self) -> &ash::Device {
        &self.ctx.device
    }

    /// Name of the selected GPU
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn create(config: &Config, mut extension_names: Vec<*const c_char>) -> Result<Self> {
        config.validate().map_err(|e| galaxy_3d_binder::engine_raise!(SOURCE, e))?;
        let presentable = !extension_names.is_empty();
        let validation = cfg!(feature = "vulkan-validation") && config.enable_validation;

        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| init_failure(format!("Failed to load Vulkan library: {:?}", e)))?;

            let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Galaxy3D")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_failure(format!("Failed to create instance: {:?}", e)))?;

            let debug_messenger = if validation {
                match Self::create_debug_messenger(&entry, &instance, config) {
                    Ok(messenger) => Some(messenger),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            match Self::create_device(entry, instance.clone(), debug_messenger.clone(), config, presentable) {
                Ok(device) => Ok(device),
                Err(e) => {
                    crate::debug::cleanup_debug_config();
                    if let Some((debug_utils, messenger)) = debug_messenger {
                        debug_utils.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                    Err(e)
                }
            }
        }
    }

    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &Config,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        crate::debug::init_debug_config(crate::debug::Config::from(config));

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::severity_flags(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils
            .create_debug_utils_messenger(&debug_info, None)
            .map_err(|e| init_failure(format!("Failed to create debug messenger: {:?}", e)))?;
        Ok((debug_utils, messenger))
    }

    /// Pick a GPU, create the logical device and everything the context owns
    ///
    /// On failure, objects created here are destroyed; the instance and
    /// messenger are left to the caller.
    unsafe fn create_device(
        entry: ash::Entry,
        instance: ash::Instance,
        debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
        config: &Config,
        presentable: bool,
    ) -> Result<Self> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| init_failure(format!("Failed to enumerate physical devices: {:?}", e)))?;

        let mut selected = None;
        for physical_device in physical_devices {
            let properties = instance.get_physical_device_properties(physical_device);
            let name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy().into_owned();
            if properties.api_version < vk::API_VERSION_1_3 {
                engine_debug!(SOURCE, "Skipping '{}': Vulkan 1.3 not supported", name);
                continue;
            }
            if let Some(missing) = missing_feature(&instance, physical_device) {
                engine_debug!(SOURCE, "Skipping '{}': {} not supported", name, missing);
                continue;
            }
            let family = instance
                .get_physical_device_queue_family_properties(physical_device)
                .iter()
                .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE));
            let Some(family) = family else {
                engine_debug!(SOURCE, "Skipping '{}': no graphics queue family", name);
                continue;
            };
            selected = Some((physical_device, family as u32, name, properties));
            break;
        }
        let Some((physical_device, graphics_family_index, device_name, properties)) = selected else {
            return Err(init_failure("No Vulkan 1.3 GPU with the required features found".to_string()));
        };

        let supported = instance.get_physical_device_features(physical_device);
        let anisotropy = supported.sampler_anisotropy == vk::TRUE;

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_family_index)
            .queue_priorities(&queue_priorities)];

        let device_extension_names = if presentable {
            vec![ash::khr::swapchain::NAME.as_ptr()]
        } else {
            vec![]
        };

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy);
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default()
            .timeline_semaphore(true)
            .buffer_device_address(true)
            .descriptor_indexing(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_storage_image_update_after_bind(true)
            .descriptor_binding_uniform_buffer_update_after_bind(true)
            .descriptor_binding_storage_buffer_update_after_bind(true)
            .shader_sampled_image_array_non_uniform_indexing(true)
            .shader_storage_image_array_non_uniform_indexing(true)
            .shader_uniform_buffer_array_non_uniform_indexing(true)
            .shader_storage_buffer_array_non_uniform_indexing(true);
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extension_names)
            .enabled_features(&features)
            .push_next(&mut features12)
            .push_next(&mut features13);

        let device = instance
            .create_device(physical_device, &device_create_info, None)
            .map_err(|e| init_failure(format!("Failed to create logical device: {:?}", e)))?;

        let graphics_queue = device.get_device_queue(graphics_family_index, 0);

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                device.destroy_device(None);
                return Err(init_failure(format!("Failed to create allocator: {:?}", e)));
            }
        };

        let bindless = match BindlessLayout::new(&device, config) {
            Ok(layout) => layout,
            Err(e) => {
                drop(allocator);
                device.destroy_device(None);
                return Err(e);
            }
        };

        let max_anisotropy = anisotropy.then_some(properties.limits.max_sampler_anisotropy.min(16.0));

        // From here on, GpuContext::drop releases everything, including the
        // instance and messenger
        let ctx = Arc::new(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue: Mutex::new(graphics_queue),
            graphics_queue_family: graphics_family_index,
            bindless,
            samplers: Mutex::new(SamplerCache::new(max_anisotropy)),
            storages: Mutex::new(StorageRegistry::default()),
            present_sync: Mutex::new(None),
            debug_messenger,
        });

        engine_info!(
            SOURCE,
            "Vulkan device '{}' created (validation: {}, presentation: {})",
            device_name,
            ctx.debug_messenger.is_some(),
            presentable
        );

        Ok(Self { ctx, device_name })
    }
}

/// First required feature the GPU lacks
unsafe fn missing_feature(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Option<&'static str> {
    let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut features12)
        .push_next(&mut features13);
    instance.get_physical_device_features2(physical_device, &mut features2);

    let required = [
        (features12.timeline_semaphore, "timeline semaphores"),
        (features12.buffer_device_address, "buffer device address"),
        (features12.descriptor_indexing, "descriptor indexing"),
        (features12.runtime_descriptor_array, "runtime descriptor arrays"),
        (features12.descriptor_binding_partially_bound, "partially bound descriptors"),
        (features12.descriptor_binding_sampled_image_update_after_bind, "update-after-bind"),
        (features12.descriptor_binding_storage_image_update_after_bind, "update-after-bind"),
        (features12.descriptor_binding_uniform_buffer_update_after_bind, "update-after-bind"),
        (features12.descriptor_binding_storage_buffer_update_after_bind, "update-after-bind"),
        (features12.shader_sampled_image_array_non_uniform_indexing, "non-uniform indexing"),
        (features12.shader_storage_image_array_non_uniform_indexing, "non-uniform indexing"),
        (features12.shader_uniform_buffer_array_non_uniform_indexing, "non-uniform indexing"),
        (features12.shader_storage_buffer_array_non_uniform_indexing, "non-uniform indexing"),
        (features13.dynamic_rendering, "dynamic rendering"),
        (features13.synchronization2, "synchronization2"),
    ];
    required.iter().find(|(supported, _)| *supported != vk::TRUE).map(|(_, name)| *name)
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn BinderTexture>> {
        Ok(Arc::new(VulkanTexture::create(&self.ctx, &desc)?))
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn BinderBuffer>> {
        Ok(Arc::new(VulkanBuffer::create(&self.ctx, &desc)?))
    }

    fn create_descriptor_storage(&self, kind: DescriptorHeapKind, capacity: u32) -> Result<Arc<dyn DescriptorStorage>> {
        vulkan_descriptor::create_storage(&self.ctx, kind, capacity)
    }

    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn BinderFence>> {
        Ok(Arc::new(VulkanFence::create(&self.ctx, initial_value)?))
    }

    fn create_command_list(&self) -> Result<Box<dyn BinderCommandList>> {
        Ok(Box::new(VulkanCommandList::new(&self.ctx)?))
    }

    fn submit(&self, command_lists: &[&dyn BinderCommandList], fence: &dyn BinderFence, signal_value: u64) -> Result<()> {
        self.queue_submit(command_lists, fence, signal_value, false)
    }

    fn submit_frame(&self, command_lists: &[&dyn BinderCommandList], fence: &dyn BinderFence, signal_value: u64) -> Result<()> {
        self.queue_submit(command_lists, fence, signal_value, true)
    }

    fn wait_idle(&self) -> Result<()> {
        // Queue lock keeps submissions out while waiting
        let _queue = lock(&self.ctx.graphics_queue, "graphics queue")?;
        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| vk_failure!(e, "Failed to wait for device idle"))
        }
    }
}

impl VulkanGraphicsDevice {
    /// Submit to the graphics queue, signaling the timeline `fence`
    ///
    /// A frame submission waits for the last acquired back buffer and signals
    /// its render-finished semaphore.
    fn queue_submit(
        &self,
        command_lists: &[&dyn BinderCommandList],
        fence: &dyn BinderFence,
        signal_value: u64,
        frame: bool,
    ) -> Result<()> {
        let fence = vulkan_fence::as_vulkan(fence)?;
        let command_buffers = command_lists
            .iter()
            .map(|list| {
                vulkan_command_list::as_vulkan(*list)
                    .map(|list| vk::CommandBufferSubmitInfo::default().command_buffer(list.command_buffer))
            })
            .collect::<Result<Vec<_>>>()?;

        let present_sync: Option<PresentSync> = if frame {
            lock(&self.ctx.present_sync, "present sync")?.take()
        } else {
            None
        };

        let mut wait_infos = Vec::new();
        let mut signal_infos = vec![vk::SemaphoreSubmitInfo::default()
            .semaphore(fence.semaphore)
            .value(signal_value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        if let Some(sync) = present_sync {
            wait_infos.push(
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(sync.wait)
                    .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT),
            );
            signal_infos.push(
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(sync.signal)
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS),
            );
        }

        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_infos)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signal_infos);

        let queue = lock(&self.ctx.graphics_queue, "graphics queue")?;
        unsafe {
            self.ctx
                .device
                .queue_submit2(*queue, &[submit_info], vk::Fence::null())
                .map_err(|e| vk_failure!(e, "Failed to submit {} command list(s)", command_lists.len()))?;
        }

        engine_trace!(SOURCE, "Submitted {} command list(s), signal {}", command_lists.len(), signal_value);
        Ok(())
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        let outstanding = Arc::strong_count(&self.ctx) - 1;
        if outstanding > 0 {
            engine_warn!(
                SOURCE,
                "{} GPU object(s) still alive when the device is dropped; the device is destroyed with the last one",
                outstanding
            );
        }
        if let Ok(samplers) = self.ctx.samplers.lock() {
            engine_trace!(SOURCE, "{} sampler state(s) cached", samplers.len());
        }
    }
}
