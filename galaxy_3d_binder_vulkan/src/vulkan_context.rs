/// GpuContext - Shared Vulkan objects for all backend resources
///
/// Contains everything needed for GPU operations:
/// - Instance, physical and logical device
/// - Allocator for memory management
/// - Graphics queue for submission and presentation
/// - Bindless descriptor layouts and the sampler cache
///
/// Every texture, buffer, fence, storage and command list holds an
/// `Arc<GpuContext>`, so the device is destroyed after the last of them.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use gpu_allocator::AllocationError;
use galaxy_3d_binder::galaxy3d::Error;
use galaxy_3d_binder::galaxy3d::render::PerKind;
use galaxy_3d_binder::{engine_error, engine_warn};
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard, Weak};

use crate::vulkan_descriptor::{AttachmentStorage, BindlessLayout};
use crate::vulkan_sampler::SamplerCache;

pub(crate) const SOURCE: &str = "galaxy3d::vulkan";

/// Log a failed Vulkan call at ERROR and turn it into `Error::DeviceFailure`
macro_rules! vk_failure {
    ($result:expr, $($arg:tt)*) => {{
        let result: ash::vk::Result = $result;
        galaxy_3d_binder::engine_raise!(
            crate::vulkan_context::SOURCE,
            galaxy_3d_binder::galaxy3d::Error::DeviceFailure {
                code: result.as_raw(),
                message: format!("{}: {:?}", format!($($arg)*), result),
            }
        )
    }};
}
pub(crate) use vk_failure;

/// Map a gpu-allocator failure
pub(crate) fn allocation_failure(what: &str, size: u64, error: AllocationError) -> Error {
    let size_mb = size as f64 / (1024.0 * 1024.0);
    match error {
        AllocationError::OutOfMemory => {
            engine_error!(SOURCE, "Out of GPU memory for {} ({:.2} MB)", what, size_mb);
            Error::OutOfMemory
        }
        other => {
            engine_error!(SOURCE, "Allocation of {} ({:.2} MB) failed: {}", what, size_mb, other);
            Error::BackendError(format!("allocation of {} failed: {}", what, other))
        }
    }
}

/// Lock a context mutex, mapping poisoning to `BackendError`
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> galaxy_3d_binder::galaxy3d::Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| {
        engine_error!(SOURCE, "{} lock poisoned", what);
        Error::BackendError(format!("{} lock poisoned", what))
    })
}

/// Binary semaphores linking the next submit to the swapchain
#[derive(Debug, Clone, Copy)]
pub(crate) struct PresentSync {
    /// Signaled by acquire, waited by the submit
    pub wait: vk::Semaphore,
    /// Signaled by the submit, waited by present
    pub signal: vk::Semaphore,
}

/// Device-wide descriptor sets registered by the storages
#[derive(Default)]
pub(crate) struct StorageRegistry {
    pub shader_resource_set: Option<vk::DescriptorSet>,
    pub sampler_set: Option<vk::DescriptorSet>,
    pub color_attachments: Weak<AttachmentStorage>,
    pub depth_attachments: Weak<AttachmentStorage>,
    /// Which kinds already have a storage
    pub created: PerKind<bool>,
}

/// Shared GPU context for all Vulkan resources
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    /// Vulkan logical device
    pub(crate) device: ash::Device,
    /// GPU memory allocator, dropped BEFORE the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Graphics queue (also used for presentation); the mutex provides the
    /// external synchronization Vulkan requires for queue access
    pub(crate) graphics_queue: Mutex<vk::Queue>,
    pub(crate) graphics_queue_family: u32,
    pub(crate) bindless: BindlessLayout,
    pub(crate) samplers: Mutex<SamplerCache>,
    pub(crate) storages: Mutex<StorageRegistry>,
    /// Set by swapchain acquire, consumed by the next submit
    pub(crate) present_sync: Mutex<Option<PresentSync>>,
    /// Debug utils loader and messenger (if validation enabled)
    pub(crate) debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                engine_warn!(SOURCE, "device_wait_idle failed during teardown: {:?}", e);
            }

            // 1. Objects owned by the context itself
            if let Ok(mut samplers) = self.samplers.lock() {
                samplers.destroy_all(&self.device);
            }
            self.bindless.destroy(&self.device);

            // 2. Free VkDeviceMemory pages BEFORE destroying the device
            ManuallyDrop::drop(&mut self.allocator);

            // 3. Stop callbacks, then destroy the messenger before the instance
            crate::debug::cleanup_debug_config();
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 4. Device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
