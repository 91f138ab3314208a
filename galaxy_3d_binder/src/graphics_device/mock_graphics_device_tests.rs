//! Unit tests for MockGraphicsDevice and the mock objects it hands out

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::descriptor::DescriptorHeapKind;
use crate::error::Error;
use crate::graphics_device::mock_graphics_device::*;
use crate::graphics_device::{
    BindingSlot, BufferDesc, BufferUsage, Fence, GraphicsDevice, MemoryLocation, PipelineBindPoint,
    ResourceView, SamplerDesc, Swapchain, TextureDesc,
};

fn upload_desc(name: &str, size: u64) -> BufferDesc {
    BufferDesc {
        name: name.to_string(),
        size,
        usage: BufferUsage::TRANSFER_SRC,
        location: MemoryLocation::CpuToGpu,
    }
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn test_buffer_update_and_read() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(upload_desc("staging", 16)).unwrap();
    buffer.update(4, &[9, 8, 7]).unwrap();

    let mock = device.buffer("staging").unwrap();
    assert_eq!(mock.read(3, 5), vec![0, 9, 8, 7, 0]);
    assert!(matches!(buffer.update(14, &[1, 2, 3]), Err(Error::InvalidResource(_))));
}

#[test]
fn test_gpu_only_buffer_is_not_writable() {
    let device = MockGraphicsDevice::new();
    let buffer = device
        .create_buffer(BufferDesc {
            name: "vram".to_string(),
            size: 64,
            usage: BufferUsage::STORAGE,
            location: MemoryLocation::GpuOnly,
        })
        .unwrap();
    assert!(matches!(buffer.update(0, &[1]), Err(Error::BackendError(_))));
}

#[test]
fn test_buffer_addresses_are_distinct_and_aligned() {
    let device = MockGraphicsDevice::new();
    let a = device.create_buffer(upload_desc("a", 10)).unwrap();
    let b = device.create_buffer(upload_desc("b", 70_000)).unwrap();
    let c = device.create_buffer(upload_desc("c", 1)).unwrap();

    assert_eq!(a.gpu_address() % 65536, 0);
    assert_eq!(b.gpu_address(), a.gpu_address() + 65536);
    assert_eq!(c.gpu_address(), b.gpu_address() + 2 * 65536);
}

#[test]
fn test_zero_sized_creations_fail() {
    let device = MockGraphicsDevice::new();
    assert!(device.create_buffer(upload_desc("empty", 0)).is_err());
    assert!(device
        .create_texture(TextureDesc { width: 0, ..TextureDesc::default() })
        .is_err());
}

// ============================================================================
// Descriptor storage
// ============================================================================

#[test]
fn test_descriptor_storage_addresses() {
    let device = MockGraphicsDevice::new();
    let srv = device.create_descriptor_storage(DescriptorHeapKind::ShaderResource, 8).unwrap();
    let rtv = device.create_descriptor_storage(DescriptorHeapKind::ColorAttachment, 8).unwrap();

    assert_eq!(srv.cpu_base(), 1 << 40);
    assert_eq!(srv.gpu_base(), (1 << 60) | (1 << 40));
    assert_eq!(srv.increment(), 32);
    assert_eq!(rtv.cpu_base(), 2 << 40);
    assert_eq!(rtv.gpu_base(), 0);
}

#[test]
fn test_descriptor_storage_write_and_copy() {
    let device = MockGraphicsDevice::new();
    let storage = device.create_descriptor_storage(DescriptorHeapKind::Sampler, 4).unwrap();
    storage.write(0, &ResourceView::Sampler(SamplerDesc::default())).unwrap();
    storage.copy(2, 0, 1).unwrap();

    let mock = device.descriptor_storage(DescriptorHeapKind::Sampler).unwrap();
    assert_eq!(mock.slot(0), mock.slot(2));
    assert!(mock.slot(2).unwrap().starts_with("Sampler("));
    assert_eq!(mock.slot(1), None);
    assert_eq!(mock.write_count(), 1);
    assert_eq!(mock.copy_count(), 1);

    assert!(storage.copy(3, 0, 2).is_err());
}

#[test]
fn test_descriptor_storage_rejects_wrong_kind() {
    let device = MockGraphicsDevice::new();
    let storage = device.create_descriptor_storage(DescriptorHeapKind::ShaderResource, 4).unwrap();
    let result = storage.write(0, &ResourceView::Sampler(SamplerDesc::default()));
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

// ============================================================================
// Command lists
// ============================================================================

#[test]
fn test_command_list_requires_recording() {
    let device = MockGraphicsDevice::new();
    let mut list = device.create_command_list().unwrap();
    assert!(list.draw(3, 1, 0, 0).is_err());
    assert!(list.end().is_err());

    list.begin().unwrap();
    list.set_descriptor_table(BindingSlot::ReadTable, 0x40).unwrap();
    list.draw(3, 1, 0, 0).unwrap();
    list.end().unwrap();

    assert_eq!(
        device.commands(),
        vec![
            MockCommand::Begin,
            MockCommand::SetDescriptorTable { slot: BindingSlot::ReadTable, gpu_address: 0x40 },
            MockCommand::Draw { vertex_count: 3, instance_count: 1 },
            MockCommand::End,
        ]
    );
}

#[test]
fn test_bind_pipeline_records_name() {
    let device = MockGraphicsDevice::new();
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.bind_pipeline(&MockPipeline::new("blur", PipelineBindPoint::Compute)).unwrap();
    list.dispatch(8, 8, 1).unwrap();

    let commands = device.commands();
    assert_eq!(commands[1], MockCommand::BindPipeline("blur".to_string()));
    assert_eq!(commands[2], MockCommand::Dispatch { x: 8, y: 8, z: 1 });

    let mock = list.as_any().downcast_ref::<MockCommandList>().unwrap();
    assert_eq!(mock.recorded_count(), 2);
}

#[test]
fn test_copy_buffer_moves_bytes() {
    let device = MockGraphicsDevice::new();
    let src = device.create_buffer(upload_desc("src", 8)).unwrap();
    let dst = device.create_buffer(upload_desc("dst", 8)).unwrap();
    src.update(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.copy_buffer(src.as_ref(), 2, dst.as_ref(), 4, 4).unwrap();

    assert_eq!(device.buffer("dst").unwrap().contents(), vec![0, 0, 0, 0, 3, 4, 5, 6]);
}

// ============================================================================
// Submission and fences
// ============================================================================

#[test]
fn test_frame_submissions_are_counted_apart() {
    let device = MockGraphicsDevice::new();
    let fence = device.create_fence(0).unwrap();
    device.submit(&[], fence.as_ref(), 1).unwrap();
    device.submit_frame(&[], fence.as_ref(), 2).unwrap();

    assert_eq!(device.submission_count(), 2);
    assert_eq!(device.frame_submission_count(), 1);
    assert_eq!(fence.completed_value().unwrap(), 2);
}

#[test]
fn test_immediate_completion_signals_on_submit() {
    let device = MockGraphicsDevice::new();
    let fence = device.create_fence(0).unwrap();
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list.end().unwrap();

    device.submit(&[list.as_ref()], fence.as_ref(), 5).unwrap();
    assert_eq!(fence.completed_value().unwrap(), 5);
    assert_eq!(device.submission_count(), 1);
    assert_eq!(device.pending_submissions(), 0);
}

#[test]
fn test_submit_rejects_recording_list() {
    let device = MockGraphicsDevice::new();
    let fence = device.create_fence(0).unwrap();
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    assert!(device.submit(&[list.as_ref()], fence.as_ref(), 1).is_err());
}

#[test]
fn test_manual_completion_retires_in_order() {
    let device = MockGraphicsDevice::with_completion(FenceCompletion::Manual);
    let fence = device.create_fence(0).unwrap();
    device.submit(&[], fence.as_ref(), 1).unwrap();
    device.submit(&[], fence.as_ref(), 2).unwrap();

    assert_eq!(fence.completed_value().unwrap(), 0);
    assert_eq!(device.pending_submissions(), 2);
    assert_eq!(device.retire_next(), Some(1));
    assert_eq!(fence.completed_value().unwrap(), 1);
    assert_eq!(device.retire_all(), 1);
    assert_eq!(fence.completed_value().unwrap(), 2);
    assert_eq!(device.retire_next(), None);
}

#[test]
fn test_fence_wait_blocks_until_retired() {
    let device = Arc::new(MockGraphicsDevice::with_completion(FenceCompletion::Manual));
    let fence = device.create_fence(0).unwrap();
    device.submit(&[], fence.as_ref(), 1).unwrap();

    let retirer = {
        let device = device.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            device.retire_all()
        })
    };

    fence.wait(1).unwrap();
    assert_eq!(fence.completed_value().unwrap(), 1);
    assert_eq!(retirer.join().unwrap(), 1);
}

#[test]
fn test_fence_signal_never_lowers() {
    let fence = MockFence::new(4);
    fence.signal(2);
    assert_eq!(fence.completed_value().unwrap(), 4);
    fence.wait(3).unwrap();
}

#[test]
fn test_wait_idle_drains_pending() {
    let device = Arc::new(MockGraphicsDevice::with_completion(FenceCompletion::Manual));
    let fence = device.create_fence(0).unwrap();
    device.submit(&[], fence.as_ref(), 1).unwrap();

    let retirer = {
        let device = device.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            device.set_fence_completion(FenceCompletion::Immediate);
        })
    };
    device.wait_idle().unwrap();
    assert_eq!(fence.completed_value().unwrap(), 1);
    retirer.join().unwrap();
}

#[test]
fn test_injected_failure_hits_next_operation_only() {
    let device = MockGraphicsDevice::new();
    device.fail_next_operation(-4);

    match device.create_fence(0) {
        Err(Error::DeviceFailure { code, .. }) => assert_eq!(code, -4),
        other => panic!("expected DeviceFailure, got {:?}", other.map(|_| ())),
    }
    assert!(device.create_fence(0).is_ok());
}

// ============================================================================
// Swapchain
// ============================================================================

#[test]
fn test_swapchain_cycles_and_presents() {
    let device = MockGraphicsDevice::new();
    let mut swapchain = MockSwapchain::new(&device, 2, 640, 480);

    assert_eq!(swapchain.image_count(), 2);
    assert_eq!(swapchain.extent(), (640, 480));
    assert_eq!(swapchain.acquire_next_image().unwrap(), 0);
    assert_eq!(swapchain.acquire_next_image().unwrap(), 1);
    assert_eq!(swapchain.acquire_next_image().unwrap(), 0);

    let image = swapchain.back_buffer(1).unwrap();
    assert_eq!(image.info().name, "back_buffer_1");

    swapchain.present(1).unwrap();
    assert!(swapchain.present(2).is_err());
    assert_eq!(device.commands(), vec![MockCommand::Present(1)]);
}
