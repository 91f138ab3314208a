//! Unit tests for frame_pipeline.rs and immediate.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::{Config, FatalAction};
use crate::descriptor::{DescriptorHeapKind, HeapManager, PerKind};
use crate::error::Error;
use crate::frame::{FramePipeline, FrameSlotStatus};
use crate::graphics_device::mock_graphics_device::{FenceCompletion, MockCommand, MockGraphicsDevice};
use crate::graphics_device::GraphicsDevice;

fn small_config(frames: usize) -> Config {
    Config {
        frames_in_flight: frames,
        static_descriptors: PerKind::new(16, 4, 4, 2),
        dynamic_descriptors_per_frame: PerKind::new(32, 4, 4, 2),
        dynamic_uniform_bytes_per_frame: 4096,
        static_uniform_bytes: 4096,
        fatal_action: FatalAction::Propagate,
        ..Config::default()
    }
}

fn pipeline(mock: &Arc<MockGraphicsDevice>, config: &Config) -> FramePipeline {
    let device: Arc<dyn GraphicsDevice> = mock.clone();
    let mut capacities = PerKind::splat(0);
    for kind in DescriptorHeapKind::ALL {
        capacities[kind] = config.storage_capacity(kind) as u32;
    }
    let mut heaps = HeapManager::new(device.as_ref(), &capacities).unwrap();
    FramePipeline::new(device, config, &mut heaps).unwrap()
}

fn run_frame(frames: &mut FramePipeline) -> u64 {
    let index = frames.active_index();
    frames.begin_frame(index).unwrap();
    let value = frames.submit().unwrap();
    frames.present().unwrap();
    value
}

// ============================================================================
// FRAME CYCLE
// ============================================================================

#[test]
fn test_slots_cycle_and_values_increase() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(3));

    let mut indices = Vec::new();
    for frame in 0..10u64 {
        indices.push(frames.active_index());
        assert_eq!(run_frame(&mut frames), frame + 1);
    }

    assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(frames.frame_number(), 10);
    assert_eq!(frames.slot(0).unwrap().fence_value(), 10);
    assert_eq!(frames.slot(1).unwrap().fence_value(), 8);
    assert_eq!(mock.submission_count(), 10);
}

#[test]
fn test_status_transitions() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));
    assert_eq!(frames.active_slot().status(), FrameSlotStatus::Idle);

    frames.begin_frame(0).unwrap();
    assert_eq!(frames.active_slot().status(), FrameSlotStatus::Recording);
    assert!(frames.is_frame_open());

    frames.submit().unwrap();
    assert_eq!(frames.active_slot().status(), FrameSlotStatus::Submitted);

    frames.present().unwrap();
    assert!(!frames.is_frame_open());
    assert_eq!(frames.slot(0).unwrap().status(), FrameSlotStatus::Submitted);

    frames.wait_for_slot(0).unwrap();
    assert_eq!(frames.slot(0).unwrap().status(), FrameSlotStatus::Idle);
}

#[test]
fn test_begin_frame_on_wrong_slot() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));
    assert!(matches!(frames.begin_frame(1), Err(Error::ProtocolViolation(_))));
}

#[test]
fn test_second_begin_before_present() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));
    frames.begin_frame(0).unwrap();
    assert!(matches!(frames.begin_frame(0), Err(Error::ProtocolViolation(_))));

    frames.submit().unwrap();
    assert!(matches!(frames.begin_frame(0), Err(Error::ProtocolViolation(_))));
}

#[test]
fn test_submit_and_present_out_of_order() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));
    assert!(matches!(frames.submit(), Err(Error::ProtocolViolation(_))));
    assert!(matches!(frames.present(), Err(Error::ProtocolViolation(_))));
    assert!(matches!(frames.command_list_mut(), Err(Error::ProtocolViolation(_))));

    frames.begin_frame(0).unwrap();
    assert!(matches!(frames.present(), Err(Error::ProtocolViolation(_))));
    assert!(frames.command_list_mut().is_ok());
}

#[test]
fn test_begin_frame_resets_transient_memory() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));

    frames.begin_frame(0).unwrap();
    let (_, heaps, uniforms) = frames.active_slot_mut().parts_mut();
    let first = heaps.get_mut(DescriptorHeapKind::ShaderResource).allocate_slot(3).unwrap();
    let uniform = uniforms.allocate(64).unwrap();
    frames.submit().unwrap();
    frames.present().unwrap();
    run_frame(&mut frames);

    frames.begin_frame(0).unwrap();
    let (_, heaps, uniforms) = frames.active_slot_mut().parts_mut();
    let heap = heaps.get_mut(DescriptorHeapKind::ShaderResource);
    assert!(!heap.is_live(&first));
    assert!(!uniforms.is_live(&uniform));
    let again = heap.allocate_slot(3).unwrap();
    assert_eq!(again.offset, first.offset);
    assert_eq!(again.cpu, first.cpu);
}

#[test]
fn test_begin_frame_waits_for_the_slot_fence() {
    let mock = Arc::new(MockGraphicsDevice::with_completion(FenceCompletion::Manual));
    let mut frames = pipeline(&mock, &small_config(2));

    run_frame(&mut frames);
    run_frame(&mut frames);
    assert_eq!(mock.pending_submissions(), 2);
    assert!(!frames.is_slot_retired(0).unwrap());

    let retired = Arc::new(AtomicBool::new(false));
    let retirer = {
        let mock = mock.clone();
        let retired = retired.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            retired.store(true, Ordering::SeqCst);
            mock.retire_next()
        })
    };

    frames.begin_frame(0).unwrap();
    assert!(retired.load(Ordering::SeqCst));
    assert_eq!(retirer.join().unwrap(), Some(1));
    assert!(frames.is_slot_retired(0).unwrap());
    assert!(!frames.is_slot_retired(1).unwrap());

    mock.set_fence_completion(FenceCompletion::Immediate);
}

#[test]
fn test_wait_idle_and_invalid_slot() {
    let mock = Arc::new(MockGraphicsDevice::with_completion(FenceCompletion::Manual));
    let mut frames = pipeline(&mock, &small_config(2));
    run_frame(&mut frames);

    let retirer = {
        let mock = mock.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            mock.retire_all()
        })
    };
    frames.wait_idle().unwrap();
    assert_eq!(retirer.join().unwrap(), 1);
    assert!(matches!(frames.wait_for_slot(7), Err(Error::InvalidResource(_))));
}

#[test]
fn test_device_failure_on_submit_propagates() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));
    frames.begin_frame(0).unwrap();
    mock.fail_next_operation(-3);
    assert!(matches!(frames.submit(), Err(Error::DeviceFailure { code: -3, .. })));
    assert_eq!(frames.last_signaled_value(), 0);
}

// ============================================================================
// IMMEDIATE CONTEXT
// ============================================================================

#[test]
fn test_immediate_round_trip() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));
    mock.clear_commands();

    let list = frames.begin_immediate().unwrap();
    list.dispatch(1, 1, 1).unwrap();
    assert!(frames.immediate().is_outstanding());
    assert_eq!(frames.finish_immediate().unwrap(), 1);
    assert!(!frames.immediate().is_outstanding());

    assert_eq!(
        mock.commands(),
        vec![
            MockCommand::Begin,
            MockCommand::Dispatch { x: 1, y: 1, z: 1 },
            MockCommand::End,
            MockCommand::Submit { command_lists: 1, signal_value: 1 },
        ]
    );
}

#[test]
fn test_nested_immediate_is_rejected() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));
    frames.begin_immediate().unwrap();
    assert!(matches!(frames.begin_immediate(), Err(Error::ProtocolViolation(_))));

    frames.abandon_immediate().unwrap();
    assert!(frames.begin_immediate().is_ok());
}

#[test]
fn test_immediate_rejected_while_frame_open() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));

    frames.begin_frame(0).unwrap();
    assert!(matches!(frames.begin_immediate(), Err(Error::ProtocolViolation(_))));
    frames.submit().unwrap();
    assert!(matches!(frames.begin_immediate(), Err(Error::ProtocolViolation(_))));
    assert!(!frames.immediate().is_outstanding());
    frames.present().unwrap();

    frames.begin_immediate().unwrap();
    frames.finish_immediate().unwrap();
    assert_eq!(mock.submission_count(), 2);
    assert_eq!(mock.frame_submission_count(), 1);
}

#[test]
fn test_finish_without_begin() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(1));
    assert!(matches!(frames.finish_immediate(), Err(Error::ProtocolViolation(_))));
    assert!(matches!(frames.immediate_command_list(), Err(Error::ProtocolViolation(_))));
}

#[test]
fn test_immediate_does_not_touch_frame_timeline() {
    let mock = Arc::new(MockGraphicsDevice::new());
    let mut frames = pipeline(&mock, &small_config(2));
    run_frame(&mut frames);
    frames.begin_immediate().unwrap();
    frames.finish_immediate().unwrap();
    assert_eq!(frames.last_signaled_value(), 1);
    assert_eq!(run_frame(&mut frames), 2);
}
