//! Unit tests for renderer.rs

use std::sync::Arc;

use serial_test::serial;

use crate::config::{Config, FatalAction};
use crate::descriptor::{DescriptorHeapKind, HeapBudget};
use crate::engine::Engine;
use crate::error::Error;
use crate::graphics_device::mock_graphics_device::{MockCommand, MockGraphicsDevice, MockSwapchain};
use crate::graphics_device::{
    BindingSlot, BufferDesc, DescriptorStorage, BufferUsage, ClearValues, MemoryLocation, ResourceView, TextureDesc,
    TextureUsage,
};
use crate::log::{LogSeverity, MemoryLogger};
use crate::pass::{BindingCategory, BindingSource, PassBinding, PassLayout, UniformBlock, UniformField, UniformLayout};
use crate::renderer::Renderer;
use crate::state::{ResourceAccessState as S, SubresourceRange};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct Exposure {
    scale: [f32; 4],
}

impl UniformBlock for Exposure {
    const LAYOUT: UniformLayout = UniformLayout {
        size: 16,
        fields: &[UniformField { name: "scale", offset: 0, size: 16 }],
    };
}

fn config(frames: usize) -> Config {
    Config {
        frames_in_flight: frames,
        static_descriptors: HeapBudget::new(64, 16, 16, 8),
        dynamic_descriptors_per_frame: HeapBudget::new(32, 8, 8, 4),
        dynamic_uniform_bytes_per_frame: 64 * 1024,
        static_uniform_bytes: 64 * 1024,
        fatal_action: FatalAction::Propagate,
        ..Config::default()
    }
}

fn setup(frames: usize) -> (Arc<MockGraphicsDevice>, Renderer) {
    let device = Arc::new(MockGraphicsDevice::new());
    let renderer = Renderer::new(device.clone(), config(frames)).unwrap();
    (device, renderer)
}

fn texture_desc(name: &str, mips: u32, samples: u32) -> TextureDesc {
    TextureDesc {
        name: name.to_string(),
        width: 32,
        height: 32,
        usage: TextureUsage::SAMPLED | TextureUsage::COLOR_ATTACHMENT,
        mip_levels: mips,
        sample_count: samples,
        ..TextureDesc::default()
    }
}

fn lighting_layout() -> PassLayout {
    PassLayout::new("lighting").with_reads(1).with_samplers(1).with_color_outputs(1)
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[test]
fn test_invalid_config_is_rejected() {
    let device = Arc::new(MockGraphicsDevice::new());
    let result = Renderer::new(device, config(5));
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

#[test]
fn test_heaps_are_carved_from_one_storage_per_kind() {
    let (device, renderer) = setup(2);
    for kind in DescriptorHeapKind::ALL {
        let storage = device.descriptor_storage(kind).unwrap();
        assert_eq!(storage.capacity() as u64, renderer.config().storage_capacity(kind));
    }
    assert_eq!(renderer.static_heaps().usage(), HeapBudget::splat(0));
}

// ============================================================================
// FRAME CYCLE
// ============================================================================

#[test]
fn test_frame_slots_cycle() {
    let (device, mut renderer) = setup(3);

    let mut indices = Vec::new();
    for _ in 0..7 {
        indices.push(renderer.begin_frame().unwrap());
        renderer.submit().unwrap();
        renderer.present().unwrap();
    }

    assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(renderer.stats().frames_submitted, 7);
    assert_eq!(renderer.frames().frame_number(), 7);
    assert_eq!(device.submission_count(), 7);
}

#[test]
fn test_present_before_submit_is_rejected() {
    let (_device, mut renderer) = setup(2);
    renderer.begin_frame().unwrap();
    assert!(matches!(renderer.present(), Err(Error::ProtocolViolation(_))));
    assert!(matches!(renderer.begin_frame(), Err(Error::ProtocolViolation(_))));
}

#[test]
fn test_submit_records_frame_usage() {
    let (_device, mut renderer) = setup(2);
    renderer.begin_frame().unwrap();
    renderer.allocate_dynamic_descriptors(DescriptorHeapKind::ShaderResource, 5).unwrap();
    renderer.allocate_uniform(&[0u8; 300]).unwrap();
    renderer.submit().unwrap();

    let stats = renderer.stats();
    assert_eq!(stats.dynamic_heap_usage[DescriptorHeapKind::ShaderResource], 5);
    assert_eq!(stats.uniform_bytes_this_frame, 512);
}

#[test]
fn test_swapchain_back_buffer_round_trip() {
    let device = Arc::new(MockGraphicsDevice::new());
    let swapchain = Box::new(MockSwapchain::new(&device, 2, 64, 64));
    let mut renderer = Renderer::with_swapchain(device.clone(), config(2), swapchain).unwrap();
    assert_eq!(renderer.registry().live_count(), 2);

    renderer.begin_frame().unwrap();
    let back_buffer = renderer.back_buffer().unwrap();
    renderer.record_begin(Some([0.1, 0.2, 0.3, 1.0])).unwrap();
    assert_eq!(renderer.resource_state(back_buffer, 0, 0).unwrap(), S::ColorOutput);
    renderer.record_end().unwrap();
    renderer.submit().unwrap();
    renderer.present().unwrap();

    let commands = device.commands();
    assert!(commands.contains(&MockCommand::Barrier {
        resource: "back_buffer_0".into(),
        slice: 0,
        mip: 0,
        before: S::Present,
        after: S::ColorOutput,
    }));
    assert!(commands.contains(&MockCommand::ClearColor {
        target: "back_buffer_0".into(),
        color: [0.1, 0.2, 0.3, 1.0],
    }));
    assert_eq!(commands.last(), Some(&MockCommand::Present(0)));
    assert_eq!(renderer.resource_state(back_buffer, 0, 0).unwrap(), S::Present);

    renderer.begin_frame().unwrap();
    assert_ne!(renderer.back_buffer(), Some(back_buffer));
}

#[test]
fn test_record_begin_without_swapchain_records_nothing() {
    let (device, mut renderer) = setup(1);
    renderer.begin_frame().unwrap();
    device.clear_commands();
    renderer.record_begin(Some([0.0; 4])).unwrap();
    renderer.record_end().unwrap();
    assert!(device.commands().is_empty());
}

#[test]
fn test_back_buffers_cannot_be_released() {
    let device = Arc::new(MockGraphicsDevice::new());
    let swapchain = Box::new(MockSwapchain::new(&device, 2, 8, 8));
    let mut renderer = Renderer::with_swapchain(device.clone(), config(2), swapchain).unwrap();
    renderer.begin_frame().unwrap();
    let back_buffer = renderer.back_buffer().unwrap();
    assert!(matches!(renderer.release_resource(back_buffer), Err(Error::InvalidResource(_))));
}

// ============================================================================
// STATE TRACKING
// ============================================================================

#[test]
fn test_transition_reports_recorded_barriers() {
    let (_device, mut renderer) = setup(2);
    let id = renderer.create_texture(texture_desc("gbuffer", 2, 1), S::ShaderRead).unwrap();
    renderer.begin_frame().unwrap();

    assert!(renderer.transition(id, S::ColorOutput, SubresourceRange::ALL).unwrap());
    assert!(!renderer.transition(id, S::ColorOutput, SubresourceRange::ALL).unwrap());
    assert!(matches!(
        renderer.transition(id, S::ColorOutput, SubresourceRange::single(0, 1)),
        Err(Error::IllegalTransition(_))
    ));
    assert_eq!(renderer.stats().barriers, 2);
    assert_eq!(renderer.resource_state(id, 0, 1).unwrap(), S::ColorOutput);
}

#[test]
fn test_transition_outside_a_frame_is_rejected() {
    let (_device, mut renderer) = setup(2);
    let id = renderer.create_texture(texture_desc("t", 1, 1), S::ShaderRead).unwrap();
    assert!(matches!(
        renderer.transition(id, S::CopyDest, SubresourceRange::ALL),
        Err(Error::ProtocolViolation(_))
    ));
    assert_eq!(renderer.resource_state(id, 0, 0).unwrap(), S::ShaderRead);
}

#[test]
fn test_placeholder_is_use_before_init() {
    let (_device, mut renderer) = setup(1);
    let id = renderer.register_placeholder("streamed");
    assert!(matches!(renderer.resource_state(id, 0, 0), Err(Error::UseBeforeInit(_))));
    renderer.release_resource(id).unwrap();
    assert!(matches!(renderer.resource_state(id, 0, 0), Err(Error::InvalidResource(_))));
}

#[test]
fn test_resolve_through_renderer() {
    let (device, mut renderer) = setup(2);
    let msaa = renderer.create_texture(texture_desc("msaa", 1, 4), S::ColorOutput).unwrap();
    let resolved = renderer.create_texture(texture_desc("resolved", 1, 1), S::ShaderRead).unwrap();
    renderer.begin_frame().unwrap();

    assert_eq!(renderer.resolve(msaa, resolved).unwrap(), 3);
    assert!(device.commands().contains(&MockCommand::Resolve {
        src: "msaa".into(),
        dst: "resolved".into(),
    }));
    assert_eq!(renderer.resource_state(msaa, 0, 0).unwrap(), S::ResolveSource);
    assert_eq!(renderer.resource_state(resolved, 0, 0).unwrap(), S::ShaderRead);
    assert!(matches!(renderer.resolve(msaa, msaa), Err(Error::InvalidResource(_))));
}

// ============================================================================
// DESCRIPTORS AND UNIFORMS
// ============================================================================

#[test]
fn test_dynamic_descriptors_need_an_open_frame() {
    let (_device, mut renderer) = setup(2);
    assert!(matches!(
        renderer.allocate_dynamic_descriptors(DescriptorHeapKind::Sampler, 1),
        Err(Error::ProtocolViolation(_))
    ));
    assert!(matches!(renderer.allocate_uniform(&[1, 2, 3]), Err(Error::ProtocolViolation(_))));
}

#[test]
fn test_write_and_copy_descriptors() {
    let (device, mut renderer) = setup(2);
    let id = renderer.create_texture(texture_desc("albedo", 1, 1), S::ShaderRead).unwrap();
    let texture = renderer.texture(id).unwrap();

    let table = renderer.allocate_static_descriptors(DescriptorHeapKind::ShaderResource, 2).unwrap();
    renderer.write_descriptor(&table, 1, &ResourceView::SampledTexture(texture)).unwrap();

    renderer.begin_frame().unwrap();
    let scratch = renderer.allocate_dynamic_descriptors(DescriptorHeapKind::ShaderResource, 2).unwrap();
    renderer.copy_descriptors(&table, &scratch).unwrap();

    let storage = device.descriptor_storage(DescriptorHeapKind::ShaderResource).unwrap();
    assert_eq!(storage.slot(scratch.index + 1).as_deref(), Some("SampledTexture(albedo)"));
    assert_eq!(storage.slot(scratch.index), None);
}

#[test]
fn test_stale_dynamic_table_is_rejected() {
    let (_device, mut renderer) = setup(1);
    renderer.begin_frame().unwrap();
    let scratch = renderer.allocate_dynamic_descriptors(DescriptorHeapKind::Sampler, 1).unwrap();
    renderer.submit().unwrap();
    renderer.present().unwrap();
    renderer.begin_frame().unwrap();

    let view = ResourceView::Sampler(Default::default());
    assert!(matches!(renderer.write_descriptor(&scratch, 0, &view), Err(Error::InvalidResource(_))));
}

#[test]
fn test_uniform_allocations_are_aligned() {
    let (_device, mut renderer) = setup(2);
    renderer.begin_frame().unwrap();
    let first = renderer.allocate_uniform(&[7u8; 40]).unwrap();
    let second = renderer.allocate_uniform_value(&Exposure { scale: [1.0; 4] }).unwrap();
    assert_eq!(first.offset, 0);
    assert_eq!(second.offset, 256);
    assert_eq!(second.gpu_address % 256, 0);
}

// ============================================================================
// PASSES
// ============================================================================

#[test]
fn test_clean_pass_draws_from_static_tier() {
    let (device, mut renderer) = setup(2);
    let pass = renderer.create_pass(lighting_layout(), Exposure { scale: [1.0; 4] }).unwrap();
    let state = *renderer.pass(pass).unwrap().slot_state(0).unwrap();
    let static_uniform = state.static_tier.uniform.unwrap();
    let static_reads = state.static_tier.read.unwrap();

    renderer.begin_frame().unwrap();
    device.clear_commands();
    renderer.draw(pass, 3, 1).unwrap();

    let commands = device.commands();
    assert_eq!(commands[0], MockCommand::SetUniformAddress(static_uniform.gpu_address));
    assert_eq!(commands[1], MockCommand::SetDescriptorTable {
        slot: BindingSlot::ReadTable,
        gpu_address: static_reads.gpu,
    });
    assert_eq!(commands.last(), Some(&MockCommand::Draw { vertex_count: 3, instance_count: 1 }));

    let stats = renderer.stats();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.dynamic_allocations, 0);
}

#[test]
fn test_uniform_change_goes_dynamic_then_refreshes() {
    let (_device, mut renderer) = setup(2);
    let pass = renderer.create_pass(lighting_layout(), Exposure { scale: [1.0; 4] }).unwrap();

    // Frame on slot 0: the new value lives in the dynamic tier
    renderer.begin_frame().unwrap();
    renderer.pass_mut(pass).unwrap().set_uniform(Exposure { scale: [2.0; 4] });
    let bound = renderer.flush_pass(pass).unwrap();
    assert_eq!(bound.source(BindingCategory::Uniform), Some(BindingSource::Dynamic));
    assert_eq!(bound.source(BindingCategory::Read), Some(BindingSource::Static));
    let again = renderer.flush_pass(pass).unwrap();
    assert_eq!(again.uniform, bound.uniform);
    assert_eq!(renderer.stats().dynamic_allocations, 1);

    let dirty = renderer.pass(pass).unwrap().slot_state(0).unwrap().dirty;
    assert!(!dirty.test_frame(BindingCategory::Uniform));
    assert!(dirty.test_persistent(BindingCategory::Uniform));
    renderer.submit().unwrap();
    renderer.present().unwrap();

    // Slot 1 and then slot 0 rewrite their static tier
    for _ in 0..2 {
        renderer.begin_frame().unwrap();
        let bound = renderer.flush_pass(pass).unwrap();
        assert_eq!(bound.source(BindingCategory::Uniform), Some(BindingSource::Static));
        renderer.submit().unwrap();
        renderer.present().unwrap();
    }
    assert_eq!(renderer.stats().static_refreshes, 2);
    assert_eq!(renderer.stats().dynamic_allocations, 1);
}

#[test]
fn test_graphics_pass_begins_rendering() {
    let (device, mut renderer) = setup(2);
    let layout = PassLayout::new("gbuffer").with_color_outputs(2).with_depth();
    let pass = renderer.create_pass(layout, ()).unwrap();
    let state = *renderer.pass(pass).unwrap().slot_state(0).unwrap();
    let colors = state.static_tier.color.unwrap();
    let depth = state.static_tier.depth.unwrap();

    renderer.begin_frame().unwrap();
    let clear = ClearValues::default();
    renderer.begin_pass(pass, Some(clear)).unwrap();
    renderer.draw(pass, 3, 1).unwrap();
    renderer.end_pass(pass).unwrap();

    let commands = device.commands();
    assert!(commands.contains(&MockCommand::BeginRendering(crate::graphics_device::RenderingInfo {
        color_attachments: vec![colors.cpu_at(0), colors.cpu_at(1)],
        depth_attachment: Some(depth.cpu),
        clear: Some(clear),
    })));
    assert_eq!(commands.last(), Some(&MockCommand::EndRendering));
}

#[test]
fn test_compute_pass_dispatches_without_rendering() {
    let (device, mut renderer) = setup(2);
    let pass = renderer.create_pass(PassLayout::new("blur").with_reads(1).with_writes(1), ()).unwrap();

    renderer.begin_frame().unwrap();
    renderer.begin_pass(pass, None).unwrap();
    renderer.dispatch(pass, 8, 4, 1).unwrap();
    renderer.end_pass(pass).unwrap();

    let commands = device.commands();
    assert!(!commands.iter().any(|c| matches!(c, MockCommand::BeginRendering(_) | MockCommand::EndRendering)));
    assert!(commands.contains(&MockCommand::Dispatch { x: 8, y: 4, z: 1 }));
    assert!(!commands.iter().any(|c| matches!(c, MockCommand::SetUniformAddress(_))));
    assert_eq!(renderer.stats().dispatches, 1);
}

#[test]
fn test_pass_handles_are_typed() {
    let (_device, mut renderer) = setup(1);
    let pass = renderer.create_pass(lighting_layout(), Exposure { scale: [0.0; 4] }).unwrap();
    assert_eq!(renderer.pass(pass).unwrap().name(), "lighting");
    assert_eq!(renderer.pass_count(), 1);

    renderer.destroy_pass(pass).unwrap();
    assert_eq!(renderer.pass_count(), 0);
    assert!(matches!(renderer.pass(pass), Err(Error::InvalidResource(_))));
    assert!(matches!(renderer.destroy_pass(pass), Err(Error::InvalidResource(_))));
}

#[test]
fn test_draw_outside_a_frame_is_rejected() {
    let (_device, mut renderer) = setup(1);
    let pass = renderer.create_pass(PassLayout::new("blit").with_reads(1), ()).unwrap();
    assert!(matches!(renderer.draw(pass, 3, 1), Err(Error::ProtocolViolation(_))));
}

// ============================================================================
// IMMEDIATE CONTEXT
// ============================================================================

#[test]
fn test_upload_buffer_goes_through_copy_dest() {
    let (device, mut renderer) = setup(2);
    let id = renderer
        .create_buffer(
            BufferDesc {
                name: "mesh".to_string(),
                size: 16,
                usage: BufferUsage::VERTEX | BufferUsage::TRANSFER_DST,
                location: MemoryLocation::GpuOnly,
            },
            S::ShaderRead,
        )
        .unwrap();

    renderer.upload_buffer(id, 4, &[1, 2, 3, 4], S::ShaderRead).unwrap();

    let mesh = device.buffer("mesh").unwrap();
    assert_eq!(mesh.read(4, 4), vec![1, 2, 3, 4]);
    assert_eq!(renderer.resource_state(id, 0, 0).unwrap(), S::ShaderRead);
    assert!(device.commands().contains(&MockCommand::CopyBuffer {
        src: "mesh staging".into(),
        dst: "mesh".into(),
        size: 4,
    }));
    assert_eq!(renderer.stats().barriers, 2);
    assert!(!renderer.frames().immediate().is_outstanding());
}

#[test]
fn test_upload_past_the_end_is_rejected() {
    let (_device, mut renderer) = setup(1);
    let id = renderer
        .create_buffer(
            BufferDesc {
                name: "small".to_string(),
                size: 4,
                usage: BufferUsage::STORAGE,
                location: MemoryLocation::GpuOnly,
            },
            S::ShaderRead,
        )
        .unwrap();
    assert!(matches!(renderer.upload_buffer(id, 2, &[0; 4], S::ShaderRead), Err(Error::InvalidResource(_))));
    assert!(matches!(renderer.upload_buffer(id, 0, &[], S::ShaderRead), Err(Error::InvalidResource(_))));
    assert!(!renderer.frames().immediate().is_outstanding());
}

#[test]
fn test_upload_texture_mip() {
    let (device, mut renderer) = setup(1);
    let id = renderer.create_texture(texture_desc("albedo", 3, 1), S::ShaderRead).unwrap();
    renderer.upload_texture(id, 0, 2, &[0xFF; 64], S::ShaderRead).unwrap();

    assert!(device.commands().contains(&MockCommand::CopyBufferToTexture {
        src: "albedo staging".into(),
        dst: "albedo".into(),
        mip: 2,
        slice: 0,
    }));
    assert_eq!(renderer.resource_state(id, 0, 2).unwrap(), S::ShaderRead);
}

#[test]
fn test_upload_inside_frame_is_rejected() {
    let (device, mut renderer) = setup(2);
    let id = renderer.create_texture(texture_desc("albedo", 1, 1), S::ShaderRead).unwrap();

    renderer.begin_frame().unwrap();
    renderer.transition(id, S::CopySource, SubresourceRange::ALL).unwrap();
    device.clear_commands();

    let result = renderer.upload_texture(id, 0, 0, &[0xFF; 64], S::ShaderRead);
    assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    assert!(matches!(renderer.begin_immediate(), Err(Error::ProtocolViolation(_))));
    assert!(!renderer.frames().immediate().is_outstanding());
    assert!(device.commands().is_empty());
    assert_eq!(renderer.resource_state(id, 0, 0).unwrap(), S::CopySource);

    renderer.submit().unwrap();
    renderer.present().unwrap();
    renderer.upload_texture(id, 0, 0, &[0xFF; 64], S::ShaderRead).unwrap();
    assert_eq!(renderer.resource_state(id, 0, 0).unwrap(), S::ShaderRead);
}

#[test]
fn test_failed_immediate_is_abandoned() {
    let (_device, mut renderer) = setup(1);
    let result: crate::error::Result<()> =
        renderer.immediate(|_| Err(Error::BackendError("recording failed".to_string())));
    assert!(result.is_err());
    assert!(!renderer.frames().immediate().is_outstanding());

    renderer.immediate(|list| list.dispatch(1, 1, 1)).unwrap();
}

#[test]
fn test_nested_immediate_is_rejected() {
    let (_device, mut renderer) = setup(1);
    renderer.begin_immediate().unwrap();
    assert!(matches!(renderer.begin_immediate(), Err(Error::ProtocolViolation(_))));
    renderer.finish_immediate().unwrap();
}

// ============================================================================
// FATAL POLICY AND SHUTDOWN
// ============================================================================

#[test]
#[should_panic(expected = "galaxy3d fatal error")]
fn test_panic_policy() {
    let device = Arc::new(MockGraphicsDevice::new());
    let config = Config {
        fatal_action: FatalAction::Panic,
        ..config(1)
    };
    let mut renderer = Renderer::new(device, config).unwrap();
    let _ = renderer.submit();
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "galaxy3d fatal error")]
fn test_default_policy_halts_on_capacity_exhaustion() {
    let device = Arc::new(MockGraphicsDevice::new());
    let config = Config {
        dynamic_descriptors_per_frame: HeapBudget::new(32, 8, 8, 4),
        ..Config::default()
    };
    let mut renderer = Renderer::new(device, config).unwrap();
    renderer.begin_frame().unwrap();
    let _ = renderer.allocate_dynamic_descriptors(DescriptorHeapKind::ShaderResource, 1000);
}

#[test]
#[should_panic(expected = "galaxy3d fatal error")]
fn test_panic_policy_covers_nested_immediate() {
    let device = Arc::new(MockGraphicsDevice::new());
    let config = Config {
        fatal_action: FatalAction::Panic,
        ..config(1)
    };
    let mut renderer = Renderer::new(device, config).unwrap();
    renderer.begin_immediate().unwrap();
    let _ = renderer.begin_immediate();
}

#[test]
#[serial]
fn test_shutdown_reports_leaks() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let (_device, mut renderer) = setup(2);
    let kept = renderer.create_texture(texture_desc("forgotten_texture", 1, 1), S::ShaderRead).unwrap();
    let released = renderer.create_texture(texture_desc("released_texture", 1, 1), S::ShaderRead).unwrap();
    renderer.release_resource(released).unwrap();
    renderer.begin_frame().unwrap();
    renderer.submit().unwrap();
    renderer.present().unwrap();

    assert_eq!(renderer.shutdown().unwrap(), 1);
    assert_eq!(renderer.shutdown().unwrap(), 0);
    assert!(renderer.is_shut_down());
    assert!(matches!(renderer.begin_frame(), Err(Error::ProtocolViolation(_))));

    let leaks: Vec<_> = logger
        .entries()
        .into_iter()
        .filter(|e| e.severity == LogSeverity::Error && e.message.contains("'forgotten_texture'"))
        .collect();
    assert_eq!(leaks.len(), 1);
    assert!(!logger.contains("'released_texture'"));
    let _ = kept;

    Engine::reset_logger();
}

#[test]
fn test_renderer_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<Renderer>();
}
