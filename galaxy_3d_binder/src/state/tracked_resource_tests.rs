//! Unit tests for tracked_resource.rs and resolve.rs

use std::sync::Arc;

use crate::error::Error;
use crate::graphics_device::mock_graphics_device::{MockCommand, MockGraphicsDevice, MockTexture};
use crate::graphics_device::{
    Buffer, BufferDesc, BufferUsage, GraphicsDevice, MemoryLocation, TextureDesc, TextureUsage,
};
use crate::state::{resolve, ResourceAccessState as S, SubresourceAxis, SubresourceRange, TrackedResource};

fn texture(name: &str, slices: u32, mips: u32, samples: u32) -> TrackedResource {
    let texture = Arc::new(MockTexture::new(&TextureDesc {
        name: name.to_string(),
        width: 64,
        height: 64,
        usage: TextureUsage::SAMPLED | TextureUsage::COLOR_ATTACHMENT,
        array_layers: slices,
        mip_levels: mips,
        sample_count: samples,
        ..TextureDesc::default()
    }));
    TrackedResource::texture(texture, S::ShaderRead)
}

fn buffer(device: &MockGraphicsDevice) -> Arc<dyn Buffer> {
    device
        .create_buffer(BufferDesc {
            name: "vertices".to_string(),
            size: 128,
            usage: BufferUsage::VERTEX,
            location: MemoryLocation::GpuOnly,
        })
        .unwrap()
}

// ============================================================================
// TRANSITIONS
// ============================================================================

#[test]
fn test_whole_resource_transition() {
    let mut resource = texture("gbuffer", 2, 3, 1);

    let barriers = resource.request_transition(S::ColorOutput, SubresourceRange::ALL).unwrap();
    assert_eq!(barriers.len(), 6);
    assert!(barriers.iter().all(|b| b.before == S::ShaderRead && b.after == S::ColorOutput));

    for slice in 0..2 {
        for mip in 0..3 {
            assert_eq!(resource.current_state(slice, mip).unwrap(), S::ColorOutput);
        }
    }
    assert_eq!(resource.uniform_state().unwrap(), Some(S::ColorOutput));
}

#[test]
fn test_single_cell_redundant_transition_is_illegal() {
    let mut resource = texture("t", 1, 1, 1);
    let result = resource.request_transition(S::ShaderRead, SubresourceRange::ALL);
    assert!(matches!(result, Err(Error::IllegalTransition(_))));
    assert_eq!(resource.current_state(0, 0).unwrap(), S::ShaderRead);
}

#[test]
fn test_multi_cell_range_skips_cells_already_in_state() {
    let mut resource = texture("mips", 1, 4, 1);
    resource.request_transition(S::CopyDest, SubresourceRange::single(0, 1)).unwrap();

    let barriers = resource.request_transition(S::CopyDest, SubresourceRange::ALL).unwrap();
    let mips: Vec<u32> = barriers.iter().map(|b| b.mip).collect();
    assert_eq!(mips, vec![0, 2, 3]);
    assert_eq!(resource.uniform_state().unwrap(), Some(S::CopyDest));
}

#[test]
fn test_multi_cell_range_fully_in_state_yields_nothing() {
    let mut resource = texture("mips", 1, 2, 1);
    let barriers = resource.request_transition(S::ShaderRead, SubresourceRange::ALL).unwrap();
    assert!(barriers.is_empty());
}

#[test]
fn test_partial_range_leaves_other_cells() {
    let mut resource = texture("array", 4, 2, 1);
    let range = SubresourceRange {
        slices: SubresourceAxis::Span { first: 1, count: 2 },
        mips: SubresourceAxis::Single(1),
    };
    let barriers = resource.request_transition(S::ShaderWrite, range).unwrap();

    let cells: Vec<(u32, u32)> = barriers.iter().map(|b| (b.slice, b.mip)).collect();
    assert_eq!(cells, vec![(1, 1), (2, 1)]);
    assert_eq!(resource.current_state(0, 1).unwrap(), S::ShaderRead);
    assert_eq!(resource.current_state(1, 0).unwrap(), S::ShaderRead);
    assert_eq!(resource.current_state(2, 1).unwrap(), S::ShaderWrite);
    assert_eq!(resource.uniform_state().unwrap(), None);
}

#[test]
fn test_out_of_range_requests() {
    let mut resource = texture("t", 2, 2, 1);
    assert!(matches!(
        resource.request_transition(S::CopySource, SubresourceRange::single(2, 0)),
        Err(Error::InvalidResource(_))
    ));
    assert!(matches!(
        resource.request_transition(S::CopySource, SubresourceRange {
            slices: SubresourceAxis::All,
            mips: SubresourceAxis::Span { first: 1, count: 0 },
        }),
        Err(Error::InvalidResource(_))
    ));
    assert!(matches!(resource.current_state(0, 5), Err(Error::InvalidResource(_))));
}

#[test]
fn test_buffer_has_single_cell() {
    let device = MockGraphicsDevice::new();
    let mut resource = TrackedResource::buffer(buffer(&device), S::CopyDest);
    assert_eq!(resource.extent().unwrap(), (1, 1));

    let barriers = resource.request_transition(S::ShaderRead, SubresourceRange::ALL).unwrap();
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].resource.name(), "vertices");
    assert!(matches!(
        resource.request_transition(S::ShaderRead, SubresourceRange::ALL),
        Err(Error::IllegalTransition(_))
    ));
}

#[test]
fn test_uninitialized_resource() {
    let mut resource = TrackedResource::uninitialized("pending");
    assert!(!resource.is_initialized());
    assert!(matches!(resource.current_state(0, 0), Err(Error::UseBeforeInit(_))));
    assert!(matches!(
        resource.request_transition(S::ShaderRead, SubresourceRange::ALL),
        Err(Error::UseBeforeInit(_))
    ));
}

#[test]
fn test_transition_if_needed() {
    let mut resource = texture("t", 1, 1, 1);
    assert!(resource.transition_if_needed(S::ShaderRead, SubresourceRange::ALL).unwrap().is_empty());
    assert_eq!(resource.transition_if_needed(S::CopySource, SubresourceRange::ALL).unwrap().len(), 1);
}

// ============================================================================
// RESOLVE
// ============================================================================

fn recording_list(device: &MockGraphicsDevice) -> Box<dyn crate::graphics_device::CommandList> {
    let mut list = device.create_command_list().unwrap();
    list.begin().unwrap();
    list
}

#[test]
fn test_resolve_sequence() {
    let device = MockGraphicsDevice::new();
    let mut list = recording_list(&device);
    let mut msaa = texture("msaa", 1, 1, 4);
    let mut target = texture("resolved", 1, 1, 1);
    msaa.request_transition(S::ColorOutput, SubresourceRange::ALL).unwrap();

    let count = resolve(&mut msaa, &mut target, list.as_mut()).unwrap();
    assert_eq!(count, 3);

    let commands = device.commands();
    let expected = vec![
        MockCommand::Begin,
        MockCommand::Barrier { resource: "msaa".into(), slice: 0, mip: 0, before: S::ColorOutput, after: S::ResolveSource },
        MockCommand::Barrier { resource: "resolved".into(), slice: 0, mip: 0, before: S::ShaderRead, after: S::ResolveDest },
        MockCommand::Resolve { src: "msaa".into(), dst: "resolved".into() },
        MockCommand::Barrier { resource: "resolved".into(), slice: 0, mip: 0, before: S::ResolveDest, after: S::ShaderRead },
    ];
    assert_eq!(commands, expected);

    assert_eq!(msaa.current_state(0, 0).unwrap(), S::ResolveSource);
    assert_eq!(target.current_state(0, 0).unwrap(), S::ShaderRead);
}

#[test]
fn test_resolve_twice_skips_redundant_source_barrier() {
    let device = MockGraphicsDevice::new();
    let mut list = recording_list(&device);
    let mut msaa = texture("msaa", 1, 1, 4);
    let mut target = texture("resolved", 1, 1, 1);

    resolve(&mut msaa, &mut target, list.as_mut()).unwrap();
    let count = resolve(&mut msaa, &mut target, list.as_mut()).unwrap();
    // dst ShaderRead -> ResolveDest -> ShaderRead, src unchanged
    assert_eq!(count, 2);
}

#[test]
fn test_resolve_restores_render_target_state() {
    let device = MockGraphicsDevice::new();
    let mut list = recording_list(&device);
    let mut msaa = texture("msaa", 1, 1, 4);
    let mut target = texture("resolved", 1, 1, 1);
    target.request_transition(S::ColorOutput, SubresourceRange::ALL).unwrap();

    resolve(&mut msaa, &mut target, list.as_mut()).unwrap();
    assert_eq!(target.current_state(0, 0).unwrap(), S::ColorOutput);
    assert!(device.commands().contains(&MockCommand::Barrier {
        resource: "resolved".into(),
        slice: 0,
        mip: 0,
        before: S::ResolveDest,
        after: S::ColorOutput,
    }));
}

#[test]
fn test_resolve_validates_sample_counts() {
    let device = MockGraphicsDevice::new();
    let mut list = recording_list(&device);

    let mut single = texture("single", 1, 1, 1);
    let mut target = texture("target", 1, 1, 1);
    assert!(matches!(
        resolve(&mut single, &mut target, list.as_mut()),
        Err(Error::InvalidResource(_))
    ));

    let mut msaa = texture("msaa", 1, 1, 4);
    let mut msaa_target = texture("msaa_target", 1, 1, 2);
    assert!(matches!(
        resolve(&mut msaa, &mut msaa_target, list.as_mut()),
        Err(Error::InvalidResource(_))
    ));
}

#[test]
fn test_resolve_rejects_other_prior_states() {
    let device = MockGraphicsDevice::new();
    let mut list = recording_list(&device);
    let mut msaa = texture("msaa", 1, 1, 4);
    let mut target = texture("target", 1, 1, 1);
    target.request_transition(S::CopySource, SubresourceRange::ALL).unwrap();
    assert!(matches!(resolve(&mut msaa, &mut target, list.as_mut()), Err(Error::InvalidResource(_))));

    let mut mixed = texture("mixed", 1, 2, 1);
    mixed.request_transition(S::ColorOutput, SubresourceRange::single(0, 1)).unwrap();
    assert!(matches!(resolve(&mut msaa, &mut mixed, list.as_mut()), Err(Error::InvalidResource(_))));
    assert_eq!(mixed.current_state(0, 0).unwrap(), S::ShaderRead);
}

#[test]
fn test_resolve_uninitialized_target() {
    let device = MockGraphicsDevice::new();
    let mut list = recording_list(&device);
    let mut msaa = texture("msaa", 1, 1, 4);
    let mut target = TrackedResource::uninitialized("later");
    assert!(matches!(
        resolve(&mut msaa, &mut target, list.as_mut()),
        Err(Error::UseBeforeInit(_))
    ));
}
