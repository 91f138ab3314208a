//! Unit tests for pass_bindings.rs and the dirty-flag protocol

use std::sync::Arc;

use crate::descriptor::{DescriptorHeapKind, HeapFlavor, HeapManager, HeapSet, PerKind};
use crate::error::Error;
use crate::graphics_device::mock_graphics_device::{MockGraphicsDevice, MockTexture};
use crate::graphics_device::{
    Buffer, BufferDesc, BufferUsage, GraphicsDevice, MemoryLocation, ResourceView, SamplerDesc, Texture,
    TextureDesc, TextureUsage,
};
use crate::pass::{
    BindingCategory, BindingSource, PassBinding, PassBindings, PassLayout, UniformBlock, UniformField,
    UniformLayout,
};
use crate::uniform::UniformAllocator;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct Tint {
    color: [f32; 4],
}

impl UniformBlock for Tint {
    const LAYOUT: UniformLayout = UniformLayout {
        size: 16,
        fields: &[UniformField { name: "color", offset: 0, size: 16 }],
    };
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Lying {
    value: f32,
}

impl UniformBlock for Lying {
    const LAYOUT: UniformLayout = UniformLayout { size: 8, fields: &[] };
}

struct Fixture {
    mock: Arc<MockGraphicsDevice>,
    static_heaps: HeapSet,
    static_uniforms: UniformAllocator,
    dynamic: Vec<(HeapSet, UniformAllocator)>,
}

impl Fixture {
    fn new() -> Self {
        let mock = Arc::new(MockGraphicsDevice::new());
        let mut manager = HeapManager::new(mock.as_ref(), &PerKind::new(64, 16, 16, 8)).unwrap();
        let budget = PerKind::new(16, 4, 4, 2);
        let static_heaps = manager.create_heap_set(HeapFlavor::Static, &budget, "static").unwrap();
        let static_uniforms =
            UniformAllocator::new(mock.as_ref(), "static uniforms", HeapFlavor::Static, 4096).unwrap();
        let dynamic = (0..2)
            .map(|i| {
                let heaps = manager
                    .create_heap_set(HeapFlavor::Dynamic, &budget, &format!("frame {}", i))
                    .unwrap();
                let uniforms = UniformAllocator::new(
                    mock.as_ref(),
                    &format!("frame {} uniforms", i),
                    HeapFlavor::Dynamic,
                    4096,
                )
                .unwrap();
                (heaps, uniforms)
            })
            .collect();
        Self { mock, static_heaps, static_uniforms, dynamic }
    }

    fn create<U: UniformBlock>(&mut self, pass: &mut PassBindings<U>) {
        pass.create_static_tier(2, &mut self.static_heaps, &mut self.static_uniforms).unwrap();
    }

    /// What `begin_frame(slot)` does to the transient memory and the pass
    fn begin_frame<U: UniformBlock>(&mut self, pass: &mut PassBindings<U>, slot: usize) -> bool {
        let (heaps, uniforms) = &mut self.dynamic[slot];
        heaps.reset_all().unwrap();
        uniforms.reset().unwrap();
        pass.refresh_static(slot, &self.static_heaps, &self.static_uniforms).unwrap()
    }

    fn flush<U: UniformBlock>(&mut self, pass: &mut PassBindings<U>, slot: usize) -> crate::pass::BoundTables {
        let (heaps, uniforms) = &mut self.dynamic[slot];
        pass.flush_bindings(slot, heaps, uniforms).unwrap()
    }

    fn srv_slot(&self, index: u32) -> Option<String> {
        self.mock
            .descriptor_storage(DescriptorHeapKind::ShaderResource)
            .and_then(|s| s.slot(index))
    }
}

fn texture(name: &str) -> Arc<dyn Texture> {
    Arc::new(MockTexture::new(&TextureDesc {
        name: name.to_string(),
        width: 32,
        height: 32,
        usage: TextureUsage::SAMPLED | TextureUsage::STORAGE | TextureUsage::COLOR_ATTACHMENT,
        ..TextureDesc::default()
    }))
}

fn layout() -> PassLayout {
    PassLayout::new("lighting")
        .with_reads(2)
        .with_samplers(1)
        .with_writes(1)
        .with_color_outputs(1)
        .with_depth()
}

fn tint_pass() -> PassBindings<Tint> {
    let mut pass = PassBindings::new(layout(), Tint { color: [1.0; 4] }).unwrap();
    pass.bind_read(0, ResourceView::SampledTexture(texture("albedo"))).unwrap();
    pass.bind_sampler(0, SamplerDesc::default()).unwrap();
    pass
}

// ============================================================================
// STATIC TIER
// ============================================================================

#[test]
fn test_clean_pass_binds_static_tier() {
    let mut fx = Fixture::new();
    let mut pass = tint_pass();
    fx.create(&mut pass);

    let bound = fx.flush(&mut pass, 0);
    assert_eq!(bound.allocations, 0);
    for category in BindingCategory::ALL {
        assert_eq!(bound.source(category), Some(BindingSource::Static));
    }

    let state = pass.slot_state(0).unwrap();
    assert_eq!(bound.read.unwrap().handle, state.static_tier.read.unwrap());
    assert_eq!(bound.uniform.unwrap().allocation, state.static_tier.uniform.unwrap());
    assert!(state.dirty.is_clean());
}

#[test]
fn test_static_tier_is_populated_at_creation() {
    let mut fx = Fixture::new();
    let mut pass = tint_pass();
    fx.create(&mut pass);

    for slot in 0..2 {
        let tier = pass.slot_state(slot).unwrap().static_tier;
        let read = tier.read.unwrap();
        assert_eq!(fx.srv_slot(read.index), Some("SampledTexture(albedo)".to_string()));
        assert_eq!(fx.srv_slot(read.index + 1), None);

        let uniform = tier.uniform.unwrap();
        let bytes = fx.mock.buffer("static uniforms").unwrap().read(uniform.offset, 16);
        assert_eq!(bytes, bytemuck::bytes_of(&Tint { color: [1.0; 4] }).to_vec());
    }

    // Each slot owns its own static tables
    let a = pass.slot_state(0).unwrap().static_tier.read.unwrap();
    let b = pass.slot_state(1).unwrap().static_tier.read.unwrap();
    assert_ne!(a.index, b.index);
}

#[test]
fn test_static_tier_created_once() {
    let mut fx = Fixture::new();
    let mut pass = tint_pass();
    fx.create(&mut pass);
    let result = pass.create_static_tier(2, &mut fx.static_heaps, &mut fx.static_uniforms);
    assert!(matches!(result, Err(Error::ProtocolViolation(_))));
}

#[test]
fn test_flush_before_static_tier() {
    let mut fx = Fixture::new();
    let mut pass = tint_pass();
    let (heaps, uniforms) = &mut fx.dynamic[0];
    assert!(matches!(pass.flush_bindings(0, heaps, uniforms), Err(Error::UseBeforeInit(_))));
}

// ============================================================================
// DIRTY-FLAG PROTOCOL
// ============================================================================

#[test]
fn test_dirty_uniform_uses_dynamic_until_refresh() {
    let mut fx = Fixture::new();
    let mut pass = tint_pass();
    fx.create(&mut pass);
    fx.begin_frame(&mut pass, 0);

    pass.set_uniform(Tint { color: [0.5; 4] });
    let state = pass.slot_state(0).unwrap();
    assert!(state.dirty.test_frame(BindingCategory::Uniform));
    assert!(state.dirty.test_persistent(BindingCategory::Uniform));

    let first = fx.flush(&mut pass, 0);
    assert_eq!(first.allocations, 1);
    assert_eq!(first.source(BindingCategory::Uniform), Some(BindingSource::Dynamic));
    assert_eq!(first.source(BindingCategory::Read), Some(BindingSource::Static));

    let state = pass.slot_state(0).unwrap();
    assert!(!state.dirty.test_frame(BindingCategory::Uniform));
    assert!(state.dirty.test_persistent(BindingCategory::Uniform));

    // Same frame: the dynamic block is reused
    let second = fx.flush(&mut pass, 0);
    assert_eq!(second.allocations, 0);
    assert_eq!(second.uniform, first.uniform);

    let dynamic = first.uniform.unwrap().allocation;
    let bytes = fx.mock.buffer("frame 0 uniforms").unwrap().read(dynamic.offset, 16);
    assert_eq!(bytes, bytemuck::bytes_of(&Tint { color: [0.5; 4] }).to_vec());

    // Next use of slot 0 rewrites the static block and goes back to it
    assert!(fx.begin_frame(&mut pass, 0));
    let state = pass.slot_state(0).unwrap();
    assert!(state.dirty.is_clean());
    let uniform = state.static_tier.uniform.unwrap();
    let bytes = fx.mock.buffer("static uniforms").unwrap().read(uniform.offset, 16);
    assert_eq!(bytes, bytemuck::bytes_of(&Tint { color: [0.5; 4] }).to_vec());

    let third = fx.flush(&mut pass, 0);
    assert_eq!(third.allocations, 0);
    assert_eq!(third.source(BindingCategory::Uniform), Some(BindingSource::Static));
}

#[test]
fn test_mark_dirty_reaches_every_slot() {
    let mut fx = Fixture::new();
    let mut pass = tint_pass();
    fx.create(&mut pass);

    pass.mark_dirty(BindingCategory::Write);
    for slot in 0..2 {
        let dirty = pass.slot_state(slot).unwrap().dirty;
        assert!(dirty.test_frame(BindingCategory::Write));
        assert!(dirty.test_persistent(BindingCategory::Write));
        assert!(!dirty.test_frame(BindingCategory::Read));
    }

    // Slot 0 flushes, slot 1 keeps both bits until its own frame
    fx.flush(&mut pass, 0);
    assert!(pass.slot_state(1).unwrap().dirty.test_frame(BindingCategory::Write));

    let bound = fx.flush(&mut pass, 1);
    assert_eq!(bound.source(BindingCategory::Write), Some(BindingSource::Dynamic));
    assert_eq!(bound.allocations, 1);
}

#[test]
fn test_rebinding_read_fills_dynamic_then_static() {
    let mut fx = Fixture::new();
    let mut pass = tint_pass();
    fx.create(&mut pass);
    fx.begin_frame(&mut pass, 0);

    pass.bind_read(0, ResourceView::SampledTexture(texture("normals"))).unwrap();
    let bound = fx.flush(&mut pass, 0);
    // read table and sampler table
    assert_eq!(bound.allocations, 2);

    let dynamic = bound.read.unwrap();
    assert_eq!(dynamic.source, BindingSource::Dynamic);
    assert_eq!(fx.srv_slot(dynamic.handle.index), Some("SampledTexture(normals)".to_string()));

    let static_read = pass.slot_state(0).unwrap().static_tier.read.unwrap();
    assert_eq!(fx.srv_slot(static_read.index), Some("SampledTexture(albedo)".to_string()));

    fx.begin_frame(&mut pass, 0);
    assert_eq!(fx.srv_slot(static_read.index), Some("SampledTexture(normals)".to_string()));

    // Slot 1 was never refreshed: still dirty, still old static contents
    let slot1 = pass.slot_state(1).unwrap();
    assert!(slot1.dirty.test_persistent(BindingCategory::Read));
    let slot1_read = slot1.static_tier.read.unwrap();
    assert_eq!(fx.srv_slot(slot1_read.index), Some("SampledTexture(albedo)".to_string()));
}

#[test]
fn test_stale_dynamic_tier_is_reallocated() {
    let mut fx = Fixture::new();
    let mut pass = tint_pass();
    fx.create(&mut pass);

    pass.update_uniform(|u| u.color[0] = 0.0);
    let first = fx.flush(&mut pass, 0);
    assert_eq!(first.allocations, 1);

    // Transient memory rewound without the static refresh
    let (heaps, uniforms) = &mut fx.dynamic[0];
    heaps.reset_all().unwrap();
    uniforms.reset().unwrap();

    let second = fx.flush(&mut pass, 0);
    assert_eq!(second.allocations, 1);
    assert_eq!(second.source(BindingCategory::Uniform), Some(BindingSource::Dynamic));
}

#[test]
fn test_refresh_without_dirty_bits() {
    let mut fx = Fixture::new();
    let mut pass = tint_pass();
    fx.create(&mut pass);
    assert!(!fx.begin_frame(&mut pass, 1));
}

#[test]
fn test_pass_without_uniforms() {
    let mut fx = Fixture::new();
    let mut pass = PassBindings::new(PassLayout::new("blit").with_reads(1).with_color_outputs(1), ()).unwrap();
    fx.create(&mut pass);
    pass.update_uniform(|_| {});

    let bound = fx.flush(&mut pass, 0);
    assert!(bound.uniform.is_none());
    assert!(bound.write.is_none());
    assert!(bound.depth.is_none());
    assert_eq!(bound.source(BindingCategory::Output), Some(BindingSource::Static));
    assert!(pass.slot_state(0).unwrap().dirty.is_clean());
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_binding_validation() {
    let fx = Fixture::new();
    let mut pass = tint_pass();
    let uniform_buffer: Arc<dyn Buffer> = fx
        .mock
        .create_buffer(BufferDesc {
            name: "params".to_string(),
            size: 256,
            usage: BufferUsage::UNIFORM,
            location: MemoryLocation::CpuToGpu,
        })
        .unwrap();

    assert!(matches!(
        pass.bind_read(2, ResourceView::SampledTexture(texture("t"))),
        Err(Error::InvalidResource(_))
    ));
    assert!(matches!(
        pass.bind_read(0, ResourceView::Sampler(SamplerDesc::default())),
        Err(Error::InvalidResource(_))
    ));
    assert!(pass
        .bind_read(1, ResourceView::UniformBuffer { buffer: uniform_buffer.clone(), offset: 0, size: 256 })
        .is_ok());
    assert!(matches!(
        pass.bind_write(0, ResourceView::SampledTexture(texture("t"))),
        Err(Error::InvalidResource(_))
    ));
    assert!(pass.bind_write(0, ResourceView::StorageTexture(texture("t"))).is_ok());
    assert!(matches!(
        pass.bind_color_output(0, ResourceView::DepthAttachment { texture: texture("d"), mip: 0, slice: 0 }),
        Err(Error::InvalidResource(_))
    ));
    assert!(pass
        .bind_depth_output(ResourceView::DepthAttachment { texture: texture("d"), mip: 0, slice: 0 })
        .is_ok());

    let mut no_depth = PassBindings::new(PassLayout::new("post").with_color_outputs(1), ()).unwrap();
    assert!(matches!(
        no_depth.bind_depth_output(ResourceView::DepthAttachment { texture: texture("d"), mip: 0, slice: 0 }),
        Err(Error::InvalidResource(_))
    ));
}

#[test]
fn test_uniform_layout_must_match_block_size() {
    let result = PassBindings::new(PassLayout::new("bad"), Lying { value: 1.0 });
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_uniform_layout_validation() {
    const OVERLAP: UniformLayout = UniformLayout {
        size: 16,
        fields: &[
            UniformField { name: "a", offset: 0, size: 8 },
            UniformField { name: "b", offset: 4, size: 4 },
        ],
    };
    const PAST_END: UniformLayout = UniformLayout {
        size: 8,
        fields: &[UniformField { name: "a", offset: 4, size: 8 }],
    };
    assert!(OVERLAP.validate().is_err());
    assert!(PAST_END.validate().is_err());
    assert!(Tint::LAYOUT.validate().is_ok());
    assert_eq!(Tint::LAYOUT.field("color").map(|f| f.size), Some(16));
}

#[test]
fn test_layout_tables() {
    let tables: Vec<(DescriptorHeapKind, u32)> = layout().tables().collect();
    assert_eq!(
        tables,
        vec![
            (DescriptorHeapKind::ShaderResource, 2),
            (DescriptorHeapKind::Sampler, 1),
            (DescriptorHeapKind::ShaderResource, 1),
            (DescriptorHeapKind::ColorAttachment, 1),
            (DescriptorHeapKind::DepthAttachment, 1),
        ]
    );
    assert!(layout().is_graphics());
    assert!(!PassLayout::new("cs").with_writes(1).is_graphics());
}
