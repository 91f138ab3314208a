/// Renderer - owns the heaps, the frame pipeline, the passes and the tracked
/// resources, and records everything into the active frame

use std::marker::PhantomData;
use std::sync::Arc;

use slotmap::{new_key_type, SlotMap};

use crate::config::{Config, FatalAction};
use crate::descriptor::{
    DescriptorHandle, DescriptorHeap, DescriptorHeapKind, HeapFlavor, HeapId, HeapManager, HeapSet,
    PerKind,
};
use crate::error::{Error, Result};
use crate::frame::FramePipeline;
use crate::graphics_device::{
    BindingSlot, Buffer, BufferDesc, BufferUsage, ClearValues, CommandList, GraphicsDevice,
    MemoryLocation, Pipeline, RenderingInfo, ResourceView, Swapchain, Texture, TextureDesc,
};
use crate::pass::{BoundTables, PassBinding, PassBindings, PassLayout, UniformBlock};
use crate::renderer::{RendererStats, ResourceId, ResourceRegistry};
use crate::state::{self, ResourceAccessState, SubresourceRange, TrackedResource};
use crate::uniform::{UniformAllocation, UniformAllocator};
use crate::{engine_debug, engine_error, engine_info, engine_raise, engine_trace, engine_warn};

const SOURCE: &str = "galaxy3d::Renderer";

// ============================================================================
// Pass handles
// ============================================================================

new_key_type! {
    /// Untyped key of a pass in the renderer arena
    pub struct PassKey;
}

/// Typed handle of a pass whose uniform block is `U`
pub struct PassHandle<U> {
    key: PassKey,
    _uniform: PhantomData<fn() -> U>,
}

impl<U> PassHandle<U> {
    pub fn key(&self) -> PassKey {
        self.key
    }
}

impl<U> Clone for PassHandle<U> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<U> Copy for PassHandle<U> {}

impl<U> PartialEq for PassHandle<U> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<U> std::fmt::Debug for PassHandle<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PassHandle({:?})", self.key)
    }
}

// ============================================================================
// Fatal error policy
// ============================================================================

/// Apply `action` to a failed result
///
/// The error has already been logged where it was raised.
fn escalate<T>(action: FatalAction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(error) => match action {
            FatalAction::Propagate => Err(error),
            FatalAction::Panic => panic!("galaxy3d fatal error: {}", error),
            FatalAction::Abort => {
                engine_error!(SOURCE, "Aborting on fatal error: {}", error);
                std::process::abort()
            }
        },
    }
}

// ============================================================================
// Recording helpers
// ============================================================================

/// Transition `id` and record the barriers, returns how many were recorded
fn record_transition(
    command_list: &mut dyn CommandList,
    registry: &mut ResourceRegistry,
    id: ResourceId,
    state: ResourceAccessState,
    range: SubresourceRange,
    if_needed: bool,
) -> Result<usize> {
    let resource = registry.get_mut(id)?;
    let barriers = if if_needed {
        resource.transition_if_needed(state, range)?
    } else {
        resource.request_transition(state, range)?
    };
    if !barriers.is_empty() {
        command_list.resource_barriers(&barriers)?;
    }
    Ok(barriers.len())
}

/// Bind the uniform block and the shader-visible tables of a flush
fn bind_tables(command_list: &mut dyn CommandList, bound: &BoundTables) -> Result<()> {
    if let Some(uniform) = bound.uniform {
        command_list.set_uniform_address(uniform.allocation.gpu_address)?;
    }
    for (slot, table) in [
        (BindingSlot::ReadTable, bound.read),
        (BindingSlot::SamplerTable, bound.samplers),
        (BindingSlot::WriteTable, bound.write),
    ] {
        if let Some(table) = table {
            command_list.set_descriptor_table(slot, table.handle.gpu)?;
        }
    }
    Ok(())
}

fn rendering_info(bound: &BoundTables, clear: Option<ClearValues>) -> RenderingInfo {
    RenderingInfo {
        color_attachments: bound
            .color
            .map(|table| (0..table.handle.count).map(|i| table.handle.cpu_at(i)).collect())
            .unwrap_or_default(),
        depth_attachment: bound.depth.map(|table| table.handle.cpu),
        clear,
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Resource binding and frame synchronization front end
///
/// One renderer drives one device. Frames follow
/// `begin_frame` → `record_begin` → passes → `record_end` → `submit` →
/// `present`; every fatal error goes through `Config::fatal_action`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use galaxy_3d_binder::galaxy3d::{Config, Renderer};
/// use galaxy_3d_binder::galaxy3d::mock::MockGraphicsDevice;
/// use galaxy_3d_binder::galaxy3d::render::PassLayout;
///
/// let mut renderer = Renderer::new(Arc::new(MockGraphicsDevice::new()), Config::default())?;
/// let blur = renderer.create_pass(PassLayout::new("blur").with_reads(1).with_writes(1), ())?;
///
/// renderer.begin_frame()?;
/// renderer.dispatch(blur, 8, 8, 1)?;
/// renderer.submit()?;
/// renderer.present()?;
/// # Ok::<(), galaxy_3d_binder::galaxy3d::Error>(())
/// ```
pub struct Renderer {
    device: Arc<dyn GraphicsDevice>,
    config: Config,
    swapchain: Option<Box<dyn Swapchain>>,
    back_buffers: Vec<ResourceId>,
    /// Back buffer acquired by the open frame
    current_image: Option<u32>,
    heap_manager: HeapManager,
    static_heaps: HeapSet,
    static_uniforms: UniformAllocator,
    frames: FramePipeline,
    passes: SlotMap<PassKey, Box<dyn PassBinding>>,
    registry: ResourceRegistry,
    stats: RendererStats,
    shut_down: bool,
}

impl Renderer {
    /// Create a headless renderer (no presentation)
    ///
    /// # Arguments
    ///
    /// * `device` - Device every GPU object is created on
    /// * `config` - Heap budgets, frame count and fatal error policy
    pub fn new(device: Arc<dyn GraphicsDevice>, config: Config) -> Result<Self> {
        let action = config.fatal_action;
        escalate(action, Self::build(device, config, None))
    }

    /// Create a renderer presenting to `swapchain`
    ///
    /// Back buffers are tracked from creation, in the `Present` state.
    pub fn with_swapchain(
        device: Arc<dyn GraphicsDevice>,
        config: Config,
        swapchain: Box<dyn Swapchain>,
    ) -> Result<Self> {
        let action = config.fatal_action;
        escalate(action, Self::build(device, config, Some(swapchain)))
    }

    fn build(
        device: Arc<dyn GraphicsDevice>,
        config: Config,
        swapchain: Option<Box<dyn Swapchain>>,
    ) -> Result<Self> {
        config.validate().map_err(|e| engine_raise!(SOURCE, e))?;

        let mut capacities = PerKind::splat(0u32);
        for kind in DescriptorHeapKind::ALL {
            capacities[kind] = config.storage_capacity(kind) as u32;
        }
        let mut heap_manager = HeapManager::new(device.as_ref(), &capacities)?;
        let static_heaps = heap_manager.create_heap_set(HeapFlavor::Static, &config.static_descriptors, "static")?;
        let static_uniforms = UniformAllocator::new(
            device.as_ref(),
            "static uniforms",
            HeapFlavor::Static,
            config.static_uniform_bytes,
        )?;
        let frames = FramePipeline::new(device.clone(), &config, &mut heap_manager)?;

        let mut registry = ResourceRegistry::new();
        let mut back_buffers = Vec::new();
        if let Some(swapchain) = swapchain.as_ref() {
            for index in 0..swapchain.image_count() as u32 {
                let texture = swapchain.back_buffer(index).ok_or_else(|| {
                    engine_raise!(SOURCE, Error::InitializationFailed(format!(
                        "swapchain has no back buffer {}",
                        index
                    )))
                })?;
                back_buffers.push(registry.insert(TrackedResource::texture(texture, ResourceAccessState::Present)));
            }
        }

        engine_info!(
            SOURCE,
            "Renderer created on '{}' ({} frame(s) in flight, {} back buffer(s))",
            device.backend_name(),
            config.frames_in_flight,
            back_buffers.len()
        );

        Ok(Self {
            device,
            config,
            swapchain,
            back_buffers,
            current_image: None,
            heap_manager,
            static_heaps,
            static_uniforms,
            frames,
            passes: SlotMap::with_key(),
            registry,
            stats: RendererStats::default(),
            shut_down: false,
        })
    }

    /// Run `op` and apply the fatal error policy to its result
    fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let action = self.config.fatal_action;
        escalate(action, op(self))
    }

    // ===== ACCESSORS =====

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn frames(&self) -> &FramePipeline {
        &self.frames
    }

    pub fn heap_manager(&self) -> &HeapManager {
        &self.heap_manager
    }

    pub fn static_heaps(&self) -> &HeapSet {
        &self.static_heaps
    }

    pub fn static_uniforms(&self) -> &UniformAllocator {
        &self.static_uniforms
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Counters, with the current static heap usage
    pub fn stats(&self) -> RendererStats {
        let mut stats = self.stats;
        stats.static_heap_usage = self.static_heaps.usage();
        stats
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Tracked back buffer acquired by the open frame
    pub fn back_buffer(&self) -> Option<ResourceId> {
        self.current_image
            .and_then(|index| self.back_buffers.get(index as usize).copied())
    }

    // ===== RESOURCES =====

    /// Create a texture and track it, every subresource in `initial`
    pub fn create_texture(&mut self, desc: TextureDesc, initial: ResourceAccessState) -> Result<ResourceId> {
        self.guarded(|r| {
            let texture = r.device.create_texture(desc)?;
            Ok(r.registry.insert(TrackedResource::texture(texture, initial)))
        })
    }

    /// Create a buffer and track it in `initial`
    pub fn create_buffer(&mut self, desc: BufferDesc, initial: ResourceAccessState) -> Result<ResourceId> {
        self.guarded(|r| {
            let buffer = r.device.create_buffer(desc)?;
            Ok(r.registry.insert(TrackedResource::buffer(buffer, initial)))
        })
    }

    /// Track a texture created elsewhere
    pub fn register_texture(&mut self, texture: Arc<dyn Texture>, initial: ResourceAccessState) -> ResourceId {
        self.registry.insert(TrackedResource::texture(texture, initial))
    }

    /// Track a buffer created elsewhere
    pub fn register_buffer(&mut self, buffer: Arc<dyn Buffer>, initial: ResourceAccessState) -> ResourceId {
        self.registry.insert(TrackedResource::buffer(buffer, initial))
    }

    /// Reserve an id for a resource whose allocation does not exist yet
    pub fn register_placeholder(&mut self, name: &str) -> ResourceId {
        self.registry.insert(TrackedResource::uninitialized(name))
    }

    /// Stop tracking `id`; the device object dies with its last reference
    pub fn release_resource(&mut self, id: ResourceId) -> Result<()> {
        self.guarded(|r| {
            if r.back_buffers.contains(&id) {
                return Err(engine_raise!(SOURCE, Error::InvalidResource(
                    "back buffers are owned by the swapchain".to_string()
                )));
            }
            r.registry.release(id).map(|_| ())
        })
    }

    pub fn texture(&self, id: ResourceId) -> Result<Arc<dyn Texture>> {
        let resource = self.registry.get(id)?;
        resource.texture_object().cloned().ok_or_else(|| {
            engine_raise!(SOURCE, Error::InvalidResource(format!("'{}' is not a texture", resource.name())))
        })
    }

    pub fn buffer(&self, id: ResourceId) -> Result<Arc<dyn Buffer>> {
        let resource = self.registry.get(id)?;
        resource.buffer_object().cloned().ok_or_else(|| {
            engine_raise!(SOURCE, Error::InvalidResource(format!("'{}' is not a buffer", resource.name())))
        })
    }

    /// Tracked state of one subresource
    pub fn resource_state(&self, id: ResourceId, slice: u32, mip: u32) -> Result<ResourceAccessState> {
        let action = self.config.fatal_action;
        escalate(action, self.registry.get(id).and_then(|r| r.current_state(slice, mip)))
    }

    /// Move `range` of `id` to `state`, recording the barriers into the frame
    ///
    /// Returns whether at least one barrier was recorded.
    ///
    /// # Errors
    ///
    /// - `IllegalTransition` for a single subresource already in `state`
    /// - `ProtocolViolation` outside `begin_frame` / `submit`
    pub fn transition(&mut self, id: ResourceId, state: ResourceAccessState, range: SubresourceRange) -> Result<bool> {
        self.guarded(|r| {
            let command_list = r.frames.command_list_mut()?;
            let count = record_transition(command_list, &mut r.registry, id, state, range, false)?;
            r.stats.barriers += count as u64;
            Ok(count > 0)
        })
    }

    /// Resolve multisampled `src` into `dst`; `dst` keeps its prior state
    ///
    /// Returns the number of barriers recorded.
    pub fn resolve(&mut self, src: ResourceId, dst: ResourceId) -> Result<usize> {
        self.guarded(|r| {
            let command_list = r.frames.command_list_mut()?;
            let (src, dst) = r.registry.get_pair_mut(src, dst)?;
            let count = state::resolve(src, dst, command_list)?;
            r.stats.barriers += count as u64;
            Ok(count)
        })
    }

    // ===== DESCRIPTORS AND UNIFORMS =====

    /// Table of `count` slots that lives as long as the renderer
    pub fn allocate_static_descriptors(&mut self, kind: DescriptorHeapKind, count: u32) -> Result<DescriptorHandle> {
        self.guarded(|r| r.static_heaps.get_mut(kind).allocate_slot(count))
    }

    /// Table of `count` slots valid until the active slot is reused
    pub fn allocate_dynamic_descriptors(&mut self, kind: DescriptorHeapKind, count: u32) -> Result<DescriptorHandle> {
        self.guarded(|r| {
            let (_, heaps, _) = r.frames.recording_parts_mut()?;
            heaps.get_mut(kind).allocate_slot(count)
        })
    }

    fn heap(&self, id: HeapId) -> Result<&DescriptorHeap> {
        self.static_heaps
            .iter()
            .find(|heap| heap.id() == id)
            .or_else(|| self.frames.find_heap(id))
            .ok_or_else(|| {
                engine_raise!(SOURCE, Error::InvalidResource(format!(
                    "heap {} does not belong to this renderer",
                    id.raw()
                )))
            })
    }

    /// Write `view` into slot `offset` of `handle`
    pub fn write_descriptor(&self, handle: &DescriptorHandle, offset: u32, view: &ResourceView) -> Result<()> {
        let action = self.config.fatal_action;
        escalate(action, self.heap(handle.heap).and_then(|heap| heap.write(handle, offset, view)))
    }

    /// Copy every slot of `src` into `dst`
    pub fn copy_descriptors(&self, src: &DescriptorHandle, dst: &DescriptorHandle) -> Result<()> {
        let result = self.heap(src.heap).and_then(|src_heap| {
            if !src_heap.is_live(src) {
                return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                    "{}: copy from a stale table",
                    src_heap.label()
                ))));
            }
            self.heap(dst.heap)?.copy(src, dst)
        });
        escalate(self.config.fatal_action, result)
    }

    /// Copy `bytes` into the active slot's uniform region
    pub fn allocate_uniform(&mut self, bytes: &[u8]) -> Result<UniformAllocation> {
        self.guarded(|r| {
            let (_, _, uniforms) = r.frames.recording_parts_mut()?;
            uniforms.allocate_bytes(bytes)
        })
    }

    /// Copy one plain-data value into the active slot's uniform region
    pub fn allocate_uniform_value<T: bytemuck::Pod>(&mut self, value: &T) -> Result<UniformAllocation> {
        self.allocate_uniform(bytemuck::bytes_of(value))
    }

    /// Copy `bytes` into the static uniform region (never reclaimed)
    pub fn allocate_static_uniform(&mut self, bytes: &[u8]) -> Result<UniformAllocation> {
        self.guarded(|r| r.static_uniforms.allocate_bytes(bytes))
    }

    // ===== FRAME CYCLE =====

    /// Open the next frame and return its slot index
    ///
    /// Blocks until the slot's previous submission has completed, refreshes the
    /// static tier of every pass for this slot, then acquires a back buffer.
    pub fn begin_frame(&mut self) -> Result<usize> {
        self.guarded(|r| {
            if r.shut_down {
                return Err(engine_raise!(SOURCE, Error::ProtocolViolation(
                    "begin_frame after shutdown".to_string()
                )));
            }
            let index = r.frames.active_index();
            r.frames.begin_frame(index)?;

            for pass in r.passes.values_mut() {
                if pass.refresh_static(index, &r.static_heaps, &r.static_uniforms)? {
                    r.stats.static_refreshes += 1;
                }
            }

            if let Some(swapchain) = r.swapchain.as_mut() {
                r.current_image = Some(swapchain.acquire_next_image()?);
            }
            Ok(index)
        })
    }

    /// Move the acquired back buffer to `ColorOutput`, clearing it to `clear`
    ///
    /// Does nothing without a swapchain.
    pub fn record_begin(&mut self, clear: Option<[f32; 4]>) -> Result<()> {
        self.guarded(|r| {
            let command_list = r.frames.command_list_mut()?;
            let Some(id) = r.current_image.and_then(|i| r.back_buffers.get(i as usize).copied()) else {
                return Ok(());
            };
            let count = record_transition(
                command_list,
                &mut r.registry,
                id,
                ResourceAccessState::ColorOutput,
                SubresourceRange::ALL,
                true,
            )?;
            r.stats.barriers += count as u64;
            if let Some(color) = clear {
                let texture = r.registry.get(id)?.texture_object().cloned();
                if let Some(texture) = texture {
                    command_list.clear_color_target(texture.as_ref(), color)?;
                }
            }
            Ok(())
        })
    }

    /// Move the acquired back buffer back to `Present`
    pub fn record_end(&mut self) -> Result<()> {
        self.guarded(|r| {
            let command_list = r.frames.command_list_mut()?;
            let Some(id) = r.current_image.and_then(|i| r.back_buffers.get(i as usize).copied()) else {
                return Ok(());
            };
            let count = record_transition(
                command_list,
                &mut r.registry,
                id,
                ResourceAccessState::Present,
                SubresourceRange::ALL,
                true,
            )?;
            r.stats.barriers += count as u64;
            Ok(())
        })
    }

    /// Command list of the open frame
    pub fn command_list(&mut self) -> Result<&mut dyn CommandList> {
        self.frames.command_list_mut()
    }

    /// Submit the open frame, returns the fence value it signals
    pub fn submit(&mut self) -> Result<u64> {
        self.guarded(|r| {
            let slot = r.frames.active_slot();
            let dynamic_usage = slot.dynamic_heaps().usage();
            let uniform_bytes = slot.uniforms().used();

            let value = r.frames.submit()?;
            r.stats.frames_submitted += 1;
            r.stats.dynamic_heap_usage = dynamic_usage;
            r.stats.uniform_bytes_this_frame = uniform_bytes;
            Ok(value)
        })
    }

    /// Present the acquired back buffer and advance to the next slot
    pub fn present(&mut self) -> Result<()> {
        self.guarded(|r| {
            if let (Some(swapchain), Some(image)) = (r.swapchain.as_mut(), r.current_image) {
                if r.frames.is_frame_open() {
                    swapchain.present(image)?;
                }
            }
            r.frames.present()?;
            r.current_image = None;
            Ok(())
        })
    }

    /// Block until slot `index`'s last submission has completed
    pub fn wait_for_slot(&mut self, index: usize) -> Result<()> {
        self.guarded(|r| r.frames.wait_for_slot(index))
    }

    /// Block until every submitted frame has completed
    pub fn wait_idle(&mut self) -> Result<()> {
        self.guarded(|r| r.drain())
    }

    fn drain(&mut self) -> Result<()> {
        if self.frames.immediate().is_outstanding() {
            engine_warn!(SOURCE, "Abandoning an unfinished immediate operation");
            self.frames.abandon_immediate()?;
        }
        self.frames.wait_idle()?;
        self.device.wait_idle()
    }

    // ===== PASSES =====

    /// Create a pass and its static tier for every frame slot
    pub fn create_pass<U: UniformBlock>(&mut self, layout: PassLayout, uniform: U) -> Result<PassHandle<U>> {
        self.guarded(|r| {
            let mut pass = PassBindings::new(layout, uniform)?;
            pass.create_static_tier(r.frames.frames_in_flight(), &mut r.static_heaps, &mut r.static_uniforms)?;
            engine_debug!(SOURCE, "Pass '{}' created", pass.name());
            let key = r.passes.insert(Box::new(pass));
            Ok(PassHandle {
                key,
                _uniform: PhantomData,
            })
        })
    }

    fn unknown_pass(key: PassKey) -> Error {
        engine_raise!(SOURCE, Error::InvalidResource(format!("unknown pass {:?}", key)))
    }

    pub fn pass<U: UniformBlock>(&self, handle: PassHandle<U>) -> Result<&PassBindings<U>> {
        self.passes
            .get(handle.key)
            .and_then(|pass| pass.as_any().downcast_ref::<PassBindings<U>>())
            .ok_or_else(|| Self::unknown_pass(handle.key))
    }

    pub fn pass_mut<U: UniformBlock>(&mut self, handle: PassHandle<U>) -> Result<&mut PassBindings<U>> {
        self.passes
            .get_mut(handle.key)
            .and_then(|pass| pass.as_any_mut().downcast_mut::<PassBindings<U>>())
            .ok_or_else(|| Self::unknown_pass(handle.key))
    }

    /// Remove a pass; its static tables stay reserved until the renderer dies
    pub fn destroy_pass<U: UniformBlock>(&mut self, handle: PassHandle<U>) -> Result<()> {
        self.guarded(|r| {
            let pass = r.passes.remove(handle.key).ok_or_else(|| Self::unknown_pass(handle.key))?;
            engine_debug!(SOURCE, "Pass '{}' destroyed", pass.name());
            Ok(())
        })
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    fn flush_key(&mut self, key: PassKey) -> Result<BoundTables> {
        let slot = self.frames.active_index();
        let pass = self.passes.get_mut(key).ok_or_else(|| Self::unknown_pass(key))?;
        let (_, heaps, uniforms) = self.frames.recording_parts_mut()?;
        let bound = pass.flush_bindings(slot, heaps, uniforms)?;
        self.stats.dynamic_allocations += bound.allocations as u64;
        Ok(bound)
    }

    /// Resolve which tier every category of the pass uses this frame
    pub fn flush_pass<U: UniformBlock>(&mut self, handle: PassHandle<U>) -> Result<BoundTables> {
        self.guarded(|r| r.flush_key(handle.key))
    }

    fn flush_and_bind(&mut self, key: PassKey) -> Result<BoundTables> {
        let bound = self.flush_key(key)?;
        bind_tables(self.frames.command_list_mut()?, &bound)?;
        Ok(bound)
    }

    /// Flush and bind the pass, then start rendering into its outputs
    ///
    /// Compute-only passes are bound without starting rendering.
    pub fn begin_pass<U: UniformBlock>(&mut self, handle: PassHandle<U>, clear: Option<ClearValues>) -> Result<BoundTables> {
        self.guarded(|r| {
            let bound = r.flush_and_bind(handle.key)?;
            if r.pass(handle)?.layout().is_graphics() {
                r.frames.command_list_mut()?.begin_rendering(&rendering_info(&bound, clear))?;
            }
            Ok(bound)
        })
    }

    /// End rendering started by `begin_pass`
    pub fn end_pass<U: UniformBlock>(&mut self, handle: PassHandle<U>) -> Result<()> {
        self.guarded(|r| {
            if r.pass(handle)?.layout().is_graphics() {
                r.frames.command_list_mut()?.end_rendering()?;
            }
            Ok(())
        })
    }

    pub fn bind_pipeline(&mut self, pipeline: &dyn Pipeline) -> Result<()> {
        self.guarded(|r| r.frames.command_list_mut()?.bind_pipeline(pipeline))
    }

    /// Flush and bind the pass, then draw
    pub fn draw<U: UniformBlock>(&mut self, handle: PassHandle<U>, vertex_count: u32, instance_count: u32) -> Result<()> {
        self.guarded(|r| {
            r.flush_and_bind(handle.key)?;
            r.frames.command_list_mut()?.draw(vertex_count, instance_count, 0, 0)?;
            r.stats.draw_calls += 1;
            Ok(())
        })
    }

    /// Flush and bind the pass, then dispatch
    pub fn dispatch<U: UniformBlock>(&mut self, handle: PassHandle<U>, x: u32, y: u32, z: u32) -> Result<()> {
        self.guarded(|r| {
            r.flush_and_bind(handle.key)?;
            r.frames.command_list_mut()?.dispatch(x, y, z)?;
            r.stats.dispatches += 1;
            Ok(())
        })
    }

    // ===== IMMEDIATE CONTEXT =====

    /// Open the immediate command list (one-off work outside the frame timeline)
    pub fn begin_immediate(&mut self) -> Result<&mut dyn CommandList> {
        let action = self.config.fatal_action;
        escalate(action, self.frames.begin_immediate())
    }

    /// Submit the immediate command list and wait for it
    pub fn finish_immediate(&mut self) -> Result<u64> {
        self.guarded(|r| r.frames.finish_immediate())
    }

    /// Record `record` into the immediate command list, submit and wait
    ///
    /// The operation is abandoned if `record` fails.
    pub fn immediate<T>(&mut self, record: impl FnOnce(&mut dyn CommandList) -> Result<T>) -> Result<T> {
        self.guarded(|r| {
            let command_list = r.frames.begin_immediate()?;
            match record(command_list) {
                Ok(value) => {
                    r.frames.finish_immediate()?;
                    Ok(value)
                }
                Err(error) => {
                    r.frames.abandon_immediate()?;
                    Err(error)
                }
            }
        })
    }

    fn staging_buffer(&self, target: &str, data: &[u8]) -> Result<Arc<dyn Buffer>> {
        if data.is_empty() {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "empty upload into '{}'",
                target
            ))));
        }
        let staging = self.device.create_buffer(BufferDesc {
            name: format!("{} staging", target),
            size: data.len() as u64,
            usage: BufferUsage::TRANSFER_SRC,
            location: MemoryLocation::CpuToGpu,
        })?;
        staging.update(0, data)?;
        Ok(staging)
    }

    /// Run `record` on the immediate list, abandoning it on failure
    fn run_immediate(
        &mut self,
        record: impl FnOnce(&mut dyn CommandList, &mut ResourceRegistry) -> Result<usize>,
    ) -> Result<()> {
        let command_list = self.frames.begin_immediate()?;
        match record(command_list, &mut self.registry) {
            Ok(barriers) => {
                self.stats.barriers += barriers as u64;
                self.frames.finish_immediate()?;
                Ok(())
            }
            Err(error) => {
                self.frames.abandon_immediate()?;
                Err(error)
            }
        }
    }

    /// Copy `data` into buffer `id` at `offset` and wait for the copy
    ///
    /// The buffer goes through `CopyDest` and ends in `final_state`.
    pub fn upload_buffer(&mut self, id: ResourceId, offset: u64, data: &[u8], final_state: ResourceAccessState) -> Result<()> {
        self.guarded(|r| {
            let target = r.buffer(id)?;
            let fits = offset.checked_add(data.len() as u64).is_some_and(|end| end <= target.size());
            if !fits {
                return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                    "upload of {} bytes at {} exceeds '{}' ({} bytes)",
                    data.len(),
                    offset,
                    target.name(),
                    target.size()
                ))));
            }
            let staging = r.staging_buffer(target.name(), data)?;

            r.run_immediate(|command_list, registry| {
                let mut barriers = record_transition(
                    command_list,
                    registry,
                    id,
                    ResourceAccessState::CopyDest,
                    SubresourceRange::ALL,
                    true,
                )?;
                command_list.copy_buffer(staging.as_ref(), 0, target.as_ref(), offset, data.len() as u64)?;
                barriers += record_transition(command_list, registry, id, final_state, SubresourceRange::ALL, true)?;
                Ok(barriers)
            })?;
            engine_trace!(SOURCE, "Uploaded {} bytes into '{}'", data.len(), target.name());
            Ok(())
        })
    }

    /// Copy `data` into (`slice`, `mip`) of texture `id` and wait for the copy
    pub fn upload_texture(
        &mut self,
        id: ResourceId,
        slice: u32,
        mip: u32,
        data: &[u8],
        final_state: ResourceAccessState,
    ) -> Result<()> {
        self.guarded(|r| {
            let target = r.texture(id)?;
            let staging = r.staging_buffer(&target.info().name, data)?;
            let range = SubresourceRange::single(slice, mip);

            r.run_immediate(|command_list, registry| {
                let mut barriers =
                    record_transition(command_list, registry, id, ResourceAccessState::CopyDest, range, true)?;
                command_list.copy_buffer_to_texture(staging.as_ref(), 0, target.as_ref(), mip, slice)?;
                barriers += record_transition(command_list, registry, id, final_state, range, true)?;
                Ok(barriers)
            })?;
            engine_trace!(SOURCE, "Uploaded {} bytes into '{}'", data.len(), target.info().name);
            Ok(())
        })
    }

    // ===== SHUTDOWN =====

    /// Drain the GPU, drop the passes and report leaked resources
    ///
    /// Returns the number of tracked resources that were never released.
    /// Calling it again does nothing.
    pub fn shutdown(&mut self) -> Result<usize> {
        if self.shut_down {
            return Ok(0);
        }
        self.guarded(|r| {
            r.drain()?;
            for id in std::mem::take(&mut r.back_buffers) {
                r.registry.release(id)?;
            }
            r.current_image = None;
            r.swapchain = None;
            r.passes.clear();

            let leaks = r.registry.check_leaks();
            r.shut_down = true;
            if leaks > 0 {
                engine_error!(SOURCE, "Renderer shut down with {} leaked resource(s)", leaks);
            } else {
                engine_info!(
                    SOURCE,
                    "Renderer shut down after {} frame(s)",
                    r.stats.frames_submitted
                );
            }
            Ok(leaks)
        })
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(error) = self.drain() {
            engine_warn!(SOURCE, "Drain on drop failed: {}", error);
        }
    }
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
