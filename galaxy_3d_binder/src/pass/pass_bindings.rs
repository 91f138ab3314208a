/// Pass bindings - static and dynamic descriptor tiers of one pass
///
/// Every pass keeps, per frame slot, a static tier (tables in the static
/// heaps and a block in the static uniform region, allocated once) and a
/// dynamic tier (scratch tables from the slot's dynamic heaps, only used
/// while a binding changed since the static tier was last written).
///
/// For the active slot and each category, `flush_bindings`:
/// 1. frame bit set: allocates and fills dynamic storage, clears the frame bit
/// 2. persistent bit set: reuses the dynamic storage of this frame
/// 3. otherwise: uses the static tier as is
///
/// `refresh_static`, run at `begin_frame` of the slot, rewrites the stale
/// static tables and clears both bits of the slot.

use std::any::Any;
use std::mem;

use crate::descriptor::{DescriptorHandle, DescriptorHeap, DescriptorHeapKind, HeapSet};
use crate::error::{Error, Result};
use crate::graphics_device::{ResourceView, SamplerDesc};
use crate::pass::{BindingCategory, PassLayout, SlotDirtyState, UniformBlock};
use crate::uniform::{UniformAllocation, UniformAllocator};
use crate::{engine_debug, engine_raise, engine_trace};

const SOURCE: &str = "galaxy3d::PassBindings";

// ============================================================================
// Tables
// ============================================================================

/// Which tier a bound table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSource {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundTable {
    pub handle: DescriptorHandle,
    pub source: BindingSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundUniform {
    pub allocation: UniformAllocation,
    pub source: BindingSource,
}

/// Result of a flush: what to bind for the draw or dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundTables {
    pub uniform: Option<BoundUniform>,
    pub read: Option<BoundTable>,
    pub samplers: Option<BoundTable>,
    pub write: Option<BoundTable>,
    pub color: Option<BoundTable>,
    pub depth: Option<BoundTable>,
    /// Dynamic tables and uniform blocks allocated by this flush
    pub allocations: u32,
}

impl BoundTables {
    /// Tier used for `category`, `None` when the pass has nothing in it
    pub fn source(&self, category: BindingCategory) -> Option<BindingSource> {
        match category {
            BindingCategory::Uniform => self.uniform.map(|u| u.source),
            BindingCategory::Read => self.read.or(self.samplers).map(|t| t.source),
            BindingCategory::Write => self.write.map(|t| t.source),
            BindingCategory::Output => self.color.or(self.depth).map(|t| t.source),
        }
    }
}

/// Handles of one tier for one frame slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassTables {
    pub uniform: Option<UniformAllocation>,
    pub read: Option<DescriptorHandle>,
    pub samplers: Option<DescriptorHandle>,
    pub write: Option<DescriptorHandle>,
    pub color: Option<DescriptorHandle>,
    pub depth: Option<DescriptorHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Read,
    Samplers,
    Write,
    Color,
    Depth,
}

impl Table {
    const ALL: [Table; 5] = [Table::Read, Table::Samplers, Table::Write, Table::Color, Table::Depth];

    fn kind(self) -> DescriptorHeapKind {
        match self {
            Table::Read | Table::Write => DescriptorHeapKind::ShaderResource,
            Table::Samplers => DescriptorHeapKind::Sampler,
            Table::Color => DescriptorHeapKind::ColorAttachment,
            Table::Depth => DescriptorHeapKind::DepthAttachment,
        }
    }

    fn category(self) -> BindingCategory {
        match self {
            Table::Read | Table::Samplers => BindingCategory::Read,
            Table::Write => BindingCategory::Write,
            Table::Color | Table::Depth => BindingCategory::Output,
        }
    }

    fn size(self, layout: &PassLayout) -> u32 {
        match self {
            Table::Read => layout.read_slots,
            Table::Samplers => layout.sampler_slots,
            Table::Write => layout.write_slots,
            Table::Color => layout.color_outputs,
            Table::Depth => layout.has_depth as u32,
        }
    }

    fn in_category(category: BindingCategory) -> impl Iterator<Item = Table> {
        Table::ALL.into_iter().filter(move |t| t.category() == category)
    }
}

impl PassTables {
    fn get(&self, table: Table) -> Option<DescriptorHandle> {
        match table {
            Table::Read => self.read,
            Table::Samplers => self.samplers,
            Table::Write => self.write,
            Table::Color => self.color,
            Table::Depth => self.depth,
        }
    }

    fn set(&mut self, table: Table, handle: DescriptorHandle) {
        let entry = match table {
            Table::Read => &mut self.read,
            Table::Samplers => &mut self.samplers,
            Table::Write => &mut self.write,
            Table::Color => &mut self.color,
            Table::Depth => &mut self.depth,
        };
        *entry = Some(handle);
    }
}

/// Dirty bits and both tiers of one pass for one frame slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSlotState {
    pub dirty: SlotDirtyState,
    pub static_tier: PassTables,
    /// Tables issued during the current frame of the slot
    pub dynamic_tier: PassTables,
}

// ============================================================================
// Bound resources
// ============================================================================

struct CurrentBindings {
    reads: Vec<Option<ResourceView>>,
    samplers: Vec<Option<SamplerDesc>>,
    writes: Vec<Option<ResourceView>>,
    colors: Vec<Option<ResourceView>>,
    depth: Option<ResourceView>,
}

impl CurrentBindings {
    fn new(layout: &PassLayout) -> Self {
        Self {
            reads: vec![None; layout.read_slots as usize],
            samplers: vec![None; layout.sampler_slots as usize],
            writes: vec![None; layout.write_slots as usize],
            colors: vec![None; layout.color_outputs as usize],
            depth: None,
        }
    }

    fn views(&self, table: Table) -> Vec<(u32, ResourceView)> {
        fn bound(views: &[Option<ResourceView>]) -> Vec<(u32, ResourceView)> {
            views
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.clone().map(|v| (i as u32, v)))
                .collect()
        }
        match table {
            Table::Read => bound(&self.reads),
            Table::Samplers => self
                .samplers
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.map(|s| (i as u32, ResourceView::Sampler(s))))
                .collect(),
            Table::Write => bound(&self.writes),
            Table::Color => bound(&self.colors),
            Table::Depth => self.depth.clone().map(|v| (0, v)).into_iter().collect(),
        }
    }

    /// Write every bound view of `table` into `handle`
    fn populate(&self, heap: &DescriptorHeap, handle: &DescriptorHandle, table: Table) -> Result<()> {
        for (index, view) in self.views(table) {
            heap.write(handle, index, &view)?;
        }
        Ok(())
    }
}

// ============================================================================
// PassBinding trait
// ============================================================================

/// Type-erased pass, as stored in the renderer's pass arena
pub trait PassBinding: Send + Sync {
    fn name(&self) -> &str;

    fn layout(&self) -> &PassLayout;

    /// Allocate and fill the static tier of `frames` slots
    ///
    /// # Arguments
    ///
    /// * `frames` - Number of frames in flight
    /// * `heaps` - Static descriptor heaps
    /// * `uniforms` - Static uniform region
    fn create_static_tier(&mut self, frames: usize, heaps: &mut HeapSet, uniforms: &mut UniformAllocator) -> Result<()>;

    /// Rewrite the stale static tables of `slot` and clear its dirty bits
    ///
    /// Returns whether anything was rewritten. Must only run once the fence
    /// of `slot` has been waited on.
    fn refresh_static(&mut self, slot: usize, heaps: &HeapSet, uniforms: &UniformAllocator) -> Result<bool>;

    /// Pick, per category, the tables to bind for a draw in `slot`
    ///
    /// # Arguments
    ///
    /// * `slot` - Active frame slot
    /// * `heaps` - Dynamic heaps of that slot
    /// * `uniforms` - Dynamic uniform region of that slot
    fn flush_bindings(&mut self, slot: usize, heaps: &mut HeapSet, uniforms: &mut UniformAllocator) -> Result<BoundTables>;

    fn slot_state(&self, slot: usize) -> Option<&PassSlotState>;

    /// Set both dirty bits of `category` for every slot
    fn mark_dirty(&mut self, category: BindingCategory);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// PassBindings
// ============================================================================

/// Bindings of a pass whose uniform block is `U`
pub struct PassBindings<U: UniformBlock> {
    layout: PassLayout,
    uniform: U,
    bindings: CurrentBindings,
    slots: Vec<PassSlotState>,
}

impl<U: UniformBlock> PassBindings<U> {
    /// Pass with nothing bound yet and `uniform` as initial block
    ///
    /// # Errors
    ///
    /// `InvalidResource` if `U::LAYOUT` is inconsistent or its size differs
    /// from `size_of::<U>()`
    pub fn new(layout: PassLayout, uniform: U) -> Result<Self> {
        U::LAYOUT.validate()?;
        if mem::size_of::<U>() != U::LAYOUT.size as usize {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: uniform layout declares {} bytes, the block type has {}",
                layout.name,
                U::LAYOUT.size,
                mem::size_of::<U>()
            ))));
        }
        Ok(Self {
            bindings: CurrentBindings::new(&layout),
            layout,
            uniform,
            slots: Vec::new(),
        })
    }

    fn has_uniforms(&self) -> bool {
        !U::LAYOUT.is_empty()
    }

    pub fn uniform(&self) -> &U {
        &self.uniform
    }

    /// Replace the uniform block
    pub fn set_uniform(&mut self, value: U) {
        self.uniform = value;
        if self.has_uniforms() {
            self.mark_dirty(BindingCategory::Uniform);
        }
    }

    /// Modify the uniform block in place
    pub fn update_uniform(&mut self, update: impl FnOnce(&mut U)) {
        update(&mut self.uniform);
        if self.has_uniforms() {
            self.mark_dirty(BindingCategory::Uniform);
        }
    }

    fn check_index(&self, what: &str, index: u32, count: usize) -> Result<()> {
        if (index as usize) < count {
            Ok(())
        } else {
            Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: {} slot {} outside a table of {}",
                self.layout.name, what, index, count
            ))))
        }
    }

    fn reject_view(&self, what: &str, view: &ResourceView) -> Error {
        engine_raise!(SOURCE, Error::InvalidResource(format!(
            "{}: {:?} cannot be bound as {}",
            self.layout.name, view, what
        )))
    }

    /// Bind a read-only shader resource
    pub fn bind_read(&mut self, index: u32, view: ResourceView) -> Result<()> {
        self.check_index("read", index, self.bindings.reads.len())?;
        if view.heap_kind() != DescriptorHeapKind::ShaderResource {
            return Err(self.reject_view("a read binding", &view));
        }
        self.bindings.reads[index as usize] = Some(view);
        self.mark_dirty(BindingCategory::Read);
        Ok(())
    }

    /// Bind a sampler (part of the read category)
    pub fn bind_sampler(&mut self, index: u32, sampler: SamplerDesc) -> Result<()> {
        self.check_index("sampler", index, self.bindings.samplers.len())?;
        self.bindings.samplers[index as usize] = Some(sampler);
        self.mark_dirty(BindingCategory::Read);
        Ok(())
    }

    /// Bind a shader-writable resource
    pub fn bind_write(&mut self, index: u32, view: ResourceView) -> Result<()> {
        self.check_index("write", index, self.bindings.writes.len())?;
        if !view.is_writable() {
            return Err(self.reject_view("a write binding", &view));
        }
        self.bindings.writes[index as usize] = Some(view);
        self.mark_dirty(BindingCategory::Write);
        Ok(())
    }

    /// Bind color attachment `index`
    pub fn bind_color_output(&mut self, index: u32, view: ResourceView) -> Result<()> {
        self.check_index("color output", index, self.bindings.colors.len())?;
        if !matches!(view, ResourceView::ColorAttachment { .. }) {
            return Err(self.reject_view("a color output", &view));
        }
        self.bindings.colors[index as usize] = Some(view);
        self.mark_dirty(BindingCategory::Output);
        Ok(())
    }

    /// Bind the depth attachment
    pub fn bind_depth_output(&mut self, view: ResourceView) -> Result<()> {
        if !self.layout.has_depth {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: the layout has no depth output",
                self.layout.name
            ))));
        }
        if !matches!(view, ResourceView::DepthAttachment { .. }) {
            return Err(self.reject_view("the depth output", &view));
        }
        self.bindings.depth = Some(view);
        self.mark_dirty(BindingCategory::Output);
        Ok(())
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if self.slots.is_empty() {
            return Err(engine_raise!(SOURCE, Error::UseBeforeInit(format!(
                "{}: static tier not created",
                self.layout.name
            ))));
        }
        if slot >= self.slots.len() {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: frame slot {} outside {} slots",
                self.layout.name,
                slot,
                self.slots.len()
            ))));
        }
        Ok(())
    }

    fn category_in_use(&self, category: BindingCategory) -> bool {
        match category {
            BindingCategory::Uniform => self.has_uniforms(),
            other => self.layout.has_tables(other),
        }
    }
}

/// Whether every dynamic table of `category` was issued this frame
fn dynamic_tier_live(
    state: &PassSlotState,
    category: BindingCategory,
    layout: &PassLayout,
    heaps: &HeapSet,
    uniforms: &UniformAllocator,
) -> bool {
    if category == BindingCategory::Uniform {
        return state.dynamic_tier.uniform.map_or(false, |u| uniforms.is_live(&u));
    }
    Table::in_category(category)
        .filter(|t| t.size(layout) > 0)
        .all(|t| {
            state
                .dynamic_tier
                .get(t)
                .map_or(false, |h| heaps.get(t.kind()).is_live(&h))
        })
}

fn fill_bound(bound: &mut BoundTables, category: BindingCategory, tier: &PassTables, source: BindingSource) {
    let table = |handle: Option<DescriptorHandle>| handle.map(|handle| BoundTable { handle, source });
    match category {
        BindingCategory::Uniform => {
            bound.uniform = tier.uniform.map(|allocation| BoundUniform { allocation, source });
        }
        BindingCategory::Read => {
            bound.read = table(tier.read);
            bound.samplers = table(tier.samplers);
        }
        BindingCategory::Write => bound.write = table(tier.write),
        BindingCategory::Output => {
            bound.color = table(tier.color);
            bound.depth = table(tier.depth);
        }
    }
}

impl<U: UniformBlock + 'static> PassBinding for PassBindings<U> {
    fn name(&self) -> &str {
        &self.layout.name
    }

    fn layout(&self) -> &PassLayout {
        &self.layout
    }

    fn create_static_tier(&mut self, frames: usize, heaps: &mut HeapSet, uniforms: &mut UniformAllocator) -> Result<()> {
        if !self.slots.is_empty() {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(format!(
                "{}: static tier already created",
                self.layout.name
            ))));
        }

        let mut slots = Vec::with_capacity(frames);
        for _ in 0..frames {
            let mut tier = PassTables::default();
            for table in Table::ALL {
                let size = table.size(&self.layout);
                if size == 0 {
                    continue;
                }
                let handle = heaps.get_mut(table.kind()).allocate_slot(size)?;
                self.bindings.populate(heaps.get(table.kind()), &handle, table)?;
                tier.set(table, handle);
            }
            if self.has_uniforms() {
                tier.uniform = Some(uniforms.allocate_bytes(bytemuck::bytes_of(&self.uniform))?);
            }
            slots.push(PassSlotState {
                static_tier: tier,
                ..PassSlotState::default()
            });
        }
        self.slots = slots;

        engine_debug!(SOURCE, "{}: static tier created for {} slot(s)", self.layout.name, frames);
        Ok(())
    }

    fn refresh_static(&mut self, slot: usize, heaps: &HeapSet, uniforms: &UniformAllocator) -> Result<bool> {
        self.check_slot(slot)?;
        let state = &mut self.slots[slot];
        state.dynamic_tier = PassTables::default();
        if state.dirty.persistent.is_empty() {
            return Ok(false);
        }

        for category in BindingCategory::ALL {
            if !state.dirty.test_persistent(category) {
                continue;
            }
            if category == BindingCategory::Uniform {
                if let Some(allocation) = state.static_tier.uniform {
                    uniforms.write(&allocation, bytemuck::bytes_of(&self.uniform))?;
                }
            } else {
                for table in Table::in_category(category) {
                    if let Some(handle) = state.static_tier.get(table) {
                        self.bindings.populate(heaps.get(table.kind()), &handle, table)?;
                    }
                }
            }
            state.dirty.clear(category);
        }

        engine_trace!(SOURCE, "{}: static tier of slot {} refreshed", self.layout.name, slot);
        Ok(true)
    }

    fn flush_bindings(&mut self, slot: usize, heaps: &mut HeapSet, uniforms: &mut UniformAllocator) -> Result<BoundTables> {
        self.check_slot(slot)?;
        let in_use: Vec<BindingCategory> = BindingCategory::ALL
            .into_iter()
            .filter(|&c| self.category_in_use(c))
            .collect();

        let state = &mut self.slots[slot];
        let mut bound = BoundTables::default();

        for category in in_use {
            let stale = state.dirty.test_frame(category)
                || (state.dirty.test_persistent(category)
                    && !dynamic_tier_live(state, category, &self.layout, heaps, uniforms));

            let source = if stale {
                if category == BindingCategory::Uniform {
                    let allocation = uniforms.allocate_bytes(bytemuck::bytes_of(&self.uniform))?;
                    state.dynamic_tier.uniform = Some(allocation);
                    bound.allocations += 1;
                } else {
                    for table in Table::in_category(category) {
                        let size = table.size(&self.layout);
                        if size == 0 {
                            continue;
                        }
                        let handle = heaps.get_mut(table.kind()).allocate_slot(size)?;
                        self.bindings.populate(heaps.get(table.kind()), &handle, table)?;
                        state.dynamic_tier.set(table, handle);
                        bound.allocations += 1;
                    }
                }
                state.dirty.clear_frame(category);
                BindingSource::Dynamic
            } else if state.dirty.test_persistent(category) {
                BindingSource::Dynamic
            } else {
                BindingSource::Static
            };

            let tier = match source {
                BindingSource::Static => &state.static_tier,
                BindingSource::Dynamic => &state.dynamic_tier,
            };
            fill_bound(&mut bound, category, tier, source);
        }

        if bound.allocations > 0 {
            engine_trace!(
                SOURCE,
                "{}: {} dynamic allocation(s) in slot {}",
                self.layout.name,
                bound.allocations,
                slot
            );
        }
        Ok(bound)
    }

    fn slot_state(&self, slot: usize) -> Option<&PassSlotState> {
        self.slots.get(slot)
    }

    fn mark_dirty(&mut self, category: BindingCategory) {
        for state in &mut self.slots {
            state.dirty.set(category);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "pass_bindings_tests.rs"]
mod tests;
