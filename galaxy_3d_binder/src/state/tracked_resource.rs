/// Tracked resource - device object plus per-subresource state table

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graphics_device::{Barrier, Buffer, GpuResource, Texture};
use crate::state::{ResourceAccessState, StateTable, SubresourceRange};
use crate::{engine_raise, engine_trace};

const SOURCE: &str = "galaxy3d::StateTracker";

/// Texture or buffer whose access state is tracked per subresource
///
/// A resource registered without a backing allocation has no state table:
/// every query and transition on it fails with `UseBeforeInit`.
pub struct TrackedResource {
    name: String,
    resource: Option<GpuResource>,
    table: Option<StateTable>,
}

impl TrackedResource {
    /// Track every (slice, mip) of `texture`, all starting in `initial`
    pub fn texture(texture: Arc<dyn Texture>, initial: ResourceAccessState) -> Self {
        let info = texture.info();
        let table = StateTable::new(info.array_layers, info.mip_levels, initial);
        Self {
            name: info.name.clone(),
            resource: Some(GpuResource::Texture(texture)),
            table: Some(table),
        }
    }

    /// Track `buffer` as a single subresource
    pub fn buffer(buffer: Arc<dyn Buffer>, initial: ResourceAccessState) -> Self {
        Self {
            name: buffer.name().to_string(),
            resource: Some(GpuResource::Buffer(buffer)),
            table: Some(StateTable::new(1, 1, initial)),
        }
    }

    /// Placeholder for a resource whose allocation does not exist yet
    pub fn uninitialized(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resource: None,
            table: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> Option<&GpuResource> {
        self.resource.as_ref()
    }

    pub fn texture_object(&self) -> Option<&Arc<dyn Texture>> {
        self.resource.as_ref().and_then(GpuResource::as_texture)
    }

    pub fn buffer_object(&self) -> Option<&Arc<dyn Buffer>> {
        self.resource.as_ref().and_then(GpuResource::as_buffer)
    }

    pub fn is_initialized(&self) -> bool {
        self.table.is_some()
    }

    /// Samples per texel (1 for buffers)
    pub fn sample_count(&self) -> u32 {
        self.texture_object().map(|t| t.info().sample_count).unwrap_or(1)
    }

    fn table(&self) -> Result<&StateTable> {
        self.table.as_ref().ok_or_else(|| {
            engine_raise!(SOURCE, Error::UseBeforeInit(format!(
                "'{}' has no backing allocation",
                self.name
            )))
        })
    }

    /// (array slices, mip levels) of the state table
    pub fn extent(&self) -> Result<(u32, u32)> {
        let table = self.table()?;
        Ok((table.slices(), table.mips()))
    }

    /// State of one subresource
    pub fn current_state(&self, slice: u32, mip: u32) -> Result<ResourceAccessState> {
        self.table()?.get(slice, mip).ok_or_else(|| {
            engine_raise!(SOURCE, Error::InvalidResource(format!(
                "'{}' has no subresource (slice {}, mip {})",
                self.name, slice, mip
            )))
        })
    }

    /// Whether every subresource of `range` already is in `state`
    pub fn is_in_state(&self, state: ResourceAccessState, range: SubresourceRange) -> Result<bool> {
        let table = self.table()?;
        let (slices, mips) = self.resolve_range(table, range)?;
        let all_match = table.cells_in(slices, mips).all(|(_, _, s)| s == state);
        Ok(all_match)
    }

    /// Common state of the whole resource, if every subresource agrees
    pub fn uniform_state(&self) -> Result<Option<ResourceAccessState>> {
        Ok(self.table()?.uniform_state())
    }

    fn resolve_range(
        &self,
        table: &StateTable,
        range: SubresourceRange,
    ) -> Result<(std::ops::Range<u32>, std::ops::Range<u32>)> {
        let slices = range.slices.resolve(table.slices());
        let mips = range.mips.resolve(table.mips());
        match (slices, mips) {
            (Some(slices), Some(mips)) => Ok((slices, mips)),
            _ => Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{:?} is outside '{}' ({} slices x {} mips)",
                range,
                self.name,
                table.slices(),
                table.mips()
            )))),
        }
    }

    /// Move every subresource of `range` to `new_state`
    ///
    /// Returns one barrier per subresource whose state changed. Subresources
    /// already in `new_state` are skipped, unless the range is a single
    /// subresource: that request is an `IllegalTransition`.
    pub fn request_transition(
        &mut self,
        new_state: ResourceAccessState,
        range: SubresourceRange,
    ) -> Result<Vec<Barrier>> {
        let table = self.table()?;
        let (slices, mips) = self.resolve_range(table, range)?;
        let single_cell = slices.len() == 1 && mips.len() == 1;

        let changes: Vec<(u32, u32, ResourceAccessState)> = table
            .cells_in(slices.clone(), mips.clone())
            .filter(|&(_, _, state)| state != new_state)
            .collect();

        if single_cell && changes.is_empty() {
            return Err(engine_raise!(SOURCE, Error::IllegalTransition(format!(
                "'{}' (slice {}, mip {}) is already {}",
                self.name, slices.start, mips.start, new_state
            ))));
        }

        let resource = self.resource.clone().ok_or_else(|| {
            Error::UseBeforeInit(format!("'{}' has no backing allocation", self.name))
        })?;

        let mut barriers = Vec::with_capacity(changes.len());
        if let Some(table) = self.table.as_mut() {
            for (slice, mip, before) in changes {
                table.set(slice, mip, new_state);
                barriers.push(Barrier {
                    resource: resource.clone(),
                    slice,
                    mip,
                    before,
                    after: new_state,
                });
            }
        }

        engine_trace!(SOURCE, "'{}' -> {}: {} barrier(s)", self.name, new_state, barriers.len());
        Ok(barriers)
    }

    /// Like `request_transition`, but a range already in `new_state` yields
    /// no barrier instead of an error
    pub fn transition_if_needed(
        &mut self,
        new_state: ResourceAccessState,
        range: SubresourceRange,
    ) -> Result<Vec<Barrier>> {
        if self.is_in_state(new_state, range)? {
            return Ok(Vec::new());
        }
        self.request_transition(new_state, range)
    }
}

#[cfg(test)]
#[path = "tracked_resource_tests.rs"]
mod tests;
