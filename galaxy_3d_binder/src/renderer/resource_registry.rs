/// Resource registry - slot-map arena of tracked resources

use slotmap::{new_key_type, SlotMap};

use crate::error::{Error, Result};
use crate::state::TrackedResource;
use crate::{engine_error, engine_raise, engine_trace};

const SOURCE: &str = "galaxy3d::ResourceRegistry";

new_key_type! {
    /// Stable key of a tracked texture or buffer
    pub struct ResourceId;
}

/// Owns every tracked resource until it is explicitly released
pub struct ResourceRegistry {
    resources: SlotMap<ResourceId, TrackedResource>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            resources: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, resource: TrackedResource) -> ResourceId {
        engine_trace!(SOURCE, "Tracking '{}'", resource.name());
        self.resources.insert(resource)
    }

    fn missing(id: ResourceId) -> Error {
        engine_raise!(SOURCE, Error::InvalidResource(format!("unknown resource {:?}", id)))
    }

    pub fn get(&self, id: ResourceId) -> Result<&TrackedResource> {
        self.resources.get(id).ok_or_else(|| Self::missing(id))
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Result<&mut TrackedResource> {
        self.resources.get_mut(id).ok_or_else(|| Self::missing(id))
    }

    /// Two distinct resources borrowed mutably at once
    pub fn get_pair_mut(&mut self, a: ResourceId, b: ResourceId) -> Result<(&mut TrackedResource, &mut TrackedResource)> {
        if a == b {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{:?} cannot be borrowed twice",
                a
            ))));
        }
        if let Some(id) = [a, b].into_iter().find(|&id| !self.resources.contains_key(id)) {
            return Err(Self::missing(id));
        }
        match self.resources.get_disjoint_mut([a, b]) {
            Some([first, second]) => Ok((first, second)),
            None => Err(Self::missing(a)),
        }
    }

    /// Stop tracking `id` and hand the resource back
    pub fn release(&mut self, id: ResourceId) -> Result<TrackedResource> {
        let resource = self.resources.remove(id).ok_or_else(|| Self::missing(id))?;
        engine_trace!(SOURCE, "Released '{}'", resource.name());
        Ok(resource)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.resources.len()
    }

    /// Log every resource that was never released, returns how many
    pub fn check_leaks(&self) -> usize {
        for (id, resource) in &self.resources {
            engine_error!(SOURCE, "Leaked resource '{}' ({:?})", resource.name(), id);
        }
        self.resources.len()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "resource_registry_tests.rs"]
mod tests;
