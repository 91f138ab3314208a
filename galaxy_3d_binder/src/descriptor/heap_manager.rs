/// HeapManager - owner of the device descriptor storages

use std::sync::Arc;
use rustc_hash::FxHashMap;

use crate::descriptor::{DescriptorHeap, DescriptorHeapKind, HeapBudget, HeapFlavor, HeapId, HeapSet, PerKind};
use crate::error::{Error, Result};
use crate::graphics_device::{DescriptorStorage, GraphicsDevice};
use crate::{engine_info, engine_raise};

const SOURCE: &str = "galaxy3d::HeapManager";

struct KindRegion {
    storage: Arc<dyn DescriptorStorage>,
    /// Slots already handed to heaps
    reserved: u32,
}

/// Owns one device storage per kind and carves heaps out of it
///
/// Each kind has a reservation cursor; every heap gets the next
/// `capacity` slots, so regions never overlap and are never returned.
pub struct HeapManager {
    regions: FxHashMap<DescriptorHeapKind, KindRegion>,
    next_id: u32,
}

impl HeapManager {
    /// Create one device storage per kind with the given slot counts
    pub fn new(device: &dyn GraphicsDevice, capacities: &PerKind<u32>) -> Result<Self> {
        let mut regions = FxHashMap::default();
        for (kind, capacity) in capacities.iter() {
            let storage = device.create_descriptor_storage(kind, capacity)?;
            engine_info!(
                SOURCE,
                "{} storage: {} slots of {} bytes",
                kind,
                capacity,
                storage.increment()
            );
            regions.insert(kind, KindRegion { storage, reserved: 0 });
        }
        Ok(Self { regions, next_id: 0 })
    }

    fn region(&self, kind: DescriptorHeapKind) -> Result<&KindRegion> {
        self.regions
            .get(&kind)
            .ok_or_else(|| Error::InvalidResource(format!("no {} storage", kind)))
    }

    /// Device storage of `kind`
    pub fn storage(&self, kind: DescriptorHeapKind) -> Result<&Arc<dyn DescriptorStorage>> {
        Ok(&self.region(kind)?.storage)
    }

    /// Slots of `kind` already reserved by heaps
    pub fn reserved(&self, kind: DescriptorHeapKind) -> u32 {
        self.regions.get(&kind).map(|r| r.reserved).unwrap_or(0)
    }

    /// Total slots of the storage of `kind`
    pub fn capacity(&self, kind: DescriptorHeapKind) -> u32 {
        self.regions.get(&kind).map(|r| r.storage.capacity()).unwrap_or(0)
    }

    /// Reserve the next `capacity` slots of `kind` as a new heap
    pub fn create_heap(
        &mut self,
        kind: DescriptorHeapKind,
        flavor: HeapFlavor,
        capacity: u32,
        label: impl Into<String>,
    ) -> Result<DescriptorHeap> {
        let label = label.into();
        let region = self
            .regions
            .get_mut(&kind)
            .ok_or_else(|| engine_raise!(SOURCE, Error::InvalidResource(format!("no {} storage", kind))))?;

        let total = region.storage.capacity();
        if capacity > total - region.reserved {
            return Err(engine_raise!(SOURCE, Error::capacity_exhausted(
                format!("{} descriptor storage (creating '{}')", kind, label),
                capacity as u64,
                region.reserved as u64,
                total as u64,
            )));
        }

        let head = region.reserved;
        region.reserved += capacity;
        let id = HeapId(self.next_id);
        self.next_id += 1;

        Ok(DescriptorHeap::new(id, label, flavor, region.storage.clone(), head, capacity))
    }

    /// One heap per kind, sized from `budget`
    pub fn create_heap_set(&mut self, flavor: HeapFlavor, budget: &HeapBudget, label: &str) -> Result<HeapSet> {
        let heaps = DescriptorHeapKind::ALL
            .iter()
            .map(|&kind| self.create_heap(kind, flavor, budget.get(kind), format!("{} {}", kind, label)))
            .collect::<Result<Vec<_>>>()?;
        Ok(HeapSet::new(heaps))
    }
}

#[cfg(test)]
#[path = "heap_manager_tests.rs"]
mod tests;
