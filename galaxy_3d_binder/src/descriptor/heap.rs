/// Descriptor heaps: bump allocators over a region of a device storage

use std::sync::Arc;

use crate::descriptor::{DescriptorHandle, DescriptorHeapKind, HeapId, PerKind};
use crate::error::{Error, Result};
use crate::graphics_device::{DescriptorStorage, ResourceView};
use crate::{engine_raise, engine_trace};

const SOURCE: &str = "galaxy3d::DescriptorHeap";

/// Lifetime policy of an allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapFlavor {
    /// Allocated once, never reset
    Static,
    /// Reset once per frame, after the slot's fence wait
    Dynamic,
}

/// Region `[head, head + capacity)` of a device descriptor storage
///
/// Allocation is a bump of `offset`, in strictly increasing slot order, with
/// no free list. Dynamic heaps are rewound in bulk by `reset`.
pub struct DescriptorHeap {
    id: HeapId,
    label: String,
    kind: DescriptorHeapKind,
    flavor: HeapFlavor,
    storage: Arc<dyn DescriptorStorage>,
    head: u32,
    capacity: u32,
    offset: u32,
    epoch: u64,
    peak: u32,
}

impl DescriptorHeap {
    /// Only `HeapManager` carves heaps, so regions never overlap
    pub(crate) fn new(
        id: HeapId,
        label: String,
        flavor: HeapFlavor,
        storage: Arc<dyn DescriptorStorage>,
        head: u32,
        capacity: u32,
    ) -> Self {
        Self {
            id,
            label,
            kind: storage.kind(),
            flavor,
            storage,
            head,
            capacity,
            offset: 0,
            epoch: 0,
            peak: 0,
        }
    }

    pub fn id(&self) -> HeapId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    pub fn flavor(&self) -> HeapFlavor {
        self.flavor
    }

    /// First slot of the region inside the device storage
    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Slots allocated since the last reset
    pub fn used(&self) -> u32 {
        self.offset
    }

    pub fn remaining(&self) -> u32 {
        self.capacity - self.offset
    }

    /// Highest `used()` ever observed
    pub fn peak(&self) -> u32 {
        self.peak
    }

    /// Number of resets so far
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn storage(&self) -> &Arc<dyn DescriptorStorage> {
        &self.storage
    }

    /// Allocate a table of `count` consecutive slots
    ///
    /// # Errors
    ///
    /// - `InvalidResource` when `count` is 0
    /// - `CapacityExhausted` when the region is full
    pub fn allocate_slot(&mut self, count: u32) -> Result<DescriptorHandle> {
        if count == 0 {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: cannot allocate 0 slots",
                self.label
            ))));
        }
        if count > self.remaining() {
            return Err(engine_raise!(SOURCE, Error::capacity_exhausted(
                self.label.clone(),
                count as u64,
                self.offset as u64,
                self.capacity as u64,
            )));
        }

        let offset = self.offset;
        let index = self.head + offset;
        let increment = self.storage.increment();
        let gpu = if self.kind.is_shader_visible() {
            self.storage.gpu_base() + index as u64 * increment
        } else {
            0
        };

        self.offset += count;
        self.peak = self.peak.max(self.offset);

        engine_trace!(SOURCE, "{}: allocated {} slot(s) at offset {}", self.label, count, offset);

        Ok(DescriptorHandle {
            cpu: self.storage.cpu_base() + index as u64 * increment,
            gpu,
            heap: self.id,
            kind: self.kind,
            index,
            offset,
            count,
            increment,
            epoch: self.epoch,
            valid: true,
        })
    }

    /// Rewind to the head and start a new epoch
    ///
    /// Only the frame pipeline calls this, once the fence of the owning
    /// frame slot has been waited on. Static heaps refuse.
    pub fn reset(&mut self) -> Result<()> {
        if self.flavor == HeapFlavor::Static {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(format!(
                "{}: static heaps are never reset",
                self.label
            ))));
        }
        self.offset = 0;
        self.epoch += 1;
        Ok(())
    }

    /// Whether `handle` was issued by this heap and its slots are still reserved
    pub fn is_live(&self, handle: &DescriptorHandle) -> bool {
        handle.valid
            && handle.heap == self.id
            && (self.flavor == HeapFlavor::Static || handle.epoch == self.epoch)
    }

    fn check_live(&self, handle: &DescriptorHandle) -> Result<()> {
        if self.is_live(handle) {
            Ok(())
        } else {
            Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: handle (heap {:?}, epoch {}) is not live (heap epoch {})",
                self.label, handle.heap, handle.epoch, self.epoch
            ))))
        }
    }

    /// Populate slot `offset` of the table `handle` with `view`
    pub fn write(&self, handle: &DescriptorHandle, offset: u32, view: &ResourceView) -> Result<()> {
        self.check_live(handle)?;
        if offset >= handle.count {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: slot {} outside a table of {}",
                self.label, offset, handle.count
            ))));
        }
        if view.heap_kind() != self.kind {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: {:?} does not belong in a {} heap",
                self.label, view, self.kind
            ))));
        }
        self.storage.write(handle.index + offset, view)
    }

    /// Copy the whole table `src` into the table `dst` owned by this heap
    ///
    /// `src` may come from another heap of the same kind (e.g. the static
    /// heap), they share the same device storage.
    pub fn copy(&self, src: &DescriptorHandle, dst: &DescriptorHandle) -> Result<()> {
        self.check_live(dst)?;
        if !src.valid || src.kind != self.kind {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: cannot copy from a {} table",
                self.label, src.kind
            ))));
        }
        if src.count > dst.count {
            return Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "{}: copy of {} slots into a table of {}",
                self.label, src.count, dst.count
            ))));
        }
        self.storage.copy(dst.index, src.index, src.count)
    }
}

/// One heap per descriptor kind
pub struct HeapSet {
    heaps: Vec<DescriptorHeap>,
}

impl HeapSet {
    /// `heaps` must hold one heap per kind, in `DescriptorHeapKind::ALL` order
    pub(crate) fn new(heaps: Vec<DescriptorHeap>) -> Self {
        debug_assert!(heaps.iter().map(|h| h.kind()).eq(DescriptorHeapKind::ALL));
        Self { heaps }
    }

    pub fn get(&self, kind: DescriptorHeapKind) -> &DescriptorHeap {
        &self.heaps[kind.index()]
    }

    pub fn get_mut(&mut self, kind: DescriptorHeapKind) -> &mut DescriptorHeap {
        &mut self.heaps[kind.index()]
    }

    /// Reset every heap of the set
    pub fn reset_all(&mut self) -> Result<()> {
        for heap in &mut self.heaps {
            heap.reset()?;
        }
        Ok(())
    }

    /// Slots in use, per kind
    pub fn usage(&self) -> PerKind<u32> {
        let mut usage = PerKind::splat(0);
        for heap in &self.heaps {
            usage[heap.kind()] = heap.used();
        }
        usage
    }

    pub fn iter(&self) -> impl Iterator<Item = &DescriptorHeap> {
        self.heaps.iter()
    }
}

#[cfg(test)]
#[path = "heap_tests.rs"]
mod tests;
