/// Descriptor handles

use crate::descriptor::DescriptorHeapKind;

/// Identifier of a descriptor heap, unique per `HeapManager`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(pub(crate) u32);

impl HeapId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Table of `count` consecutive binding slots inside one descriptor heap
///
/// Handles are plain values: they are never freed on their own. A handle
/// from a dynamic heap is only live until that heap is reset (its epoch
/// moves on); `DescriptorHeap::is_live` detects stale handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    /// Address used when writing the first slot
    pub cpu: u64,
    /// Address used by shaders for the first slot (0 for attachment kinds)
    pub gpu: u64,
    /// Heap that issued the handle
    pub heap: HeapId,
    pub kind: DescriptorHeapKind,
    /// Index of the first slot inside the device storage
    pub index: u32,
    /// Offset of the first slot from the heap head
    pub offset: u32,
    /// Number of slots in the table
    pub count: u32,
    /// Distance in bytes between two slots
    pub increment: u64,
    /// Heap epoch the handle was issued in
    pub epoch: u64,
    pub valid: bool,
}

impl DescriptorHandle {
    /// Handle that points at nothing
    pub const NULL: DescriptorHandle = DescriptorHandle {
        cpu: 0,
        gpu: 0,
        heap: HeapId(u32::MAX),
        kind: DescriptorHeapKind::ShaderResource,
        index: 0,
        offset: 0,
        count: 0,
        increment: 0,
        epoch: 0,
        valid: false,
    };

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// CPU address of slot `i` of the table
    pub fn cpu_at(&self, i: u32) -> u64 {
        self.cpu + i as u64 * self.increment
    }

    /// GPU address of slot `i` of the table, 0 when not shader visible
    pub fn gpu_at(&self, i: u32) -> u64 {
        if self.gpu == 0 {
            0
        } else {
            self.gpu + i as u64 * self.increment
        }
    }
}

impl Default for DescriptorHandle {
    fn default() -> Self {
        Self::NULL
    }
}
