/// Frame slot - per in-flight frame command list and transient memory

use crate::descriptor::HeapSet;
use crate::graphics_device::CommandList;
use crate::uniform::UniformAllocator;

/// Position of a slot in its Idle -> Recording -> Submitted cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameSlotStatus {
    /// Nothing in flight, or the last submission is known to be complete
    Idle,
    /// Between `begin_frame` and `submit`
    Recording,
    /// Handed to the queue, fence value not yet waited on
    Submitted,
}

/// Everything a frame owns exclusively until its fence signals
///
/// The dynamic heaps and the uniform region are only reset by the frame
/// pipeline, after the fence wait for this slot.
pub struct FrameSlot {
    index: usize,
    command_list: Box<dyn CommandList>,
    fence_value: u64,
    status: FrameSlotStatus,
    dynamic_heaps: HeapSet,
    uniforms: UniformAllocator,
}

impl FrameSlot {
    pub(crate) fn new(
        index: usize,
        command_list: Box<dyn CommandList>,
        dynamic_heaps: HeapSet,
        uniforms: UniformAllocator,
    ) -> Self {
        Self {
            index,
            command_list,
            fence_value: 0,
            status: FrameSlotStatus::Idle,
            dynamic_heaps,
            uniforms,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn status(&self) -> FrameSlotStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: FrameSlotStatus) {
        self.status = status;
    }

    /// Timeline value signaled by the last submission of this slot (0 if none)
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    pub(crate) fn set_fence_value(&mut self, value: u64) {
        self.fence_value = value;
    }

    pub fn command_list(&self) -> &dyn CommandList {
        self.command_list.as_ref()
    }

    pub fn dynamic_heaps(&self) -> &HeapSet {
        &self.dynamic_heaps
    }

    pub fn uniforms(&self) -> &UniformAllocator {
        &self.uniforms
    }

    /// Command list, dynamic heaps and uniform region borrowed together
    pub(crate) fn parts_mut(&mut self) -> (&mut dyn CommandList, &mut HeapSet, &mut UniformAllocator) {
        (self.command_list.as_mut(), &mut self.dynamic_heaps, &mut self.uniforms)
    }
}
