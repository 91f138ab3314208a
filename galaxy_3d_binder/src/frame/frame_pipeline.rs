/// Frame pipeline - N frame slots pipelined ahead of the GPU
///
/// Every submission signals one global timeline fence with a strictly
/// increasing value; a slot remembers the value of its last submission and
/// `begin_frame` blocks on it before any transient memory is reused.

use std::sync::Arc;

use crate::config::Config;
use crate::descriptor::{DescriptorHeap, HeapFlavor, HeapId, HeapManager, HeapSet};
use crate::error::{Error, Result};
use crate::frame::{FrameSlot, FrameSlotStatus, ImmediateContext};
use crate::graphics_device::{CommandList, Fence, GraphicsDevice};
use crate::uniform::UniformAllocator;
use crate::{engine_debug, engine_info, engine_raise, engine_trace};

const SOURCE: &str = "galaxy3d::FramePipeline";

pub struct FramePipeline {
    device: Arc<dyn GraphicsDevice>,
    fence: Arc<dyn Fence>,
    slots: Vec<FrameSlot>,
    active: usize,
    /// A frame was begun on the active slot and not presented yet
    frame_open: bool,
    last_signaled: u64,
    frame_number: u64,
    immediate: ImmediateContext,
}

impl FramePipeline {
    /// Create `config.frames_in_flight` slots, carving their dynamic heaps
    /// from `heaps`
    pub fn new(device: Arc<dyn GraphicsDevice>, config: &Config, heaps: &mut HeapManager) -> Result<Self> {
        let mut slots = Vec::with_capacity(config.frames_in_flight);
        for index in 0..config.frames_in_flight {
            let command_list = device.create_command_list()?;
            let dynamic_heaps = heaps.create_heap_set(
                HeapFlavor::Dynamic,
                &config.dynamic_descriptors_per_frame,
                &format!("dynamic (frame {})", index),
            )?;
            let uniforms = UniformAllocator::new(
                device.as_ref(),
                &format!("frame {} uniforms", index),
                HeapFlavor::Dynamic,
                config.dynamic_uniform_bytes_per_frame,
            )?;
            slots.push(FrameSlot::new(index, command_list, dynamic_heaps, uniforms));
        }

        let fence = device.create_fence(0)?;
        let immediate = ImmediateContext::new(device.as_ref())?;

        engine_info!(SOURCE, "{} frame(s) in flight", slots.len());

        Ok(Self {
            device,
            fence,
            slots,
            active: 0,
            frame_open: false,
            last_signaled: 0,
            frame_number: 0,
            immediate,
        })
    }

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot the next (or current) frame records into
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Number of frames presented so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Whether a frame has been begun and not presented yet
    pub fn is_frame_open(&self) -> bool {
        self.frame_open
    }

    /// Last value handed to the timeline fence
    pub fn last_signaled_value(&self) -> u64 {
        self.last_signaled
    }

    pub fn fence(&self) -> &Arc<dyn Fence> {
        &self.fence
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    pub fn active_slot(&self) -> &FrameSlot {
        &self.slots[self.active]
    }

    pub(crate) fn active_slot_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[self.active]
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(engine_raise!(SOURCE, Error::InvalidResource(format!(
                "frame slot {} does not exist ({} in flight)",
                index,
                self.slots.len()
            ))))
        }
    }

    /// Whether the last submission of slot `index` has completed
    pub fn is_slot_retired(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.fence.completed_value()? >= self.slots[index].fence_value())
    }

    // ===== FRAME CYCLE =====

    /// Start recording frame slot `index`
    ///
    /// Blocks until the slot's previous submission has completed, then resets
    /// its dynamic heaps and uniform region and opens its command list.
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if `index` is not the active slot, or if a frame is
    /// already open (second `begin_frame` before `present`)
    pub fn begin_frame(&mut self, index: usize) -> Result<()> {
        if index != self.active {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(format!(
                "begin_frame({}) while slot {} is active",
                index, self.active
            ))));
        }
        if self.frame_open {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(format!(
                "begin_frame({}) before the previous frame on this slot was presented",
                index
            ))));
        }

        let slot = &mut self.slots[index];
        let value = slot.fence_value();
        if value > 0 {
            if self.fence.completed_value()? < value {
                engine_debug!(SOURCE, "Slot {} waits for fence value {}", index, value);
            }
            self.fence.wait(value)?;
        }

        let (command_list, heaps, uniforms) = slot.parts_mut();
        heaps.reset_all()?;
        uniforms.reset()?;
        command_list.begin()?;

        slot.set_status(FrameSlotStatus::Recording);
        self.frame_open = true;
        engine_trace!(SOURCE, "Frame {} recording in slot {}", self.frame_number, index);
        Ok(())
    }

    /// Command list of the frame being recorded
    pub fn command_list_mut(&mut self) -> Result<&mut dyn CommandList> {
        Ok(self.recording_parts_mut()?.0)
    }

    /// Command list, dynamic heaps and uniform region of the recording slot
    pub(crate) fn recording_parts_mut(
        &mut self,
    ) -> Result<(&mut dyn CommandList, &mut HeapSet, &mut UniformAllocator)> {
        let slot = &mut self.slots[self.active];
        if slot.status() != FrameSlotStatus::Recording {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(format!(
                "slot {} is not recording ({:?})",
                slot.index(),
                slot.status()
            ))));
        }
        Ok(slot.parts_mut())
    }

    /// Dynamic heap `id` of any slot
    pub fn find_heap(&self, id: HeapId) -> Option<&DescriptorHeap> {
        self.slots
            .iter()
            .flat_map(|slot| slot.dynamic_heaps().iter())
            .find(|heap| heap.id() == id)
    }

    /// Close and submit the active slot, returns the fence value it signals
    pub fn submit(&mut self) -> Result<u64> {
        let slot = &mut self.slots[self.active];
        if slot.status() != FrameSlotStatus::Recording {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(format!(
                "submit on slot {} which is not recording ({:?})",
                slot.index(),
                slot.status()
            ))));
        }

        let (command_list, _, _) = slot.parts_mut();
        command_list.end()?;

        let value = self.last_signaled + 1;
        self.device.submit_frame(&[slot.command_list()], self.fence.as_ref(), value)?;
        self.last_signaled = value;
        slot.set_fence_value(value);
        slot.set_status(FrameSlotStatus::Submitted);

        engine_trace!(SOURCE, "Slot {} submitted, signals {}", self.active, value);
        Ok(value)
    }

    /// Finish the frame and advance to the next slot
    pub fn present(&mut self) -> Result<()> {
        let status = self.slots[self.active].status();
        if !self.frame_open || status == FrameSlotStatus::Recording {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(format!(
                "present on slot {} without a submitted frame ({:?})",
                self.active, status
            ))));
        }
        self.frame_open = false;
        self.active = (self.active + 1) % self.slots.len();
        self.frame_number += 1;
        Ok(())
    }

    /// Block until the last submission of slot `index` has completed
    pub fn wait_for_slot(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.fence.wait(self.slots[index].fence_value())?;
        let open = self.frame_open && index == self.active;
        let slot = &mut self.slots[index];
        if slot.status() == FrameSlotStatus::Submitted && !open {
            slot.set_status(FrameSlotStatus::Idle);
        }
        Ok(())
    }

    /// Block until every submitted frame has completed
    pub fn wait_idle(&mut self) -> Result<()> {
        for index in 0..self.slots.len() {
            self.wait_for_slot(index)?;
        }
        Ok(())
    }

    // ===== IMMEDIATE CONTEXT =====

    /// Open the immediate command list
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` while a frame is open (between `begin_frame` and
    /// `present`) or if an immediate operation is already outstanding
    pub fn begin_immediate(&mut self) -> Result<&mut dyn CommandList> {
        if self.frame_open {
            return Err(engine_raise!(SOURCE, Error::ProtocolViolation(format!(
                "immediate operation inside frame {} (slot {})",
                self.frame_number, self.active
            ))));
        }
        self.immediate.begin()
    }

    /// Command list of the outstanding immediate operation
    pub fn immediate_command_list(&mut self) -> Result<&mut dyn CommandList> {
        self.immediate.command_list_mut()
    }

    /// Submit the immediate operation and wait for it
    pub fn finish_immediate(&mut self) -> Result<u64> {
        self.immediate.finish(self.device.as_ref())
    }

    /// Drop the outstanding immediate operation
    pub fn abandon_immediate(&mut self) -> Result<()> {
        self.immediate.abandon()
    }

    pub fn immediate(&self) -> &ImmediateContext {
        &self.immediate
    }
}

#[cfg(test)]
#[path = "frame_pipeline_tests.rs"]
mod tests;
