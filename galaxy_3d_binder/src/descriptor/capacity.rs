/// Static heap capacity planning

use crate::descriptor::{DescriptorHeapKind, HeapBudget, PerKind};
use crate::pass::PassLayout;

/// Sum of the largest size of every table that lives in the static heaps
///
/// Tables are kept once per frame slot, so the final budget multiplies the
/// sum by the number of frames in flight.
#[derive(Debug, Clone, Default)]
pub struct StaticHeapEstimate {
    per_frame: PerKind<u32>,
    tables: u32,
}

impl StaticHeapEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one table of at most `max_size` slots
    pub fn add_table(&mut self, kind: DescriptorHeapKind, max_size: u32) -> &mut Self {
        self.per_frame[kind] += max_size;
        self.tables += 1;
        self
    }

    /// Account for every static table of a pass
    pub fn add_layout(&mut self, layout: &PassLayout) -> &mut Self {
        for (kind, size) in layout.tables() {
            self.add_table(kind, size);
        }
        self
    }

    /// Slots of `kind` needed by one frame slot
    pub fn per_frame(&self, kind: DescriptorHeapKind) -> u32 {
        self.per_frame.get(kind)
    }

    /// Number of tables accounted for
    pub fn table_count(&self) -> u32 {
        self.tables
    }

    /// Static heap sizes for `frames_in_flight` slots
    pub fn to_budget(&self, frames_in_flight: usize) -> HeapBudget {
        let mut budget = HeapBudget::splat(0);
        for (kind, per_frame) in self.per_frame.iter() {
            budget.set(kind, per_frame.saturating_mul(frames_in_flight as u32));
        }
        budget
    }
}
