/// Per-subresource state table

use std::ops::Range;
use crate::state::ResourceAccessState;

/// 2-D table of access states, one cell per (array slice, mip level)
///
/// Buffers use a 1x1 table.
#[derive(Debug, Clone)]
pub struct StateTable {
    slices: u32,
    mips: u32,
    cells: Vec<ResourceAccessState>,
}

impl StateTable {
    pub fn new(slices: u32, mips: u32, initial: ResourceAccessState) -> Self {
        let slices = slices.max(1);
        let mips = mips.max(1);
        Self {
            slices,
            mips,
            cells: vec![initial; (slices * mips) as usize],
        }
    }

    pub fn slices(&self) -> u32 {
        self.slices
    }

    pub fn mips(&self) -> u32 {
        self.mips
    }

    fn cell_index(&self, slice: u32, mip: u32) -> Option<usize> {
        if slice < self.slices && mip < self.mips {
            Some((slice * self.mips + mip) as usize)
        } else {
            None
        }
    }

    pub fn get(&self, slice: u32, mip: u32) -> Option<ResourceAccessState> {
        self.cell_index(slice, mip).map(|i| self.cells[i])
    }

    /// Set one cell, returns the previous state
    pub fn set(&mut self, slice: u32, mip: u32, state: ResourceAccessState) -> Option<ResourceAccessState> {
        let index = self.cell_index(slice, mip)?;
        Some(std::mem::replace(&mut self.cells[index], state))
    }

    /// Cells of a rectangle, slice-major
    pub fn cells_in(
        &self,
        slices: Range<u32>,
        mips: Range<u32>,
    ) -> impl Iterator<Item = (u32, u32, ResourceAccessState)> + '_ {
        slices.flat_map(move |slice| {
            mips.clone().filter_map(move |mip| self.get(slice, mip).map(|state| (slice, mip, state)))
        })
    }

    /// Common state of every cell, if they all agree
    pub fn uniform_state(&self) -> Option<ResourceAccessState> {
        let first = *self.cells.first()?;
        self.cells.iter().all(|&s| s == first).then_some(first)
    }
}
