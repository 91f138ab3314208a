/// Subresource ranges (array slices x mip levels)

use std::ops::Range;

/// Selection along one axis of a resource (array slices or mip levels)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubresourceAxis {
    /// Every index of the axis
    All,
    /// One index
    Single(u32),
    /// `count` indices starting at `first`
    Span { first: u32, count: u32 },
}

impl SubresourceAxis {
    /// Concrete index range for an axis of length `extent`
    ///
    /// Returns `None` when the selection is empty or leaves the axis.
    pub fn resolve(self, extent: u32) -> Option<Range<u32>> {
        let (first, count) = match self {
            SubresourceAxis::All => (0, extent),
            SubresourceAxis::Single(index) => (index, 1),
            SubresourceAxis::Span { first, count } => (first, count),
        };
        let end = first.checked_add(count)?;
        if count == 0 || end > extent {
            return None;
        }
        Some(first..end)
    }
}

/// Rectangle of subresources inside a resource's state table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceRange {
    pub slices: SubresourceAxis,
    pub mips: SubresourceAxis,
}

impl SubresourceRange {
    /// Whole resource
    pub const ALL: SubresourceRange = SubresourceRange {
        slices: SubresourceAxis::All,
        mips: SubresourceAxis::All,
    };

    /// Exactly one (slice, mip) cell
    pub fn single(slice: u32, mip: u32) -> Self {
        Self {
            slices: SubresourceAxis::Single(slice),
            mips: SubresourceAxis::Single(mip),
        }
    }

    /// One mip level across every slice
    pub fn mip(mip: u32) -> Self {
        Self {
            slices: SubresourceAxis::All,
            mips: SubresourceAxis::Single(mip),
        }
    }

    /// Every mip level of one slice
    pub fn slice(slice: u32) -> Self {
        Self {
            slices: SubresourceAxis::Single(slice),
            mips: SubresourceAxis::All,
        }
    }
}

impl Default for SubresourceRange {
    fn default() -> Self {
        Self::ALL
    }
}
