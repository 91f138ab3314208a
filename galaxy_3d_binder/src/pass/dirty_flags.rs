/// Dirty flags - which binding categories changed, per frame slot

use bitflags::bitflags;

bitflags! {
    /// Set of binding categories
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u8 {
        const UNIFORM = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        const OUTPUT = 1 << 3;
    }
}

/// Group of bindings that is invalidated and refreshed as a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingCategory {
    /// The uniform block
    Uniform,
    /// Read-only shader resources and samplers
    Read,
    /// Shader-writable resources
    Write,
    /// Color and depth attachments
    Output,
}

impl BindingCategory {
    pub const ALL: [BindingCategory; 4] = [
        BindingCategory::Uniform,
        BindingCategory::Read,
        BindingCategory::Write,
        BindingCategory::Output,
    ];

    pub fn flag(self) -> DirtyFlags {
        match self {
            BindingCategory::Uniform => DirtyFlags::UNIFORM,
            BindingCategory::Read => DirtyFlags::READ,
            BindingCategory::Write => DirtyFlags::WRITE,
            BindingCategory::Output => DirtyFlags::OUTPUT,
        }
    }
}

/// Dirty state of one pass for one frame slot
///
/// `frame`: the binding changed and this frame has not allocated dynamic
/// storage for it yet. `persistent`: the static tier of the slot is stale
/// until the next `begin_frame` of the slot rewrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotDirtyState {
    pub frame: DirtyFlags,
    pub persistent: DirtyFlags,
}

impl SlotDirtyState {
    pub const CLEAN: SlotDirtyState = SlotDirtyState {
        frame: DirtyFlags::empty(),
        persistent: DirtyFlags::empty(),
    };

    /// Mark `category` dirty in both sets
    pub fn set(&mut self, category: BindingCategory) {
        self.frame |= category.flag();
        self.persistent |= category.flag();
    }

    /// Clear the frame bit of `category` once dynamic storage was allocated
    pub fn clear_frame(&mut self, category: BindingCategory) {
        self.frame.remove(category.flag());
    }

    /// Clear both bits of `category` once the static tier was rewritten
    pub fn clear(&mut self, category: BindingCategory) {
        self.frame.remove(category.flag());
        self.persistent.remove(category.flag());
    }

    pub fn test_frame(&self, category: BindingCategory) -> bool {
        self.frame.contains(category.flag())
    }

    pub fn test_persistent(&self, category: BindingCategory) -> bool {
        self.persistent.contains(category.flag())
    }

    pub fn is_clean(&self) -> bool {
        self.frame.is_empty() && self.persistent.is_empty()
    }
}

impl Default for SlotDirtyState {
    fn default() -> Self {
        Self::CLEAN
    }
}
