/// Descriptor module - heap kinds, handles, heaps and their manager

pub mod heap_kind;
pub mod handle;
pub mod heap;
pub mod heap_manager;
pub mod capacity;

pub use heap_kind::*;
pub use handle::*;
pub use heap::*;
pub use heap_manager::*;
pub use capacity::*;
