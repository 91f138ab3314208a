/// Uniform module - dynamic and static uniform regions

pub mod uniform_allocator;

pub use uniform_allocator::*;
