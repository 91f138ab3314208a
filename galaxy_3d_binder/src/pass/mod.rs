/// Pass module - per-pass bindings and the dirty-flag refresh protocol

pub mod dirty_flags;
pub mod uniform_layout;
pub mod pass_layout;
pub mod pass_bindings;

pub use dirty_flags::*;
pub use uniform_layout::*;
pub use pass_layout::*;
pub use pass_bindings::*;
