/// Frame module - N frames in flight, fences and the immediate context

pub mod frame_slot;
pub mod immediate;
pub mod frame_pipeline;

pub use frame_slot::*;
pub use immediate::*;
pub use frame_pipeline::*;
