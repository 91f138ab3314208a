/// State module - per-subresource access state tracking

pub mod access_state;
pub mod subresource;
pub mod state_table;
pub mod tracked_resource;
pub mod resolve;

pub use access_state::*;
pub use subresource::*;
pub use state_table::*;
pub use tracked_resource::*;
pub use resolve::resolve;
