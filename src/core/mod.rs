//! Core types - pure abstractions shared across the codebase.

mod priority;
mod runtime;
mod state;

pub use priority::RebuildPriority;
pub use runtime::RuntimeKind;
pub use state::{is_shutdown, register_shutdown_channel, setup_shutdown_handler};
