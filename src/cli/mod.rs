//! Command-line interface.

mod args;
mod host;
pub mod watch;

pub use args::{Cli, Commands};
pub use host::CommandInfraHost;
