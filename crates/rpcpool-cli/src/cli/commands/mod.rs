//! CLI command handlers, one file per command.

mod call;
mod config;
mod endpoints;

pub use call::{run_call, CallOverrides};
pub use config::run_config;
pub use endpoints::run_endpoints;
