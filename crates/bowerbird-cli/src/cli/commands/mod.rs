//! CLI command handlers. Each command is in its own file.

mod config;
mod get;

pub use config::run_config;
pub use get::{run_get, GetArgs};
