pub mod commands;
pub mod config;

pub use commands::{run_command, CliCommand};
pub use config::CliConfig;
