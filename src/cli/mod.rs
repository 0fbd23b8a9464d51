//! CLI module for promoter
//!
//! Provides command-line interface for:
//! - serve: Start the HTTP server and timeout sweeper
//! - check-config: Validate configuration
//! - resolve: Show where a branch would be promoted

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{
    build_controller, check_config, check_report, resolve, resolve_report, run, run_command, serve,
};
pub use errors::{CliError, CliErrorCode, CliResult};
