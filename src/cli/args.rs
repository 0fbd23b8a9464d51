//! CLI argument definitions using clap
//!
//! Commands:
//! - promoter serve --config <path>
//! - promoter check-config --config <path>
//! - promoter resolve --config <path> <branch>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// promoter - gate-driven release promotion controller
#[derive(Parser, Debug)]
#[command(name = "promoter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server and the timeout sweeper
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./promoter.json")]
        config: PathBuf,
    },

    /// Validate configuration and print the resolved routing
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./promoter.json")]
        config: PathBuf,
    },

    /// Print the environment and required gates for a branch
    Resolve {
        /// Path to configuration file
        #[arg(long, default_value = "./promoter.json")]
        config: PathBuf,

        /// Branch name or full ref (refs/heads/...)
        branch: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
