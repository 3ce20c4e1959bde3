//! # witmig CLI Module
//!
//! ## Available Commands
//!
//! - `run` - Run the migration described by a configuration file
//! - `validate` - Load a configuration and assemble the engine without running it
//! - `stages` - List the built-in stage names

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use witmig_core::{MigrationError, RunResult};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// witmig - Work Item Migration Tool
///
/// Moves work items between stores through an ordered pipeline of stages.
#[derive(Parser, Debug)]
#[command(name = "witmig")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a migration
    Run {
        /// Path to the migration configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Principal recorded in run telemetry
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Validate a migration configuration
    Validate {
        /// Path to the migration configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List built-in stages
    Stages,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
///
/// Commands other than `run` report `RunResult::Complete` on success.
pub fn execute(cli: Cli) -> Result<RunResult, MigrationError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Run { config, user } => cmd_run(&config, user, json_mode),
        Commands::Validate { config } => cmd_validate(&config, json_mode, cli.verbose),
        Commands::Stages => cmd_stages(json_mode),
    }
}
