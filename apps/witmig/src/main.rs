//! # witmig - Work Item Migration Tool
//!
//! The main binary for the work item migration engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  apps/witmig (THE BINARY)                 │
//! │                                                           │
//! │  ┌────────────┐   ┌─────────────┐   ┌─────────────────┐  │
//! │  │    CLI     │   │ TOML config │   │ JSON file store │  │
//! │  │   (clap)   │   │   (serde)   │   │  (serde_json)   │  │
//! │  └─────┬──────┘   └──────┬──────┘   └────────┬────────┘  │
//! │        └─────────────────┼───────────────────┘           │
//! │                          ▼                               │
//! │                  ┌───────────────┐                       │
//! │                  │  witmig-core  │                       │
//! │                  │  (THE LOGIC)  │                       │
//! │                  └───────────────┘                       │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! witmig validate -c migration.toml
//! witmig run -c migration.toml --user alice
//! witmig stages
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use witmig_core::RunResult;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // WITMIG_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("WITMIG_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "witmig=info,witmig_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    match cli::execute(cli) {
        Ok(RunResult::Complete) => {}
        Ok(RunResult::Failed) => {
            tracing::error!("Migration finished in the failed state");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the startup banner.
fn print_banner() {
    println!("witmig v{} - work item migration", env!("CARGO_PKG_VERSION"));
    println!();
}
