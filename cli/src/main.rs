// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! # HiveMind Launcher
//!
//! The `hivemind` binary boots a full coordination node: in-memory broker,
//! decomposer, typed worker fleet, memory tiers, metrics collection,
//! event observation and the HTTP submission API.
//!
//! ## Commands
//!
//! - `hivemind` / `hivemind run` - start the node (default)
//! - `hivemind config show|validate` - configuration management
//! - `hivemind submit <description>` - submit a task to a running node

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod platform;

use commands::{ConfigCommand, SubmitArgs};

/// HiveMind - distributed agent coordination node
#[derive(Parser)]
#[command(name = "hivemind")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding agents.yaml, tasks.yaml and tools.yaml
    #[arg(
        short,
        long,
        global = true,
        env = "CONFIG_DIR",
        value_name = "DIR",
        default_value = "config"
    )]
    config_dir: PathBuf,

    /// HTTP API port
    #[arg(long, global = true, env = "HIVEMIND_PORT", default_value = "8000")]
    port: u16,

    /// HTTP API host
    #[arg(long, global = true, env = "HIVEMIND_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "HIVEMIND_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordination node
    Run,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Submit a task to a running node
    Submit(SubmitArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        None | Some(Commands::Run) => {
            commands::run::execute(&cli.config_dir, &cli.host, cli.port).await
        }
        Some(Commands::Config { command }) => commands::config::execute(command, &cli.config_dir),
        Some(Commands::Submit(args)) => {
            commands::submit::execute(args, &cli.host, cli.port).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
