// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::Path;

use hivemind_core::infrastructure::PlatformConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Validate the configuration files
    Validate,
}

pub fn execute(command: ConfigCommand, config_dir: &Path) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = PlatformConfig::discover(config_dir)?;
            println!("{}", "agents:".bold());
            for agent in &config.agents.agents {
                println!(
                    "  {} ({}) x{} - {}",
                    agent.id.cyan(),
                    agent.agent_type,
                    agent.replicas,
                    agent.role
                );
            }
            println!("{}", "settings:".bold());
            println!("{}", serde_yaml::to_string(&config.settings)?);
            Ok(())
        }
        ConfigCommand::Validate => match PlatformConfig::discover(config_dir) {
            Ok(config) => {
                println!(
                    "{} {} agents, {} seed tasks",
                    "valid:".green().bold(),
                    config.agents.agents.len(),
                    config.tasks.tasks.len()
                );
                Ok(())
            }
            Err(e) => {
                eprintln!("{} {}", "invalid:".red().bold(), e);
                Err(e.into())
            }
        },
    }
}
