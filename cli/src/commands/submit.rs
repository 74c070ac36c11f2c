// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::collections::HashMap;
use std::time::Duration;

use hivemind_sdk::{HiveMindClient, SubmitTask};

#[derive(Args)]
pub struct SubmitArgs {
    /// Task description handed to the decomposer
    pub description: String,

    /// Task id (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,

    /// Additional parameters as key=value pairs
    #[arg(short, long, value_name = "KEY=VALUE")]
    pub param: Vec<String>,

    /// Poll until all results for the task have arrived
    #[arg(long)]
    pub wait: bool,

    /// How many results to wait for with --wait
    #[arg(long, default_value = "5")]
    pub expect: usize,
}

pub async fn execute(args: SubmitArgs, host: &str, port: u16) -> Result<()> {
    let mut parameters = HashMap::new();
    for pair in &args.param {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid parameter '{pair}', expected KEY=VALUE");
        };
        parameters.insert(key.to_string(), serde_json::json!(value));
    }

    let client = HiveMindClient::new(format!("http://{host}:{port}"));
    let response = client
        .submit_task(&SubmitTask {
            id: args.id,
            description: args.description,
            parameters,
        })
        .await
        .context("failed to submit task (is the node running?)")?;

    println!("{} {}", "submitted:".green().bold(), response.task_id.cyan());

    if !args.wait {
        return Ok(());
    }

    loop {
        let results = client.results(&response.task_id).await?;
        if results.results.len() >= args.expect {
            for result in &results.results {
                println!(
                    "  {} [{}] by {}",
                    result.task_id.cyan(),
                    result.status,
                    result.agent_id
                );
            }
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
