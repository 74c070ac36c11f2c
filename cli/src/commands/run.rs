// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Start the coordination node and run until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hivemind_core::infrastructure::PlatformConfig;

use crate::platform::HivePlatform;

pub async fn execute(config_dir: &Path, host: &str, port: u16) -> Result<()> {
    let config = PlatformConfig::discover(config_dir)
        .with_context(|| format!("failed to load configuration from {}", config_dir.display()))?;

    let platform = HivePlatform::bootstrap(&config)
        .await
        .context("failed to bootstrap platform")?;

    let token = CancellationToken::new();
    let handles = platform.start(&token);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind API to {host}:{port}"))?;
    info!(host, port, workers = platform.worker_count(), "node started");
    println!(
        "{} listening on {}",
        "HiveMind node".green().bold(),
        format!("http://{host}:{port}").cyan()
    );

    let api_token = token.clone();
    let server = axum::serve(listener, platform.api_router())
        .with_graceful_shutdown(async move { api_token.cancelled().await });

    tokio::select! {
        result = server => result.context("API server failed")?,
        _ = shutdown_signal() => {
            println!("{}", "shutting down...".yellow());
        }
    }

    token.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    info!("node stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
