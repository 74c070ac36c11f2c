// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0
//! Memory Pruner - Background task for consolidation and retention
//!
//! Periodically promotes important short-term memories to the long-term
//! tier and evicts entries the retention policies no longer keep.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::application::manager::MemoryManager;

/// Configuration for the memory pruner
#[derive(Debug, Clone)]
pub struct MemoryPrunerConfig {
    /// How often to run the pruner (in seconds)
    pub interval_seconds: u64,

    /// Whether pruning is enabled
    pub enabled: bool,
}

impl Default for MemoryPrunerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600, // Run every hour
            enabled: true,
        }
    }
}

/// Memory Pruner - Background task
pub struct MemoryPruner {
    manager: Arc<dyn MemoryManager>,
    config: MemoryPrunerConfig,
    shutdown_token: tokio_util::sync::CancellationToken,
}

impl MemoryPruner {
    pub fn new(manager: Arc<dyn MemoryManager>, config: MemoryPrunerConfig) -> Self {
        Self {
            manager,
            config,
            shutdown_token: tokio_util::sync::CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> tokio_util::sync::CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the pruner background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the pruner loop with graceful shutdown support
    async fn run(&self) {
        if !self.config.enabled {
            info!("Memory pruner is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            "Starting memory pruner background task"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running memory pruner cycle");

                    match self.prune_cycle().await {
                        Ok((promoted, pruned)) => {
                            info!(promoted, pruned, "memory pruner cycle completed");
                        }
                        Err(e) => {
                            warn!("memory pruner cycle failed: {}", e);
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping memory pruner");
                    break;
                }
            }
        }

        info!("Memory pruner background task stopped");
    }

    /// Execute a single cycle: consolidate then prune, per known agent.
    async fn prune_cycle(&self) -> anyhow::Result<(usize, usize)> {
        let mut promoted = 0;
        let mut pruned = 0;

        for agent_id in self.manager.known_agents().await {
            promoted += self.manager.consolidate(&agent_id).await?;
            pruned += self.manager.prune(&agent_id).await?;
        }

        Ok((promoted, pruned))
    }
}
