// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Metrics collector
//!
//! Samples every registered instance on a fixed tick, publishes each
//! metric on its own queue and pushes the aggregated fleet view into the
//! orchestrator. The map lock is held only while sampling and mutating,
//! never across broker I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hivemind_core::application::TaskManager;
use hivemind_core::domain::metrics::{AgentMetrics, MetricSample, SystemMetrics};
use hivemind_core::infrastructure::broker::{
    metric_queue, MessageBroker, PublishOptions, QueueOptions,
};

use crate::application::orchestrator::PoolOrchestrator;

/// OS-level resource readings. The stub sampler stands in for platform
/// probes, mirroring the simulated readings of the original collector.
pub trait ResourceSampler: Send + Sync {
    fn cpu_percent(&self) -> f64;
    fn memory_bytes(&self) -> u64;
    fn memory_percent(&self) -> f64;
}

pub struct StubSampler;

impl ResourceSampler for StubSampler {
    fn cpu_percent(&self) -> f64 {
        50.0
    }

    fn memory_bytes(&self) -> u64 {
        64 * 1024 * 1024
    }

    fn memory_percent(&self) -> f64 {
        40.0
    }
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub sample_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(5),
        }
    }
}

pub struct MetricsCollector {
    broker: Arc<dyn MessageBroker>,
    task_manager: Arc<TaskManager>,
    orchestrator: Arc<PoolOrchestrator>,
    sampler: Arc<dyn ResourceSampler>,
    metrics_map: RwLock<HashMap<String, AgentMetrics>>,
    config: CollectorConfig,
    cycles: AtomicU64,
}

impl MetricsCollector {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        task_manager: Arc<TaskManager>,
        orchestrator: Arc<PoolOrchestrator>,
        sampler: Arc<dyn ResourceSampler>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            broker,
            task_manager,
            orchestrator,
            sampler,
            metrics_map: RwLock::new(HashMap::new()),
            config,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn metrics_for(&self, agent_id: &str) -> Option<AgentMetrics> {
        self.metrics_map
            .read()
            .expect("metrics map lock poisoned")
            .get(agent_id)
            .cloned()
    }

    /// Sample every instance and publish. Sampling mutates under the write
    /// lock; publishing happens after the lock is released.
    pub async fn collect_cycle(&self) -> SystemMetrics {
        let instances = self.orchestrator.instances_snapshot().await;
        let queued = self.task_manager.queued_count().await as u64;

        let (system, samples) = {
            let mut map = self.metrics_map.write().expect("metrics map lock poisoned");

            for instance in &instances {
                let entry = map
                    .entry(instance.agent.id.clone())
                    .or_insert_with(|| AgentMetrics::new(instance.agent.id.clone()));
                entry.cpu_usage = self.sampler.cpu_percent();
                entry.memory_usage = self.sampler.memory_bytes();
                entry.memory_percent = self.sampler.memory_percent();
                entry.tasks_in_queue = queued;
                entry.response_time = instance.agent.response_time();
                entry.error_rate = instance.metrics.error_rate;
                entry.touch();
            }

            let system = SystemMetrics::aggregate(map.values());
            let samples: Vec<AgentMetrics> = map.values().cloned().collect();
            (system, samples)
        };

        for metrics in &samples {
            self.publish_agent_metrics(metrics).await;
            self.orchestrator
                .update_instance_metrics(&metrics.agent_id, metrics.clone())
                .await;
        }
        self.orchestrator.update_metrics(system).await;

        self.cycles.fetch_add(1, Ordering::Relaxed);
        debug!(
            agents = samples.len(),
            cpu = system.cpu_usage,
            tasks = system.task_count,
            "metrics cycle completed"
        );
        system
    }

    async fn publish_agent_metrics(&self, metrics: &AgentMetrics) {
        let points = [
            ("cpu", metrics.cpu_usage),
            ("memory", metrics.memory_usage as f64),
            ("tasks_in_queue", metrics.tasks_in_queue as f64),
            ("response_time", metrics.response_time),
            ("error_rate", metrics.error_rate),
        ];

        for (name, value) in points {
            let queue = metric_queue(&metrics.agent_id, name);
            if let Err(e) = self.broker.declare_queue(&queue, QueueOptions::durable()).await {
                warn!(queue = %queue, error = %e, "failed to declare metric queue");
                continue;
            }

            let sample = MetricSample::now(value);
            let body = match serde_json::to_vec(&sample) {
                Ok(body) => body,
                Err(e) => {
                    warn!(queue = %queue, error = %e, "failed to encode metric sample");
                    continue;
                }
            };
            if let Err(e) = self
                .broker
                .publish(&queue, &body, PublishOptions::persistent())
                .await
            {
                warn!(queue = %queue, error = %e, "failed to publish metric");
            }
        }
    }

    /// Sample on a fixed tick until cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!(
            interval_secs = self.config.sample_interval.as_secs(),
            "metrics collector started"
        );
        let mut tick = tokio::time::interval(self.config.sample_interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.collect_cycle().await;
                }
                _ = token.cancelled() => break,
            }
        }

        info!("metrics collector stopped");
    }
}
