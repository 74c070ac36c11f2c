// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Pool orchestrator
//!
//! Owns the per-type instance registry and the scale-out decision. One
//! cooldown guards the whole fleet; within a pass each type is re-checked
//! against its own averaged metrics so only hot types grow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use hivemind_core::domain::agent::CognitiveAgent;
use hivemind_core::domain::metrics::{AgentMetrics, SystemMetrics};
use hivemind_core::presentation::api::MetricsSource;

use crate::domain::{PoolInstance, ScalingConfig};

pub struct PoolOrchestrator {
    instances: RwLock<HashMap<String, Vec<PoolInstance>>>,
    last_scale_at: Mutex<Option<Instant>>,
    metrics: RwLock<SystemMetrics>,
    config: ScalingConfig,
}

impl PoolOrchestrator {
    pub fn new(config: ScalingConfig) -> Arc<Self> {
        Arc::new(Self {
            instances: RwLock::new(HashMap::new()),
            last_scale_at: Mutex::new(None),
            metrics: RwLock::new(SystemMetrics::default()),
            config,
        })
    }

    pub fn config(&self) -> &ScalingConfig {
        &self.config
    }

    pub async fn register(&self, agent: CognitiveAgent) {
        let mut instances = self.instances.write().await;
        let bucket = instances.entry(agent.agent_type.clone()).or_default();
        info!(agent_id = %agent.id, agent_type = %agent.agent_type, "instance registered");
        bucket.push(PoolInstance::new(agent));
    }

    pub async fn instance_count(&self, agent_type: &str) -> usize {
        self.instances
            .read()
            .await
            .get(agent_type)
            .map_or(0, Vec::len)
    }

    pub async fn total_instances(&self) -> usize {
        self.instances.read().await.values().map(Vec::len).sum()
    }

    pub async fn instances_snapshot(&self) -> Vec<PoolInstance> {
        self.instances
            .read()
            .await
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    /// Replace the fleet-wide metrics (pushed by the collector).
    pub async fn update_metrics(&self, metrics: SystemMetrics) {
        *self.metrics.write().await = metrics;
    }

    /// Update one instance's metric sample.
    pub async fn update_instance_metrics(&self, agent_id: &str, metrics: AgentMetrics) {
        let mut instances = self.instances.write().await;
        for bucket in instances.values_mut() {
            if let Some(instance) = bucket.iter_mut().find(|i| i.agent.id == agent_id) {
                instance.metrics = metrics;
                return;
            }
        }
    }

    fn crosses_thresholds(&self, cpu: f64, memory: f64, tasks: u64, error_rate: f64) -> bool {
        cpu >= self.config.cpu_threshold
            || memory >= self.config.memory_threshold
            || tasks >= self.config.tasks_threshold
            || error_rate >= self.config.error_threshold
    }

    /// Whether a scale-out pass may fire now: cooldown elapsed and the
    /// fleet metrics cross at least one threshold. Read-only; the
    /// timestamp is stamped by [`scale_system`](Self::scale_system).
    pub async fn check_scaling(&self) -> bool {
        let last = *self.last_scale_at.lock().await;
        if let Some(last) = last {
            if last.elapsed() < self.config.cooldown {
                return false;
            }
        }

        let m = *self.metrics.read().await;
        self.crosses_thresholds(m.cpu_usage, m.memory_usage, m.task_count, m.error_rate)
    }

    /// Run one scale-out pass. For each type whose averaged metrics cross
    /// the thresholds, clone one representative under a fresh identity and
    /// register the clone. Returns the new instance ids.
    pub async fn scale_system(&self) -> Vec<String> {
        if !self.check_scaling().await {
            return Vec::new();
        }
        *self.last_scale_at.lock().await = Some(Instant::now());

        let mut spawned = Vec::new();
        let mut instances = self.instances.write().await;
        for (agent_type, bucket) in instances.iter_mut() {
            if bucket.is_empty() {
                continue;
            }

            let n = bucket.len() as f64;
            let avg_cpu = bucket.iter().map(|i| i.metrics.cpu_usage).sum::<f64>() / n;
            let avg_memory = bucket.iter().map(|i| i.metrics.memory_percent).sum::<f64>() / n;
            let avg_tasks =
                (bucket.iter().map(|i| i.metrics.tasks_in_queue).sum::<u64>() as f64 / n) as u64;
            let avg_errors = bucket.iter().map(|i| i.metrics.error_rate).sum::<f64>() / n;

            if !self.crosses_thresholds(avg_cpu, avg_memory, avg_tasks, avg_errors) {
                debug!(agent_type = %agent_type, "type within thresholds, not scaled");
                continue;
            }

            let clone = bucket[0].agent.clone_instance();
            info!(agent_type = %agent_type, clone_id = %clone.id, "scaling out: clone registered");
            spawned.push(clone.id.clone());
            bucket.push(PoolInstance::new(clone));
        }

        spawned
    }
}

#[async_trait::async_trait]
impl MetricsSource for PoolOrchestrator {
    async fn system_metrics(&self) -> SystemMetrics {
        *self.metrics.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn agent(id: &str, agent_type: &str) -> CognitiveAgent {
        CognitiveAgent::new(id, agent_type, "Worker", "role", "goal", "model")
    }

    fn hot_metrics() -> SystemMetrics {
        SystemMetrics {
            cpu_usage: 90.0,
            memory_usage: 90.0,
            task_count: 200,
            error_rate: 0.1,
        }
    }

    fn hot_instance_metrics(agent_id: &str) -> AgentMetrics {
        AgentMetrics {
            agent_id: agent_id.to_string(),
            cpu_usage: 95.0,
            memory_usage: 0,
            memory_percent: 0.0,
            tasks_in_queue: 150,
            response_time: 1.0,
            error_rate: 0.2,
            last_updated: chrono::Utc::now().timestamp(),
        }
    }

    async fn hot_orchestrator() -> Arc<PoolOrchestrator> {
        let orchestrator = PoolOrchestrator::new(ScalingConfig::default());
        orchestrator.register(agent("a1", "analysis")).await;
        orchestrator.register(agent("r1", "research")).await;
        orchestrator.update_metrics(hot_metrics()).await;
        orchestrator
            .update_instance_metrics("a1", hot_instance_metrics("a1"))
            .await;
        orchestrator
    }

    #[tokio::test]
    async fn test_check_scaling_requires_hot_metrics() {
        let orchestrator = PoolOrchestrator::new(ScalingConfig::default());
        orchestrator.register(agent("a1", "analysis")).await;

        assert!(!orchestrator.check_scaling().await);
        orchestrator.update_metrics(hot_metrics()).await;
        assert!(orchestrator.check_scaling().await);
    }

    #[tokio::test]
    async fn test_scale_clones_only_hot_types() {
        let orchestrator = hot_orchestrator().await;

        let spawned = orchestrator.scale_system().await;
        assert_eq!(spawned.len(), 1);
        assert_eq!(orchestrator.instance_count("analysis").await, 2);
        // The research bucket had default (cold) metrics and stays put.
        assert_eq!(orchestrator.instance_count("research").await, 1);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_back_to_back_scaling() {
        let orchestrator = hot_orchestrator().await;

        let first = orchestrator.scale_system().await;
        assert_eq!(first.len(), 1);

        // Still hot, but inside the cooldown: exactly one clone per hot type.
        let second = orchestrator.scale_system().await;
        assert!(second.is_empty());
        assert_eq!(orchestrator.instance_count("analysis").await, 2);
    }

    #[tokio::test]
    async fn test_cooldown_elapses() {
        let config = ScalingConfig {
            cooldown: Duration::from_millis(30),
            ..ScalingConfig::default()
        };
        let orchestrator = PoolOrchestrator::new(config);
        orchestrator.register(agent("a1", "analysis")).await;
        orchestrator.update_metrics(hot_metrics()).await;
        orchestrator
            .update_instance_metrics("a1", hot_instance_metrics("a1"))
            .await;

        assert_eq!(orchestrator.scale_system().await.len(), 1);
        assert!(orchestrator.scale_system().await.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        // The clone starts with cold metrics, halving the averages; the
        // bucket stays over the error-rate threshold.
        let spawned = orchestrator.scale_system().await;
        assert!(!spawned.is_empty());
    }

    #[tokio::test]
    async fn test_clone_is_structurally_equal_with_fresh_id() {
        let orchestrator = hot_orchestrator().await;
        let spawned = orchestrator.scale_system().await;
        let clone_id = &spawned[0];

        let instances = orchestrator.instances_snapshot().await;
        let original = instances.iter().find(|i| i.agent.id == "a1").unwrap();
        let clone = instances.iter().find(|i| &i.agent.id == clone_id).unwrap();

        assert_ne!(clone.agent.id, original.agent.id);
        assert_eq!(clone.agent.agent_type, original.agent.agent_type);
        assert_eq!(clone.agent.role, original.agent.role);
        assert_eq!(clone.agent.temperature, original.agent.temperature);
    }

    #[tokio::test]
    async fn test_metrics_source_exposes_fleet_view() {
        let orchestrator = hot_orchestrator().await;
        let metrics = orchestrator.system_metrics().await;
        assert_eq!(metrics.cpu_usage, 90.0);
        assert_eq!(metrics.task_count, 200);
    }
}
