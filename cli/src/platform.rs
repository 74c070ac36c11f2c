// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Embedded platform runtime
//!
//! Wires the broker, memory tiers, task manager, decomposer, worker fleet,
//! telemetry and the submission API into one cancellable unit. Cancelling
//! the root token stops every loop promptly.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hivemind_core::application::{
    Decomposer, EventEmitter, ResultCollector, SimulatedProcessor, StaticBreakdown, TaskManager,
    Worker, WorkerConfig,
};
use hivemind_core::domain::agent::CognitiveAgent;
use hivemind_core::infrastructure::{
    AgentConfig, ChannelClient, CommunicationClient, EventObserver, InMemoryBroker,
    InMemoryEventSink, MessageHub, ObserverConfig, PlatformConfig,
};
use hivemind_memory::application::{MemoryManager, MemoryPruner, MemoryPrunerConfig};
use hivemind_memory::domain::MemoryConfig;
use hivemind_pool::application::{
    CollectorConfig, MetricsCollector, PoolOrchestrator, StubSampler,
};
use hivemind_pool::domain::ScalingConfig;

/// Fleet started when `agents.yaml` is absent: two instances per pipeline
/// stage.
const DEFAULT_FLEET: [(&str, &str); 5] = [
    ("analysis", "Requirements analysis and context"),
    ("research", "Research and information gathering"),
    ("development", "Solution development"),
    ("validation", "Validation and testing"),
    ("documentation", "Documentation and reports"),
];

pub struct HivePlatform {
    broker: Arc<InMemoryBroker>,
    task_manager: Arc<TaskManager>,
    orchestrator: Arc<PoolOrchestrator>,
    collector: Arc<ResultCollector>,
    decomposer: Arc<Decomposer>,
    workers: Vec<Arc<Worker>>,
    metrics_collector: Arc<MetricsCollector>,
    observer: Arc<EventObserver>,
    pruner: Arc<MemoryPruner>,
}

impl HivePlatform {
    /// Build every service from the discovered configuration.
    pub async fn bootstrap(config: &PlatformConfig) -> Result<Self> {
        let broker = InMemoryBroker::new();
        let task_manager = TaskManager::new();
        let memory: Arc<dyn MemoryManager> =
            Arc::new(hivemind_memory::default_manager(MemoryConfig::default()));
        let orchestrator = PoolOrchestrator::new(ScalingConfig::default());

        let decomposer = Arc::new(Decomposer::new(broker.clone(), Arc::new(StaticBreakdown)));
        decomposer
            .declare_topology()
            .await
            .context("failed to declare broker topology")?;

        let emitter = Arc::new(EventEmitter::new());
        emitter.on_any(Arc::new(|event| {
            tracing::debug!(event_type = ?event.event_type, source = %event.source, "event");
        }));

        let agent_configs = fleet_from(config);
        let mut workers = Vec::new();
        for agent_config in &agent_configs {
            for replica in 0..agent_config.replicas.max(1) {
                let agent = CognitiveAgent::new(
                    format!("{}-{}", agent_config.id, replica + 1),
                    &agent_config.agent_type,
                    &agent_config.name,
                    &agent_config.role,
                    &agent_config.goal,
                    &agent_config.model,
                )
                .with_backstory(&agent_config.backstory);

                task_manager.register_agent(agent.clone()).await;
                orchestrator.register(agent.clone()).await;

                workers.push(Arc::new(
                    Worker::new(
                        agent,
                        broker.clone(),
                        Arc::new(SimulatedProcessor),
                        WorkerConfig::default(),
                    )
                    .with_task_manager(task_manager.clone())
                    .with_memory(memory.clone())
                    .with_emitter(emitter.clone()),
                ));
            }
        }

        let collector = Arc::new(ResultCollector::new(broker.clone()));
        let metrics_collector = Arc::new(MetricsCollector::new(
            broker.clone(),
            task_manager.clone(),
            orchestrator.clone(),
            Arc::new(StubSampler),
            CollectorConfig::default(),
        ));

        let hub = MessageHub::new();
        let observer_client = Arc::new(ChannelClient::new(hub, "in-process"));
        observer_client
            .connect()
            .await
            .context("failed to connect observer client")?;
        let mut observer = EventObserver::new(InMemoryEventSink::new(), ObserverConfig::default());
        observer.add_client(observer_client);
        let observer = Arc::new(observer);

        let pruner = Arc::new(MemoryPruner::new(memory, MemoryPrunerConfig::default()));

        info!(
            workers = workers.len(),
            types = agent_configs.len(),
            "platform bootstrapped"
        );

        Ok(Self {
            broker,
            task_manager,
            orchestrator,
            collector,
            decomposer,
            workers,
            metrics_collector,
            observer,
            pruner,
        })
    }

    pub fn broker(&self) -> Arc<InMemoryBroker> {
        self.broker.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Spawn every service loop under the given root token.
    pub fn start(&self, token: &CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        {
            let decomposer = self.decomposer.clone();
            let t = token.clone();
            handles.push(tokio::spawn(async move { decomposer.run(t).await }));
        }

        for worker in &self.workers {
            let worker = worker.clone();
            let t = token.clone();
            handles.push(tokio::spawn(async move { worker.run(t).await }));
        }

        {
            let collector = self.collector.clone();
            let t = token.clone();
            handles.push(tokio::spawn(async move { collector.run(t).await }));
        }

        {
            let metrics = self.metrics_collector.clone();
            let t = token.clone();
            handles.push(tokio::spawn(async move { metrics.run(t).await }));
        }

        {
            let observer = self.observer.clone();
            let t = token.clone();
            handles.push(tokio::spawn(async move { observer.run(t).await }));
        }

        {
            let pruner = self.pruner.clone();
            let pruner_token = self.pruner.shutdown_token();
            let t = token.clone();
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = pruner.clone().start() => {}
                    _ = t.cancelled() => pruner_token.cancel(),
                }
            }));
        }

        // The scaling supervisor: re-evaluate the fleet on a fixed tick.
        {
            let orchestrator = self.orchestrator.clone();
            let t = token.clone();
            handles.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(std::time::Duration::from_secs(30));
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            let spawned = orchestrator.scale_system().await;
                            if !spawned.is_empty() {
                                info!(count = spawned.len(), "scaled out instances");
                            }
                        }
                        _ = t.cancelled() => break,
                    }
                }
            }));
        }

        handles
    }

    /// The axum router serving the submission API.
    pub fn api_router(&self) -> axum::Router {
        hivemind_core::presentation::api::app(
            self.broker.clone(),
            self.collector.clone(),
            self.task_manager.clone(),
            self.orchestrator.clone(),
        )
    }
}

fn fleet_from(config: &PlatformConfig) -> Vec<AgentConfig> {
    if !config.agents.agents.is_empty() {
        return config.agents.agents.clone();
    }

    DEFAULT_FLEET
        .iter()
        .map(|(agent_type, description)| AgentConfig {
            id: format!("llm-agent-{agent_type}"),
            name: format!("{agent_type} agent"),
            description: (*description).to_string(),
            agent_type: (*agent_type).to_string(),
            role: format!("{agent_type} specialist"),
            goal: (*description).to_string(),
            model: "gpt-4o-mini".to_string(),
            max_rounds: 10,
            backstory: String::new(),
            replicas: 2,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivemind_core::domain::task::TaskRequest;
    use hivemind_core::infrastructure::{MessageBroker, PublishOptions, INPUT_QUEUE, RESULT_QUEUE};
    use std::collections::HashMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bootstrap_default_fleet() {
        let platform = HivePlatform::bootstrap(&PlatformConfig::default()).await.unwrap();
        assert_eq!(platform.worker_count(), 10);
    }

    #[tokio::test]
    async fn test_platform_processes_a_request_end_to_end() {
        let platform = HivePlatform::bootstrap(&PlatformConfig::default()).await.unwrap();
        let token = CancellationToken::new();
        let handles = platform.start(&token);

        let request = TaskRequest {
            id: "boot-1".to_string(),
            description: "smoke request".to_string(),
            parameters: HashMap::new(),
        };
        platform
            .broker()
            .publish(
                INPUT_QUEUE,
                &serde_json::to_vec(&request).unwrap(),
                PublishOptions::persistent(),
            )
            .await
            .unwrap();

        let broker = platform.broker();
        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.stats(RESULT_QUEUE).published < 5 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("all five subtasks should complete");

        token.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("service should stop on cancellation")
                .unwrap();
        }
    }
}
