// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Worker
//!
//! Consumes the shared task queue and processes subtasks matching its own
//! type, releasing everything else back to the queue (type routing).
//! Processing is idempotent: redelivered task ids are detected through a
//! bounded cache of recently completed ids and acked without reprocessing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hivemind_memory::application::MemoryManager;
use hivemind_memory::domain::Memory;

use crate::application::event_emitter::EventEmitter;
use crate::application::task_manager::TaskManager;
use crate::domain::agent::CognitiveAgent;
use crate::domain::events::{Event, EventType};
use crate::domain::metrics::AgentHealth;
use crate::domain::task::{Subtask, TaskResult, TaskResultStatus};
use crate::infrastructure::broker::{
    Backoff, ConsumeOptions, Delivery, MessageBroker, PublishOptions, RESULT_QUEUE, TASK_QUEUE,
};

/// Business processing seam. The simulated implementation stands in for
/// the downstream skill services, which are out of scope.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(
        &self,
        agent: &CognitiveAgent,
        subtask: &Subtask,
    ) -> anyhow::Result<HashMap<String, serde_json::Value>>;
}

/// Deterministic stand-in processor.
pub struct SimulatedProcessor;

#[async_trait]
impl TaskProcessor for SimulatedProcessor {
    async fn process(
        &self,
        agent: &CognitiveAgent,
        subtask: &Subtask,
    ) -> anyhow::Result<HashMap<String, serde_json::Value>> {
        Ok(HashMap::from([
            (
                "analysis".to_string(),
                serde_json::json!(format!("task '{}' processed", subtask.name)),
            ),
            (
                "details".to_string(),
                serde_json::json!({
                    "agent_type": agent.agent_type,
                    "task_type": subtask.task_type,
                    "parameters": subtask.parameters,
                }),
            ),
        ]))
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Capacity of the recently-completed id cache.
    pub dedup_capacity: u64,
    /// Pause after releasing a mismatched delivery, giving a matching
    /// consumer a window to claim the redelivery.
    pub mismatch_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: 4096,
            mismatch_delay: Duration::from_millis(10),
        }
    }
}

pub struct Worker {
    id: String,
    agent_type: String,
    agent: RwLock<CognitiveAgent>,
    broker: Arc<dyn MessageBroker>,
    processor: Arc<dyn TaskProcessor>,
    task_manager: Option<Arc<TaskManager>>,
    memory: Option<Arc<dyn MemoryManager>>,
    emitter: Option<Arc<EventEmitter>>,
    completed: moka::sync::Cache<String, ()>,
    decode_failures: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        agent: CognitiveAgent,
        broker: Arc<dyn MessageBroker>,
        processor: Arc<dyn TaskProcessor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id: agent.id.clone(),
            agent_type: agent.agent_type.clone(),
            agent: RwLock::new(agent),
            broker,
            processor,
            task_manager: None,
            memory: None,
            emitter: None,
            completed: moka::sync::Cache::new(config.dedup_capacity),
            decode_failures: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            config,
        }
    }

    pub fn with_task_manager(mut self, task_manager: Arc<TaskManager>) -> Self {
        self.task_manager = Some(task_manager);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryManager>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    fn emit_task_update(&self, subtask_id: &str, status: TaskResultStatus) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(
                Event::new(EventType::TaskUpdate, self.id.clone())
                    .with_data("task_id", serde_json::json!(subtask_id))
                    .with_data("status", serde_json::json!(status)),
            );
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn decode_failure_count(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Failure fraction over everything this worker attempted.
    pub fn error_rate(&self) -> f64 {
        let processed = self.processed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total = processed + failed;
        if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        }
    }

    pub async fn response_time(&self) -> f64 {
        self.agent.read().await.response_time()
    }

    /// Consume the shared task queue until cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!(worker = %self.id, agent_type = %self.agent_type, "worker started");
        let mut backoff = Backoff::default();

        'reconnect: while !token.is_cancelled() {
            let mut stream = match self
                .broker
                .consume(TASK_QUEUE, &self.id, ConsumeOptions::default())
                .await
            {
                Ok(stream) => {
                    backoff.reset();
                    stream
                }
                Err(e) => {
                    warn!(worker = %self.id, error = %e, "consume failed, backing off");
                    let delay = backoff.next_delay();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue 'reconnect,
                        _ = token.cancelled() => break 'reconnect,
                    }
                }
            };

            loop {
                tokio::select! {
                    _ = token.cancelled() => break 'reconnect,
                    delivery = stream.recv() => {
                        match delivery {
                            Some(delivery) => self.handle(delivery).await,
                            None => {
                                warn!(worker = %self.id, "task stream ended, reconnecting");
                                continue 'reconnect;
                            }
                        }
                    }
                }
            }
        }

        info!(worker = %self.id, "worker stopped");
    }

    async fn handle(&self, delivery: Delivery) {
        let subtask: Subtask = match serde_json::from_slice(&delivery.body) {
            Ok(subtask) => subtask,
            Err(e) => {
                error!(worker = %self.id, error = %e, "failed to decode subtask");
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                let _ = self.broker.nack(delivery.tag, false).await;
                return;
            }
        };

        // Type routing: release anything that is not ours.
        if subtask.task_type != self.agent_type {
            let _ = self.broker.nack(delivery.tag, true).await;
            tokio::time::sleep(self.config.mismatch_delay).await;
            return;
        }

        // At-least-once delivery: the same id may arrive again.
        if self.completed.contains_key(&subtask.id) {
            debug!(worker = %self.id, subtask_id = %subtask.id, "duplicate delivery, acked");
            let _ = self.broker.ack(delivery.tag).await;
            return;
        }

        self.heartbeat(true, Some(subtask.id.clone()));
        let started = Instant::now();

        debug!(worker = %self.id, subtask_id = %subtask.id, "processing subtask");
        let agent = self.agent.read().await.clone();
        match self.processor.process(&agent, &subtask).await {
            Ok(result) => self.complete(delivery, subtask, result, started).await,
            Err(e) => self.fail(delivery, subtask, e).await,
        }

        self.heartbeat(false, None);
    }

    async fn complete(
        &self,
        delivery: Delivery,
        subtask: Subtask,
        result: HashMap<String, serde_json::Value>,
        started: Instant,
    ) {
        let task_result = TaskResult {
            task_id: subtask.id.clone(),
            parent_id: subtask.parent_id.clone(),
            agent_id: self.id.clone(),
            status: TaskResultStatus::Completed,
            result,
            completed_at: Utc::now(),
        };

        let body = match serde_json::to_vec(&task_result) {
            Ok(body) => body,
            Err(e) => {
                error!(worker = %self.id, error = %e, "failed to encode result");
                let _ = self.broker.nack(delivery.tag, true).await;
                return;
            }
        };

        if let Err(e) = self
            .broker
            .publish(RESULT_QUEUE, &body, PublishOptions::persistent())
            .await
        {
            warn!(worker = %self.id, error = %e, "failed to publish result, requeueing");
            let _ = self.broker.nack(delivery.tag, true).await;
            return;
        }

        let _ = self.broker.ack(delivery.tag).await;
        self.completed.insert(subtask.id.clone(), ());
        self.processed.fetch_add(1, Ordering::Relaxed);

        {
            let mut agent = self.agent.write().await;
            agent.record_response(format!("completed {}", subtask.id), started.elapsed());
        }

        if let Some(memory) = &self.memory {
            let record = Memory::new(
                &self.id,
                serde_json::to_string(&task_result).unwrap_or_default(),
                0.4,
            )
            .with_tags(vec!["task_result".to_string(), subtask.task_type.clone()]);
            if let Err(e) = memory.put(&record).await {
                warn!(worker = %self.id, error = %e, "failed to memorize result");
            }
        }

        self.emit_task_update(&subtask.id, TaskResultStatus::Completed);
        info!(worker = %self.id, subtask_id = %subtask.id, "subtask completed");
    }

    async fn fail(&self, delivery: Delivery, mut subtask: Subtask, cause: anyhow::Error) {
        warn!(worker = %self.id, subtask_id = %subtask.id, error = %cause, "subtask processing failed");
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.emit_task_update(&subtask.id, TaskResultStatus::Failed);

        let task_result = TaskResult {
            task_id: subtask.id.clone(),
            parent_id: subtask.parent_id.clone(),
            agent_id: self.id.clone(),
            status: TaskResultStatus::Failed,
            result: HashMap::from([(
                "error".to_string(),
                serde_json::json!(cause.to_string()),
            )]),
            completed_at: Utc::now(),
        };
        if let Ok(body) = serde_json::to_vec(&task_result) {
            if let Err(e) = self
                .broker
                .publish(RESULT_QUEUE, &body, PublishOptions::persistent())
                .await
            {
                warn!(worker = %self.id, error = %e, "failed to publish failure result");
            }
        }

        if subtask.retries < subtask.max_retries {
            // The requeued copy must carry the advanced counter, so the
            // original is acked and a fresh body is published instead of a
            // plain nack.
            subtask.retries += 1;
            match serde_json::to_vec(&subtask) {
                Ok(body) => {
                    if let Err(e) = self
                        .broker
                        .publish(TASK_QUEUE, &body, PublishOptions::persistent())
                        .await
                    {
                        warn!(worker = %self.id, error = %e, "failed to republish retry, requeueing original");
                        let _ = self.broker.nack(delivery.tag, true).await;
                        return;
                    }
                    let _ = self.broker.ack(delivery.tag).await;
                    info!(worker = %self.id, subtask_id = %subtask.id, retries = subtask.retries, "subtask requeued for retry");
                }
                Err(e) => {
                    error!(worker = %self.id, error = %e, "failed to encode retry");
                    let _ = self.broker.nack(delivery.tag, true).await;
                }
            }
        } else {
            let _ = self.broker.ack(delivery.tag).await;
            info!(worker = %self.id, subtask_id = %subtask.id, "subtask failed permanently");
        }
    }

    fn heartbeat(&self, is_processing: bool, current_task_id: Option<String>) {
        let Some(task_manager) = &self.task_manager else {
            return;
        };
        let health = AgentHealth {
            agent_id: self.id.clone(),
            last_heartbeat: Utc::now(),
            is_processing,
            current_task_id,
            processing_time: 0.0,
            success_rate: 1.0 - self.error_rate(),
        };
        if task_manager.emit_health(health).is_err() {
            debug!(worker = %self.id, "health channel full, signal dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::decomposer::{BreakdownPolicy, StaticBreakdown};
    use crate::domain::task::{TaskRequest, TaskStatus};
    use crate::infrastructure::memory_broker::InMemoryBroker;

    fn agent(agent_type: &str) -> CognitiveAgent {
        CognitiveAgent::new(
            format!("{agent_type}-worker-1"),
            agent_type,
            "Worker",
            "Pipeline worker",
            "Process subtasks",
            "gpt-4o-mini",
        )
    }

    fn subtask(id: &str, task_type: &str) -> Subtask {
        Subtask {
            id: id.to_string(),
            parent_id: "T1".to_string(),
            name: "Stage".to_string(),
            description: "stage work".to_string(),
            task_type: task_type.to_string(),
            parameters: HashMap::new(),
            status: TaskStatus::Pending,
            retries: 0,
            max_retries: 3,
        }
    }

    async fn broker() -> Arc<InMemoryBroker> {
        let b = InMemoryBroker::new();
        for q in [TASK_QUEUE, RESULT_QUEUE] {
            b.declare_queue(q, Default::default()).await.unwrap();
        }
        b
    }

    struct FailingProcessor;

    #[async_trait]
    impl TaskProcessor for FailingProcessor {
        async fn process(
            &self,
            _agent: &CognitiveAgent,
            _subtask: &Subtask,
        ) -> anyhow::Result<HashMap<String, serde_json::Value>> {
            anyhow::bail!("downstream skill unavailable")
        }
    }

    async fn publish_subtask(broker: &InMemoryBroker, s: &Subtask) {
        broker
            .publish(TASK_QUEUE, &serde_json::to_vec(s).unwrap(), PublishOptions::persistent())
            .await
            .unwrap();
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_matching_subtask_is_processed_and_acked() {
        let broker = broker().await;
        let worker = Arc::new(Worker::new(
            agent("analysis"),
            broker.clone(),
            Arc::new(SimulatedProcessor),
            WorkerConfig::default(),
        ));

        publish_subtask(&broker, &subtask("T1-1", "analysis")).await;

        let token = CancellationToken::new();
        let w = worker.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { w.run(t).await });

        let b = broker.clone();
        wait_until(move || b.stats(RESULT_QUEUE).published == 1).await;
        assert_eq!(broker.stats(TASK_QUEUE).acked, 1);
        assert_eq!(worker.processed_count(), 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_type_mismatch_requeued_never_acked() {
        let broker = broker().await;
        let worker = Arc::new(Worker::new(
            agent("research"),
            broker.clone(),
            Arc::new(SimulatedProcessor),
            WorkerConfig {
                mismatch_delay: Duration::from_millis(1),
                ..WorkerConfig::default()
            },
        ));

        publish_subtask(&broker, &subtask("T1-1", "analysis")).await;

        let token = CancellationToken::new();
        let w = worker.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { w.run(t).await });

        // Bounded redelivery harness: watch the delivery ping-pong.
        let b = broker.clone();
        wait_until(move || b.stats(TASK_QUEUE).redelivered >= 5).await;
        assert_eq!(broker.stats(TASK_QUEUE).acked, 0);
        assert_eq!(broker.stats(RESULT_QUEUE).published, 0);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_acked_once_processed() {
        let broker = broker().await;
        let worker = Arc::new(Worker::new(
            agent("analysis"),
            broker.clone(),
            Arc::new(SimulatedProcessor),
            WorkerConfig::default(),
        ));

        let s = subtask("T1-1", "analysis");
        publish_subtask(&broker, &s).await;

        let token = CancellationToken::new();
        let w = worker.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { w.run(t).await });

        let b = broker.clone();
        wait_until(move || b.stats(RESULT_QUEUE).published == 1).await;

        // Redeliver the same id; it must be acked without a second result.
        publish_subtask(&broker, &s).await;
        let b = broker.clone();
        wait_until(move || b.stats(TASK_QUEUE).acked == 2).await;
        assert_eq!(broker.stats(RESULT_QUEUE).published, 1);
        assert_eq!(worker.processed_count(), 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_advances_retries_and_republshes() {
        let broker = broker().await;
        let worker = Arc::new(Worker::new(
            agent("analysis"),
            broker.clone(),
            Arc::new(FailingProcessor),
            WorkerConfig::default(),
        ));

        let mut s = subtask("T1-1", "analysis");
        s.max_retries = 2;
        publish_subtask(&broker, &s).await;

        let token = CancellationToken::new();
        let w = worker.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { w.run(t).await });

        // 1 initial attempt + 2 retries, each publishing a failed result.
        let b = broker.clone();
        wait_until(move || b.stats(RESULT_QUEUE).published == 3).await;
        let b = broker.clone();
        wait_until(move || b.depth(TASK_QUEUE) == 0 && b.unacked_count() == 0).await;

        assert_eq!(worker.failed_count(), 3);
        assert!(worker.error_rate() > 0.99);

        // Every failure result carries the failed status.
        let mut rx = broker
            .consume(RESULT_QUEUE, "observer", ConsumeOptions { auto_ack: true })
            .await
            .unwrap();
        for _ in 0..3 {
            let delivery = rx.recv().await.unwrap();
            let result: TaskResult = serde_json::from_slice(&delivery.body).unwrap();
            assert_eq!(result.status, TaskResultStatus::Failed);
        }

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_poison_subtask_counted_and_dropped() {
        let broker = broker().await;
        let worker = Arc::new(Worker::new(
            agent("analysis"),
            broker.clone(),
            Arc::new(SimulatedProcessor),
            WorkerConfig::default(),
        ));

        broker
            .publish(TASK_QUEUE, b"garbage", PublishOptions::persistent())
            .await
            .unwrap();

        let token = CancellationToken::new();
        let w = worker.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { w.run(t).await });

        let w2 = worker.clone();
        wait_until(move || w2.decode_failure_count() == 1).await;
        assert_eq!(broker.stats(TASK_QUEUE).rejected, 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_memorizes_results() {
        let broker = broker().await;
        let memory: Arc<dyn MemoryManager> = Arc::new(hivemind_memory::default_manager(
            hivemind_memory::domain::MemoryConfig::default(),
        ));
        let worker = Arc::new(
            Worker::new(
                agent("analysis"),
                broker.clone(),
                Arc::new(SimulatedProcessor),
                WorkerConfig::default(),
            )
            .with_memory(memory.clone()),
        );

        publish_subtask(&broker, &subtask("T1-1", "analysis")).await;

        let token = CancellationToken::new();
        let w = worker.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { w.run(t).await });

        let b = broker.clone();
        wait_until(move || b.stats(RESULT_QUEUE).published == 1).await;

        let remembered = memory
            .search_by_tags(worker.id(), &["task_result".into()])
            .await
            .unwrap();
        assert_eq!(remembered.len(), 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_fanout_to_typed_workers_via_breakdown() {
        let broker = broker().await;
        let request = TaskRequest {
            id: "T9".into(),
            description: "full fan-out".into(),
            parameters: HashMap::new(),
        };
        for s in StaticBreakdown.breakdown(&request).await.unwrap() {
            publish_subtask(&broker, &s).await;
        }

        let token = CancellationToken::new();
        let mut handles = Vec::new();
        for t in ["analysis", "research", "development", "validation", "documentation"] {
            let worker = Arc::new(Worker::new(
                agent(t),
                broker.clone(),
                Arc::new(SimulatedProcessor),
                WorkerConfig {
                    mismatch_delay: Duration::from_millis(1),
                    ..WorkerConfig::default()
                },
            ));
            let tk = token.clone();
            handles.push(tokio::spawn(async move { worker.run(tk).await }));
        }

        let b = broker.clone();
        wait_until(move || b.stats(RESULT_QUEUE).published == 5).await;

        token.cancel();
        for h in handles {
            h.await.unwrap();
        }
    }
}
