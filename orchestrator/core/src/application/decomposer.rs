// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Task decomposer
//!
//! Consumes parent task requests from the input queue, expands each into
//! typed subtasks through the plugged breakdown policy, and publishes them
//! on the shared task queue. The parent delivery is acked only after every
//! subtask has been accepted by the broker.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::task::{Subtask, TaskRequest, TaskStatus};
use crate::infrastructure::broker::{
    Backoff, ConsumeOptions, Delivery, MessageBroker, PublishOptions, QueueOptions, INPUT_QUEUE,
    RESULT_QUEUE, TASK_QUEUE,
};

/// Expansion policy for parent requests. Production policies may call an
/// external decomposition service; the static policy is deterministic per
/// input.
#[async_trait]
pub trait BreakdownPolicy: Send + Sync {
    async fn breakdown(&self, request: &TaskRequest) -> anyhow::Result<Vec<Subtask>>;
}

/// Default policy: one subtask per pipeline stage.
pub struct StaticBreakdown;

const STAGES: [(&str, &str, &str, &str); 5] = [
    ("analysis", "Requirements Analysis", "Analyze the requirements and context of the task", "high"),
    ("research", "Research", "Research the subject matter", "high"),
    ("development", "Development", "Develop the solution", "high"),
    ("validation", "Validation", "Validate the developed solution", "medium"),
    ("documentation", "Documentation", "Document the solution", "medium"),
];

#[async_trait]
impl BreakdownPolicy for StaticBreakdown {
    async fn breakdown(&self, request: &TaskRequest) -> anyhow::Result<Vec<Subtask>> {
        let now = Utc::now();
        Ok(STAGES
            .iter()
            .enumerate()
            .map(|(i, (task_type, name, description, priority))| {
                let mut parameters = request.parameters.clone();
                parameters.insert("priority".to_string(), serde_json::json!(priority));
                parameters.insert(
                    "deadline".to_string(),
                    serde_json::json!(
                        (now + ChronoDuration::hours(i as i64 + 1)).to_rfc3339()
                    ),
                );

                Subtask {
                    id: format!("{}-{}", request.id, i + 1),
                    parent_id: request.id.clone(),
                    name: (*name).to_string(),
                    description: (*description).to_string(),
                    task_type: (*task_type).to_string(),
                    parameters,
                    status: TaskStatus::Pending,
                    retries: 0,
                    max_retries: 3,
                }
            })
            .collect())
    }
}

pub struct Decomposer {
    broker: Arc<dyn MessageBroker>,
    policy: Arc<dyn BreakdownPolicy>,
    decode_failures: AtomicU64,
}

impl Decomposer {
    pub fn new(broker: Arc<dyn MessageBroker>, policy: Arc<dyn BreakdownPolicy>) -> Self {
        Self {
            broker,
            policy,
            decode_failures: AtomicU64::new(0),
        }
    }

    /// Declare the pipeline queues. Names are part of the wire contract.
    pub async fn declare_topology(&self) -> anyhow::Result<()> {
        for queue in [INPUT_QUEUE, TASK_QUEUE, RESULT_QUEUE] {
            self.broker.declare_queue(queue, QueueOptions::durable()).await?;
        }
        Ok(())
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Consume the input queue until cancelled. Stream termination triggers
    /// reconnect with exponential backoff.
    pub async fn run(&self, token: CancellationToken) {
        info!(queue = INPUT_QUEUE, "decomposer started");
        let mut backoff = Backoff::default();

        'reconnect: while !token.is_cancelled() {
            let mut stream = match self
                .broker
                .consume(INPUT_QUEUE, "decomposer", ConsumeOptions::default())
                .await
            {
                Ok(stream) => {
                    backoff.reset();
                    stream
                }
                Err(e) => {
                    warn!(error = %e, "decomposer consume failed, backing off");
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
                                warn!("decomposer stream ended, reconnecting");
                                continue 'reconnect;
                            }
                        }
                    }
                }
            }
        }

        info!("decomposer stopped");
    }

    async fn handle(&self, delivery: Delivery) {
        let request: TaskRequest = match serde_json::from_slice(&delivery.body) {
            Ok(request) => request,
            Err(e) => {
                // Poison message: drop it, count it, keep consuming.
                error!(error = %e, "failed to decode task request");
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                let _ = self.broker.nack(delivery.tag, false).await;
                return;
            }
        };

        info!(request_id = %request.id, description = %request.description, "task request received");

        let subtasks = match self.policy.breakdown(&request).await {
            Ok(subtasks) => subtasks,
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "breakdown failed, requeueing");
                let _ = self.broker.nack(delivery.tag, true).await;
                return;
            }
        };

        info!(request_id = %request.id, count = subtasks.len(), "task expanded into subtasks");

        for subtask in &subtasks {
            let body = match serde_json::to_vec(subtask) {
                Ok(body) => body,
                Err(e) => {
                    error!(subtask_id = %subtask.id, error = %e, "failed to encode subtask");
                    let _ = self.broker.nack(delivery.tag, true).await;
                    return;
                }
            };

            if let Err(e) = self
                .broker
                .publish(TASK_QUEUE, &body, PublishOptions::persistent())
                .await
            {
                warn!(subtask_id = %subtask.id, error = %e, "failed to publish subtask, requeueing parent");
                let _ = self.broker.nack(delivery.tag, true).await;
                return;
            }
        }

        // Every subtask is persisted; only now does the parent leave the queue.
        if let Err(e) = self.broker.ack(delivery.tag).await {
            warn!(request_id = %request.id, error = %e, "failed to ack task request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_broker::InMemoryBroker;
    use std::time::Duration;

    fn request(id: &str) -> TaskRequest {
        TaskRequest {
            id: id.to_string(),
            description: "analyze the repository".to_string(),
            parameters: HashMap::from([("priority".to_string(), serde_json::json!("high"))]),
        }
    }

    #[tokio::test]
    async fn test_static_breakdown_produces_five_typed_subtasks() {
        let subtasks = StaticBreakdown.breakdown(&request("T1")).await.unwrap();
        assert_eq!(subtasks.len(), 5);

        let types: Vec<&str> = subtasks.iter().map(|s| s.task_type.as_str()).collect();
        assert_eq!(
            types,
            ["analysis", "research", "development", "validation", "documentation"]
        );
        for (i, subtask) in subtasks.iter().enumerate() {
            assert_eq!(subtask.parent_id, "T1");
            assert_eq!(subtask.id, format!("T1-{}", i + 1));
            assert_eq!(subtask.status, TaskStatus::Pending);
            assert!(subtask.parameters.contains_key("deadline"));
        }
    }

    #[tokio::test]
    async fn test_decomposer_fans_out_and_acks() {
        let broker = InMemoryBroker::new();
        let decomposer = Decomposer::new(broker.clone(), Arc::new(StaticBreakdown));
        decomposer.declare_topology().await.unwrap();

        broker
            .publish(
                INPUT_QUEUE,
                &serde_json::to_vec(&request("T1")).unwrap(),
                PublishOptions::persistent(),
            )
            .await
            .unwrap();

        let token = CancellationToken::new();
        let handle = {
            let token = token.clone();
            let decomposer = Arc::new(decomposer);
            let d = decomposer.clone();
            tokio::spawn(async move { d.run(token).await })
        };

        // Wait for the fan-out to land on the task queue.
        tokio::time::timeout(Duration::from_secs(2), async {
            while broker.depth(TASK_QUEUE) < 5 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("expected 5 subtasks on the task queue");

        assert_eq!(broker.stats(INPUT_QUEUE).acked, 1);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("decomposer should stop on cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_poison_request_is_dropped_not_requeued() {
        let broker = InMemoryBroker::new();
        let decomposer = Arc::new(Decomposer::new(broker.clone(), Arc::new(StaticBreakdown)));
        decomposer.declare_topology().await.unwrap();

        broker
            .publish(INPUT_QUEUE, b"not json", PublishOptions::persistent())
            .await
            .unwrap();

        let token = CancellationToken::new();
        let d = decomposer.clone();
        let run_token = token.clone();
        let handle = tokio::spawn(async move { d.run(run_token).await });

        tokio::time::timeout(Duration::from_secs(2), async {
            while decomposer.decode_failures() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("decode failure should be counted");

        assert_eq!(broker.stats(INPUT_QUEUE).rejected, 1);
        assert_eq!(broker.depth(TASK_QUEUE), 0);

        token.cancel();
        handle.await.unwrap();
    }
}
