// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Result collector
//!
//! Downstream consumer of the results queue. Indexes results by parent
//! request; duplicates of the same task id overwrite in place, which is
//! what makes the at-least-once pipeline safe to observe from here.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::task::TaskResult;
use crate::infrastructure::broker::{
    Backoff, ConsumeOptions, MessageBroker, RESULT_QUEUE,
};

pub struct ResultCollector {
    broker: Arc<dyn MessageBroker>,
    // parent_id -> task_id -> result
    results: RwLock<HashMap<String, HashMap<String, TaskResult>>>,
}

impl ResultCollector {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self {
            broker,
            results: RwLock::new(HashMap::new()),
        }
    }

    pub async fn results_for(&self, parent_id: &str) -> Vec<TaskResult> {
        let results = self.results.read().await;
        results
            .get(parent_id)
            .map(|by_task| by_task.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn total_count(&self) -> usize {
        let results = self.results.read().await;
        results.values().map(HashMap::len).sum()
    }

    pub async fn run(&self, token: CancellationToken) {
        info!(queue = RESULT_QUEUE, "result collector started");
        let mut backoff = Backoff::default();

        'reconnect: while !token.is_cancelled() {
            let mut stream = match self
                .broker
                .consume(RESULT_QUEUE, "result-collector", ConsumeOptions::default())
                .await
            {
                Ok(stream) => {
                    backoff.reset();
                    stream
                }
                Err(e) => {
                    warn!(error = %e, "result collector consume failed, backing off");
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
                        let Some(delivery) = delivery else {
                            warn!("result stream ended, reconnecting");
                            continue 'reconnect;
                        };

                        match serde_json::from_slice::<TaskResult>(&delivery.body) {
                            Ok(result) => {
                                let mut results = self.results.write().await;
                                results
                                    .entry(result.parent_id.clone())
                                    .or_default()
                                    .insert(result.task_id.clone(), result);
                                drop(results);
                                let _ = self.broker.ack(delivery.tag).await;
                            }
                            Err(e) => {
                                error!(error = %e, "failed to decode task result");
                                let _ = self.broker.nack(delivery.tag, false).await;
                            }
                        }
                    }
                }
            }
        }

        info!("result collector stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskResultStatus;
    use crate::infrastructure::broker::PublishOptions;
    use crate::infrastructure::memory_broker::InMemoryBroker;
    use chrono::Utc;
    use std::time::Duration;

    fn result(task_id: &str, parent_id: &str) -> TaskResult {
        TaskResult {
            task_id: task_id.to_string(),
            parent_id: parent_id.to_string(),
            agent_id: "agent-1".to_string(),
            status: TaskResultStatus::Completed,
            result: HashMap::new(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_collects_and_indexes_by_parent() {
        let broker = InMemoryBroker::new();
        broker.declare_queue(RESULT_QUEUE, Default::default()).await.unwrap();
        let collector = Arc::new(ResultCollector::new(broker.clone()));

        for body in [result("T1-1", "T1"), result("T1-2", "T1"), result("T2-1", "T2")] {
            broker
                .publish(
                    RESULT_QUEUE,
                    &serde_json::to_vec(&body).unwrap(),
                    PublishOptions::persistent(),
                )
                .await
                .unwrap();
        }

        let token = CancellationToken::new();
        let c = collector.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { c.run(t).await });

        tokio::time::timeout(Duration::from_secs(2), async {
            while collector.total_count().await < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(collector.results_for("T1").await.len(), 2);
        assert_eq!(collector.results_for("T2").await.len(), 1);
        assert!(collector.results_for("T3").await.is_empty());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_result_is_idempotent() {
        let broker = InMemoryBroker::new();
        broker.declare_queue(RESULT_QUEUE, Default::default()).await.unwrap();
        let collector = Arc::new(ResultCollector::new(broker.clone()));

        let r = result("T1-1", "T1");
        for _ in 0..3 {
            broker
                .publish(
                    RESULT_QUEUE,
                    &serde_json::to_vec(&r).unwrap(),
                    PublishOptions::persistent(),
                )
                .await
                .unwrap();
        }

        let token = CancellationToken::new();
        let c = collector.clone();
        let t = token.clone();
        let handle = tokio::spawn(async move { c.run(t).await });

        tokio::time::timeout(Duration::from_secs(2), async {
            while broker.stats(RESULT_QUEUE).acked < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(collector.results_for("T1").await.len(), 1);

        token.cancel();
        handle.await.unwrap();
    }
}
