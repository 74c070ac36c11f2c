// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-memory broker
//!
//! Process-local implementation of the broker adapter used by the embedded
//! runtime and the test suite. Per-queue FIFO backlog, round-robin dispatch
//! across competing consumers, unacked tracking with redelivery on nack.
//! Durability flags are recorded but inert in-process.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::infrastructure::broker::{
    BrokerError, ConsumeOptions, Delivery, DeliveryTag, MessageBroker, PublishOptions,
    QueueOptions,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub rejected: u64,
    pub redelivered: u64,
}

struct QueuedMessage {
    body: Vec<u8>,
    redeliveries: u32,
}

struct Consumer {
    id: String,
    auto_ack: bool,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<QueuedMessage>,
    consumers: Vec<Consumer>,
    rr_cursor: usize,
    stats: QueueStats,
}

struct InFlight {
    queue: String,
    message: QueuedMessage,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    unacked: HashMap<DeliveryTag, InFlight>,
    closed: bool,
}

/// In-process broker shared by every component of the embedded runtime.
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    next_tag: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BrokerState::default()),
            next_tag: AtomicU64::new(1),
        })
    }

    /// Ready-queue depth, for supervision and tests.
    pub fn depth(&self, queue: &str) -> usize {
        let state = self.state.lock();
        state.queues.get(queue).map_or(0, |q| q.ready.len())
    }

    pub fn stats(&self, queue: &str) -> QueueStats {
        let state = self.state.lock();
        state.queues.get(queue).map_or_else(QueueStats::default, |q| q.stats)
    }

    pub fn unacked_count(&self) -> usize {
        self.state.lock().unacked.len()
    }

    /// Drain ready messages toward live consumers, round-robin. Dead
    /// consumers are pruned; with no live consumer the backlog stays put.
    fn dispatch(queue: &mut QueueState, unacked: &mut HashMap<DeliveryTag, InFlight>, queue_name: &str, next_tag: &AtomicU64) {
        loop {
            queue.consumers.retain(|c| !c.tx.is_closed());
            if queue.consumers.is_empty() || queue.ready.is_empty() {
                return;
            }

            let Some(message) = queue.ready.pop_front() else {
                return;
            };
            let tag = next_tag.fetch_add(1, Ordering::Relaxed);
            let delivery = Delivery {
                tag,
                queue: queue_name.to_string(),
                body: message.body.clone(),
                redelivered: message.redeliveries > 0,
                redeliveries: message.redeliveries,
            };

            let n = queue.consumers.len();
            let mut pending = Some(message);
            for offset in 0..n {
                let idx = (queue.rr_cursor + offset) % n;
                let (send_ok, auto_ack, consumer_id) = {
                    let consumer = &queue.consumers[idx];
                    (
                        consumer.tx.send(delivery.clone()).is_ok(),
                        consumer.auto_ack,
                        consumer.id.clone(),
                    )
                };
                if !send_ok {
                    continue;
                }

                queue.rr_cursor = (idx + 1) % n;
                queue.stats.delivered += 1;
                if let Some(message) = pending.take() {
                    if message.redeliveries > 0 {
                        queue.stats.redelivered += 1;
                    }
                    if !auto_ack {
                        unacked.insert(
                            tag,
                            InFlight {
                                queue: queue_name.to_string(),
                                message,
                            },
                        );
                    }
                }
                trace!(queue = queue_name, tag, consumer = %consumer_id, "delivery dispatched");
                break;
            }

            if let Some(message) = pending {
                // Every consumer is gone; put the message back and stop.
                queue.ready.push_front(message);
                queue.consumers.retain(|c| !c.tx.is_closed());
                if queue.consumers.is_empty() {
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_queue(&self, name: &str, _options: QueueOptions) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrokerError::Unavailable);
        }
        state.queues.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        _options: PublishOptions,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrokerError::Unavailable);
        }

        let BrokerState { queues, unacked, .. } = &mut *state;
        let queue_state = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

        queue_state.stats.published += 1;
        queue_state.ready.push_back(QueuedMessage {
            body: body.to_vec(),
            redeliveries: 0,
        });
        Self::dispatch(queue_state, unacked, queue, &self.next_tag);
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_id: &str,
        options: ConsumeOptions,
    ) -> Result<mpsc::UnboundedReceiver<Delivery>, BrokerError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BrokerError::Unavailable);
        }

        let BrokerState { queues, unacked, .. } = &mut *state;
        let queue_state = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        queue_state.consumers.push(Consumer {
            id: consumer_id.to_string(),
            auto_ack: options.auto_ack,
            tx,
        });
        debug!(queue, consumer_id, "consumer registered");

        Self::dispatch(queue_state, unacked, queue, &self.next_tag);
        Ok(rx)
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        let in_flight = state
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDeliveryTag(tag))?;
        if let Some(queue) = state.queues.get_mut(&in_flight.queue) {
            queue.stats.acked += 1;
        }
        Ok(())
    }

    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        let mut in_flight = state
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDeliveryTag(tag))?;

        let BrokerState { queues, unacked, .. } = &mut *state;
        let Some(queue_state) = queues.get_mut(&in_flight.queue) else {
            return Ok(());
        };

        if requeue {
            in_flight.message.redeliveries += 1;
            queue_state.ready.push_back(in_flight.message);
            Self::dispatch(queue_state, unacked, &in_flight.queue, &self.next_tag);
        } else {
            queue_state.stats.rejected += 1;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        state.closed = true;
        // Dropping senders ends every consumer stream.
        for queue in state.queues.values_mut() {
            queue.consumers.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn broker_with_queue(name: &str) -> Arc<InMemoryBroker> {
        let broker = InMemoryBroker::new();
        broker.declare_queue(name, QueueOptions::durable()).await.unwrap();
        broker
    }

    #[tokio::test]
    async fn test_publish_then_consume_fifo() {
        let broker = broker_with_queue("q").await;
        broker.publish("q", b"one", PublishOptions::persistent()).await.unwrap();
        broker.publish("q", b"two", PublishOptions::persistent()).await.unwrap();

        let mut rx = broker
            .consume("q", "c1", ConsumeOptions::default())
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().body, b"one");
        assert_eq!(rx.recv().await.unwrap().body, b"two");
    }

    #[tokio::test]
    async fn test_publish_to_unknown_queue_fails() {
        let broker = InMemoryBroker::new();
        assert!(matches!(
            broker.publish("nope", b"x", PublishOptions::default()).await,
            Err(BrokerError::QueueNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ack_clears_unacked() {
        let broker = broker_with_queue("q").await;
        let mut rx = broker
            .consume("q", "c1", ConsumeOptions::default())
            .await
            .unwrap();
        broker.publish("q", b"m", PublishOptions::default()).await.unwrap();

        let delivery = rx.recv().await.unwrap();
        assert_eq!(broker.unacked_count(), 1);
        broker.ack(delivery.tag).await.unwrap();
        assert_eq!(broker.unacked_count(), 0);
        assert_eq!(broker.stats("q").acked, 1);
    }

    #[tokio::test]
    async fn test_nack_requeue_redelivers() {
        let broker = broker_with_queue("q").await;
        let mut rx = broker
            .consume("q", "c1", ConsumeOptions::default())
            .await
            .unwrap();
        broker.publish("q", b"m", PublishOptions::default()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(!first.redelivered);
        broker.nack(first.tag, true).await.unwrap();

        let second = rx.recv().await.unwrap();
        assert!(second.redelivered);
        assert_eq!(second.redeliveries, 1);
        assert_eq!(second.body, b"m");
    }

    #[tokio::test]
    async fn test_nack_without_requeue_drops() {
        let broker = broker_with_queue("q").await;
        let mut rx = broker
            .consume("q", "c1", ConsumeOptions::default())
            .await
            .unwrap();
        broker.publish("q", b"poison", PublishOptions::default()).await.unwrap();

        let delivery = rx.recv().await.unwrap();
        broker.nack(delivery.tag, false).await.unwrap();
        assert_eq!(broker.stats("q").rejected, 1);
        assert_eq!(broker.depth("q"), 0);
        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_competing_consumers_split_backlog() {
        let broker = broker_with_queue("q").await;
        let mut rx1 = broker
            .consume("q", "c1", ConsumeOptions::default())
            .await
            .unwrap();
        let mut rx2 = broker
            .consume("q", "c2", ConsumeOptions::default())
            .await
            .unwrap();

        for i in 0..4u8 {
            broker
                .publish("q", &[i], PublishOptions::default())
                .await
                .unwrap();
        }

        let mut c1 = 0;
        let mut c2 = 0;
        for _ in 0..2 {
            rx1.recv().await.unwrap();
            c1 += 1;
            rx2.recv().await.unwrap();
            c2 += 1;
        }
        assert_eq!(c1 + c2, 4);
    }

    #[tokio::test]
    async fn test_backlog_waits_for_first_consumer() {
        let broker = broker_with_queue("q").await;
        broker.publish("q", b"early", PublishOptions::default()).await.unwrap();
        assert_eq!(broker.depth("q"), 1);

        let mut rx = broker
            .consume("q", "late", ConsumeOptions::default())
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().body, b"early");
        assert_eq!(broker.depth("q"), 0);
    }

    #[tokio::test]
    async fn test_close_fails_publishers_and_ends_streams() {
        let broker = broker_with_queue("q").await;
        let mut rx = broker
            .consume("q", "c1", ConsumeOptions::default())
            .await
            .unwrap();

        broker.close().await.unwrap();
        assert!(matches!(
            broker.publish("q", b"x", PublishOptions::default()).await,
            Err(BrokerError::Unavailable)
        ));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_auto_ack_skips_unacked_tracking() {
        let broker = broker_with_queue("q").await;
        let mut rx = broker
            .consume("q", "c1", ConsumeOptions { auto_ack: true })
            .await
            .unwrap();
        broker.publish("q", b"m", PublishOptions::default()).await.unwrap();
        rx.recv().await.unwrap();
        assert_eq!(broker.unacked_count(), 0);
    }
}
