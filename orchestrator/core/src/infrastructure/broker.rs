// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Message broker adapter
//!
//! Uniform capability set over any durable broker: declare, publish,
//! consume, ack, nack. Delivery is at-least-once; consumers must be
//! idempotent. Concrete broker SDKs (AMQP et al.) implement this trait as
//! adapters; queue names are part of the wire contract.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Broker-assigned identifier of one delivery, used to ack or nack it.
pub type DeliveryTag = u64;

/// Queue names forming the wire contract of the pipeline.
pub const INPUT_QUEUE: &str = "llm_input";
pub const TASK_QUEUE: &str = "llm_tasks";
pub const RESULT_QUEUE: &str = "llm_results";

/// Queue name for one published metric.
pub fn metric_queue(agent_id: &str, metric: &str) -> String {
    format!("metrics.{agent_id}.{metric}")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl QueueOptions {
    pub fn durable() -> Self {
        Self {
            durable: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    pub persistent: bool,
}

impl PublishOptions {
    pub fn persistent() -> Self {
        Self { persistent: true }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumeOptions {
    pub auto_ack: bool,
}

/// One message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub queue: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
    pub redeliveries: u32,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable")]
    Unavailable,

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("unknown delivery tag: {0}")]
    UnknownDeliveryTag(DeliveryTag),
}

/// Capability set every broker adapter provides.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError>;

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        options: PublishOptions,
    ) -> Result<(), BrokerError>;

    /// Open a delivery stream on a queue. Competing consumers on the same
    /// queue share the backlog; ordering is only guaranteed for a single
    /// consumer. The stream ends when the broker closes.
    async fn consume(
        &self,
        queue: &str,
        consumer_id: &str,
        options: ConsumeOptions,
    ) -> Result<mpsc::UnboundedReceiver<Delivery>, BrokerError>;

    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError>;

    /// Reject a delivery. With `requeue` the message returns to the queue
    /// and is redelivered, possibly to a different consumer.
    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// Exponential reconnect backoff: initial 1s, cap 30s, 10% jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration, jitter: f64) -> Self {
        Self {
            initial,
            cap,
            jitter,
            attempt: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.initial.as_secs_f64() * 2f64.powi(self.attempt as i32);
        let base = exp.min(self.cap.as_secs_f64());
        self.attempt = self.attempt.saturating_add(1);

        let spread = base * self.jitter;
        let jittered = base + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 0.1)
    }
}
