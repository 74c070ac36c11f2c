// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Communication client contract
//!
//! One implementation per protocol (NATS, Kafka, gRPC stream, WebSocket,
//! in-process). Concrete protocol SDK bindings are adapters behind this
//! trait and out of scope here; the in-process client exercises the full
//! contract for the embedded runtime and tests.

pub mod channel_client;

pub use channel_client::{ChannelClient, MessageHub};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// A message observed on a subject. `reply_to` carries the temporary reply
/// subject during request/reply emulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub subject: String,
    pub data: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub id: String,
    pub timestamp: i64,
}

impl Message {
    pub fn new(subject: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            data,
            reply_to: None,
            id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

#[derive(Debug, Error)]
pub enum CommunicationError {
    #[error("client is not connected")]
    NotConnected,

    #[error("already subscribed to {0}")]
    AlreadySubscribed(String),

    #[error("not subscribed to {0}")]
    NotSubscribed(String),

    #[error("request timed out")]
    RequestTimeout,

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Connection and traffic counters reported by every client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientStatus {
    pub connected: bool,
    pub last_error: Option<String>,
    /// Unix seconds of the last successful connection.
    pub last_connection: i64,
    pub subscriptions: usize,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[async_trait]
pub trait CommunicationClient: Send + Sync {
    /// Protocol label used by the observer pipeline ("NATS", "Kafka", ...).
    fn protocol(&self) -> &str;

    async fn connect(&self) -> Result<(), CommunicationError>;

    async fn disconnect(&self) -> Result<(), CommunicationError>;

    async fn subscribe(
        &self,
        subject: &str,
        handler: MessageHandler,
    ) -> Result<(), CommunicationError>;

    async fn unsubscribe(&self, subject: &str) -> Result<(), CommunicationError>;

    async fn publish(&self, subject: &str, data: &[u8]) -> Result<(), CommunicationError>;

    /// Send a message and await its reply. Brokers without native
    /// request/reply emulate it through a temporary reply subject carrying
    /// a random suffix.
    async fn request(
        &self,
        subject: &str,
        data: &[u8],
        timeout_ms: u64,
    ) -> Result<Vec<u8>, CommunicationError>;

    fn status(&self) -> ClientStatus;

    fn subscriptions(&self) -> Vec<String>;

    /// Subjects currently visible on the transport. Adapters able to
    /// enumerate remote subjects override this; the default reports only
    /// this client's own subscription list.
    async fn known_subjects(&self) -> Vec<String> {
        self.subscriptions()
    }
}
