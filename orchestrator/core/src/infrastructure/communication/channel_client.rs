// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-process communication client
//!
//! Transports messages over a shared topic hub of broadcast channels.
//! Implements the full client contract, including request/reply emulation
//! via a temporary reply subject with a random suffix.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{ClientStatus, CommunicationClient, CommunicationError, Message, MessageHandler};

const TOPIC_CAPACITY: usize = 256;

/// Shared topic registry. Every client attached to the same hub sees the
/// same subjects.
pub struct MessageHub {
    topics: Mutex<HashMap<String, broadcast::Sender<Message>>>,
}

impl MessageHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: Mutex::new(HashMap::new()),
        })
    }

    fn topic(&self, subject: &str) -> broadcast::Sender<Message> {
        let mut topics = self.topics.lock();
        topics
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.topics.lock().keys().cloned().collect()
    }
}

#[derive(Default)]
struct ClientState {
    connected: bool,
    last_error: Option<String>,
    last_connection: i64,
    bytes_sent: u64,
    bytes_received: u64,
}

pub struct ChannelClient {
    protocol: String,
    hub: Arc<MessageHub>,
    state: Arc<Mutex<ClientState>>,
    subscriptions: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ChannelClient {
    pub fn new(hub: Arc<MessageHub>, protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            hub,
            state: Arc::new(Mutex::new(ClientState::default())),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    fn ensure_connected(&self) -> Result<(), CommunicationError> {
        if !self.state.lock().connected {
            return Err(CommunicationError::NotConnected);
        }
        Ok(())
    }

    fn reply_subject(subject: &str) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        format!("{subject}.reply.{suffix}")
    }
}

#[async_trait]
impl CommunicationClient for ChannelClient {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    async fn connect(&self) -> Result<(), CommunicationError> {
        let mut state = self.state.lock();
        state.connected = true;
        state.last_connection = chrono::Utc::now().timestamp();
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), CommunicationError> {
        for (_, handle) in self.subscriptions.lock().drain() {
            handle.abort();
        }
        self.state.lock().connected = false;
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: MessageHandler,
    ) -> Result<(), CommunicationError> {
        self.ensure_connected()?;

        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(subject) {
            return Err(CommunicationError::AlreadySubscribed(subject.to_string()));
        }

        let mut rx = self.hub.topic(subject).subscribe();
        let state = self.state.clone();
        let subject_owned = subject.to_string();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        state.lock().bytes_received += message.data.len() as u64;
                        handler(message);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(subject = %subject_owned, lagged = n, "subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        subscriptions.insert(subject.to_string(), handle);
        Ok(())
    }

    async fn unsubscribe(&self, subject: &str) -> Result<(), CommunicationError> {
        let handle = self
            .subscriptions
            .lock()
            .remove(subject)
            .ok_or_else(|| CommunicationError::NotSubscribed(subject.to_string()))?;
        handle.abort();
        Ok(())
    }

    async fn publish(&self, subject: &str, data: &[u8]) -> Result<(), CommunicationError> {
        self.ensure_connected()?;
        let message = Message::new(subject, data.to_vec());
        // A send with no receivers is not a failure; the subject just has
        // no subscribers yet.
        let _ = self.hub.topic(subject).send(message);
        self.state.lock().bytes_sent += data.len() as u64;
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        data: &[u8],
        timeout_ms: u64,
    ) -> Result<Vec<u8>, CommunicationError> {
        self.ensure_connected()?;

        let reply_subject = Self::reply_subject(subject);
        let mut reply_rx = self.hub.topic(&reply_subject).subscribe();

        let mut message = Message::new(subject, data.to_vec());
        message.reply_to = Some(reply_subject.clone());
        let _ = self.hub.topic(subject).send(message);
        self.state.lock().bytes_sent += data.len() as u64;

        match tokio::time::timeout(Duration::from_millis(timeout_ms), reply_rx.recv()).await {
            Ok(Ok(reply)) => {
                let mut state = self.state.lock();
                state.bytes_received += reply.data.len() as u64;
                Ok(reply.data)
            }
            Ok(Err(_)) => Err(CommunicationError::Transport(
                "reply channel closed".to_string(),
            )),
            Err(_) => {
                self.state.lock().last_error = Some("request timed out".to_string());
                Err(CommunicationError::RequestTimeout)
            }
        }
    }

    fn status(&self) -> ClientStatus {
        let state = self.state.lock();
        ClientStatus {
            connected: state.connected,
            last_error: state.last_error.clone(),
            last_connection: state.last_connection,
            subscriptions: self.subscriptions.lock().len(),
            bytes_sent: state.bytes_sent,
            bytes_received: state.bytes_received,
        }
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().keys().cloned().collect()
    }

    async fn known_subjects(&self) -> Vec<String> {
        // The hub knows every subject any attached client has touched.
        self.hub.subjects()
    }
}
