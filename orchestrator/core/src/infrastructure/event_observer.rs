// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Event observer
//!
//! Watches every attached protocol adapter, auto-subscribing a normalizing
//! handler to subjects as they appear, and fans the resulting event logs
//! through a bounded drop-oldest ring into a batching persister. The sink
//! never blocks the message pipeline.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::events::EventLog;
use crate::infrastructure::communication::CommunicationClient;
use crate::infrastructure::event_sink::EventSink;

#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// How often each adapter's subject list is reconciled.
    pub reconcile_interval: Duration,
    /// Capacity of the in-flight ring; overflow drops the oldest entry.
    pub ring_capacity: usize,
    /// Persister flush threshold.
    pub batch_size: usize,
    /// Persister flush interval for partial batches.
    pub flush_interval: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(30),
            ring_capacity: 1000,
            batch_size: 64,
            flush_interval: Duration::from_secs(1),
        }
    }
}

/// Bounded drop-oldest buffer between subscription handlers and the
/// persister.
struct EventRing {
    buffer: parking_lot::Mutex<VecDeque<EventLog>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl EventRing {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: parking_lot::Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: EventLog) {
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() == self.capacity {
                buffer.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "observer ring full, oldest event dropped");
            }
            buffer.push_back(event);
        }
        self.notify.notify_one();
    }

    fn drain(&self, max: usize) -> Vec<EventLog> {
        let mut buffer = self.buffer.lock();
        let n = buffer.len().min(max);
        buffer.drain(..n).collect()
    }

    fn len(&self) -> usize {
        self.buffer.lock().len()
    }
}

pub struct EventObserver {
    clients: Vec<Arc<dyn CommunicationClient>>,
    sink: Arc<dyn EventSink>,
    ring: Arc<EventRing>,
    config: ObserverConfig,
    persisted: AtomicU64,
}

impl EventObserver {
    pub fn new(sink: Arc<dyn EventSink>, config: ObserverConfig) -> Self {
        let ring = Arc::new(EventRing::new(config.ring_capacity));
        Self {
            clients: Vec::new(),
            sink,
            ring,
            config,
            persisted: AtomicU64::new(0),
        }
    }

    pub fn add_client(&mut self, client: Arc<dyn CommunicationClient>) {
        self.clients.push(client);
    }

    pub fn dropped_count(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }

    pub fn persisted_count(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    pub fn pending_count(&self) -> usize {
        self.ring.len()
    }

    /// Run the reconcile loops and the persister until cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        info!(clients = self.clients.len(), "event observer started");

        let mut tasks = Vec::new();
        for client in self.clients.iter().cloned() {
            if !client.status().connected {
                warn!(protocol = client.protocol(), "skipping disconnected client");
                continue;
            }
            let observer = self.clone();
            let client_token = token.clone();
            tasks.push(tokio::spawn(async move {
                observer.watch_client(client, client_token).await;
            }));
        }

        self.persist_loop(token).await;
        for task in tasks {
            let _ = task.await;
        }
        info!("event observer stopped");
    }

    /// Reconcile one adapter: attach the normalizing handler to every
    /// subject the transport knows that is not wrapped yet.
    async fn watch_client(
        &self,
        client: Arc<dyn CommunicationClient>,
        token: CancellationToken,
    ) {
        let protocol = client.protocol().to_string();
        let mut known: HashSet<String> = HashSet::new();
        let mut tick = tokio::time::interval(self.config.reconcile_interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    for subject in client.known_subjects().await {
                        if known.contains(&subject) {
                            continue;
                        }

                        let ring = self.ring.clone();
                        let protocol_name = protocol.clone();
                        let handler = Arc::new(move |message: crate::infrastructure::communication::Message| {
                            ring.push(EventLog::message(
                                protocol_name.clone(),
                                message.subject.clone(),
                                message.data,
                            ));
                        });

                        match client.subscribe(&subject, handler).await {
                            Ok(()) => {
                                info!(protocol = %protocol, subject = %subject, "new subject observed");
                                known.insert(subject);
                            }
                            Err(e) => {
                                debug!(protocol = %protocol, subject = %subject, error = %e, "subscribe skipped");
                                // Subject already taken on this client; do not retry it.
                                known.insert(subject);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Drain the ring in batches into the sink.
    async fn persist_loop(&self, token: CancellationToken) {
        let mut flush_tick = tokio::time::interval(self.config.flush_interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.ring.notify.notified() => {
                    if self.ring.len() >= self.config.batch_size {
                        self.flush().await;
                    }
                }
                _ = flush_tick.tick() => {
                    self.flush().await;
                }
            }
        }

        // Final drain so a clean shutdown loses nothing buffered.
        self.flush().await;
    }

    async fn flush(&self) {
        loop {
            let mut batch = self.ring.drain(self.config.batch_size);
            if batch.is_empty() {
                return;
            }
            let now = chrono::Utc::now().timestamp_millis();
            for event in &mut batch {
                event.processed_at = now;
            }

            if let Err(e) = self.sink.append(&batch).await {
                warn!(error = %e, count = batch.len(), "failed to persist event batch");
                return;
            }
            self.persisted.fetch_add(batch.len() as u64, Ordering::Relaxed);
        }
    }
}
