// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-process event emitter
//!
//! Typed pub/sub with per-listener mailboxes: `emit` never blocks, each
//! listener observes events in emit order, and a panicking listener is
//! isolated from both the emitter and its own mailbox loop.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::events::{Event, EventType};

pub type EventListener = Arc<dyn Fn(Event) + Send + Sync>;

struct Mailbox {
    tx: mpsc::UnboundedSender<Event>,
}

/// Emitter with per-event-type and any-event listeners.
pub struct EventEmitter {
    listeners: RwLock<HashMap<EventType, Vec<Mailbox>>>,
    any_listeners: RwLock<Vec<Mailbox>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            any_listeners: RwLock::new(Vec::new()),
        }
    }

    fn spawn_mailbox(listener: EventListener) -> Mailbox {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
                if result.is_err() {
                    warn!("event listener panicked; listener kept alive");
                }
            }
        });
        Mailbox { tx }
    }

    /// Register a listener for one event type.
    pub fn on(&self, event_type: EventType, listener: EventListener) {
        let mailbox = Self::spawn_mailbox(listener);
        self.listeners.write().entry(event_type).or_default().push(mailbox);
    }

    /// Register a listener for every event type.
    pub fn on_any(&self, listener: EventListener) {
        let mailbox = Self::spawn_mailbox(listener);
        self.any_listeners.write().push(mailbox);
    }

    /// Dispatch an event to the type's listeners and to any-event
    /// listeners. Delivery is asynchronous and best-effort.
    pub fn emit(&self, event: Event) {
        {
            let listeners = self.listeners.read();
            if let Some(mailboxes) = listeners.get(&event.event_type) {
                for mailbox in mailboxes {
                    let _ = mailbox.tx.send(event.clone());
                }
            }
        }

        let any = self.any_listeners.read();
        for mailbox in any.iter() {
            let _ = mailbox.tx.send(event.clone());
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
