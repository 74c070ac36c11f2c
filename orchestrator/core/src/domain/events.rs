// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kinds of in-process events the emitter dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentAction,
    TaskUpdate,
    WorkflowUpdate,
    ProjectUpdate,
    MemoryOperation,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::AgentAction,
        EventType::TaskUpdate,
        EventType::WorkflowUpdate,
        EventType::ProjectUpdate,
        EventType::MemoryOperation,
    ];
}

/// An in-process event. Ephemeral; serialized to JSON only when it crosses
/// into the observer pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub data: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(event_type: EventType, source: impl Into<String>) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            source: source.into(),
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Normalized record of an observed message, persisted to the time-series
/// sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub protocol: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subject: String,
    pub data: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processed_at: i64,
}

impl EventLog {
    pub fn message(protocol: impl Into<String>, subject: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            protocol: protocol.into(),
            kind: "message".to_string(),
            subject: subject.into(),
            data,
            metadata: HashMap::new(),
            status: "success".to_string(),
            error: None,
            processed_at: 0,
        }
    }
}
