// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Which tier a memory is currently routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    ShortTerm,
    LongTerm,
}

/// A single unit of agent memory.
///
/// # Invariants
///
/// - `importance` stays within `[0.0, 1.0]`.
/// - A short-term memory whose `ttl` has elapsed is invisible to readers.
/// - A memory with `importance >= threshold` is eligible for long-term
///   placement (see [`MemoryConfig::importance_threshold`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub agent_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub importance: f64,
    pub timestamp: DateTime<Utc>,
    /// Time-to-live for short-term placement. Zero means none, in which case
    /// the short-term store applies its configured default.
    #[serde(with = "ttl_seconds")]
    pub ttl: Duration,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Memory {
    pub fn new(agent_id: impl Into<String>, content: impl Into<String>, importance: f64) -> Self {
        Self {
            id: format!("memory_{}", Uuid::new_v4()),
            agent_id: agent_id.into(),
            content: content.into(),
            memory_type: MemoryType::ShortTerm,
            importance: importance.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            ttl: Duration::ZERO,
            tags: Vec::new(),
            metadata: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    /// Age of the memory relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

mod ttl_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(ttl.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Configuration shared by the memory tiers and the hybrid manager.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Importance at or above which a memory is placed long-term.
    pub importance_threshold: f64,
    /// Default TTL applied when a short-term memory carries none.
    pub short_term_ttl: Duration,
    /// Long-term entries older than this window become prune candidates.
    pub prune_window: Duration,
    /// Long-term entries below this importance inside the window are pruned.
    pub prune_importance_floor: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            importance_threshold: 0.7,
            short_term_ttl: Duration::from_secs(24 * 3600),
            prune_window: Duration::from_secs(24 * 3600),
            prune_importance_floor: 0.3,
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory not found: {0}")]
    NotFound(String),

    #[error("memory already exists: {0}")]
    Duplicate(String),

    #[error("store is closed")]
    Closed,

    #[error("storage backend failure: {0}")]
    Backend(String),
}
