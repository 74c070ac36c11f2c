// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Short-term memory tier
//!
//! In-process TTL store with per-agent tag indexes. Entries past their
//! deadline are invisible to every reader; `prune` sweeps them out.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::domain::{Memory, MemoryError};
use crate::infrastructure::repository::MemoryStore;

struct StoredMemory {
    memory: Memory,
    expires_at: Instant,
}

impl StoredMemory {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
struct AgentShelf {
    memories: HashMap<String, StoredMemory>,
    // tag -> ids carrying it, mirroring the tag sets of the original cache
    tag_index: HashMap<String, HashSet<String>>,
}

impl AgentShelf {
    fn index_tags(&mut self, memory: &Memory) {
        for tag in &memory.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(memory.id.clone());
        }
    }

    fn unindex_tags(&mut self, memory_id: &str) {
        self.tag_index.retain(|_, ids| {
            ids.remove(memory_id);
            !ids.is_empty()
        });
    }
}

/// Short-term tier backed by process memory.
pub struct ShortTermStore {
    shelves: Arc<RwLock<HashMap<String, AgentShelf>>>,
    default_ttl: Duration,
    closed: AtomicBool,
}

impl ShortTermStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            shelves: Arc::new(RwLock::new(HashMap::new())),
            default_ttl,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), MemoryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MemoryError::Closed);
        }
        Ok(())
    }

    fn deadline_for(&self, memory: &Memory) -> Instant {
        let ttl = if memory.ttl.is_zero() {
            self.default_ttl
        } else {
            memory.ttl
        };
        Instant::now() + ttl
    }
}

#[async_trait]
impl MemoryStore for ShortTermStore {
    async fn put(&self, memory: &Memory) -> Result<(), MemoryError> {
        self.ensure_open()?;
        let expires_at = self.deadline_for(memory);

        let mut shelves = self.shelves.write().await;
        let shelf = shelves.entry(memory.agent_id.clone()).or_default();
        shelf.index_tags(memory);
        shelf.memories.insert(
            memory.id.clone(),
            StoredMemory {
                memory: memory.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, agent_id: &str, memory_id: &str) -> Result<Memory, MemoryError> {
        self.ensure_open()?;
        let shelves = self.shelves.read().await;
        let stored = shelves
            .get(agent_id)
            .and_then(|shelf| shelf.memories.get(memory_id))
            .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))?;

        if stored.is_expired(Instant::now()) {
            return Err(MemoryError::NotFound(memory_id.to_string()));
        }
        Ok(stored.memory.clone())
    }

    async fn search_by_tags(
        &self,
        agent_id: &str,
        tags: &[String],
    ) -> Result<Vec<Memory>, MemoryError> {
        self.ensure_open()?;
        let now = Instant::now();
        let shelves = self.shelves.read().await;
        let Some(shelf) = shelves.get(agent_id) else {
            return Ok(Vec::new());
        };

        let visible = |stored: &StoredMemory| !stored.is_expired(now);

        if tags.is_empty() {
            return Ok(shelf
                .memories
                .values()
                .filter(|s| visible(s))
                .map(|s| s.memory.clone())
                .collect());
        }

        // Intersection across tag indexes: every requested tag must match.
        let mut candidate_ids: Option<HashSet<String>> = None;
        for tag in tags {
            let ids = shelf.tag_index.get(tag).cloned().unwrap_or_default();
            candidate_ids = Some(match candidate_ids {
                None => ids,
                Some(acc) => acc.intersection(&ids).cloned().collect(),
            });
        }

        let ids = candidate_ids.unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| shelf.memories.get(id))
            .filter(|s| visible(s))
            .map(|s| s.memory.clone())
            .collect())
    }

    async fn update(&self, memory: &Memory) -> Result<(), MemoryError> {
        self.ensure_open()?;
        let mut shelves = self.shelves.write().await;
        let shelf = shelves
            .get_mut(&memory.agent_id)
            .ok_or_else(|| MemoryError::NotFound(memory.id.clone()))?;

        // The remaining TTL survives the update, as with an EXPIRE-preserving
        // cache write.
        let expires_at = match shelf.memories.get(&memory.id) {
            Some(existing) if !existing.is_expired(Instant::now()) => existing.expires_at,
            _ => return Err(MemoryError::NotFound(memory.id.clone())),
        };

        shelf.unindex_tags(&memory.id);
        shelf.index_tags(memory);
        shelf.memories.insert(
            memory.id.clone(),
            StoredMemory {
                memory: memory.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, agent_id: &str, memory_id: &str) -> Result<(), MemoryError> {
        self.ensure_open()?;
        let mut shelves = self.shelves.write().await;
        let shelf = shelves
            .get_mut(agent_id)
            .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))?;
        shelf
            .memories
            .remove(memory_id)
            .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))?;
        shelf.unindex_tags(memory_id);
        Ok(())
    }

    async fn prune(&self, agent_id: &str) -> Result<usize, MemoryError> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut shelves = self.shelves.write().await;
        let Some(shelf) = shelves.get_mut(agent_id) else {
            return Ok(0);
        };

        let expired: Vec<String> = shelf
            .memories
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            shelf.memories.remove(id);
            shelf.unindex_tags(id);
        }
        Ok(expired.len())
    }

    async fn close(&self) -> Result<(), MemoryError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
