// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Long-term memory tier
//!
//! In-process document store. Retention: `prune` deletes memories that are
//! both older than the configured window and below the importance floor.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::{Memory, MemoryError};
use crate::infrastructure::repository::MemoryStore;

/// Long-term tier backed by process memory.
pub struct LongTermStore {
    // agent_id -> memory_id -> memory
    documents: Arc<RwLock<HashMap<String, HashMap<String, Memory>>>>,
    prune_window: Duration,
    prune_importance_floor: f64,
    closed: AtomicBool,
}

impl LongTermStore {
    pub fn new(prune_window: Duration, prune_importance_floor: f64) -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            prune_window,
            prune_importance_floor,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), MemoryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MemoryError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for LongTermStore {
    async fn put(&self, memory: &Memory) -> Result<(), MemoryError> {
        self.ensure_open()?;
        let mut documents = self.documents.write().await;
        documents
            .entry(memory.agent_id.clone())
            .or_default()
            .insert(memory.id.clone(), memory.clone());
        Ok(())
    }

    async fn get(&self, agent_id: &str, memory_id: &str) -> Result<Memory, MemoryError> {
        self.ensure_open()?;
        let documents = self.documents.read().await;
        documents
            .get(agent_id)
            .and_then(|docs| docs.get(memory_id))
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))
    }

    async fn search_by_tags(
        &self,
        agent_id: &str,
        tags: &[String],
    ) -> Result<Vec<Memory>, MemoryError> {
        self.ensure_open()?;
        let documents = self.documents.read().await;
        let Some(docs) = documents.get(agent_id) else {
            return Ok(Vec::new());
        };

        Ok(docs
            .values()
            .filter(|m| tags.iter().all(|tag| m.tags.contains(tag)))
            .cloned()
            .collect())
    }

    async fn update(&self, memory: &Memory) -> Result<(), MemoryError> {
        self.ensure_open()?;
        let mut documents = self.documents.write().await;
        let docs = documents
            .get_mut(&memory.agent_id)
            .ok_or_else(|| MemoryError::NotFound(memory.id.clone()))?;
        if !docs.contains_key(&memory.id) {
            return Err(MemoryError::NotFound(memory.id.clone()));
        }
        docs.insert(memory.id.clone(), memory.clone());
        Ok(())
    }

    async fn delete(&self, agent_id: &str, memory_id: &str) -> Result<(), MemoryError> {
        self.ensure_open()?;
        let mut documents = self.documents.write().await;
        documents
            .get_mut(agent_id)
            .and_then(|docs| docs.remove(memory_id))
            .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))?;
        Ok(())
    }

    async fn prune(&self, agent_id: &str) -> Result<usize, MemoryError> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut documents = self.documents.write().await;
        let Some(docs) = documents.get_mut(agent_id) else {
            return Ok(0);
        };

        let before = docs.len();
        docs.retain(|_, m| {
            m.age(now) <= self.prune_window || m.importance >= self.prune_importance_floor
        });
        Ok(before - docs.len())
    }

    async fn close(&self) -> Result<(), MemoryError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
