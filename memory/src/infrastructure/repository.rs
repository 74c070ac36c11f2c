// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository interfaces for the memory bounded context
//! Defines the contracts the three tiers implement

use crate::domain::{Memory, MemoryError};
use async_trait::async_trait;

/// A single memory tier: short-term cache or long-term document store.
///
/// Implementations are concurrent-safe by contract; callers never hold
/// external locks around tier operations.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store a new memory.
    async fn put(&self, memory: &Memory) -> Result<(), MemoryError>;

    /// Fetch a single memory by owner and id.
    async fn get(&self, agent_id: &str, memory_id: &str) -> Result<Memory, MemoryError>;

    /// Search by tags. Empty tags returns every memory the agent owns;
    /// otherwise only memories carrying *all* requested tags match.
    async fn search_by_tags(
        &self,
        agent_id: &str,
        tags: &[String],
    ) -> Result<Vec<Memory>, MemoryError>;

    /// Replace an existing memory.
    async fn update(&self, memory: &Memory) -> Result<(), MemoryError>;

    /// Delete a memory.
    async fn delete(&self, agent_id: &str, memory_id: &str) -> Result<(), MemoryError>;

    /// Evict entries the tier's retention policy no longer keeps.
    /// Returns the number of memories removed.
    async fn prune(&self, agent_id: &str) -> Result<usize, MemoryError>;

    /// Release backing resources.
    async fn close(&self) -> Result<(), MemoryError>;
}

/// The semantic tier: every memory is mirrored here for similarity search.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn put(&self, memory: &Memory) -> Result<(), MemoryError>;

    /// Return up to `limit` memories ordered by decreasing similarity.
    async fn search_similar(&self, query: &str, limit: usize)
        -> Result<Vec<Memory>, MemoryError>;

    async fn update(&self, memory: &Memory) -> Result<(), MemoryError>;

    async fn delete(&self, memory_id: &str) -> Result<(), MemoryError>;

    async fn close(&self) -> Result<(), MemoryError>;
}
