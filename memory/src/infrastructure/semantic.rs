// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Semantic memory tier
//!
//! Every memory is mirrored here regardless of placement. Search ranks by
//! cosine similarity over embeddings produced by the configured [`Embedder`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Memory, MemoryError};
use crate::infrastructure::embedder::Embedder;
use crate::infrastructure::repository::SemanticIndex;

/// In-process vector index over agent memories.
pub struct SemanticStore {
    embedder: Arc<dyn Embedder>,
    entries: Arc<RwLock<HashMap<String, (Memory, Vec<f32>)>>>,
}

impl SemanticStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if magnitude_a == 0.0 || magnitude_b == 0.0 {
            return 0.0;
        }

        (dot_product / (magnitude_a * magnitude_b)) as f64
    }
}

#[async_trait]
impl SemanticIndex for SemanticStore {
    async fn put(&self, memory: &Memory) -> Result<(), MemoryError> {
        let embedding = self.embedder.embed(&memory.content).await?;
        let mut entries = self.entries.write().await;
        entries.insert(memory.id.clone(), (memory.clone(), embedding));
        Ok(())
    }

    async fn search_similar(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        let query_embedding = self.embedder.embed(query).await?;
        let entries = self.entries.read().await;

        let mut results: Vec<(Memory, f64)> = entries
            .values()
            .map(|(memory, embedding)| {
                let similarity = Self::cosine_similarity(&query_embedding, embedding);
                (memory.clone(), similarity)
            })
            .collect();

        // Sort by similarity descending
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        Ok(results.into_iter().map(|(memory, _)| memory).collect())
    }

    async fn update(&self, memory: &Memory) -> Result<(), MemoryError> {
        let embedding = self.embedder.embed(&memory.content).await?;
        let mut entries = self.entries.write().await;
        if !entries.contains_key(&memory.id) {
            return Err(MemoryError::NotFound(memory.id.clone()));
        }
        entries.insert(memory.id.clone(), (memory.clone(), embedding));
        Ok(())
    }

    async fn delete(&self, memory_id: &str) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        entries
            .remove(memory_id)
            .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}
