// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Embedding seam for the semantic tier
//!
//! Production deployments point this at an embedding service; the default
//! implementation hashes token features into a fixed-width vector so the
//! semantic tier works hermetically.

use async_trait::async_trait;

use crate::domain::MemoryError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a piece of text into a dense vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;
}

/// Deterministic feature-hashing embedder.
///
/// Tokens are lowercased, hashed into `dims` buckets, counted, and the
/// resulting vector L2-normalized. Texts sharing vocabulary land close in
/// cosine space, which is all the in-process index needs.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dims as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for x in &mut vector {
                *x /= magnitude;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
