// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the memory bounded context

pub mod embedder;
pub mod long_term;
pub mod repository;
pub mod semantic;
pub mod short_term;

pub use embedder::{Embedder, HashingEmbedder};
pub use long_term::LongTermStore;
pub use repository::{MemoryStore, SemanticIndex};
pub use semantic::SemanticStore;
pub use short_term::ShortTermStore;
