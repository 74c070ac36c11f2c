// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Provides lib functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Implements lib

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use infrastructure::*;

use std::sync::Arc;

use application::HybridMemoryManager;
use infrastructure::{HashingEmbedder, LongTermStore, SemanticStore, ShortTermStore};

/// Build a hybrid manager over the in-process tiers with the given config.
pub fn default_manager(config: MemoryConfig) -> HybridMemoryManager {
    HybridMemoryManager::new(
        Arc::new(ShortTermStore::new(config.short_term_ttl)),
        Arc::new(LongTermStore::new(
            config.prune_window,
            config.prune_importance_floor,
        )),
        Arc::new(SemanticStore::new(Arc::new(HashingEmbedder::default()))),
        config,
    )
}
