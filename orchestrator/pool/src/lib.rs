// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Pool Orchestration
//!
//! Elastic scaling of the cognitive worker fleet:
//!
//! - [`PoolOrchestrator`](application::PoolOrchestrator) — instance
//!   registry and cooldown-guarded scale-out by cloning.
//! - [`MetricsCollector`](application::MetricsCollector) — periodic
//!   sampling and per-metric queue publishing.

pub mod application;
pub mod domain;

pub use application::*;
pub use domain::*;
