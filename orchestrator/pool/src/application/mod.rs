// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod metrics_collector;
pub mod orchestrator;

pub use metrics_collector::{CollectorConfig, MetricsCollector, ResourceSampler, StubSampler};
pub use orchestrator::PoolOrchestrator;
