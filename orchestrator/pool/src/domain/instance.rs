// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Pool Domain Aggregates
//!
//! Defines the core types for elastic worker pool management:
//!
//! - [`PoolInstance`] — one registered agent instance with its metrics.
//! - [`ScalingConfig`] — thresholds and cooldown for scale-out decisions.
//!
//! # Invariants
//!
//! - An instance belongs to exactly one type bucket, keyed by its agent's
//!   `agent_type`.
//! - Between two scale-out passes at least the cooldown period elapses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use hivemind_core::domain::agent::CognitiveAgent;
use hivemind_core::domain::metrics::AgentMetrics;

/// One agent instance registered with the pool orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInstance {
    pub agent: CognitiveAgent,
    /// When this instance was created by registration or cloning.
    pub registered_at: DateTime<Utc>,
    pub metrics: AgentMetrics,
}

impl PoolInstance {
    pub fn new(agent: CognitiveAgent) -> Self {
        let metrics = AgentMetrics::new(agent.id.clone());
        Self {
            agent,
            registered_at: Utc::now(),
            metrics,
        }
    }
}

/// Scale-out thresholds. A pass fires when any threshold is crossed and
/// the cooldown since the previous pass has elapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    /// Percent CPU at or above which the fleet is considered hot.
    pub cpu_threshold: f64,
    /// Percent memory at or above which the fleet is considered hot.
    pub memory_threshold: f64,
    /// Queue depth at or above which the fleet is considered hot.
    pub tasks_threshold: u64,
    /// Error-rate fraction at or above which the fleet is considered hot.
    pub error_threshold: f64,
    /// Minimum wall time between two scale-out passes.
    #[serde(with = "cooldown_seconds")]
    pub cooldown: Duration,
}

mod cooldown_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            tasks_threshold: 100,
            error_threshold: 0.05,
            cooldown: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = ScalingConfig::default();
        assert_eq!(config.cpu_threshold, 80.0);
        assert_eq!(config.memory_threshold, 85.0);
        assert_eq!(config.tasks_threshold, 100);
        assert_eq!(config.error_threshold, 0.05);
        assert_eq!(config.cooldown, Duration::from_secs(300));
    }

    #[test]
    fn test_pool_instance_inherits_agent_id() {
        let agent = CognitiveAgent::new("a1", "analysis", "A", "r", "g", "m");
        let instance = PoolInstance::new(agent);
        assert_eq!(instance.metrics.agent_id, "a1");
    }
}
