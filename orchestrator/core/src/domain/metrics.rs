// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Gauges and counters sampled per agent instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub agent_id: String,
    /// CPU usage in percent.
    pub cpu_usage: f64,
    /// Resident memory in bytes, as published on the metric queue.
    pub memory_usage: u64,
    /// Resident memory as a percent of available memory; the scaling
    /// thresholds compare against this, never against raw bytes.
    pub memory_percent: f64,
    pub tasks_in_queue: u64,
    /// Moving-average response time in seconds.
    pub response_time: f64,
    /// Fraction of failed tasks, in [0, 1].
    pub error_rate: f64,
    /// Unix seconds of the last sample.
    pub last_updated: i64,
}

impl AgentMetrics {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now().timestamp();
    }
}

/// Fleet-wide averages plus the total task count. `memory_usage` is a
/// percent, matching the scaling thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub task_count: u64,
    pub error_rate: f64,
}

impl SystemMetrics {
    /// Arithmetic means across the fleet; tasks are summed.
    pub fn aggregate<'a>(metrics: impl Iterator<Item = &'a AgentMetrics>) -> Self {
        let mut total = SystemMetrics::default();
        let mut count = 0u64;
        for m in metrics {
            total.cpu_usage += m.cpu_usage;
            total.memory_usage += m.memory_percent;
            total.task_count += m.tasks_in_queue;
            total.error_rate += m.error_rate;
            count += 1;
        }
        if count > 0 {
            total.cpu_usage /= count as f64;
            total.memory_usage /= count as f64;
            total.error_rate /= count as f64;
        }
        total
    }
}

/// Per-agent liveness and performance snapshot pushed through the bounded
/// health channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: String,
    pub last_heartbeat: chrono::DateTime<Utc>,
    pub is_processing: bool,
    pub current_task_id: Option<String>,
    pub processing_time: f64,
    pub success_rate: f64,
}

/// Body published on `metrics.<agent>.<metric>` queues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub timestamp: i64,
}

impl MetricSample {
    pub fn now(value: f64) -> Self {
        Self {
            value,
            timestamp: Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_averages_and_sums() {
        let mut a = AgentMetrics::new("a");
        a.cpu_usage = 80.0;
        a.memory_percent = 20.0;
        a.tasks_in_queue = 10;
        a.error_rate = 0.2;

        let mut b = AgentMetrics::new("b");
        b.cpu_usage = 40.0;
        b.memory_percent = 60.0;
        b.tasks_in_queue = 30;
        b.error_rate = 0.0;

        let sys = SystemMetrics::aggregate([&a, &b].into_iter());
        assert_eq!(sys.cpu_usage, 60.0);
        assert_eq!(sys.memory_usage, 40.0);
        assert_eq!(sys.task_count, 40);
        assert!((sys.error_rate - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_empty_fleet_is_zero() {
        let sys = SystemMetrics::aggregate(std::iter::empty());
        assert_eq!(sys, SystemMetrics::default());
    }

    #[test]
    fn test_metric_sample_wire_shape() {
        let sample = MetricSample::now(42.5);
        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(json["value"], 42.5);
        assert!(json["timestamp"].is_i64());
    }
}
