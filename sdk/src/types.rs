// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Task submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
}

/// One subtask result as reported by the node.
#[derive(Debug, Clone, Deserialize)]
pub struct SubtaskResult {
    pub task_id: String,
    pub parent_id: String,
    pub agent_id: String,
    pub status: String,
    #[serde(default)]
    pub result: HashMap<String, serde_json::Value>,
    pub completed_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ResultsResponse {
    pub parent_id: String,
    pub results: Vec<SubtaskResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct AgentsResponse {
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemMetricsView {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub task_count: u64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskCounters {
    pub total: u64,
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
}

#[derive(Debug, Deserialize)]
pub struct MetricsResponse {
    pub system: SystemMetricsView,
    pub tasks: TaskCounters,
}
