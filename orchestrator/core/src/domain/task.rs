// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

/// Current state of a task.
///
/// Transitions form a DAG: `Pending -> Running -> {Complete | Failed |
/// Cancelled}`. Terminal states are permanent; the only way out of `Failed`
/// is an explicit retry while attempts remain, which resets to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, TaskStatus::Running)
                | (Self::Running, TaskStatus::Complete)
                | (Self::Running, TaskStatus::Failed)
                | (Self::Running, TaskStatus::Cancelled)
        )
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task already exists: {0}")]
    Duplicate(String),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("illegal status transition {from:?} -> {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("task {0} has no retries left")]
    RetriesExhausted(String),

    #[error("health channel full")]
    HealthChannelFull,
}

/// A unit of work owned by the TaskManager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Routing key: a worker only processes tasks of its own type.
    #[serde(rename = "type")]
    pub task_type: String,
    pub description: String,
    pub input: HashMap<String, serde_json::Value>,
    pub output: HashMap<String, serde_json::Value>,
    pub status: TaskStatus,
    /// Larger values are scheduled earlier.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Written once at assignment, cleared only on retry.
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retries: u32,
    pub max_retries: u32,
    #[serde(with = "timeout_seconds")]
    pub timeout: Duration,
    pub dependencies: HashSet<String>,
}

mod timeout_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        task_type: impl Into<String>,
        description: impl Into<String>,
        input: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            task_type: task_type.into(),
            description: description.into(),
            input,
            output: HashMap::new(),
            status: TaskStatus::Pending,
            priority: 1,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            assigned_to: None,
            error: None,
            retries: 0,
            max_retries: 3,
            timeout: Duration::from_secs(5 * 60),
            dependencies: HashSet::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_dependency(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.insert(task_id.into());
        self
    }

    /// Move the task to `next`, enforcing the transition DAG.
    /// Entering `Running` stamps `started_at`; entering a terminal state
    /// stamps `finished_at`.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        match next {
            TaskStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
            }
            s if s.is_terminal() => {
                self.finished_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retries < self.max_retries
    }

    /// Reset a failed task back to pending, consuming one retry.
    pub fn retry(&mut self) -> Result<(), TaskError> {
        if !self.can_retry() {
            return Err(TaskError::RetriesExhausted(self.id.clone()));
        }
        self.retries += 1;
        self.status = TaskStatus::Pending;
        self.assigned_to = None;
        self.finished_at = None;
        self.error = None;
        Ok(())
    }

    /// Whether the task has outlived its timeout. Observability only; the
    /// supervising loop decides what to do about it.
    pub fn has_timed_out(&self) -> bool {
        match self.started_at {
            Some(started_at) if self.status == TaskStatus::Running => {
                let elapsed = (Utc::now() - started_at).to_std().unwrap_or_default();
                elapsed > self.timeout
            }
            _ => false,
        }
    }

    pub fn duration(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            (Some(start), None) => (Utc::now() - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }
}

/// Request submitted by an external producer on the input queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

/// A typed unit of work derived from a parent request, published on the
/// shared task queue and routed to workers by `task_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub status: TaskStatus,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

/// Outcome of processing a subtask, published on the results queue.
/// Consumers must treat duplicates idempotently: at-least-once delivery can
/// replay both subtasks and results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub parent_id: String,
    pub agent_id: String,
    pub status: TaskResultStatus,
    pub result: HashMap<String, serde_json::Value>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Completed,
    Failed,
}
