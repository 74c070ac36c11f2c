// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Task manager
//!
//! Single writer of task status. Owns the task registry, the
//! priority-ordered pending queue, the agent registry and the bounded
//! health channel.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use crate::domain::agent::CognitiveAgent;
use crate::domain::metrics::AgentHealth;
use crate::domain::task::{Task, TaskError, TaskStatus};

const HEALTH_CHANNEL_CAPACITY: usize = 100;

struct TaskState {
    tasks: HashMap<String, Task>,
    /// Ids of tasks still awaiting assignment.
    pending: Vec<String>,
}

pub struct TaskManager {
    state: RwLock<TaskState>,
    agents: RwLock<HashMap<String, CognitiveAgent>>,
    health_tx: mpsc::Sender<AgentHealth>,
    health_rx: Mutex<Option<mpsc::Receiver<AgentHealth>>>,
}

impl TaskManager {
    pub fn new() -> Arc<Self> {
        let (health_tx, health_rx) = mpsc::channel(HEALTH_CHANNEL_CAPACITY);
        Arc::new(Self {
            state: RwLock::new(TaskState {
                tasks: HashMap::new(),
                pending: Vec::new(),
            }),
            agents: RwLock::new(HashMap::new()),
            health_tx,
            health_rx: Mutex::new(Some(health_rx)),
        })
    }

    pub async fn add_task(&self, task: Task) -> Result<(), TaskError> {
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.id) {
            return Err(TaskError::Duplicate(task.id));
        }
        state.pending.push(task.id.clone());
        debug!(task_id = %task.id, priority = task.priority, "task added");
        state.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.state.read().await.tasks.get(task_id).cloned()
    }

    /// Pop the best pending task for `agent_id`: highest priority first,
    /// oldest `created_at` on ties, restricted to tasks that are unassigned
    /// or already assigned to this agent. Assignment is recorded here.
    pub async fn get_next_task(&self, agent_id: &str) -> Option<Task> {
        let mut state = self.state.write().await;
        let TaskState { tasks, pending } = &mut *state;

        let mut best: Option<(usize, i32, chrono::DateTime<chrono::Utc>)> = None;
        for (idx, id) in pending.iter().enumerate() {
            let Some(task) = tasks.get(id) else { continue };
            let eligible = match &task.assigned_to {
                None => true,
                Some(assignee) => assignee == agent_id,
            };
            if !eligible {
                continue;
            }

            let better = match best {
                None => true,
                Some((_, priority, created_at)) => {
                    task.priority > priority
                        || (task.priority == priority && task.created_at < created_at)
                }
            };
            if better {
                best = Some((idx, task.priority, task.created_at));
            }
        }

        let (idx, _, _) = best?;
        let id = pending.remove(idx);
        let task = tasks.get_mut(&id)?;
        task.assigned_to = Some(agent_id.to_string());
        Some(task.clone())
    }

    /// Apply a status transition, enforcing the DAG. `Running` stamps
    /// `started_at`; terminal states stamp `finished_at`.
    pub async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), TaskError> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        task.transition(status)
    }

    /// Reset a failed task to pending, consuming one retry, and requeue it.
    pub async fn retry_task(&self, task_id: &str) -> Result<(), TaskError> {
        let mut state = self.state.write().await;
        let TaskState { tasks, pending } = &mut *state;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        task.retry()?;
        pending.push(task_id.to_string());
        Ok(())
    }

    pub async fn register_agent(&self, agent: CognitiveAgent) {
        debug!(agent_id = %agent.id, agent_type = %agent.agent_type, "agent registered");
        self.agents.write().await.insert(agent.id.clone(), agent);
    }

    pub async fn unregister_agent(&self, agent_id: &str) {
        self.agents.write().await.remove(agent_id);
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<CognitiveAgent> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn agents(&self) -> Vec<CognitiveAgent> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn active_agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Push a health signal without blocking. A full channel surfaces as
    /// backpressure to the emitter rather than stalling it.
    pub fn emit_health(&self, health: AgentHealth) -> Result<(), TaskError> {
        self.health_tx
            .try_send(health)
            .map_err(|_| TaskError::HealthChannelFull)
    }

    /// Hand out the receiving side of the health channel. Single consumer;
    /// subsequent calls return `None`.
    pub async fn take_health_signals(&self) -> Option<mpsc::Receiver<AgentHealth>> {
        self.health_rx.lock().await.take()
    }

    pub async fn total_count(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn queued_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    pub async fn running_count(&self) -> usize {
        let state = self.state.read().await;
        state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    pub async fn completed_count(&self) -> usize {
        let state = self.state.read().await;
        state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Complete)
            .count()
    }

    /// Running tasks past their timeout. The supervising loop decides on
    /// reassignment; nothing is enforced here.
    pub async fn timed_out_tasks(&self) -> Vec<Task> {
        let state = self.state.read().await;
        state
            .tasks
            .values()
            .filter(|t| t.has_timed_out())
            .cloned()
            .collect()
    }
}
