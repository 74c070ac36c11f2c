// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration loading
//!
//! YAML files discovered under a config directory (`agents.yaml`,
//! `tasks.yaml`, `tools.yaml`) plus environment overrides for the broker,
//! memory backends and the LLM service. Parse failures are fatal at
//! startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// One agent entry in `agents.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Routing key; workers of this type consume matching subtasks.
    #[serde(rename = "type")]
    pub agent_type: String,
    pub role: String,
    pub goal: String,
    pub model: String,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default)]
    pub backstory: String,
    /// How many instances to start.
    #[serde(default = "default_replicas")]
    pub replicas: u32,
}

fn default_max_rounds() -> u32 {
    10
}

fn default_replicas() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    pub agents: Vec<AgentConfig>,
}

/// One seed task entry in `tasks.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub deadline: Option<String>,
}

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksConfig {
    pub tasks: Vec<TaskConfig>,
}

/// One tool entry in `tools.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub tools: HashMap<String, Vec<ToolConfig>>,
}

fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl AgentsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_yaml(path.as_ref())
    }
}

impl TasksConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_yaml(path.as_ref())
    }
}

impl ToolsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_yaml(path.as_ref())
    }
}

/// All config files discovered under one directory. Missing optional
/// files fall back to empty defaults; a present-but-invalid file is fatal.
#[derive(Debug, Clone, Default)]
pub struct PlatformConfig {
    pub agents: AgentsConfig,
    pub tasks: TasksConfig,
    pub tools: ToolsConfig,
    pub settings: PlatformSettings,
}

impl PlatformConfig {
    pub fn discover(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = config_dir.as_ref();

        let agents_path = dir.join("agents.yaml");
        let agents = if agents_path.exists() {
            AgentsConfig::load(&agents_path)?
        } else {
            AgentsConfig::default()
        };

        let tasks_path = dir.join("tasks.yaml");
        let tasks = if tasks_path.exists() {
            TasksConfig::load(&tasks_path)?
        } else {
            TasksConfig::default()
        };

        let tools_path = dir.join("tools.yaml");
        let tools = if tools_path.exists() {
            ToolsConfig::load(&tools_path)?
        } else {
            ToolsConfig::default()
        };

        Ok(Self {
            agents,
            tasks,
            tools,
            settings: PlatformSettings::from_env(),
        })
    }
}

/// Environment-driven connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub broker_host: String,
    pub broker_port: u16,
    pub redis_url: String,
    pub mongo_url: String,
    pub weaviate_url: String,
    pub llm_service_url: String,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 5672,
            redis_url: "redis://localhost:6379".to_string(),
            mongo_url: "mongodb://localhost:27017".to_string(),
            weaviate_url: "http://localhost:8080".to_string(),
            llm_service_url: "http://localhost:8000".to_string(),
        }
    }
}

impl PlatformSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            broker_host: std::env::var("HIVEMIND_BROKER_HOST").unwrap_or(defaults.broker_host),
            broker_port: std::env::var("HIVEMIND_BROKER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.broker_port),
            redis_url: std::env::var("HIVEMIND_REDIS_URL").unwrap_or(defaults.redis_url),
            mongo_url: std::env::var("HIVEMIND_MONGO_URL").unwrap_or(defaults.mongo_url),
            weaviate_url: std::env::var("HIVEMIND_WEAVIATE_URL").unwrap_or(defaults.weaviate_url),
            llm_service_url: std::env::var("HIVEMIND_LLM_URL").unwrap_or(defaults.llm_service_url),
        }
    }
}
