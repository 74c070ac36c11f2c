// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use reqwest::Client;

use crate::types::{
    AgentsResponse, MetricsResponse, ResultsResponse, SubmitResponse, SubmitTask,
};

/// Client for interacting with a HiveMind node.
pub struct HiveMindClient {
    base_url: String,
    client: Client,
    api_key: Option<String>,
}

impl HiveMindClient {
    /// Create a new HiveMind client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
            api_key: None,
        }
    }

    /// Set the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {key}")),
            None => req,
        }
    }

    /// Submit a task request for decomposition and processing.
    pub async fn submit_task(&self, task: &SubmitTask) -> Result<SubmitResponse> {
        let url = format!("{}/api/v1/tasks", self.base_url);
        let response = self.authorize(self.client.post(&url).json(task)).send().await?;
        Ok(response.json().await?)
    }

    /// Fetch all results collected so far for a parent task.
    pub async fn results(&self, parent_id: &str) -> Result<ResultsResponse> {
        let url = format!("{}/api/v1/results/{}", self.base_url, parent_id);
        let response = self.authorize(self.client.get(&url)).send().await?;
        Ok(response.json().await?)
    }

    /// Read the node's fleet metrics and task counters.
    pub async fn metrics(&self) -> Result<MetricsResponse> {
        let url = format!("{}/api/v1/metrics", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        Ok(response.json().await?)
    }

    /// List registered agent instances.
    pub async fn agents(&self) -> Result<AgentsResponse> {
        let url = format!("{}/api/v1/agents", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        Ok(response.json().await?)
    }
}
