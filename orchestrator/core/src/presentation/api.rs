// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::result_collector::ResultCollector;
use crate::application::task_manager::TaskManager;
use crate::domain::metrics::SystemMetrics;
use crate::infrastructure::broker::{MessageBroker, PublishOptions, INPUT_QUEUE};

/// Source of aggregated fleet metrics, implemented by the pool
/// orchestrator.
#[async_trait::async_trait]
pub trait MetricsSource: Send + Sync {
    async fn system_metrics(&self) -> SystemMetrics;
}

pub struct AppState {
    pub broker: Arc<dyn MessageBroker>,
    pub collector: Arc<ResultCollector>,
    pub task_manager: Arc<TaskManager>,
    pub metrics: Arc<dyn MetricsSource>,
}

pub fn app(
    broker: Arc<dyn MessageBroker>,
    collector: Arc<ResultCollector>,
    task_manager: Arc<TaskManager>,
    metrics: Arc<dyn MetricsSource>,
) -> Router {
    let state = Arc::new(AppState {
        broker,
        collector,
        task_manager,
        metrics,
    });

    Router::new()
        .route("/api/v1/tasks", post(submit_task))
        .route("/api/v1/results/:parent_id", get(get_results))
        .route("/api/v1/metrics", get(get_metrics))
        .route("/api/v1/agents", get(list_agents))
        .with_state(state)
}

#[derive(serde::Deserialize)]
pub struct SubmitTaskRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub parameters: std::collections::HashMap<String, serde_json::Value>,
}

async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitTaskRequest>,
) -> Json<serde_json::Value> {
    let request = crate::domain::task::TaskRequest {
        id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        description: payload.description,
        parameters: payload.parameters,
    };

    let body = match serde_json::to_vec(&request) {
        Ok(body) => body,
        Err(e) => return Json(json!({ "error": e.to_string() })),
    };

    match state
        .broker
        .publish(INPUT_QUEUE, &body, PublishOptions::persistent())
        .await
    {
        Ok(()) => Json(json!({ "task_id": request.id })),
        Err(e) => Json(json!({ "error": e.to_string() })),
    }
}

async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(parent_id): Path<String>,
) -> Json<serde_json::Value> {
    let results = state.collector.results_for(&parent_id).await;
    Json(json!({ "parent_id": parent_id, "results": results }))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let system = state.metrics.system_metrics().await;
    Json(json!({
        "system": system,
        "tasks": {
            "total": state.task_manager.total_count().await,
            "queued": state.task_manager.queued_count().await,
            "running": state.task_manager.running_count().await,
            "completed": state.task_manager.completed_count().await,
        },
    }))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let agents: Vec<serde_json::Value> = state
        .task_manager
        .agents()
        .await
        .into_iter()
        .map(|a| {
            json!({
                "id": a.id,
                "type": a.agent_type,
                "name": a.name,
                "role": a.role,
            })
        })
        .collect();
    Json(json!({ "agents": agents }))
}
