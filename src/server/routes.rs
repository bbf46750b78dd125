use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::errors::AndroidUseResult;
use crate::llm::ProviderRegistry;
use crate::memory::MemoryStats;
use crate::server::manager::AgentManager;
use crate::server::ws;
use crate::swarm::SwarmMode;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AgentManager>,
}

/// Task submission body, shared by agent and swarm starts.
#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default)]
    pub mode: Option<String>,
}

pub fn router(manager: Arc<AgentManager>) -> Router {
    Router::new()
        .route("/agent/start", post(start_agent))
        .route("/agent/stop", post(stop_agent))
        .route("/agent/pause", post(pause_agent))
        .route("/agent/resume", post(resume_agent))
        .route("/swarm/start", post(start_swarm))
        .route("/memory/stats", get(memory_stats))
        .route("/ws", get(ws::websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(AppState { manager })
}

/// Bind the gateway and serve until the process exits.
pub async fn serve(config: AppConfig, registry: Arc<ProviderRegistry>) -> AndroidUseResult<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let manager = Arc::new(AgentManager::new(config, registry));
    let app = router(manager);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn start_agent(State(state): State<AppState>, Json(req): Json<TaskRequest>) -> Json<Value> {
    tracing::info!(task = %req.task, "start requested");
    state.manager.start_task(&req.task).await;
    Json(json!({"status": "started"}))
}

async fn start_swarm(State(state): State<AppState>, Json(req): Json<TaskRequest>) -> Json<Value> {
    let mode = SwarmMode::parse(req.mode.as_deref().unwrap_or("simulate"));
    tracing::info!(task = %req.task, mode = mode.as_str(), "swarm requested");
    state.manager.start_swarm(&req.task, mode).await;
    Json(json!({"status": "swarm_started", "mode": mode.as_str()}))
}

async fn stop_agent(State(state): State<AppState>) -> Json<Value> {
    state.manager.stop().await;
    Json(json!({"status": "stopped"}))
}

async fn pause_agent(State(state): State<AppState>) -> Json<Value> {
    state.manager.pause().await;
    Json(json!({"status": "paused"}))
}

async fn resume_agent(State(state): State<AppState>) -> Json<Value> {
    state.manager.resume().await;
    Json(json!({"status": "resumed"}))
}

async fn memory_stats(State(state): State<AppState>) -> Json<MemoryStats> {
    Json(state.manager.memory_stats().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_request_accepts_optional_mode() {
        let req: TaskRequest = serde_json::from_str(r#"{"task": "open settings"}"#).unwrap();
        assert_eq!(req.task, "open settings");
        assert_eq!(req.mode, None);

        let req: TaskRequest =
            serde_json::from_str(r#"{"task": "plan a trip", "mode": "real"}"#).unwrap();
        assert_eq!(req.mode.as_deref(), Some("real"));
    }

    #[test]
    fn unknown_mode_falls_back_to_simulate() {
        let mode = SwarmMode::parse("production");
        assert_eq!(mode, SwarmMode::Simulate);
    }
}
