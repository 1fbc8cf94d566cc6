//! The Agora HTTP gateway server.
//!
//! Maps the dispatcher's transport-agnostic operations onto REST routes, with
//! streaming exposed as Server-Sent Events (one event per chunk, named by
//! chunk kind).

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use agora_core::{ExecutionRequest, ExecutionResponse};
use agora_runtime::{AgentRuntime, AgentSummary};

use crate::error::ApiError;

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub runtime: Arc<AgentRuntime>,
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/agents", get(list_agents))
        .route("/api/agents/:id", get(get_agent))
        .route("/api/agents/:id/simulate", post(simulate))
        .route("/api/agents/:id/execute", post(execute))
        .route("/api/agents/:id/stream", post(stream))
        .with_state(state)
}

/// Serve the gateway until the listener is closed.
pub async fn start_server(addr: SocketAddr, state: GatewayState) -> Result<()> {
    let app = router(state);
    info!("Gateway HTTP server listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_agents(State(state): State<GatewayState>) -> Json<Vec<AgentSummary>> {
    Json(state.runtime.list_agents().await)
}

async fn get_agent(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<AgentSummary>, ApiError> {
    Ok(Json(state.runtime.get_agent(&id).await?))
}

async fn simulate(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    Ok(Json(state.runtime.dispatcher().simulate(&id, request).await?))
}

async fn execute(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    Ok(Json(state.runtime.dispatcher().execute(&id, request).await?))
}

async fn stream(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let chunks = state
        .runtime
        .dispatcher()
        .execute_streaming(&id, request)
        .await?;

    let events = chunks.map(|chunk| {
        let event = Event::default().event(chunk.kind());
        let event = match event.json_data(&chunk) {
            Ok(event) => event,
            // Comment-only event keeps the stream well-formed.
            Err(_) => Event::default().comment("unserializable chunk"),
        };
        Ok(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
