//! Local HTTP ingest server.
//!
//! Browser pages and extensions cannot reach OS input hooks, so they post
//! what they observe to the agent instead. This module provides an HTTP
//! server that:
//! - Accepts batches of raw input events via POST /events
//! - Exposes the controller status and step-up/logout controls
//!
//! # Architecture
//!
//! ```text
//! Browser page ──→ POST /events ──→ input queue ──→ capture session
//!                  POST /step-up ──→ controller ──→ verdict service
//! ```

use crate::collector::{CaptureError, InputEvent, InputSink};
use crate::core::{ControllerError, ControllerHandle, ControllerStatus, StepUpError};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    /// Producer side of the capture queue
    sink: InputSink,
    /// Controller commands
    handle: ControllerHandle,
}

impl ServerState {
    pub fn new(sink: InputSink, handle: ControllerHandle) -> Self {
        Self { sink, handle }
    }
}

/// Batch of input events posted by a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<InputEvent>,
}

/// Response from the events endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub accepted: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepUpRequest {
    pub code: String,
}

/// Response from the step-up and logout endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub status: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

fn controller_gone(e: ControllerError) -> ApiError {
    api_error(StatusCode::SERVICE_UNAVAILABLE, "CONTROLLER_CLOSED", e)
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /events
///
/// Queues each event for the open capture session. Events that do not fit
/// in the queue are counted as dropped; the rest of the batch is still tried.
async fn events(
    State(state): State<Arc<ServerState>>,
    Json(batch): Json<EventBatch>,
) -> Result<Json<EventsResponse>, ApiError> {
    let mut accepted = 0;
    let mut dropped = 0;

    for event in batch.events {
        match state.sink.send(event) {
            Ok(()) => accepted += 1,
            Err(CaptureError::QueueFull) => dropped += 1,
            Err(e @ CaptureError::Disconnected) => {
                return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "CAPTURE_CLOSED", e));
            }
        }
    }

    if dropped > 0 {
        tracing::warn!(dropped, "input queue full, events dropped");
    }

    Ok(Json(EventsResponse { accepted, dropped }))
}

/// GET /status
async fn status(State(state): State<Arc<ServerState>>) -> Result<Json<ControllerStatus>, ApiError> {
    state.handle.status().await.map(Json).map_err(controller_gone)
}

/// POST /step-up
async fn step_up(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<StepUpRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    match state
        .handle
        .verify_step_up(request.code)
        .await
        .map_err(controller_gone)?
    {
        Ok(()) => Ok(Json(ActionResponse {
            status: "verified".to_string(),
        })),
        Err(e @ StepUpError::InvalidCode { .. }) => {
            Err(api_error(StatusCode::BAD_REQUEST, "INVALID_CODE", e))
        }
        Err(e @ StepUpError::NotAwaiting) => Err(api_error(StatusCode::CONFLICT, "NOT_AWAITING", e)),
    }
}

/// POST /logout
async fn logout(State(state): State<Arc<ServerState>>) -> Result<Json<ActionResponse>, ApiError> {
    let logged_out = state.handle.logout().await.map_err(controller_gone)?;
    let status = if logged_out { "logged_out" } else { "idle" };
    Ok(Json(ActionResponse {
        status: status.to_string(),
    }))
}

/// Build the router for the given state.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(events))
        .route("/status", get(status))
        .route("/step-up", post(step_up))
        .route("/logout", post(logout))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::new(state))
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Ingest server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
