//! HTTP transport for the dispatcher.
//!
//! One POST endpoint frames `{method, params, id?}` requests onto the
//! method table. A request without an id is a notification: it still
//! executes, but gets 204 No Content instead of a body.

use crate::dispatch::{Dispatcher, GatewayError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

/// One framed request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

fn error_code(error: &GatewayError) -> i64 {
    match error {
        GatewayError::MethodNotFound(_) => -32601,
        GatewayError::InvalidParams(_) => -32602,
        GatewayError::Internal(_) => -32603,
    }
}

async fn rpc_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(request): Json<RpcRequest>,
) -> Response {
    let outcome = dispatcher.dispatch(&request.method, request.params).await;

    let Some(id) = request.id else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match outcome {
        Ok(result) => Json(json!({ "id": id, "result": result })).into_response(),
        Err(error) => Json(json!({
            "id": id,
            "error": { "code": error_code(&error), "message": error.to_string() },
        }))
        .into_response(),
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the HTTP router over a dispatcher.
pub fn build_http_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/rpc", post(rpc_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Serve the gateway until the shutdown signal flips.
pub async fn serve(
    dispatcher: Arc<Dispatcher>,
    addr: &str,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), switchboard_core::Error> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| switchboard_core::Error::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!(addr, "Gateway listening");

    axum::serve(listener, build_http_router(dispatcher))
        .with_graceful_shutdown(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| switchboard_core::Error::Internal(format!("Gateway server error: {e}")))
}
