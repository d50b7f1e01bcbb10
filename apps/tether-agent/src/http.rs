//! Local control HTTP surface: identity verification plus inert lifecycle stubs.

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::identity::{IdentityProvider, local_username};

#[derive(Clone)]
pub struct HttpState {
    identity: Arc<dyn IdentityProvider>,
}

impl HttpState {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Shutdown,
    Restart,
    Format,
}

impl LifecycleAction {
    fn label(self) -> &'static str {
        match self {
            LifecycleAction::Shutdown => "Shutdown",
            LifecycleAction::Restart => "Restart",
            LifecycleAction::Format => "Format",
        }
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/verify_id", post(verify_id))
        .route("/shutdown/", post(|| lifecycle(LifecycleAction::Shutdown, None)))
        .route(
            "/shutdown/*device_id",
            post(|Path(id): Path<String>| lifecycle(LifecycleAction::Shutdown, Some(id))),
        )
        .route("/restart/", post(|| lifecycle(LifecycleAction::Restart, None)))
        .route(
            "/restart/*device_id",
            post(|Path(id): Path<String>| lifecycle(LifecycleAction::Restart, Some(id))),
        )
        .route("/format/", post(|| lifecycle(LifecycleAction::Format, None)))
        .route(
            "/format/*device_id",
            post(|Path(id): Path<String>| lifecycle(LifecycleAction::Format, Some(id))),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind control http listener on {addr}"))
}

pub async fn serve(
    listener: TcpListener,
    state: HttpState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "control http surface listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("control http server exited with error")
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"status": "error", "error": message}))).into_response()
}

async fn verify_id(State(state): State<HttpState>, body: Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<Value>(&body) else {
        return error(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    let provided = request
        .get("user_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if provided.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Missing user_id in request");
    }

    let identity = match state.identity.identity() {
        Ok(identity) => identity,
        Err(err) => {
            warn!(error = %err, "cannot read local identity for verification");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read device ID");
        }
    };
    if provided != identity {
        warn!(expected = %identity, %provided, "device id mismatch");
        return error(StatusCode::UNAUTHORIZED, "Device ID mismatch");
    }

    info!(%identity, "device verified");
    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "user": local_username(),
            "user_id": identity,
        })),
    )
        .into_response()
}

async fn lifecycle(action: LifecycleAction, device_id: Option<String>) -> Response {
    let Some(device_id) = device_id.filter(|id| !id.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "Missing device_id in URL");
    };
    warn!(
        action = action.label(),
        %device_id,
        "lifecycle request received; logging only, no action taken"
    );
    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "message": format!("{} request logged (no action taken)", action.label()),
        })),
    )
        .into_response()
}
