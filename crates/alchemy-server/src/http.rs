//! HTTP surface of the state service
//!
//! A single POST endpoint carrying the wire protocol, plus an
//! unauthenticated `/status` path for liveness checks. Every state
//! request must present the configured bearer token; the comparison is
//! constant-time so the token cannot be probed byte by byte.

use crate::service::StateService;
use alchemy_state::StateStore;
use alchemy_state::protocol::{WireError, WireRequest};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    service: StateService,
    token: Arc<str>,
}

/// Build the router for one state namespace.
pub fn router(service: StateService, token: impl Into<Arc<str>>) -> Router {
    let state = AppState {
        service,
        token: token.into(),
    };
    Router::new()
        .route("/state", post(handle_state))
        .route("/status", get(handle_status))
        .with_state(state)
}

/// Bind-and-serve convenience used by the daemon.
pub async fn serve(
    listener: tokio::net::TcpListener,
    store: Arc<dyn StateStore>,
    token: impl Into<Arc<str>>,
) -> std::io::Result<()> {
    let service = StateService::spawn(store);
    let app = router(service, token);
    tracing::info!(addr = %listener.local_addr()?, "state service listening");
    axum::serve(listener, app).await
}

async fn handle_status() -> &'static str {
    "ok"
}

async fn handle_state(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<WireRequest>, JsonRejection>,
) -> Response {
    if !authorized(&headers, &app.token) {
        tracing::warn!("state request with missing or invalid token");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "missing or invalid bearer token".to_string(),
            None,
        );
    }

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("malformed request body: {rejection}"),
                None,
            );
        }
    };

    match app.service.handle(request.clone()).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => {
            let status = e.status();
            // The request is echoed back on unexpected failures for
            // diagnosability; client mistakes get just the message.
            let echoed = if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(method = %request.method, error = %e, "state request failed");
                serde_json::to_value(&request).ok()
            } else {
                None
            };
            error_response(status, e.to_string(), echoed)
        }
    }
}

fn error_response(status: StatusCode, error: String, request: Option<serde_json::Value>) -> Response {
    (status, Json(WireError { error, request })).into_response()
}

fn authorized(headers: &HeaderMap, token: &str) -> bool {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match presented {
        Some(presented) => constant_time_eq(presented.as_bytes(), token.as_bytes()),
        None => false,
    }
}

/// Compare without short-circuiting on the first mismatching byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}
