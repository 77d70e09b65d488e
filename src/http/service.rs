//! Request handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::dispatch::{Decision, Dispatcher};
use crate::ratelimit::Algorithm;

/// A configured limiter as listed by `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterInfo {
    pub name: String,
    pub algorithm: Algorithm,
}

/// Build the router over `dispatcher`.
///
/// `/health` is matched before `/{name}`, so a limiter named `health` is not
/// reachable over HTTP.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(list_limiters))
        .route("/health", get(health))
        .route("/:name", any(admit))
        .with_state(dispatcher)
}

async fn list_limiters(State(dispatcher): State<Arc<Dispatcher>>) -> Json<Vec<LimiterInfo>> {
    Json(
        dispatcher
            .entries()
            .map(|(name, algorithm)| LimiterInfo {
                name: name.to_string(),
                algorithm,
            })
            .collect(),
    )
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[instrument(skip_all, fields(name = %name))]
async fn admit(State(dispatcher): State<Arc<Dispatcher>>, Path(name): Path<String>) -> Response {
    match dispatcher.check(&name).await {
        Ok(Decision::Admitted) => (StatusCode::OK, "ok").into_response(),
        Ok(Decision::Rejected) => {
            debug!("Request rejected");
            (StatusCode::TOO_MANY_REQUESTS, "too many requests").into_response()
        }
        Err(err) => {
            debug!(error = %err, "No such limiter");
            (StatusCode::NOT_FOUND, err.to_string()).into_response()
        }
    }
}
