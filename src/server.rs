// Copyright 2026 Sitepack Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP front end.
//!
//! A thin surface over the pipeline: one extraction endpoint that accepts
//! a target URL plus a rendering flag and answers with the finished zip
//! bytes, and a health probe. Errors come back as a structured
//! `{"error": {"kind", "message"}}` body; the kind tags are the stable
//! strings from the error taxonomy.

use crate::error::ExtractError;
use crate::maintenance;
use crate::pipeline::{ExtractRequest, Pipeline};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};

/// State shared by every request handler.
pub struct SharedState {
    pub pipeline: Pipeline,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<SharedState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/extract", post(handle_extract))
        .layer(cors)
        .with_state(state)
}

/// Start the server on the given port, with the archive reaper running
/// alongside it.
pub async fn start(port: u16, state: Arc<SharedState>) -> anyhow::Result<()> {
    let shutdown = Arc::new(Notify::new());
    let reaper = maintenance::spawn(state.pipeline.out_dir().clone(), Arc::clone(&shutdown));

    let app = router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("sitepack listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app).await;

    shutdown.notify_waiters();
    let _ = reaper.await;
    served?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct ExtractParams {
    url: String,
    #[serde(default)]
    render: bool,
}

async fn handle_extract(
    State(state): State<Arc<SharedState>>,
    Json(params): Json<ExtractParams>,
) -> Response {
    let outcome = state
        .pipeline
        .run(ExtractRequest {
            url: params.url,
            render: params.render,
        })
        .await;

    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => return error_response(&e),
    };

    let bytes = match tokio::fs::read(&outcome.archive.path).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("finished archive unreadable: {e}");
            return error_response(&ExtractError::ArchiveWrite {
                message: "archive unreadable after build".to_string(),
            });
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", outcome.archive.filename),
            ),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate".to_string()),
        ],
        bytes,
    )
        .into_response()
}

fn error_response(error: &ExtractError) -> Response {
    let status = match error {
        ExtractError::ArchiveWrite { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(json!({
            "error": {
                "kind": error.kind(),
                "message": error.to_string(),
            }
        })),
    )
        .into_response()
}
