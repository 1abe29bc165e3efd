// ============================================================
// Layer 1 — HTTP Presentation Layer
// ============================================================
// POST /suggest over axum.
//
//   request   {"prompt": "...", "max_length": 150}
//   200       {"suggestions": ["..."]}
//   400       {"detail": "Prompt cannot be empty."}
//   500       {"detail": "Model inference error."}
//
// The model is loaded once at startup and shared through the
// router state. Generation is CPU/GPU-bound, so each request
// runs on tokio's blocking pool.
//
// Reference: axum docs (Router, State, IntoResponse)

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};

use crate::application::suggest_use_case::SuggestUseCase;
use crate::domain::suggestion::{
    SuggestError, SuggestRequest, SuggestResponse, INFERENCE_ERROR_MESSAGE,
};
use crate::ml::{
    device::DevicePreference,
    inferencer::{InferBackend, Inferencer},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    pub model_dir: String,
    pub host:      String,
    pub port:      u16,
    pub device:    DevicePreference,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            model_dir: "models/flan_t5_local_trained".to_string(),
            host:      "0.0.0.0".to_string(),
            port:      8001,
            device:    DevicePreference::Auto,
        }
    }
}

// ─── Error body ───────────────────────────────────────────────────────────────
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// Status code + client-facing message
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: INFERENCE_ERROR_MESSAGE.to_string(),
        }
    }
}

impl From<SuggestError> for ApiError {
    fn from(err: SuggestError) -> Self {
        let status = match err {
            SuggestError::EmptyPrompt   => StatusCode::BAD_REQUEST,
            SuggestError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, detail: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

// ─── Routes ───────────────────────────────────────────────────────────────────
pub fn router(use_case: Arc<SuggestUseCase>) -> Router {
    Router::new()
        .route("/suggest", post(suggest))
        .with_state(use_case)
}

async fn suggest(
    State(use_case): State<Arc<SuggestUseCase>>,
    Json(request):   Json<SuggestRequest>,
) -> Result<Json<SuggestResponse>, ApiError> {
    let response = tokio::task::spawn_blocking(move || use_case.suggest(&request))
        .await
        .map_err(|e| {
            tracing::error!("Generation task did not complete: {e}");
            ApiError::internal()
        })??;
    Ok(Json(response))
}

// ─── Server ───────────────────────────────────────────────────────────────────
/// Load the model, bind, and serve until Ctrl-C.
pub async fn serve(config: ServeConfig) -> Result<()> {
    let model_dir = PathBuf::from(&config.model_dir);
    let device    = config.device.to_device();
    tracing::info!("Loading model from '{}'", model_dir.display());

    let inferencer = tokio::task::spawn_blocking(move || {
        Inferencer::<InferBackend>::load(&model_dir, device)
    })
    .await??;
    let use_case = Arc::new(SuggestUseCase::new(Arc::new(inferencer)));

    let addr     = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Cannot bind to {addr}"))?;
    tracing::info!("Serving POST /suggest on http://{}", listener.local_addr()?);

    axum::serve(listener, router(use_case))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
