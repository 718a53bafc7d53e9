//! HTTP surface: the thin axum shell around the engine.
//!
//! Four endpoints under a poll-based contract: `POST /index_repo` kicks
//! off (or conflicts with) the background ingestion, `GET /progress`
//! polls its state, `POST /chat` answers questions, `GET /health`
//! reports readiness. Errors cross the boundary as kind + redacted
//! message; answer failures map to 502, conflicts to 409.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::Error;
use crate::job::{JobResult, StartOutcome};
use crate::query::{Citation, Confidence, Intent};

/// Builds the router over a shared engine.
#[must_use]
pub fn create_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/index_repo", post(index_repo))
        .route("/progress", get(progress))
        .route("/chat", post(chat))
        .route("/health", get(health))
        .with_state(engine)
}

/// Binds and serves the router until shutdown.
///
/// # Errors
///
/// Returns an I/O error when the port cannot be bound.
pub async fn serve(engine: Arc<Engine>) -> std::io::Result<()> {
    let port = engine.config().port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");
    axum::serve(listener, create_router(engine)).await
}

/// Request body for `POST /index_repo`.
#[derive(Debug, Deserialize)]
struct IndexRepoRequest {
    repo_url: String,
}

/// Accepted response for `POST /index_repo`.
#[derive(Debug, Serialize)]
struct IndexRepoResponse {
    message: String,
    repo_url: String,
    status: String,
}

async fn index_repo(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<IndexRepoRequest>,
) -> Response {
    match engine.start_ingest(&request.repo_url) {
        StartOutcome::Accepted => {
            tracing::info!(repo_url = %request.repo_url, "ingestion accepted");
            (
                StatusCode::ACCEPTED,
                Json(IndexRepoResponse {
                    message: "Repository indexing started".to_string(),
                    repo_url: request.repo_url,
                    status: "started".to_string(),
                }),
            )
                .into_response()
        }
        StartOutcome::Conflict => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "detail": "indexing in progress" })),
        )
            .into_response(),
    }
}

/// Response body for `GET /progress`.
#[derive(Debug, Serialize)]
struct ProgressResponse {
    progress: u8,
    stage: String,
    in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn progress(State(engine): State<Arc<Engine>>) -> Json<ProgressResponse> {
    let snapshot = engine.job_progress();
    Json(ProgressResponse {
        progress: snapshot.progress,
        stage: snapshot.stage,
        in_progress: snapshot.in_progress,
        repo_url: snapshot.repo_url,
        result: snapshot.result,
        error: snapshot.error.map(|e| e.message),
    })
}

/// Request body for `POST /chat`.
#[derive(Debug, Deserialize)]
struct ChatRequestBody {
    query: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    repo: Option<String>,
}

/// Response body for `POST /chat`.
#[derive(Debug, Serialize)]
struct ChatResponseBody {
    answer: String,
    sources: Vec<Citation>,
    confidence: Confidence,
    intent: Intent,
}

async fn chat(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, AppError> {
    if request.query.trim().is_empty() {
        return Err(AppError::BadRequest("query cannot be empty".to_string()));
    }

    let outcome = engine
        .chat(
            &request.query,
            request.repo.as_deref(),
            request.model.as_deref(),
        )
        .await?;

    Ok(Json(ChatResponseBody {
        answer: outcome.answer,
        sources: outcome.sources,
        confidence: outcome.confidence,
        intent: outcome.intent,
    }))
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    env_configured: bool,
    services: HealthServices,
}

#[derive(Debug, Serialize)]
struct HealthServices {
    ingestion: String,
    rag: String,
}

async fn health(State(engine): State<Arc<Engine>>) -> Json<HealthResponse> {
    let snapshot = engine.job_progress();
    Json(HealthResponse {
        status: "ok".to_string(),
        env_configured: engine.config().env_configured(),
        services: HealthServices {
            ingestion: if snapshot.in_progress {
                "busy".to_string()
            } else {
                "ready".to_string()
            },
            rag: "ready".to_string(),
        },
    })
}

/// Error envelope crossing the HTTP boundary.
enum AppError {
    BadRequest(String),
    Engine(Error),
}

impl From<Error> for AppError {
    fn from(inner: Error) -> Self {
        Self::Engine(inner)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::Engine(error) => {
                // Stack digests stay in the logs; clients get kind + message.
                tracing::error!(
                    kind = ?error.kind(),
                    stack_digest = %error.stack_digest(),
                    "request failed"
                );
                let status = match error {
                    Error::Conflict => StatusCode::CONFLICT,
                    Error::Answer(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string())
            }
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
