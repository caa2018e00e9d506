//! HTTP surface for Topical.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /api/generate-summary` – Summarize a document of any length. Accepts `text` and
//!   an optional `topic`; returns the summary and the model identifier that produced it.
//! - `GET /` and `GET /health` – Liveness probes.
//! - `GET /metrics` – Observe summarization counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! When a client disconnects, hyper drops the handler future, which cancels the in-flight
//! pipeline along with any pending backend calls and backoff sleeps.

use crate::metrics::MetricsSnapshot;
use crate::processing::{Document, PipelineError, SummaryApi, SummaryOptions};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Build the HTTP router exposing the summarization API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: SummaryApi + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/generate-summary", post(generate_summary::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for `POST /api/generate-summary`.
#[derive(Deserialize)]
struct SummaryRequest {
    /// Raw document contents.
    #[serde(default)]
    text: Option<String>,
    /// Optional subject used as prompt context.
    #[serde(default)]
    topic: Option<String>,
}

/// Success response for `POST /api/generate-summary`.
#[derive(Serialize)]
struct SummaryResponse {
    summary: String,
    model: String,
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Topical API is running" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Summarize a document.
///
/// Blank or missing text is rejected with `400` before the pipeline runs. Pipeline failures
/// (single-pass backend errors, chunking errors, timeouts) map to `500`; per-chunk and reduce
/// failures never reach this layer because the pipeline degrades them into the summary text.
async fn generate_summary<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SummaryRequest>,
) -> Result<Json<SummaryResponse>, AppError>
where
    S: SummaryApi,
{
    let text = match request.text {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Err(AppError::InvalidInput),
    };
    let topic = request.topic.filter(|topic| !topic.trim().is_empty());

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("generate_summary", %request_id);
    summarize_document(service.as_ref(), text, topic)
        .instrument(span)
        .await
        .map(Json)
}

async fn summarize_document<S>(
    service: &S,
    text: String,
    topic: Option<String>,
) -> Result<SummaryResponse, AppError>
where
    S: SummaryApi,
{
    tracing::info!(
        chars = text.chars().count(),
        topic = topic.as_deref().unwrap_or("-"),
        "Summary request received"
    );
    let outcome = service
        .summarize(Document::new(text, topic), SummaryOptions::default())
        .await?;
    tracing::info!(
        kind = ?outcome.kind,
        chunks = outcome.chunk_count,
        unavailable = outcome.unavailable_chunks,
        "Summary request completed"
    );
    Ok(SummaryResponse {
        summary: outcome.summary,
        model: outcome.model,
    })
}

/// Return the current summarization counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsResponse>
where
    S: SummaryApi,
{
    Json(MetricsResponse {
        model: service.model().to_string(),
        counters: service.metrics_snapshot(),
    })
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    model: String,
    #[serde(flatten)]
    counters: MetricsSnapshot,
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "generate_summary",
                method: "POST",
                path: "/api/generate-summary",
                description: "Summarize a document of any length, chunking long input and combining section summaries. Response returns { \"summary\": string, \"model\": string }.",
                request_example: Some(json!({
                    "text": "Document contents",
                    "topic": "Optional subject"
                })),
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return summarization counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    InvalidInput,
    Pipeline(PipelineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::InvalidInput => (
                StatusCode::BAD_REQUEST,
                "Invalid or missing input text".to_string(),
            ),
            Self::Pipeline(error) => {
                tracing::error!(error = %error, "Summary request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {error}"),
                )
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}
