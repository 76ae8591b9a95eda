//! HTTP surface for the relay.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /api/upload` – Multipart upload (field `files`, at most `MAX_FILES_PER_REQUEST`). Each
//!   file is extracted and PII-filtered independently; the response carries one result per file
//!   plus a `{total_files, successful, failed}` summary.
//! - `POST /api/chat` – Clean a prompt, redact supplied document texts, assemble the payload, and
//!   relay it to the selected provider.
//! - `GET /api/providers` – Configured providers and their models.
//! - `GET /metrics` – Observe upload, redaction, and chat counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Error bodies carry only a failure kind and a short reason.

use crate::dispatch::DispatchResponse;
use crate::metrics::MetricsSnapshot;
use crate::processing::{
    BatchError, BatchReport, BatchSummary, FailureKind, FailureReport, UploadResult, UploadedFile,
};
use crate::prompt::{AssemblyDocument, DocumentInfo};
use crate::service::{ChatError, ChatRequest, RelayApi};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// Multipart field carrying uploaded files.
const FILES_FIELD: &str = "files";

/// Build the HTTP router exposing the relay API surface.
///
/// `max_body_bytes` bounds the whole request body; per-file limits are enforced by the pipeline.
pub fn create_router<S>(service: Arc<S>, max_body_bytes: usize) -> Router
where
    S: RelayApi + 'static,
{
    Router::new()
        .route("/api/upload", post(upload_files::<S>))
        .route("/api/chat", post(chat::<S>))
        .route("/api/providers", get(list_providers::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands::<S>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(service)
}

/// Upload response body, shared with the offline scanner.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Identifier correlating this batch in logs.
    pub batch_id: String,
    /// RFC 3339 timestamp of completion.
    pub processed_at: String,
    /// Whether at least one file succeeded.
    pub success: bool,
    /// Per-file results in upload order.
    pub results: Vec<UploadResult>,
    /// Reconciled totals.
    pub summary: BatchSummary,
}

impl UploadResponse {
    /// Render a processed batch under the given identifier.
    pub fn new(batch_id: Uuid, report: &BatchReport) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            processed_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            success: report.summary.successful > 0,
            results: report.results(),
            summary: report.summary,
        }
    }
}

/// Process up to `max_files` uploaded documents.
///
/// The file count is checked while reading the multipart stream, so an oversized batch is
/// rejected before any file is extracted.
async fn upload_files<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: RelayApi,
{
    let limit = service.max_files();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        if files.len() == limit {
            return Err(BatchError::TooManyFiles {
                count: files.len() + 1,
                limit,
            }
            .into());
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        files.push(UploadedFile::new(filename, content_type, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(AppError {
            status: StatusCode::BAD_REQUEST,
            kind: None,
            reason: format!("no files uploaded in field `{FILES_FIELD}`"),
        });
    }

    let batch_id = Uuid::new_v4();
    let report = service.process_uploads(files).await?;
    tracing::info!(
        batch_id = %batch_id,
        total = report.summary.total_files,
        successful = report.summary.successful,
        failed = report.summary.failed,
        "Upload request completed"
    );
    Ok(Json(UploadResponse::new(batch_id, &report)))
}

/// Document supplied inline with a chat request.
#[derive(Deserialize)]
struct ChatDocument {
    /// Optional label shown in the payload (defaults to `document-<n>`).
    #[serde(default)]
    filename: Option<String>,
    /// Document text, typically `filtered_text` from a prior upload.
    content: String,
}

/// Request body for `POST /api/chat`.
#[derive(Deserialize)]
struct ChatBody {
    prompt: String,
    llm_provider: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    documents: Vec<ChatDocument>,
    /// Unlabeled document texts, appended after `documents`.
    #[serde(default)]
    file_contents: Vec<String>,
}

impl ChatBody {
    fn into_request(self) -> ChatRequest {
        let labeled = self
            .documents
            .into_iter()
            .map(|document| (document.filename, document.content));
        let unlabeled = self.file_contents.into_iter().map(|content| (None, content));
        let documents = labeled
            .chain(unlabeled)
            .enumerate()
            .map(|(index, (label, content))| {
                let label = label.unwrap_or_else(|| format!("document-{}", index + 1));
                AssemblyDocument::new(label, content)
            })
            .collect();

        ChatRequest {
            prompt: self.prompt,
            provider: self.llm_provider,
            model: self.model,
            documents,
        }
    }
}

/// Success response for `POST /api/chat`.
#[derive(Serialize)]
struct ChatResponse {
    response: String,
    provider: String,
    model: String,
    cleaned_prompt: String,
    document_info: DocumentInfo,
    estimated_tokens: usize,
}

/// Relay a cleaned prompt plus optional documents to the selected provider.
async fn chat<S>(
    State(service): State<Arc<S>>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: RelayApi,
{
    let outcome = service.chat(body.into_request()).await?;
    let DispatchResponse {
        content,
        model,
        provider,
    } = outcome.response;
    Ok(Json(ChatResponse {
        response: content,
        provider,
        model,
        cleaned_prompt: outcome.cleaned_prompt,
        document_info: outcome.document_info,
        estimated_tokens: outcome.estimated_tokens,
    }))
}

/// List configured providers and their models.
async fn list_providers<S>(State(service): State<Arc<S>>) -> Json<BTreeMap<String, Vec<String>>>
where
    S: RelayApi,
{
    Json(service.available_providers().await)
}

/// Return relay counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: RelayApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands<S>(State(service): State<Arc<S>>) -> Json<CommandsResponse>
where
    S: RelayApi,
{
    Json(commands_catalog(service.max_files()))
}

fn commands_catalog(max_files: usize) -> CommandsResponse {
    CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/api/upload",
                description: format!(
                    "Upload up to {max_files} documents as multipart field `files`. Each is extracted and PII-filtered; response returns per-file results and {{ \"total_files\", \"successful\", \"failed\" }}."
                ),
                request_example: None,
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/api/chat",
                description: "Clean a prompt, append redacted document texts, and relay the payload to an LLM provider.".into(),
                request_example: Some(json!({
                    "prompt": "Summarize the attached report",
                    "llm_provider": "openai",
                    "model": "gpt-4o-mini",
                    "documents": [{"filename": "report.pdf", "content": "Filtered text"}]
                })),
            },
            CommandDescriptor {
                name: "providers",
                method: "GET",
                path: "/api/providers",
                description: "Return configured providers and the models each advertises.".into(),
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return upload, redaction, and chat counters useful for observability dashboards.".into(),
                request_example: None,
            },
        ],
    }
}

/// Error response: status plus a `{kind, reason}` body.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    kind: Option<FailureKind>,
    reason: String,
}

impl AppError {
    fn bad_request(report: FailureReport) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: Some(report.kind),
            reason: report.reason,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "kind": self.kind,
            "reason": self.reason,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<BatchError> for AppError {
    fn from(error: BatchError) -> Self {
        tracing::info!(error = %error, "Rejected upload batch");
        Self::bad_request(FailureReport::from(&error))
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        tracing::info!(error = %error, "Malformed multipart upload");
        Self {
            status: error.status(),
            kind: None,
            reason: error.body_text(),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(error: ChatError) -> Self {
        let status = match error.kind() {
            Some(FailureKind::EmptyOrInvalidPrompt) => StatusCode::UNPROCESSABLE_ENTITY,
            Some(_) => StatusCode::BAD_REQUEST,
            None => StatusCode::BAD_GATEWAY,
        };
        tracing::info!(error = %error, status = %status, "Chat request failed");
        Self {
            status,
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}
