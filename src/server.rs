//! JSON HTTP server.
//!
//! Exposes question answering and risk assessment over HTTP so a web front
//! end can upload a document and ask about it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/answer` | Answer a question, optionally grounded in a document |
//! | `POST` | `/risk` | Detect risky clauses and score a document |
//! | `POST` | `/analyze` | Metadata, risk and plain-language text, plus an optional summary |
//! | `GET`  | `/health` | Health check (returns version and model) |
//!
//! A document is sent either as plain text (`document_text`) or as the
//! base64-encoded original file (`document_base64` plus `content_type`).
//!
//! # Error Contract
//!
//! Request problems are reported as
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unsupported_format` (415),
//! `payload_too_large` (413), `extraction_failed` (422), `no_content` (422).
//!
//! A generation failure is not an HTTP error: `/answer` returns `200` with
//! the failure in the answer's `status` field.
//!
//! # Shutdown
//!
//! On SIGINT or SIGTERM the server stops accepting connections and cancels
//! the shared [`CancellationToken`]. In-flight generation calls then finish
//! with status `cancelled` instead of holding the shutdown open.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::analysis::{analyze_text, Analysis};
use crate::config::Config;
use crate::extract::{extract_text, ExtractError};
use crate::generation::GenerationService;
use crate::models::{Answer, AnswerOptions, AnswerOverrides, SourceFormat};
use crate::normalize::NormalizeError;
use crate::pipeline;
use crate::risk::{assess_text, RiskAssessment};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<dyn GenerationService>,
    /// Cancelled when the server shuts down; each request runs on a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, service: Arc<dyn GenerationService>) -> Self {
        Self {
            config: Arc::new(config),
            service,
            shutdown: CancellationToken::new(),
        }
    }

    fn answer_options(&self, overrides: &AnswerOverrides) -> Result<AnswerOptions, AppError> {
        overrides
            .apply(self.config.answer_options(), &self.config.answer_limits())
            .map_err(bad_request)
    }
}

/// Builds the router with all routes and the CORS layer.
pub fn router(state: AppState) -> Router {
    // base64 inflates uploads by 4/3; leave headroom for the JSON envelope
    let body_limit = (state.config.context.max_file_bytes() as usize) / 3 * 4 + 64 * 1024;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/answer", post(handle_answer))
        .route("/risk", post(handle_risk))
        .route("/analyze", post(handle_analyze))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until SIGINT or SIGTERM.
pub async fn run_server(config: &Config, service: Arc<dyn GenerationService>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), service);
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "counsel server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("counsel server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        let (status, code) = match err {
            ExtractError::UnsupportedFormat(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
            }
            ExtractError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            ExtractError::Extraction { .. } | ExtractError::Io(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        AppError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: "no_content",
            message: err.to_string(),
        }
    }
}

// ============ Document payload ============

/// Document fields shared by `/answer`, `/risk` and `/analyze`.
#[derive(Debug, Default, Deserialize)]
struct DocumentPayload {
    document_text: Option<String>,
    document_base64: Option<String>,
    content_type: Option<String>,
}

enum DocumentInput {
    None,
    Text(String),
    Bytes(Vec<u8>, SourceFormat),
}

impl DocumentPayload {
    fn into_input(self, max_bytes: u64) -> Result<DocumentInput, AppError> {
        match (self.document_text, self.document_base64) {
            (Some(_), Some(_)) => Err(bad_request(
                "send either document_text or document_base64, not both",
            )),
            (Some(text), None) => Ok(DocumentInput::Text(text)),
            (None, Some(encoded)) => {
                let content_type = self.content_type.ok_or_else(|| {
                    bad_request("content_type is required with document_base64")
                })?;
                let format = SourceFormat::from_content_type(&content_type)?;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| bad_request(format!("document_base64 is not valid base64: {}", e)))?;
                if bytes.len() as u64 > max_bytes {
                    return Err(ExtractError::TooLarge {
                        size: bytes.len() as u64,
                        limit: max_bytes,
                    }
                    .into());
                }
                Ok(DocumentInput::Bytes(bytes, format))
            }
            (None, None) => Ok(DocumentInput::None),
        }
    }

    /// Text of a document the endpoint cannot do without.
    async fn into_required_text(self, max_bytes: u64) -> Result<String, AppError> {
        match self.into_input(max_bytes)? {
            DocumentInput::None => Err(bad_request(
                "document_text or document_base64 is required",
            )),
            DocumentInput::Text(text) => Ok(text),
            DocumentInput::Bytes(bytes, format) => {
                let text = tokio::task::spawn_blocking(move || extract_text(&bytes, format))
                    .await
                    .map_err(|e| AppError {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        code: "internal",
                        message: e.to_string(),
                    })??;
                Ok(text)
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.service.model().to_string(),
    })
}

// ============ POST /answer ============

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    question: String,
    #[serde(flatten)]
    document: DocumentPayload,
    #[serde(default)]
    options: AnswerOverrides,
}

/// Answer plus the texts a client should display next to it.
#[derive(Serialize)]
struct AnswerResponse {
    #[serde(flatten)]
    answer: Answer,
    /// "Based on partial document context." when the caveat is set.
    notice: Option<&'static str>,
    /// Friendly explanation of a non-successful status.
    message: Option<&'static str>,
}

impl From<Answer> for AnswerResponse {
    fn from(answer: Answer) -> Self {
        let notice = answer.caveat.map(|c| c.notice());
        let message = (!answer.status.is_success()).then(|| answer.status.user_message());
        Self {
            answer,
            notice,
            message,
        }
    }
}

async fn handle_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let options = state.answer_options(&req.options)?;
    let input = req
        .document
        .into_input(state.config.context.max_file_bytes())?;

    let cancel = state.shutdown.child_token();
    let service = state.service.clone();
    let answer = match input {
        DocumentInput::None => {
            pipeline::answer(service, None, &req.question, &options, &cancel).await
        }
        DocumentInput::Text(text) => {
            pipeline::answer(service, Some(&text), &req.question, &options, &cancel).await
        }
        DocumentInput::Bytes(bytes, format) => {
            pipeline::answer_bytes(service, bytes, format, &req.question, &options, &cancel).await
        }
    };

    Ok(Json(answer.into()))
}

// ============ POST /risk ============

async fn handle_risk(
    State(state): State<AppState>,
    Json(payload): Json<DocumentPayload>,
) -> Result<Json<RiskAssessment>, AppError> {
    let text = payload
        .into_required_text(state.config.context.max_file_bytes())
        .await?;
    Ok(Json(assess_text(&text, &state.config.risk)))
}

// ============ POST /analyze ============

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(flatten)]
    document: DocumentPayload,
    /// Also generate a summary through the generation service.
    #[serde(default)]
    summary: bool,
    #[serde(default)]
    options: AnswerOverrides,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    #[serde(flatten)]
    analysis: Analysis,
    summary: Option<AnswerResponse>,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let options = state.answer_options(&req.options)?;
    let text = req
        .document
        .into_required_text(state.config.context.max_file_bytes())
        .await?;
    let analysis = analyze_text(&text, &state.config.risk)?;

    let summary = if req.summary {
        let answer = pipeline::summarize(
            state.service.clone(),
            &text,
            state.config.analysis.summary_words,
            &options,
            &state.shutdown.child_token(),
        )
        .await?;
        Some(answer.into())
    } else {
        None
    };

    Ok(Json(AnalyzeResponse { analysis, summary }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use crate::models::Prompt;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::io::Write;
    use tower::util::ServiceExt;

    /// Answers with the first line of the user message it was sent.
    struct Echo;

    #[async_trait]
    impl GenerationService for Echo {
        async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
            Ok(format!("[{:?}] {}", prompt.variant, prompt.user.lines().last().unwrap_or("")))
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    fn app() -> Router {
        router(AppState::new(Config::minimal(), Arc::new(Echo)))
    }

    async fn post_json(path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        send_json(app(), path, body).await
    }

    async fn send_json(
        app: Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn docx_base64(paragraphs: &[&str]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        base64::engine::general_purpose::STANDARD.encode(buf)
    }

    #[tokio::test]
    async fn health_reports_model() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model"], "echo");
    }

    #[tokio::test]
    async fn answer_with_document_text() {
        let (status, json) = post_json(
            "/answer",
            serde_json::json!({
                "question": "When does this agreement end?",
                "document_text": "This Agreement terminates after 12 months.",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["variant"], "document_grounded");
        assert_eq!(json["truncated"], false);
        assert_eq!(
            json["text"],
            "[DocumentGrounded] QUESTION: When does this agreement end?"
        );
        assert!(json["notice"].is_null());
    }

    #[tokio::test]
    async fn answer_with_uploaded_docx() {
        let (status, json) = post_json(
            "/answer",
            serde_json::json!({
                "question": "What is the rent?",
                "document_base64": docx_base64(&["1. Rent is 500 per month."]),
                "content_type": crate::extract::MIME_DOCX,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["variant"], "document_grounded");
        assert!(json["context_notice"].is_null());
    }

    #[tokio::test]
    async fn corrupt_upload_degrades_to_general() {
        let (status, json) = post_json(
            "/answer",
            serde_json::json!({
                "question": "What is the rent?",
                "document_base64": base64::engine::general_purpose::STANDARD.encode(b"junk"),
                "content_type": "application/pdf",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["variant"], "general_information");
        assert!(json["context_notice"].as_str().unwrap().contains("could not be read"));
    }

    #[tokio::test]
    async fn empty_question_is_bad_request() {
        let (status, json) = post_json("/answer", serde_json::json!({ "question": "   " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn unsupported_content_type_is_rejected() {
        let (status, json) = post_json(
            "/answer",
            serde_json::json!({
                "question": "q?",
                "document_base64": "aGVsbG8=",
                "content_type": "text/plain",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json["error"]["code"], "unsupported_format");
    }

    #[tokio::test]
    async fn invalid_options_are_rejected() {
        let (status, _) = post_json(
            "/answer",
            serde_json::json!({ "question": "q?", "options": { "max_prompt_chars": 0 } }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_question_reports_status_not_http_error() {
        let (status, json) = post_json(
            "/answer",
            serde_json::json!({
                "question": "why? ".repeat(100),
                "options": { "max_prompt_chars": 100 },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "prompt_too_large");
        assert_eq!(json["message"], "The question is too long to send.");
    }

    #[tokio::test]
    async fn risk_scores_document_text() {
        let (status, json) = post_json(
            "/risk",
            serde_json::json!({
                "document_text": "1. This lease will automatically renew.\n\n2. Rent is due monthly.",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["clauses"].as_array().unwrap().len(), 1);
        assert_eq!(json["clauses"][0]["category"], "auto_renewal");
        assert_eq!(json["recommendations"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn risk_requires_a_document() {
        let (status, _) = post_json("/risk", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn request_overrides_are_capped() {
        let (status, json) = post_json(
            "/answer",
            serde_json::json!({ "question": "q?", "options": { "retry_count": 4294967295u64 } }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("retry_count"));
    }

    #[tokio::test]
    async fn shutdown_cancels_requests() {
        let state = AppState::new(Config::minimal(), Arc::new(Echo));
        state.shutdown.cancel();
        let (status, json) = send_json(
            router(state),
            "/answer",
            serde_json::json!({ "question": "What is a lien?" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["attempts"], 0);
        assert_eq!(json["message"], "The request was cancelled.");
    }

    #[tokio::test]
    async fn general_fallback_has_notice_not_caveat() {
        let raw = (0..40)
            .map(|i| format!("{}. Clause number {} says something binding.", i + 1, i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let question = "When does this end?";
        let general_size = crate::prompt::build_prompt(None, question, usize::MAX)
            .unwrap()
            .char_len();
        let (status, json) = post_json(
            "/answer",
            serde_json::json!({
                "question": question,
                "document_text": raw,
                "options": { "max_prompt_chars": general_size },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["variant"], "general_information");
        assert!(json["caveat"].is_null());
        assert!(json["notice"].is_null());
        assert!(json["context_notice"]
            .as_str()
            .unwrap()
            .contains("did not fit"));
    }

    #[tokio::test]
    async fn analyze_reports_metadata_risk_and_plain_text() {
        let (status, json) = post_json(
            "/analyze",
            serde_json::json!({
                "document_text": "1. The Tenant shall pay rent.\n\n2. This lease will automatically renew.",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["metadata"]["units"], 2);
        assert_eq!(json["risk"]["clauses"][0]["category"], "auto_renewal");
        assert!(json["simplified"]["text"]
            .as_str()
            .unwrap()
            .contains("The Tenant will pay rent."));
        assert_eq!(json["simplified"]["replacements"][0]["term"], "shall");
        assert!(json["summary"].is_null());
    }

    #[tokio::test]
    async fn analyze_with_summary_uses_summary_prompt() {
        let (status, json) = post_json(
            "/analyze",
            serde_json::json!({
                "document_text": "1. Term. Twelve months.",
                "summary": true,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["summary"]["status"], "succeeded");
        assert_eq!(json["summary"]["variant"], "document_summary");
        assert!(json["summary"]["text"]
            .as_str()
            .unwrap()
            .starts_with("[DocumentSummary] TASK: Summarize"));
    }

    #[tokio::test]
    async fn analyze_blank_document_is_no_content() {
        let (status, json) = post_json(
            "/analyze",
            serde_json::json!({ "document_text": "  \n Page 2 of 9 \n" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["code"], "no_content");
    }
}
