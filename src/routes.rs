use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    analyzer::AnalysisClient,
    error::{AnalysisError, ErrorKind},
    gemini::TransportError,
    models::{FoodAnalysis, HistoryEntry},
    normalizer::is_image_mime,
};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const RETRY_AFTER_SECS: &str = "30";

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<RwLock<Vec<HistoryEntry>>>,
    pub analyzer: Arc<AnalysisClient>,
    pub history_limit: usize,
}

impl AppState {
    pub fn new(analyzer: Arc<AnalysisClient>, history_limit: usize) -> Self {
        Self { history: Arc::default(), analyzer, history_limit }
    }

    /// Stamps an analysis and keeps it, newest first, dropping the oldest past the limit.
    pub fn record(&self, analysis: FoodAnalysis) -> HistoryEntry {
        let entry = HistoryEntry::new(analysis);
        let mut history = self.history.write();
        history.insert(0, entry.clone());
        history.truncate(self.history_limit);
        entry
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze_upload))
        .route("/api/history", get(list_history).delete(clear_history))
        .route("/api/history/:id", get(get_history_entry))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    Analysis(AnalysisError),
    BadRequest(String),
    NotFound,
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::Analysis(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, ErrorKind::Input, message),
            ApiError::NotFound => (StatusCode::NOT_FOUND, ErrorKind::Input, "analysis not found".to_string()),
            ApiError::Analysis(err) => {
                let status = match &err {
                    AnalysisError::MissingCredential | AnalysisError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    AnalysisError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    AnalysisError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    AnalysisError::Saturated { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    AnalysisError::Remote(TransportError::QuotaExceeded { .. }) => StatusCode::TOO_MANY_REQUESTS,
                    AnalysisError::Remote(TransportError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
                    AnalysisError::Validation(_) | AnalysisError::Remote(_) => StatusCode::BAD_GATEWAY,
                };
                (status, err.kind(), err.to_string())
            }
        };

        let body = Json(json!({ "kind": kind, "error": message }));
        if status == StatusCode::SERVICE_UNAVAILABLE {
            (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

pub async fn analyze_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<HistoryEntry>, ApiError> {
    let mut upload: Option<(Bytes, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let mime = field.content_type().unwrap_or("application/octet-stream").to_string();
        // Reject before buffering the body or touching the normalizer.
        if !is_image_mime(&mime) {
            tracing::warn!(%mime, "rejected non-image upload");
            return Err(AnalysisError::UnsupportedMediaType(mime).into());
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read image: {}", e)))?;
        upload = Some((data, mime));
    }

    let (data, mime) = upload.ok_or_else(|| ApiError::BadRequest("Missing image field".to_string()))?;
    tracing::info!("🚀 Analyzing upload ({} bytes, {})", data.len(), mime);

    let analysis = state.analyzer.analyze_file(data, &mime).await?;
    let entry = state.record(analysis);
    tracing::info!(id = %entry.id, "✅ Stored analysis for {}", entry.analysis.product_name);
    Ok(Json(entry))
}

pub async fn list_history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.history.read().clone())
}

pub async fn get_history_entry(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<HistoryEntry>, ApiError> {
    state
        .history
        .read()
        .iter()
        .find(|entry| entry.id == id)
        .cloned()
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn clear_history(State(state): State<AppState>) -> StatusCode {
    let removed = {
        let mut history = state.history.write();
        let removed = history.len();
        history.clear();
        removed
    };
    tracing::info!("🧹 Cleared {} history entries", removed);
    StatusCode::NO_CONTENT
}
