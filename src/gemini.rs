use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::config::Config;

/// Failure categories at the model-service boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("model service overloaded (HTTP {status}): {message}")]
    Overloaded { status: u16, message: String },
    #[error("model request timed out")]
    Timeout,
    #[error("model service rejected the credentials (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("model service rejected the request (HTTP {status}): {message}")]
    BadRequest { status: u16, message: String },
    #[error("model quota exceeded: {message}")]
    QuotaExceeded { message: String },
    #[error("model service error (HTTP {status}): {message}")]
    Service { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unreadable model response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Temporary capacity problems worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Overloaded { .. } | TransportError::Timeout)
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

// --- Request Wire Types ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: Option<String>,
    pub response_schema: Option<Value>,
    pub temperature: Option<f32>,
}

// --- Response Wire Types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

/// Text of the first candidate, with thought parts dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: Option<String>,
    pub finish_reason: Option<String>,
}

impl GenerateContentResponse {
    pub fn into_reply(self) -> ModelReply {
        let blocked = self.prompt_feedback.and_then(|f| f.block_reason);
        let Some(candidate) = self.candidates.into_iter().next() else {
            return ModelReply { text: None, finish_reason: blocked };
        };
        let text: String = candidate
            .content
            .unwrap_or_default()
            .parts
            .into_iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text)
            .collect();
        ModelReply {
            text: Some(text).filter(|t| !t.trim().is_empty()),
            finish_reason: candidate.finish_reason.or(blocked),
        }
    }
}

/// Maps a non-success HTTP response to a category using the status code and
/// the structured `error.status` field Google returns.
pub fn classify_failure(status: StatusCode, body: &str) -> TransportError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = envelope
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| truncate(body.trim(), 200));
    let (rpc_status, key_invalid) = envelope
        .map(|e| {
            let key_invalid = e.error.details.iter().any(|d| d.reason.as_deref() == Some("API_KEY_INVALID"));
            (e.error.status, key_invalid)
        })
        .unwrap_or((None, false));
    let code = status.as_u16();

    if key_invalid {
        return TransportError::Unauthorized { status: code, message };
    }
    match (rpc_status.as_deref(), code) {
        (Some("UNAVAILABLE"), _) | (_, 503) => TransportError::Overloaded { status: code, message },
        (Some("RESOURCE_EXHAUSTED"), _) | (_, 429) => TransportError::QuotaExceeded { message },
        (Some("UNAUTHENTICATED" | "PERMISSION_DENIED"), _) | (_, 401 | 403) => {
            TransportError::Unauthorized { status: code, message }
        }
        (Some("INVALID_ARGUMENT" | "FAILED_PRECONDITION"), _) | (_, 400) => {
            TransportError::BadRequest { status: code, message }
        }
        _ => TransportError::Service { status: code, message },
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Anything that can answer a `generateContent` call.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_content(
        &self,
        api_key: &str,
        request: &GenerateContentRequest,
    ) -> Result<ModelReply, TransportError>;
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_base.clone(),
            model: config.model.clone(),
            timeout: config.request_timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate_content(
        &self,
        api_key: &str,
        request: &GenerateContentRequest,
    ) -> Result<ModelReply, TransportError> {
        let url = self.endpoint();
        info!("🔗 Making request to: {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let body = response.text().await.map_err(TransportError::from_reqwest)?;
        if !status.is_success() {
            error!("❌ API Error response: {}", truncate(&body, 500));
            return Err(classify_failure(status, &body));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;
        let reply = parsed.into_reply();
        info!(
            finish_reason = reply.finish_reason.as_deref().unwrap_or("-"),
            chars = reply.text.as_ref().map_or(0, String::len),
            "📦 Received model reply"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_uses_gemini_field_names() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Inline { inline_data: InlineData { mime_type: "image/jpeg".into(), data: "AAAA".into() } },
                    Part::Text { text: "hi".into() },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json".into()),
                response_schema: None,
                temperature: Some(0.5),
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "contents": [{ "parts": [
                    { "inlineData": { "mimeType": "image/jpeg", "data": "AAAA" } },
                    { "text": "hi" }
                ]}],
                "generationConfig": { "responseMimeType": "application/json", "temperature": 0.5 }
            })
        );
    }

    #[test]
    fn reply_joins_text_and_skips_thoughts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "{\"a\":" },
                    { "text": "1}" }
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(
            response.into_reply(),
            ModelReply { text: Some("{\"a\":1}".into()), finish_reason: Some("STOP".into()) }
        );
    }

    #[test]
    fn blocked_prompt_yields_empty_reply() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).unwrap();
        assert_eq!(response.into_reply(), ModelReply { text: None, finish_reason: Some("SAFETY".into()) });
    }

    #[test]
    fn overload_is_transient() {
        let body = json!({ "error": { "code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE" } });
        let err = classify_failure(StatusCode::SERVICE_UNAVAILABLE, &body.to_string());
        assert!(matches!(&err, TransportError::Overloaded { status: 503, message } if message == "The model is overloaded."));
        assert!(err.is_transient());
    }

    #[test]
    fn quota_and_auth_are_not_transient() {
        let quota = json!({ "error": { "code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" } });
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, &quota.to_string());
        assert!(matches!(err, TransportError::QuotaExceeded { .. }));
        assert!(!err.is_transient());

        let auth = json!({ "error": {
            "code": 400,
            "message": "API key not valid. Please pass a valid API key.",
            "status": "INVALID_ARGUMENT",
            "details": [{ "@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID" }]
        } });
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, &auth.to_string()),
            TransportError::Unauthorized { status: 400, .. }
        ));

        let malformed = json!({ "error": { "code": 400, "message": "Invalid JSON payload", "status": "INVALID_ARGUMENT" } });
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, &malformed.to_string()),
            TransportError::BadRequest { status: 400, .. }
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, "forbidden"),
            TransportError::Unauthorized { status: 403, .. }
        ));
    }

    #[test]
    fn unstructured_bodies_fall_back_to_status_code() {
        let err = classify_failure(StatusCode::SERVICE_UNAVAILABLE, "<html>busy</html>");
        assert!(matches!(&err, TransportError::Overloaded { message, .. } if message == "<html>busy</html>"));
        assert!(matches!(
            classify_failure(StatusCode::INTERNAL_SERVER_ERROR, ""),
            TransportError::Service { status: 500, .. }
        ));
        assert!(TransportError::Timeout.is_transient());
    }

    async fn fake_gemini() -> Config {
        use axum::{http::HeaderMap, routing::post, Json, Router};

        let app = Router::new().route(
            "/v1beta/models/*rest",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let key = headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()).unwrap_or("");
                let has_image = body["contents"][0]["parts"][0]["inlineData"]["data"].is_string();
                match (key, has_image) {
                    ("busy", _) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({ "error": { "code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE" } })),
                    ),
                    ("good", true) => (
                        StatusCode::OK,
                        Json(json!({ "candidates": [{ "content": { "parts": [{ "text": "{}" }] }, "finishReason": "STOP" }] })),
                    ),
                    _ => (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error": { "code": 400, "message": "bad request", "status": "INVALID_ARGUMENT" } })),
                    ),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Config { api_base: format!("http://{addr}/v1beta"), ..Config::default() }
    }

    fn image_request() -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::Inline { inline_data: InlineData { mime_type: "image/jpeg".into(), data: "AAAA".into() } }],
            }],
            generation_config: GenerationConfig::default(),
        }
    }

    #[tokio::test]
    async fn client_sends_key_header_and_reads_reply() {
        let client = GeminiClient::new(&fake_gemini().await);
        let reply = client.generate_content("good", &image_request()).await.unwrap();
        assert_eq!(reply, ModelReply { text: Some("{}".into()), finish_reason: Some("STOP".into()) });
    }

    #[tokio::test]
    async fn client_classifies_overload_responses() {
        let client = GeminiClient::new(&fake_gemini().await);
        let err = client.generate_content("busy", &image_request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Overloaded { status: 503, .. }), "{err}");

        let err = client.generate_content("other", &image_request()).await.unwrap_err();
        assert!(matches!(err, TransportError::BadRequest { status: 400, .. }), "{err}");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("şşşş", 2), "şş…");
        assert_eq!(truncate("abc", 5), "abc");
    }
}
