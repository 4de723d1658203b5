use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    error::AnalysisError,
    gemini::{Content, GenerateContentRequest, GenerationConfig, GenerativeModel, InlineData, ModelReply, Part},
    models::{EncodedImage, FoodAnalysis},
    normalizer::{is_image_mime, Normalizer},
    prompt::{build_instruction, ALTERNATIVES_THRESHOLD},
    retry::{RetryDecision, RetryPolicy},
    schema::{analysis_schema, parse_analysis, ValidationError},
};

/// Turns one label photo into one validated [`FoodAnalysis`].
///
/// Holds no per-call state, so a single instance can serve concurrent requests.
pub struct AnalysisClient {
    model: Arc<dyn GenerativeModel>,
    api_key: Option<String>,
    instruction: String,
    temperature: f32,
    normalizer: Normalizer,
    retry: RetryPolicy,
}

impl AnalysisClient {
    pub fn new(config: &Config, model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            api_key: config.api_key.clone(),
            instruction: build_instruction(&config.language),
            temperature: config.temperature,
            normalizer: Normalizer::new(config.max_dimension, config.jpeg_quality),
            retry: RetryPolicy::new(config.max_attempts, config.retry_base_delay),
        }
    }

    fn credential(&self) -> Result<&str, AnalysisError> {
        self.api_key.as_deref().ok_or(AnalysisError::MissingCredential)
    }

    /// Normalizes a raw upload and analyzes it.
    pub async fn analyze_file(&self, file: Bytes, declared_mime: &str) -> Result<FoodAnalysis, AnalysisError> {
        self.credential()?;
        if !is_image_mime(declared_mime) {
            return Err(AnalysisError::UnsupportedMediaType(declared_mime.to_string()));
        }

        let normalizer = self.normalizer;
        let size = file.len();
        let image = tokio::task::spawn_blocking(move || normalizer.normalize(&file))
            .await
            .map_err(|e| AnalysisError::Internal(format!("image worker failed: {e}")))??;
        info!(
            declared_mime,
            upload_bytes = size,
            width = image.width,
            height = image.height,
            "🖼️ Normalized upload"
        );

        self.analyze(&image).await
    }

    pub async fn analyze(&self, image: &EncodedImage) -> Result<FoodAnalysis, AnalysisError> {
        let api_key = self.credential()?;
        let request = self.build_request(image);

        let reply = self.generate_with_retry(api_key, &request).await?;
        let text = reply
            .text
            .ok_or(ValidationError::EmptyResponse { finish_reason: reply.finish_reason })?;

        let analysis = parse_analysis(&text).map_err(|e| {
            error!("❌ Model reply failed validation: {}", e);
            e
        })?;

        if analysis.health_score >= ALTERNATIVES_THRESHOLD && analysis.has_alternatives() {
            warn!(score = analysis.health_score, "alternatives suggested for a product above the threshold");
        }
        info!(
            product = %analysis.product_name,
            score = analysis.health_score,
            verdict = analysis.verdict.as_str(),
            "✅ Analysis complete"
        );
        Ok(analysis)
    }

    pub fn build_request(&self, image: &EncodedImage) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: image.mime_type.clone(),
                            data: image.data.clone(),
                        },
                    },
                    Part::Text { text: self.instruction.clone() },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(analysis_schema()),
                temperature: Some(self.temperature),
            },
        }
    }

    async fn generate_with_retry(
        &self,
        api_key: &str,
        request: &GenerateContentRequest,
    ) -> Result<ModelReply, AnalysisError> {
        let mut attempt = 1;
        loop {
            let err = match self.model.generate_content(api_key, request).await {
                Ok(reply) => return Ok(reply),
                Err(err) => err,
            };
            match self.retry.decide(attempt, &err) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "⏳ Gemini unavailable (attempt {}/{}): {}. Retrying in {}s...",
                        attempt,
                        self.retry.max_attempts,
                        err,
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Exhausted => {
                    error!("❌ Gemini still overloaded after {} attempts: {}", attempt, err);
                    return Err(AnalysisError::Saturated { attempts: attempt, last: err });
                }
                RetryDecision::Fail => {
                    error!("❌ Gemini analysis error: {}", err);
                    return Err(AnalysisError::Remote(err));
                }
            }
        }
    }
}
