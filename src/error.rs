use serde::Serialize;
use thiserror::Error;

use crate::{gemini::TransportError, normalizer::NormalizeError, schema::ValidationError};

/// Caller-facing failure class of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Input,
    Saturated,
    Validation,
    Remote,
    Internal,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Gemini API key is not configured; set GEMINI_API_KEY")]
    MissingCredential,
    #[error("unsupported media type `{0}`; please upload an image")]
    UnsupportedMediaType(String),
    #[error(transparent)]
    Image(#[from] NormalizeError),
    #[error("model service is saturated after {attempts} attempts; please try again later")]
    Saturated {
        attempts: u32,
        #[source]
        last: TransportError,
    },
    #[error("analysis failed: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] TransportError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::MissingCredential => ErrorKind::Configuration,
            AnalysisError::UnsupportedMediaType(_) | AnalysisError::Image(_) => ErrorKind::Input,
            AnalysisError::Saturated { .. } => ErrorKind::Saturated,
            AnalysisError::Validation(_) => ErrorKind::Validation,
            AnalysisError::Remote(_) => ErrorKind::Remote,
            AnalysisError::Internal(_) => ErrorKind::Internal,
        }
    }
}
