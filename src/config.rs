use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Runtime settings, read once at startup and handed to the components that need them.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` is allowed at startup; the analyzer rejects calls until it is set.
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    /// Language every free-text field of the analysis is written in.
    pub language: String,
    pub temperature: f32,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub history_limit: usize,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            language: "Turkish".to_string(),
            temperature: 0.4,
            request_timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            max_dimension: 1024,
            jpeg_quality: 80,
            history_limit: 50,
            port: 8080,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or unparsable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parsed = |key: &str| text(key).and_then(|v| v.parse::<u64>().ok());

        Self {
            api_key: text("GEMINI_API_KEY"),
            api_base: text("GEMINI_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            model: text("GEMINI_MODEL").unwrap_or(defaults.model),
            language: text("ANALYSIS_LANGUAGE").unwrap_or(defaults.language),
            temperature: defaults.temperature,
            request_timeout: parsed("GEMINI_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_attempts: defaults.max_attempts,
            retry_base_delay: defaults.retry_base_delay,
            max_dimension: parsed("IMAGE_MAX_DIMENSION")
                .filter(|dim| *dim > 0)
                .and_then(|dim| u32::try_from(dim).ok())
                .unwrap_or(defaults.max_dimension),
            jpeg_quality: parsed("IMAGE_JPEG_QUALITY")
                .filter(|q| (1..=100).contains(q))
                .map(|q| q as u8)
                .unwrap_or(defaults.jpeg_quality),
            history_limit: parsed("HISTORY_LIMIT")
                .map(|n| n as usize)
                .unwrap_or(defaults.history_limit),
            port: parsed("PORT")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(defaults.port),
        }
    }
}
