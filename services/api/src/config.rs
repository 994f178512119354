use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;
use voicegpt_core::{
    completion::DEFAULT_SYSTEM_PROMPT,
    speech::{DEFAULT_VOICE_ID, ELEVENLABS_API_BASE},
    transcription::TranscriptionOptions,
};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which origins may open the WebSocket and call the REST API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorsOrigin {
    Any,
    Exact(String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub deepgram_api_key: String,
    pub openai_api_key: String,
    pub elevenlabs_api_key: String,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_api_base: String,
    pub chat_model: String,
    pub system_prompt: String,
    pub transcription: TranscriptionOptions,
    pub reconnect_retry_delay: Duration,
    pub cors_origin: CorsOrigin,
    pub log_level: Level,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// All three provider credentials are required; the server must not accept
    /// clients without them.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = optional("BIND_ADDRESS", "0.0.0.0:4000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let deepgram_api_key = required("DEEPGRAM_API_KEY")?;
        let openai_api_key = required("OPENAI_API_KEY")?;
        let elevenlabs_api_key = required("ELEVENLABS_API_KEY")?;

        let elevenlabs_voice_id = optional("ELEVENLABS_VOICE_ID", DEFAULT_VOICE_ID);
        let elevenlabs_api_base = optional("ELEVENLABS_API_BASE", ELEVENLABS_API_BASE);
        let chat_model = optional("CHAT_MODEL", "gpt-4o");
        let system_prompt = optional("SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT);

        let defaults = TranscriptionOptions::default();
        let transcription = TranscriptionOptions {
            language: optional("TRANSCRIPTION_LANGUAGE", &defaults.language),
            model: optional("TRANSCRIPTION_MODEL", &defaults.model),
            endpoint: optional("TRANSCRIPTION_URL", &defaults.endpoint),
            ..defaults
        };

        let retry_ms_str = optional("RECONNECT_RETRY_MS", "1000");
        let retry_ms = retry_ms_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "RECONNECT_RETRY_MS".to_string(),
                format!("'{}' is not a number of milliseconds", retry_ms_str),
            )
        })?;

        let cors_origin = match optional("CORS_ORIGIN", "http://localhost:3000").as_str() {
            "*" => CorsOrigin::Any,
            origin => CorsOrigin::Exact(origin.to_string()),
        };

        let log_level_str = optional("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            deepgram_api_key,
            openai_api_key,
            elevenlabs_api_key,
            elevenlabs_voice_id,
            elevenlabs_api_base,
            chat_model,
            system_prompt,
            transcription,
            reconnect_retry_delay: Duration::from_millis(retry_ms),
            cors_origin,
            log_level,
        })
    }
}
