//! Configuration types, built from environment variables.

use secrecy::SecretString;

/// SMTP transport configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (dispatch disabled — approvals
    /// still work, delivery reports `NO_SMTP_CONFIG`).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_address = std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

/// Generation backend configuration (OpenAI-compatible endpoint).
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub default_model: String,
}

impl GenerationConfig {
    /// Build config from environment variables. `LLM_API_KEY` is required.
    pub fn from_env() -> Result<Self, crate::error::ConfigError> {
        let api_key = std::env::var("LLM_API_KEY")
            .map(SecretString::from)
            .map_err(|_| crate::error::ConfigError::MissingEnvVar("LLM_API_KEY".into()))?;

        let base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let default_model =
            std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Ok(Self {
            base_url,
            api_key,
            default_model,
        })
    }
}

/// Engine-wide tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Expiry sweep interval in seconds.
    pub sweep_interval_secs: u64,
    /// Top-K knowledge snippets attached to a generation.
    pub knowledge_top_k: usize,
    /// Snippets below this similarity are discarded.
    pub similarity_floor: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            sweep_interval_secs: 60,
            knowledge_top_k: 3,
            similarity_floor: 0.35,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("REPLYFLOW_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            sweep_interval_secs: std::env::var("REPLYFLOW_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
            knowledge_top_k: std::env::var("REPLYFLOW_KNOWLEDGE_TOP_K")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.knowledge_top_k),
            similarity_floor: std::env::var("REPLYFLOW_SIMILARITY_FLOOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.similarity_floor),
        }
    }
}
