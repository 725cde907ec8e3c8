//! Error types for replyflow.

use uuid::Uuid;

use crate::approval::model::TaskStatus;

/// Top-level error type for the reply engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Draft generation and classification errors.
///
/// An empty regeneration instruction is *not* an error — the generator falls
/// back to its default instruction string instead.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation backend unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    #[error("Unparseable response from generation backend: {reason}")]
    InvalidResponse { reason: String },
}

/// Approval state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Approval task {id} not found")]
    TaskNotFound { id: Uuid },

    #[error("Cannot {action} task {id} in state {status}")]
    InvalidStateTransition {
        id: Uuid,
        status: TaskStatus,
        action: &'static str,
    },

    #[error("A regeneration is already in flight for task {id}")]
    GenerationInFlight { id: Uuid },
}

/// Rule store errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Rule {id} not found")]
    NotFound { id: u64 },
}

/// Mail dispatch errors.
///
/// Delivery failure never rolls back an approval decision — these surface as
/// warnings on the approval outcome, not as transaction aborts.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("No SMTP transport configured")]
    NoSmtpConfig,

    #[error("SMTP send failed: {reason}")]
    SendFailed { reason: String },
}

/// Result type alias for the reply engine.
pub type Result<T> = std::result::Result<T, Error>;
