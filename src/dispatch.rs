//! Dispatcher — the SMTP boundary. Delivery is attempted exactly once per
//! approval and the outcome is always surfaced, never swallowed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::draft::Draft;
use crate::error::SendError;

/// Proof of an accepted delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Identifier of the sent message.
    pub sent_email_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// Mail transport boundary.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, draft: &Draft, to: &str) -> Result<DeliveryReceipt, SendError>;
}

/// Dispatcher used when no SMTP transport is configured. Every send reports
/// `NoSmtpConfig`; approval still proceeds.
pub struct NullDispatcher;

#[async_trait]
impl Dispatcher for NullDispatcher {
    async fn send(&self, _draft: &Draft, _to: &str) -> Result<DeliveryReceipt, SendError> {
        Err(SendError::NoSmtpConfig)
    }
}

/// SMTP dispatcher built on lettre.
pub struct SmtpDispatcher {
    config: SmtpConfig,
}

impl SmtpDispatcher {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Dispatcher for SmtpDispatcher {
    async fn send(&self, draft: &Draft, to: &str) -> Result<DeliveryReceipt, SendError> {
        let config = self.config.clone();
        let subject = draft.subject.clone();
        let body = draft.body.clone();
        let to = to.to_string();

        // lettre's SmtpTransport is blocking; keep it off the async runtime.
        let receipt = tokio::task::spawn_blocking(move || {
            send_blocking(&config, &to, &subject, &body)
        })
        .await
        .map_err(|e| SendError::SendFailed {
            reason: format!("send task panicked: {e}"),
        })??;

        Ok(receipt)
    }
}

fn send_blocking(
    config: &SmtpConfig,
    to: &str,
    subject: &str,
    body: &str,
) -> Result<DeliveryReceipt, SendError> {
    let creds = Credentials::new(config.username.clone(), config.password.clone());

    let transport = SmtpTransport::relay(&config.host)
        .map_err(|e| SendError::SendFailed {
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.port)
        .credentials(creds)
        .build();

    let email = Message::builder()
        .from(config.from_address.parse().map_err(|e| SendError::SendFailed {
            reason: format!("Invalid from address: {e}"),
        })?)
        .to(to.parse().map_err(|e| SendError::SendFailed {
            reason: format!("Invalid to address: {e}"),
        })?)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| SendError::SendFailed {
            reason: format!("Failed to build email: {e}"),
        })?;

    transport.send(&email).map_err(|e| SendError::SendFailed {
        reason: format!("SMTP send failed: {e}"),
    })?;

    info!(to, "Email dispatched");

    Ok(DeliveryReceipt {
        sent_email_id: Uuid::new_v4().to_string(),
        accepted_at: Utc::now(),
    })
}
