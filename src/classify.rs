//! Inbound email classification — categories, signals, and the LLM classifier.
//!
//! Classification is a collaborator boundary: the engine consumes it through
//! the [`Classifier`] trait. The default implementation prompts a generation
//! backend for a structured JSON verdict and parses it strictly.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GenerationError;
use crate::llm::{extract_json_object, GenerationBackend, GenerationRequest};

/// Category assigned to an inbound email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailCategory {
    Inquiry,
    Quotation,
    Sample,
    Order,
    Complaint,
    FollowUp,
    Spam,
}

impl std::fmt::Display for EmailCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inquiry => write!(f, "inquiry"),
            Self::Quotation => write!(f, "quotation"),
            Self::Sample => write!(f, "sample"),
            Self::Order => write!(f, "order"),
            Self::Complaint => write!(f, "complaint"),
            Self::FollowUp => write!(f, "follow_up"),
            Self::Spam => write!(f, "spam"),
        }
    }
}

impl std::str::FromStr for EmailCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inquiry" => Ok(Self::Inquiry),
            "quotation" => Ok(Self::Quotation),
            "sample" => Ok(Self::Sample),
            "order" => Ok(Self::Order),
            "complaint" => Ok(Self::Complaint),
            "follow_up" => Ok(Self::FollowUp),
            "spam" => Ok(Self::Spam),
            _ => Err(format!("Unknown email category: {s}")),
        }
    }
}

/// Overall sentiment of the email body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Three-step intensity scale used for urgency and purchase intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    /// Numeric rank for threshold comparisons (low=0, medium=1, high=2).
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// An inbound email as handed to the engine by the mail ingestion layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Sender address.
    pub from: String,
    /// Sender display name, if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// When the email was received.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

/// Classification verdict for one inbound email. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned category.
    pub category: EmailCategory,
    /// Sentiment of the body.
    pub sentiment: Sentiment,
    /// How urgent a reply is.
    pub urgency: Level,
    /// Buying-signal strength.
    pub purchase_intent: Level,
    /// Buying-signal score, 0–100.
    pub purchase_intent_score: u8,
    /// Sales-opportunity score, 0–100.
    pub opportunity_score: u8,
    /// Whether the classifier recommends a human look regardless of rules.
    #[serde(default)]
    pub requires_human_review: bool,
}

/// Classifies inbound emails. External collaborator boundary.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, email: &InboundEmail) -> Result<Classification, GenerationError>;
}

/// LLM-backed classifier — prompts the generation backend for structured JSON.
pub struct LlmClassifier {
    backend: Arc<dyn GenerationBackend>,
}

impl LlmClassifier {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }
}

const CLASSIFY_SYSTEM_PROMPT: &str = "\
You are an email classification engine for a sales CRM. Classify the email \
into exactly one category: inquiry, quotation, sample, order, complaint, \
follow_up, spam.\n\n\
Respond with a single JSON object:\n\
{\"category\": \"...\", \"sentiment\": \"positive|neutral|negative\", \
\"urgency\": \"low|medium|high\", \"purchase_intent\": \"low|medium|high\", \
\"purchase_intent_score\": 0-100, \"opportunity_score\": 0-100, \
\"requires_human_review\": true|false}\n\n\
ONLY output the JSON object. No other text.";

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, email: &InboundEmail) -> Result<Classification, GenerationError> {
        let user_prompt = format!(
            "From: {from}\nSubject: {subject}\n\n{body}",
            from = email.from,
            subject = email.subject,
            body = email.body,
        );

        let request = GenerationRequest::new(CLASSIFY_SYSTEM_PROMPT, user_prompt);
        let raw = self.backend.generate(request).await?;

        let json = extract_json_object(&raw);
        let mut classification: Classification = serde_json::from_str(&json).map_err(|e| {
            warn!(error = %e, raw = %raw, "Failed to parse classification response");
            GenerationError::InvalidResponse {
                reason: format!("classification JSON: {e}"),
            }
        })?;

        // Models occasionally overshoot the 0-100 score range.
        classification.purchase_intent_score = classification.purchase_intent_score.min(100);
        classification.opportunity_score = classification.opportunity_score.min(100);

        debug!(
            from = %email.from,
            category = %classification.category,
            urgency = %classification.urgency,
            "Email classified"
        );

        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedBackend(String);

    #[async_trait]
    impl GenerationBackend for CannedBackend {
        async fn generate(&self, _req: GenerationRequest) -> Result<String, GenerationError> {
            Ok(self.0.clone())
        }
    }

    fn email() -> InboundEmail {
        InboundEmail {
            from: "buyer@example.com".into(),
            sender_name: Some("Buyer".into()),
            subject: "Price for 500 units".into(),
            body: "Please quote 500 units of SKU-12, needed this month.".into(),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn parses_clean_json_verdict() {
        let backend = Arc::new(CannedBackend(
            r#"{"category": "quotation", "sentiment": "neutral", "urgency": "high",
                "purchase_intent": "high", "purchase_intent_score": 88,
                "opportunity_score": 75, "requires_human_review": false}"#
                .into(),
        ));
        let classifier = LlmClassifier::new(backend);
        let c = classifier.classify(&email()).await.unwrap();
        assert_eq!(c.category, EmailCategory::Quotation);
        assert_eq!(c.purchase_intent, Level::High);
        assert_eq!(c.purchase_intent_score, 88);
    }

    #[tokio::test]
    async fn parses_markdown_wrapped_verdict() {
        let backend = Arc::new(CannedBackend(
            "```json\n{\"category\": \"inquiry\", \"sentiment\": \"positive\", \
             \"urgency\": \"low\", \"purchase_intent\": \"medium\", \
             \"purchase_intent_score\": 40, \"opportunity_score\": 30}\n```"
                .into(),
        ));
        let classifier = LlmClassifier::new(backend);
        let c = classifier.classify(&email()).await.unwrap();
        assert_eq!(c.category, EmailCategory::Inquiry);
        // requires_human_review defaults to false when absent
        assert!(!c.requires_human_review);
    }

    #[tokio::test]
    async fn out_of_range_scores_are_clamped() {
        let backend = Arc::new(CannedBackend(
            r#"{"category": "inquiry", "sentiment": "neutral", "urgency": "low",
                "purchase_intent": "low", "purchase_intent_score": 255,
                "opportunity_score": 180}"#
                .into(),
        ));
        let classifier = LlmClassifier::new(backend);
        let c = classifier.classify(&email()).await.unwrap();
        assert_eq!(c.purchase_intent_score, 100);
        assert_eq!(c.opportunity_score, 100);
    }

    #[tokio::test]
    async fn garbage_response_is_invalid() {
        let backend = Arc::new(CannedBackend("I cannot classify this.".into()));
        let classifier = LlmClassifier::new(backend);
        let err = classifier.classify(&email()).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse { .. }));
    }

    #[test]
    fn category_display_and_fromstr() {
        assert_eq!(EmailCategory::FollowUp.to_string(), "follow_up");
        assert_eq!(
            "complaint".parse::<EmailCategory>().unwrap(),
            EmailCategory::Complaint
        );
        assert!("unknown".parse::<EmailCategory>().is_err());
    }

    #[test]
    fn level_ordering_matches_rank() {
        assert!(Level::High > Level::Medium);
        assert!(Level::Medium > Level::Low);
        assert_eq!(Level::High.rank(), 2);
    }
}
