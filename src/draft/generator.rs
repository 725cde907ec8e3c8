//! Draft generator — produces candidate replies via the generation backend,
//! optionally grounded on knowledge-base snippets.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::InboundEmail;
use crate::config::EngineConfig;
use crate::error::GenerationError;
use crate::knowledge::{KnowledgeSnippet, KnowledgeStore};
use crate::llm::{extract_json_object, GenerationBackend, GenerationRequest};
use crate::rules::AutoReplyRule;

/// Instruction used when the caller supplies none (an empty instruction is
/// not an error).
const DEFAULT_INSTRUCTION: &str = "Write a helpful, accurate reply to this email.";

/// A generated candidate reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Snippets attached to the generation context, returned as provenance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knowledge_used: Vec<KnowledgeSnippet>,
}

/// Options for one generation call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub use_knowledge_base: bool,
    pub tone: String,
    pub model: Option<String>,
    pub prompt_template: Option<String>,
    pub instruction: Option<String>,
}

impl GenerateOptions {
    /// Derive options from the matched rule's generation settings.
    pub fn from_rule(rule: &AutoReplyRule, instruction: Option<String>) -> Self {
        Self {
            use_knowledge_base: rule.generation.use_knowledge_base,
            tone: rule.generation.tone.clone(),
            model: rule.generation.model.clone(),
            prompt_template: rule.generation.prompt_template.clone(),
            instruction,
        }
    }
}

/// What the backend is asked to return.
#[derive(Deserialize)]
struct DraftPayload {
    subject: String,
    body: String,
    #[serde(default)]
    html: Option<String>,
}

/// Produces candidate replies. Failure leaves any prior draft untouched —
/// callers only commit the returned `Draft` on success.
pub struct DraftGenerator {
    backend: Arc<dyn GenerationBackend>,
    knowledge: Arc<dyn KnowledgeStore>,
    top_k: usize,
    similarity_floor: f32,
}

impl DraftGenerator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        knowledge: Arc<dyn KnowledgeStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            backend,
            knowledge,
            top_k: config.knowledge_top_k,
            similarity_floor: config.similarity_floor,
        }
    }

    /// Generate a draft reply for `email` under `options`.
    pub async fn generate(
        &self,
        email: &InboundEmail,
        options: &GenerateOptions,
    ) -> Result<Draft, GenerationError> {
        let snippets = if options.use_knowledge_base {
            self.retrieve_snippets(email).await
        } else {
            Vec::new()
        };

        let instruction = options
            .instruction
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_INSTRUCTION);

        let system_prompt = build_system_prompt(&options.tone, options.prompt_template.as_deref());
        let user_prompt = build_user_prompt(email, &snippets, instruction);

        let request = GenerationRequest::new(system_prompt, user_prompt)
            .with_model(options.model.clone())
            .with_temperature(0.4);

        let raw = self.backend.generate(request).await?;
        let json = extract_json_object(&raw);
        let payload: DraftPayload = serde_json::from_str(&json).map_err(|e| {
            warn!(error = %e, raw = %raw, "Failed to parse draft response");
            GenerationError::InvalidResponse {
                reason: format!("draft JSON: {e}"),
            }
        })?;

        info!(
            from = %email.from,
            snippets = snippets.len(),
            "Draft generated"
        );

        Ok(Draft {
            subject: payload.subject,
            body: payload.body,
            html: payload.html,
            knowledge_used: snippets,
        })
    }

    async fn retrieve_snippets(&self, email: &InboundEmail) -> Vec<KnowledgeSnippet> {
        let query = format!("{} {}", email.subject, email.body);
        let snippets: Vec<KnowledgeSnippet> = self
            .knowledge
            .search(&query, self.top_k)
            .await
            .into_iter()
            .filter(|s| s.similarity >= self.similarity_floor)
            .collect();

        debug!(
            count = snippets.len(),
            floor = self.similarity_floor,
            "Knowledge snippets retrieved"
        );
        snippets
    }
}

fn build_system_prompt(tone: &str, template: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an email reply assistant for a sales team. Write a reply in a \
         {tone} tone.\n\n\
         Respond with a single JSON object:\n\
         {{\"subject\": \"...\", \"body\": \"...\"}}\n\n\
         ONLY output the JSON object. No other text."
    );
    if let Some(template) = template {
        prompt.push_str("\n\nFollow this reply template:\n");
        prompt.push_str(template);
    }
    prompt
}

fn build_user_prompt(
    email: &InboundEmail,
    snippets: &[KnowledgeSnippet],
    instruction: &str,
) -> String {
    let mut prompt = format!(
        "Incoming email\nFrom: {from}\nSubject: {subject}\n\n{body}\n",
        from = email.from,
        subject = email.subject,
        body = email.body,
    );

    if !snippets.is_empty() {
        prompt.push_str("\nReference material:\n");
        for snippet in snippets {
            prompt.push_str(&format!(
                "- [{}] {}\n",
                snippet.document_title, snippet.content
            ));
        }
    }

    prompt.push_str(&format!("\nInstruction: {instruction}\n"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    use crate::knowledge::{InMemoryKnowledgeStore, KnowledgeDocument};

    /// Backend that records every request and returns a canned draft.
    struct RecordingBackend {
        requests: Mutex<Vec<GenerationRequest>>,
        response: Result<String, GenerationError>,
    }

    impl RecordingBackend {
        fn ok(json: &str) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                response: Ok(json.to_string()),
            }
        }

        fn failing() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                response: Err(GenerationError::UpstreamUnavailable {
                    reason: "connection refused".into(),
                }),
            }
        }

        fn last_user_prompt(&self) -> String {
            self.requests
                .lock()
                .unwrap()
                .last()
                .map(|r| r.user_prompt.clone())
                .unwrap()
        }
    }

    #[async_trait]
    impl GenerationBackend for RecordingBackend {
        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            self.requests.lock().unwrap().push(request);
            match &self.response {
                Ok(s) => Ok(s.clone()),
                Err(GenerationError::UpstreamUnavailable { reason }) => {
                    Err(GenerationError::UpstreamUnavailable {
                        reason: reason.clone(),
                    })
                }
                Err(_) => unreachable!(),
            }
        }
    }

    const CANNED_DRAFT: &str =
        r#"{"subject": "Re: Price for 500 units", "body": "Thanks for reaching out..."}"#;

    fn email() -> InboundEmail {
        InboundEmail {
            from: "buyer@example.com".into(),
            sender_name: None,
            subject: "Price for 500 units".into(),
            body: "Please quote volume pricing for 500 units.".into(),
            received_at: Utc::now(),
        }
    }

    fn options(use_kb: bool, instruction: Option<&str>) -> GenerateOptions {
        GenerateOptions {
            use_knowledge_base: use_kb,
            tone: "professional".into(),
            model: None,
            prompt_template: None,
            instruction: instruction.map(String::from),
        }
    }

    fn generator(backend: Arc<RecordingBackend>, docs: Vec<KnowledgeDocument>) -> DraftGenerator {
        DraftGenerator::new(
            backend,
            Arc::new(InMemoryKnowledgeStore::new(docs)),
            &EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn generates_draft_from_backend_json() {
        let backend = Arc::new(RecordingBackend::ok(CANNED_DRAFT));
        let generator = generator(Arc::clone(&backend), vec![]);

        let draft = generator.generate(&email(), &options(false, None)).await.unwrap();
        assert_eq!(draft.subject, "Re: Price for 500 units");
        assert!(draft.knowledge_used.is_empty());
    }

    #[tokio::test]
    async fn knowledge_snippets_attached_and_returned_as_provenance() {
        let backend = Arc::new(RecordingBackend::ok(CANNED_DRAFT));
        let generator = generator(
            Arc::clone(&backend),
            vec![KnowledgeDocument {
                title: "Pricing tiers".into(),
                content: "Volume pricing applies for 500 units and above.".into(),
            }],
        );

        let draft = generator.generate(&email(), &options(true, None)).await.unwrap();
        assert_eq!(draft.knowledge_used.len(), 1);
        assert_eq!(draft.knowledge_used[0].document_title, "Pricing tiers");
        assert!(backend.last_user_prompt().contains("Pricing tiers"));
    }

    #[tokio::test]
    async fn low_similarity_snippets_are_dropped() {
        let backend = Arc::new(RecordingBackend::ok(CANNED_DRAFT));
        let generator = generator(
            Arc::clone(&backend),
            vec![KnowledgeDocument {
                title: "Unrelated".into(),
                content: "Holiday schedule for the warehouse staff.".into(),
            }],
        );

        let draft = generator.generate(&email(), &options(true, None)).await.unwrap();
        assert!(draft.knowledge_used.is_empty());
    }

    #[tokio::test]
    async fn empty_instruction_falls_back_to_default() {
        let backend = Arc::new(RecordingBackend::ok(CANNED_DRAFT));
        let generator = generator(Arc::clone(&backend), vec![]);

        generator.generate(&email(), &options(false, Some("   ")))
            .await
            .unwrap();
        assert!(backend.last_user_prompt().contains(DEFAULT_INSTRUCTION));
    }

    #[tokio::test]
    async fn custom_instruction_is_used() {
        let backend = Arc::new(RecordingBackend::ok(CANNED_DRAFT));
        let generator = generator(Arc::clone(&backend), vec![]);

        generator.generate(&email(), &options(false, Some("Mention the spring discount")))
            .await
            .unwrap();
        let prompt = backend.last_user_prompt();
        assert!(prompt.contains("Mention the spring discount"));
        assert!(!prompt.contains(DEFAULT_INSTRUCTION));
    }

    #[tokio::test]
    async fn upstream_failure_propagates() {
        let backend = Arc::new(RecordingBackend::failing());
        let generator = generator(backend, vec![]);

        let err = generator.generate(&email(), &options(false, None)).await.unwrap_err();
        assert!(matches!(err, GenerationError::UpstreamUnavailable { .. }));
    }

    #[tokio::test]
    async fn unparseable_draft_is_invalid_response() {
        let backend = Arc::new(RecordingBackend::ok("sorry, no can do"));
        let generator = generator(backend, vec![]);

        let err = generator.generate(&email(), &options(false, None)).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse { .. }));
    }
}
