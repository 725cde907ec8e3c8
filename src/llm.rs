//! Generation backend — the seam to the LLM provider.
//!
//! The engine talks to the model through the [`GenerationBackend`] trait; the
//! shipped implementation is an OpenAI-compatible chat-completions client over
//! reqwest. Tests substitute canned backends.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::config::GenerationConfig;
use crate::error::GenerationError;

/// One generation call: a system prompt, a user prompt, and sampling knobs.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Model override; falls back to the backend's configured default.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: None,
            temperature: 0.3,
            max_tokens: 1024,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Text generation provider. External collaborator boundary.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Run one completion and return the raw text output.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;

    /// Translate content to a target language. UI-facing convenience; default
    /// implementation routes through `generate`.
    async fn translate(&self, content: &str, target_lang: &str) -> Result<String, GenerationError> {
        let request = GenerationRequest::new(
            format!(
                "You are a translator. Translate the user's text to {target_lang}. \
                 Output only the translation."
            ),
            content.to_string(),
        );
        self.generate(request).await
    }
}

/// OpenAI-compatible chat-completions backend.
pub struct HttpBackend {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl HttpBackend {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);

        let body = json!({
            "model": model,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
        });

        debug!(model, "Calling generation backend");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::UpstreamUnavailable {
                reason: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, body = %text, "Generation backend returned error status");
            return Err(GenerationError::UpstreamUnavailable {
                reason: format!("status {status}"),
            });
        }

        let parsed: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| GenerationError::InvalidResponse {
                    reason: format!("completion JSON: {e}"),
                })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse {
                reason: "no choices in completion".into(),
            })
    }
}

/// Extract a JSON object from LLM output that might contain markdown or extra text.
pub(crate) fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in a markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Try to find object bounds
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    // Give up, return as-is
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_direct() {
        let input = r#"{"subject": "Re: hi", "body": "hello"}"#;
        assert_eq!(extract_json_object(input), input);
    }

    #[test]
    fn extract_json_from_markdown() {
        let input = "Here you go:\n```json\n{\"subject\": \"s\", \"body\": \"b\"}\n```\n";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.contains("\"subject\""));
    }

    #[test]
    fn extract_json_with_surrounding_text() {
        let input = "Sure! {\"subject\": \"s\", \"body\": \"b\"} hope that helps";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.ends_with('}'));
    }

    #[test]
    fn extract_json_gives_up_gracefully() {
        assert_eq!(extract_json_object("no json here"), "no json here");
    }
}
