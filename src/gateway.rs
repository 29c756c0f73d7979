//! LLM gateway: the capability every step depends on.
//!
//! `LlmGateway` is the seam between the engine and the model provider.
//! Real implementation: `HttpGateway` (OpenAI-compatible chat completions).
//! Test doubles implement the trait directly.
//!
//! Calls must be idempotent-safe: the orchestrator's retry path re-issues
//! the same request, so the gateway performs exactly one POST per call and
//! never retries on its own.

use crate::agent::StoryAgent;
use crate::config::LlmSettings;
use crate::errors::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything a generation call needs, assembled by the step executor.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Persona that conditions the generation
    pub persona: StoryAgent,
    /// The step's instruction
    pub instruction: String,
    /// Upstream input: guidance for step 0, the prior step's accepted
    /// output otherwise
    pub input_context: String,
    /// Accumulated world-context digest
    pub world_digest: String,
    /// Reviewer critique from the previous round, present on revision rounds
    pub prior_critique: Option<String>,
}

impl GenerateRequest {
    /// Compose the user-turn prompt. The persona's system prompt travels
    /// separately as the system turn.
    pub fn build_prompt(&self) -> String {
        let mut prompt = String::new();

        if !self.world_digest.trim().is_empty() {
            prompt.push_str("## WORLD CONTEXT\n");
            prompt.push_str(self.world_digest.trim());
            prompt.push_str("\n\n");
        }

        prompt.push_str("## INPUT\n");
        prompt.push_str(self.input_context.trim());
        prompt.push_str("\n\n## TASK\n");
        prompt.push_str(self.instruction.trim());

        if let Some(critique) = &self.prior_critique {
            prompt.push_str(
                "\n\n## REVISION DIRECTIVE\nYour previous attempt was rejected. \
                 You MUST address every point of this critique in your revision:\n",
            );
            prompt.push_str(critique.trim());
        }

        prompt
    }
}

/// Abstraction over text generation for testability and provider swaps.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Generate text for the request, or fail. Implementations must not
    /// retry internally; infrastructure recovery belongs to the caller.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GatewayError>;

    /// Whether credentials are in place. Checked as a precondition of
    /// `Orchestrator::start`.
    fn is_configured(&self) -> bool {
        true
    }
}

// ---- OpenAI-compatible wire types ----

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP gateway against an OpenAI-compatible chat-completions endpoint.
pub struct HttpGateway {
    client: reqwest::Client,
    settings: LlmSettings,
    api_key: Option<String>,
}

impl HttpGateway {
    /// Build a gateway from settings, resolving the API key from the
    /// configured environment variable. A missing key is not an error here;
    /// `is_configured` reports it and `generate` fails with
    /// `MissingCredentials`.
    pub fn new(settings: LlmSettings) -> Self {
        let api_key = std::env::var(&settings.api_key_env).ok().filter(|k| !k.is_empty());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            settings,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmGateway for HttpGateway {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GatewayError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| GatewayError::MissingCredentials {
            env_var: self.settings.api_key_env.clone(),
        })?;

        let prompt = request.build_prompt();
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.persona.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.settings.temperature,
        };

        tracing::debug!(
            agent = %request.persona.id,
            model = %self.settings.model,
            prompt_chars = prompt.len(),
            "dispatching generation request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .map(|e| e.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(GatewayError::Http)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(GatewayError::EmptyResponse)?;

        tracing::debug!(agent = %request.persona.id, output_chars = content.len(), "generation complete");
        Ok(content)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
