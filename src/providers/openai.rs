//! OpenAI-compatible chat completions backend

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::GenerationSettings;
use crate::context::Prompt;
use crate::response::TextGenerator;
use crate::{Error, Result};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generates replies through a `/chat/completions` endpoint
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsGenerator {
    /// Create a generator from resolved settings
    ///
    /// The request timeout is enforced by the caller, not the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            Error::Config(
                "API key required for text generation (set COLLOQUY_API_KEY or OPENAI_API_KEY)"
                    .to_string(),
            )
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        tracing::debug!(
            model = %self.model,
            prompt_chars = prompt.user.len(),
            "requesting completion"
        );

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "completion request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "completion API error");
            return Err(Error::Generation(format!("completion API error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}
