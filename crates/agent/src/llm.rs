//! Chat-completion client used by the intent parser.
//!
//! One request per user turn: a system prompt carrying the classification
//! contract plus a user prompt carrying the utterance and its context. The
//! response is raw text; all JSON interpretation happens in `parser`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use hark_core::config::{LlmConfig, LlmProvider};

const MAX_ERROR_BODY_CHARS: usize = 512;
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("language model provider failed with status {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("language model transport failure: {0}")]
    Transport(String),
    #[error("language model returned an empty completion")]
    EmptyCompletion,
}

/// Text in, text out. Implementations never interpret the completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

pub struct HttpLlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_owned());

        Ok(Self {
            http,
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_owned()),
        })
    }

    async fn complete_chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        // OpenAI-style chat completions; Ollama serves the same shape.
        let url = match self.provider {
            LlmProvider::Ollama => format!("{}/v1/chat/completions", self.base_url),
            _ => format!("{}/chat/completions", self.base_url),
        };
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": 0,
        });

        let mut request = self.http.post(url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let body: ChatCompletionResponse = send_and_decode(request).await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyCompletion)
    }

    async fn complete_anthropic(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, LlmError> {
        let payload = json!({
            "model": self.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "system": system_prompt,
            "messages": [{ "role": "user", "content": user_prompt }],
        });

        let mut request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let body: AnthropicResponse = send_and_decode(request).await?;
        let text = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim().to_owned();
        if text.is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                self.complete_chat(system_prompt, user_prompt).await
            }
            LlmProvider::Anthropic => self.complete_anthropic(system_prompt, user_prompt).await,
        }
    }
}

async fn send_and_decode<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, LlmError> {
    let response =
        request.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Provider {
            status: status.as_u16(),
            message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    response.json::<T>().await.map_err(|error| LlmError::Transport(error.to_string()))
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}
