use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use hark_core::config::SpeechConfig;

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranscriptionError {
    #[error("input audio is empty")]
    EmptyAudio,
    #[error("provider returned no usable transcript")]
    EmptyTranscript,
    #[error("transcription provider failed with status {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("transcription transport failure: {0}")]
    Transport(String),
}

/// Audio blob in, utterance text out. The caller decides what an empty
/// transcript means; this gateway never retries.
#[async_trait]
pub trait TranscriptionGateway: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError>;
}

#[derive(Debug, Clone, Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
}

pub struct HttpTranscriber {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpTranscriber {
    pub fn from_config(config: &SpeechConfig) -> Result<Self, TranscriptionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| TranscriptionError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.stt_base_url.trim_end_matches('/').to_owned(),
            model: config.stt_model.clone(),
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_owned()),
        })
    }
}

#[async_trait]
impl TranscriptionGateway for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
        if audio.is_empty() {
            return Err(TranscriptionError::EmptyAudio);
        }

        let payload = json!({
            "model": self.model,
            "audio": BASE64_STANDARD.encode(audio),
            "response_format": "json",
        });

        let mut request = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| TranscriptionError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Provider {
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|error| TranscriptionError::Transport(error.to_string()))?;

        parsed
            .text
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty())
            .ok_or(TranscriptionError::EmptyTranscript)
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::{truncate, HttpTranscriber, TranscriptionError, TranscriptionGateway};
    use hark_core::config::AppConfig;

    #[tokio::test]
    async fn empty_audio_is_rejected_before_any_call() {
        let transcriber =
            HttpTranscriber::from_config(&AppConfig::default().speech).expect("build");
        let result = transcriber.transcribe(&[]).await;
        assert_eq!(result, Err(TranscriptionError::EmptyAudio));
    }

    #[test]
    fn error_bodies_are_truncated() {
        let long = "x".repeat(2_000);
        assert_eq!(truncate(&long, 512).len(), 512);
        assert_eq!(truncate("short", 512), "short");
    }
}
