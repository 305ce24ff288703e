use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use hark_core::config::SpeechConfig;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("speech provider failed with status {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("speech transport failure: {0}")]
    Transport(String),
    #[error("speech queue is closed")]
    QueueClosed,
    #[error("audio playback failed: {0}")]
    Playback(String),
}

/// Queued text-to-speech. `speak` enqueues and returns; playback is strictly
/// FIFO and an in-flight utterance is never preempted, including across
/// turns.
#[async_trait]
pub trait SpeechGateway: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}

#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Plays one utterance to completion before returning.
    async fn play(&self, audio: &[u8]) -> Result<(), SynthesisError>;
}

pub struct HttpSynthesizer {
    http: reqwest::Client,
    base_url: String,
    voice: String,
    api_key: Option<String>,
}

impl HttpSynthesizer {
    pub fn from_config(config: &SpeechConfig) -> Result<Self, SynthesisError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| SynthesisError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.tts_base_url.trim_end_matches('/').to_owned(),
            voice: config.tts_voice.clone(),
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_owned()),
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let payload = json!({ "voice": self.voice, "input": text });

        let mut request = self.http.post(format!("{}/audio/speech", self.base_url)).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| SynthesisError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Provider {
                status: status.as_u16(),
                message: body.chars().take(512).collect(),
            });
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|error| SynthesisError::Transport(error.to_string()))
    }
}

enum Job {
    Speak(String),
    Flush(oneshot::Sender<()>),
}

/// FIFO playback queue over a synthesizer and a sink. A synthesis or
/// playback failure is logged and the queue moves on; a failed read-back
/// must not corrupt anything upstream.
pub struct SpeechQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl SpeechQueue {
    pub fn start(synthesizer: Arc<dyn Synthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                match job {
                    Job::Speak(text) => {
                        let audio = match synthesizer.synthesize(&text).await {
                            Ok(audio) => audio,
                            Err(error) => {
                                warn!(error = %error, "speech synthesis failed; skipping utterance");
                                continue;
                            }
                        };
                        if let Err(error) = sink.play(&audio).await {
                            warn!(error = %error, "audio playback failed; skipping utterance");
                        }
                    }
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self { sender }
    }

    /// Resolves once every job enqueued before the call has been played.
    pub async fn drain(&self) -> Result<(), SynthesisError> {
        let (done, wait) = oneshot::channel();
        self.sender.send(Job::Flush(done)).map_err(|_| SynthesisError::QueueClosed)?;
        wait.await.map_err(|_| SynthesisError::QueueClosed)
    }
}

#[async_trait]
impl SpeechGateway for SpeechQueue {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        self.sender
            .send(Job::Speak(text.to_owned()))
            .map_err(|_| SynthesisError::QueueClosed)
    }
}
