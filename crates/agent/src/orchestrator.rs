//! The per-session command state machine.
//!
//! A session is either idle or holding exactly one pending send awaiting a
//! spoken yes or no. Each turn runs the same pipeline: log the utterance,
//! classify it against the conversation so far, transition the pending
//! state, execute at most one Slack action, and speak the outcome. Turns
//! within a session are strictly serialized; different sessions proceed in
//! parallel.
//!
//! Failure containment: only a conversation-store failure aborts a turn.
//! Slack, oracle, and speech failures are turned into spoken replies so the
//! conversation always keeps going.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use hark_core::domain::{Intent, PendingAction, Role, SessionId};
use hark_db::{ConversationStore, StoreError};
use hark_slack::{SlackApiError, SlackGateway};
use hark_voice::{SpeechGateway, TranscriptionError, TranscriptionGateway};

use crate::handlers::{spoken_failure, ActionHandlers};
use crate::llm::LlmClient;
use crate::parser::IntentParser;

const ORACLE_DOWN_REPLY: &str =
    "Sorry, my assistant service is temporarily unavailable. Please try again in a moment.";

const TRANSCRIPTION_FAILED_REPLY: &str =
    "Sorry, I couldn't make out what you said. Could you try again?";

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Default)]
struct SessionState {
    pending: Option<PendingAction>,
}

pub struct CommandOrchestrator {
    store: Arc<dyn ConversationStore>,
    parser: IntentParser,
    handlers: ActionHandlers,
    speech: Arc<dyn SpeechGateway>,
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionState>>>>,
}

impl CommandOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        llm: Arc<dyn LlmClient>,
        slack: Arc<dyn SlackGateway>,
        speech: Arc<dyn SpeechGateway>,
    ) -> Self {
        Self {
            store,
            parser: IntentParser::new(llm),
            handlers: ActionHandlers::new(slack),
            speech,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one full turn and returns the spoken reply, or `None` when the
    /// utterance was empty (silence is not a turn). Store failures abort
    /// the turn; everything else becomes part of the reply.
    pub async fn process_turn(
        &self,
        session_id: &SessionId,
        utterance: &str,
    ) -> Result<Option<String>, TurnError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Ok(None);
        }

        let state = self.session_state(session_id).await;
        // Held for the whole turn; a session never interleaves turns.
        let mut state = state.lock().await;

        self.store.append_turn(session_id, Role::User, utterance).await?;
        let history = self.store.get_history(session_id).await?;

        let parsed =
            match self.parser.parse(utterance, &history, state.pending.as_ref()).await {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(session = %session_id, error = %error, "intent oracle unreachable");
                    self.store
                        .append_turn(session_id, Role::Assistant, ORACLE_DOWN_REPLY)
                        .await?;
                    self.speak(ORACLE_DOWN_REPLY).await;
                    return Ok(Some(ORACLE_DOWN_REPLY.to_owned()));
                }
            };

        info!(session = %session_id, intent = parsed.intent.name(), "turn classified");

        let assistant_reply = if parsed.reply.trim().is_empty() {
            fallback_reply(&parsed.intent)
        } else {
            parsed.reply.clone()
        };
        self.store.append_turn(session_id, Role::Assistant, &assistant_reply).await?;

        let final_reply = match parsed.intent {
            Intent::SendMessage { channel, content } => {
                // Last proposal wins; an unconfirmed earlier send is dropped.
                state.pending = Some(PendingAction::channel(channel, content));
                assistant_reply
            }
            Intent::SendDirectMessage { user, content } => {
                state.pending = Some(PendingAction::direct_message(user, content));
                assistant_reply
            }
            Intent::ConfirmPending => match state.pending.take() {
                Some(action) => {
                    let outcome = self.handlers.dispatch_pending(&action).await;
                    self.record_outcome(session_id, outcome).await?
                }
                None => assistant_reply,
            },
            Intent::CancelPending => {
                if state.pending.take().is_some() {
                    "Okay, I won't send it.".to_owned()
                } else {
                    assistant_reply
                }
            }
            Intent::FetchMessages { channel, count } => {
                let outcome = self.handlers.fetch_messages(&channel, count).await;
                self.record_outcome(session_id, outcome).await?
            }
            Intent::FetchMentions { channel, count } => {
                let outcome = self.handlers.fetch_mentions(channel.as_deref(), count).await;
                self.record_outcome(session_id, outcome).await?
            }
            Intent::FetchDirectMessages { user, count } => {
                let outcome = self.handlers.fetch_direct_messages(&user, count).await;
                self.record_outcome(session_id, outcome).await?
            }
            Intent::Converse => assistant_reply,
        };

        self.speak(&final_reply).await;
        Ok(Some(final_reply))
    }

    /// Audio entry point: transcribes the blob and runs the turn. Silence
    /// (an empty blob or an empty transcript) is not a turn; a provider
    /// failure becomes a spoken apology without touching the log.
    pub async fn process_audio_turn(
        &self,
        session_id: &SessionId,
        transcriber: &dyn TranscriptionGateway,
        audio: &[u8],
    ) -> Result<Option<String>, TurnError> {
        match transcriber.transcribe(audio).await {
            Ok(text) => self.process_turn(session_id, &text).await,
            Err(TranscriptionError::EmptyAudio | TranscriptionError::EmptyTranscript) => Ok(None),
            Err(error) => {
                warn!(session = %session_id, error = %error, "transcription failed");
                self.speak(TRANSCRIPTION_FAILED_REPLY).await;
                Ok(Some(TRANSCRIPTION_FAILED_REPLY.to_owned()))
            }
        }
    }

    /// Drops any pending action and marks the session completed.
    pub async fn reset_session(&self, session_id: &SessionId) -> Result<(), TurnError> {
        self.sessions.lock().await.remove(&session_id.0);
        self.store.complete_session(session_id).await?;
        Ok(())
    }

    /// The send currently awaiting confirmation, if any.
    pub async fn pending_action(&self, session_id: &SessionId) -> Option<PendingAction> {
        let state = self.sessions.lock().await.get(&session_id.0).cloned()?;
        let pending = state.lock().await.pending.clone();
        pending
    }

    async fn session_state(&self, session_id: &SessionId) -> Arc<Mutex<SessionState>> {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(session_id.0.clone()).or_default().clone()
    }

    /// Successful Slack results are logged as system turns so later parses
    /// can refer back to them; failures only become spoken replies.
    async fn record_outcome(
        &self,
        session_id: &SessionId,
        outcome: Result<String, SlackApiError>,
    ) -> Result<String, TurnError> {
        match outcome {
            Ok(summary) => {
                self.store.append_turn(session_id, Role::System, &summary).await?;
                Ok(summary)
            }
            Err(error) => {
                warn!(session = %session_id, error = %error, "slack action failed");
                Ok(spoken_failure(&error))
            }
        }
    }

    async fn speak(&self, reply: &str) {
        if let Err(error) = self.speech.speak(reply).await {
            warn!(error = %error, "could not queue spoken reply");
        }
    }
}

/// Used when the oracle produced a valid command but no reply text.
fn fallback_reply(intent: &Intent) -> String {
    match intent {
        Intent::SendMessage { channel, content } => {
            format!("Should I send \"{content}\" to #{channel}?")
        }
        Intent::SendDirectMessage { user, content } => {
            format!("Should I send \"{content}\" to {user}?")
        }
        Intent::CancelPending => "Okay, I won't send it.".to_owned(),
        _ => "Okay.".to_owned(),
    }
}
