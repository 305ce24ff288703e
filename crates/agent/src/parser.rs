//! Utterance classification.
//!
//! The parser asks the language model to classify one utterance against the
//! closed intent set and then validates the answer hard: any completion that
//! is not a well-formed, fully-specified command collapses to `Converse`,
//! with the raw completion text as the spoken reply. The model therefore
//! cannot invent an action the rest of the system does not know.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use hark_core::domain::{
    Intent, ParsedTurn, PendingAction, Turn, DEFAULT_FETCH_DMS_COUNT,
    DEFAULT_FETCH_MENTIONS_COUNT, DEFAULT_FETCH_MESSAGES_COUNT,
};

use crate::llm::{LlmClient, LlmError};

const HISTORY_WINDOW: usize = 20;

const SYSTEM_PROMPT: &str = r#"You are the intent classifier for a voice-controlled Slack assistant.
Given the conversation so far and the latest spoken utterance, respond with a single JSON object and nothing else:

{
  "action": one of "send_message", "send_direct_message", "fetch_messages", "fetch_mentions", "fetch_direct_messages", "confirm", "cancel", "converse",
  "channel": channel name without the # prefix, when the action targets a channel,
  "user": display name or email of the person, when the action targets a person,
  "message": the exact text to send, for send actions,
  "count": number of items requested, only when the user said an explicit number,
  "reply": what the assistant should say out loud next
}

Rules:
- "confirm" and "cancel" apply only to the pending action shown in the context.
- For "fetch_mentions" across every channel, set "channel" to "ALL" or omit it.
- For a send action, "reply" must restate the message and its destination as a question.
- When the utterance is not a command, use "converse" and answer naturally in "reply".
- Never invent channel names, people, or message text the user did not say."#;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("intent oracle unavailable: {0}")]
    OracleUnavailable(#[from] LlmError),
}

/// Classifies transcribed utterances. Owns the prompt contract with the
/// language model and all validation of what comes back.
pub struct IntentParser {
    llm: Arc<dyn LlmClient>,
}

impl IntentParser {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// One utterance in, one `ParsedTurn` out. Fails only when the model
    /// itself is unreachable; every content-level problem degrades to
    /// `Converse`.
    pub async fn parse(
        &self,
        utterance: &str,
        history: &[Turn],
        pending: Option<&PendingAction>,
    ) -> Result<ParsedTurn, ParseError> {
        let user_prompt = build_user_prompt(utterance, history, pending);
        let raw = self.llm.complete(SYSTEM_PROMPT, &user_prompt).await?;

        let mut parsed = interpret_completion(&raw, utterance);

        // A confirmation answer misread as chit-chat would strand the pending
        // send, so a direct yes/no in the utterance overrides `Converse`.
        if pending.is_some() && parsed.intent == Intent::Converse {
            if let Some(resolution) = lexical_confirmation(utterance) {
                parsed.intent = resolution;
            }
        }

        Ok(parsed)
    }
}

fn build_user_prompt(
    utterance: &str,
    history: &[Turn],
    pending: Option<&PendingAction>,
) -> String {
    let mut prompt = String::from("Conversation so far:\n");
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    if history[start..].is_empty() {
        prompt.push_str("(none)\n");
    }
    for turn in &history[start..] {
        prompt.push_str(turn.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(&turn.content);
        prompt.push('\n');
    }

    prompt.push_str("\nPending action awaiting confirmation: ");
    match pending {
        Some(action) => prompt.push_str(&action.describe()),
        None => prompt.push_str("none"),
    }

    prompt.push_str("\n\nUtterance: ");
    prompt.push_str(utterance);
    prompt
}

#[derive(Debug, Default, Deserialize)]
struct OracleCommand {
    action: Option<String>,
    channel: Option<String>,
    user: Option<String>,
    message: Option<String>,
    count: Option<u32>,
    reply: Option<String>,
}

/// Turns a raw completion into a validated `ParsedTurn`. Malformed JSON and
/// under-specified commands both land on `Converse`.
fn interpret_completion(raw: &str, utterance: &str) -> ParsedTurn {
    let fallback_reply = raw.trim().to_owned();

    let command = match extract_json(raw).and_then(|json| {
        serde_json::from_str::<OracleCommand>(json).ok()
    }) {
        Some(command) => command,
        None => return ParsedTurn { intent: Intent::Converse, reply: fallback_reply },
    };

    let reply = command
        .reply
        .as_deref()
        .map(str::trim)
        .filter(|reply| !reply.is_empty())
        .map(str::to_owned)
        .unwrap_or(fallback_reply);

    let channel = non_empty(command.channel);
    let user = non_empty(command.user);
    let message = non_empty(command.message);

    let intent = match command.action.as_deref().map(str::trim) {
        Some("send_message") => match (channel, message) {
            (Some(channel), Some(content)) => Intent::SendMessage { channel, content },
            _ => Intent::Converse,
        },
        Some("send_direct_message") => match (user, message) {
            (Some(user), Some(content)) => Intent::SendDirectMessage { user, content },
            _ => Intent::Converse,
        },
        Some("fetch_messages") => match channel {
            Some(channel) => Intent::FetchMessages {
                channel,
                count: resolve_count(command.count, utterance, DEFAULT_FETCH_MESSAGES_COUNT),
            },
            None => Intent::Converse,
        },
        Some("fetch_mentions") => Intent::FetchMentions {
            channel: channel.filter(|name| !name.eq_ignore_ascii_case("all")),
            count: resolve_count(command.count, utterance, DEFAULT_FETCH_MENTIONS_COUNT),
        },
        Some("fetch_direct_messages") => match user {
            Some(user) => Intent::FetchDirectMessages {
                user,
                count: resolve_count(command.count, utterance, DEFAULT_FETCH_DMS_COUNT),
            },
            None => Intent::Converse,
        },
        Some("confirm") | Some("confirm_pending") => Intent::ConfirmPending,
        Some("cancel") | Some("cancel_pending") => Intent::CancelPending,
        _ => Intent::Converse,
    };

    ParsedTurn { intent, reply }
}

/// Pulls the JSON object out of a completion that may be fenced or wrapped
/// in prose.
fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

/// Count precedence: an explicit number from the model wins, then quantity
/// words in the utterance, then the per-intent default.
fn resolve_count(explicit: Option<u32>, utterance: &str, default: u32) -> u32 {
    if let Some(count) = explicit.filter(|count| *count > 0) {
        return count;
    }

    let lowered = utterance.to_ascii_lowercase();
    if lowered.contains("couple") || lowered.contains("few") {
        return 3;
    }
    if lowered.contains("most recent") || lowered.contains("last") {
        return 1;
    }

    default
}

/// Word-level scan for a confirmation answer. Negation wins when both kinds
/// of token appear ("no, don't confirm").
fn lexical_confirmation(utterance: &str) -> Option<Intent> {
    let lowered = utterance.to_ascii_lowercase();
    let mut affirmative = false;
    let mut negative = false;

    for token in lowered.split(|ch: char| !ch.is_ascii_alphanumeric()) {
        match token {
            "yes" | "yeah" | "yep" | "confirm" | "confirmed" => affirmative = true,
            "no" | "nope" | "cancel" | "stop" => negative = true,
            _ => {}
        }
    }

    if negative {
        Some(Intent::CancelPending)
    } else if affirmative {
        Some(Intent::ConfirmPending)
    } else {
        None
    }
}
