use serde::{Deserialize, Serialize};

pub const DEFAULT_FETCH_MESSAGES_COUNT: u32 = 3;
pub const DEFAULT_FETCH_MENTIONS_COUNT: u32 = 5;
pub const DEFAULT_FETCH_DMS_COUNT: u32 = 5;

/// Closed classification of one user utterance. Anything the oracle returns
/// that does not fit one of these shapes is coerced to `Converse` at the
/// parser boundary; the orchestrator never sees a partial intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    SendMessage { channel: String, content: String },
    SendDirectMessage { user: String, content: String },
    FetchMessages { channel: String, count: u32 },
    /// `channel: None` means a cross-channel mention search.
    FetchMentions { channel: Option<String>, count: u32 },
    FetchDirectMessages { user: String, count: u32 },
    Converse,
    ConfirmPending,
    CancelPending,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::SendDirectMessage { .. } => "send_direct_message",
            Self::FetchMessages { .. } => "fetch_messages",
            Self::FetchMentions { .. } => "fetch_mentions",
            Self::FetchDirectMessages { .. } => "fetch_direct_messages",
            Self::Converse => "converse",
            Self::ConfirmPending => "confirm_pending",
            Self::CancelPending => "cancel_pending",
        }
    }

    /// Fetch intents execute immediately and never touch pending state.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            Self::FetchMessages { .. }
                | Self::FetchMentions { .. }
                | Self::FetchDirectMessages { .. }
        )
    }
}

/// Parser output: exactly one intent plus the conversational reply to speak.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedTurn {
    pub intent: Intent,
    pub reply: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    Channel,
    DirectMessage,
}

/// A proposed send awaiting explicit confirmation. At most one exists per
/// session; a second unconfirmed send replaces the first (last-proposed-wins).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: PendingKind,
    pub target: String,
    pub content: String,
}

impl PendingAction {
    pub fn channel(target: impl Into<String>, content: impl Into<String>) -> Self {
        Self { kind: PendingKind::Channel, target: target.into(), content: content.into() }
    }

    pub fn direct_message(target: impl Into<String>, content: impl Into<String>) -> Self {
        Self { kind: PendingKind::DirectMessage, target: target.into(), content: content.into() }
    }

    pub fn describe(&self) -> String {
        match self.kind {
            PendingKind::Channel => {
                format!("send \"{}\" to #{}", self.content, self.target)
            }
            PendingKind::DirectMessage => {
                format!("send \"{}\" to {}", self.content, self.target)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Intent, PendingAction};

    #[test]
    fn fetch_intents_are_flagged_as_fetch() {
        assert!(Intent::FetchMessages { channel: "general".to_owned(), count: 3 }.is_fetch());
        assert!(Intent::FetchMentions { channel: None, count: 5 }.is_fetch());
        assert!(Intent::FetchDirectMessages { user: "ana".to_owned(), count: 5 }.is_fetch());
        assert!(!Intent::Converse.is_fetch());
        assert!(
            !Intent::SendMessage { channel: "general".to_owned(), content: "hi".to_owned() }
                .is_fetch()
        );
    }

    #[test]
    fn pending_action_description_names_target_and_content() {
        let action = PendingAction::channel("general", "hello");
        assert_eq!(action.describe(), "send \"hello\" to #general");

        let dm = PendingAction::direct_message("ana@example.com", "hello");
        assert_eq!(dm.describe(), "send \"hello\" to ana@example.com");
    }
}
