use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: String,
    pub name: String,
    pub is_member: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DmUser {
    pub slack_user_id: String,
    pub display_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectChannel {
    pub id: String,
}

/// One Slack message as returned by history/search calls. Lists are always
/// newest-first, the order Slack returns them in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackMessage {
    pub user: Option<String>,
    pub text: String,
    pub ts: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MentionScope {
    AllChannels,
    Channel(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("identifier `{identifier}` matched {matches} users")]
    AmbiguousUser { identifier: String, matches: usize },
    #[error("slack rate limit not cleared after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("no slack credential available")]
    MissingCredential,
    #[error("slack api `{operation}` failed: {code}")]
    Api { operation: String, code: String },
    #[error("slack transport failure during `{operation}`: {message}")]
    Transport { operation: String, message: String },
}

/// The Slack Web API operations Hark consumes. Channel resolution is a
/// case-insensitive exact name match; DM user resolution matches display
/// name, real name, or email and refuses to guess among multiple candidates.
#[async_trait]
pub trait SlackGateway: Send + Sync {
    async fn resolve_channel(&self, name: &str) -> Result<ChannelRef, SlackApiError>;

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackApiError>;

    /// Newest-first history, at most `limit` messages.
    async fn list_history(
        &self,
        channel_id: &str,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SlackApiError>;

    async fn open_direct_channel(&self, user_id: &str) -> Result<DirectChannel, SlackApiError>;

    async fn resolve_dm_user(&self, identifier: &str) -> Result<DmUser, SlackApiError>;

    /// Messages mentioning the bot identity, newest first, at most `limit`.
    async fn search_mentions(
        &self,
        scope: MentionScope,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SlackApiError>;
}
