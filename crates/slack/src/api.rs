use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use hark_core::config::SlackConfig;

use crate::gateway::{
    ChannelRef, DirectChannel, DmUser, MentionScope, SlackApiError, SlackGateway, SlackMessage,
};

// Per cross-channel mention scan: how many member channels we are willing to
// walk and how deep into each channel's history we look.
const MENTION_SCAN_CHANNEL_CAP: usize = 25;
const MENTION_SCAN_HISTORY_DEPTH: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    user_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelListResponse {
    ok: bool,
    channels: Option<Vec<ChannelEntry>>,
    response_metadata: Option<ResponseMetadata>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelEntry {
    id: String,
    name: String,
    #[serde(default)]
    is_member: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMetadata {
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HistoryResponse {
    ok: bool,
    messages: Option<Vec<MessageEntry>>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageEntry {
    user: Option<String>,
    #[serde(default)]
    text: String,
    ts: String,
}

#[derive(Debug, Clone, Deserialize)]
struct UserListResponse {
    ok: bool,
    members: Option<Vec<UserEntry>>,
    response_metadata: Option<ResponseMetadata>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct UserEntry {
    id: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
    profile: Option<UserProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UserProfile {
    display_name: Option<String>,
    real_name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenConversationResponse {
    ok: bool,
    channel: Option<OpenedChannel>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenedChannel {
    id: String,
}

/// reqwest-backed `SlackGateway`. Rate limits (HTTP 429 and transient 5xx)
/// are retried with bounded exponential backoff honouring `Retry-After`;
/// every other failure surfaces immediately as a typed `SlackApiError`.
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    max_retries: u32,
    retry_base_delay_ms: u64,
    bot_user_id: OnceCell<String>,
}

impl SlackApiClient {
    pub fn from_config(config: &SlackConfig) -> Result<Self, SlackApiError> {
        let bot_token = config.bot_token.expose_secret().trim().to_owned();
        if bot_token.is_empty() {
            return Err(SlackApiError::MissingCredential);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|error| SlackApiError::Transport {
                operation: "client_init".to_owned(),
                message: error.to_string(),
            })?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            bot_token,
            max_retries: config.max_retries.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
            bot_user_id: OnceCell::new(),
        })
    }

    async fn bot_user_id(&self) -> Result<&str, SlackApiError> {
        self.bot_user_id
            .get_or_try_init(|| async {
                let response: AuthTestResponse = self.call("auth.test", json!({})).await?;
                if !response.ok {
                    return Err(api_error("auth.test", response.error));
                }
                response
                    .user_id
                    .filter(|value| !value.trim().is_empty())
                    .ok_or_else(|| SlackApiError::Api {
                        operation: "auth.test".to_owned(),
                        code: "missing_user_id".to_owned(),
                    })
            })
            .await
            .map(String::as_str)
    }

    async fn call<T>(&self, method: &str, payload: serde_json::Value) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/{method}", self.api_base);
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.bot_token)
                .json(&payload)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|error| {
                            SlackApiError::Transport {
                                operation: method.to_owned(),
                                message: format!("response decode failed: {error}"),
                            }
                        });
                    }

                    let retry_after = parse_retry_after(response.headers());
                    if attempt < self.max_retries && is_retryable_status(status.as_u16()) {
                        let delay =
                            retry_delay(self.retry_base_delay_ms, attempt, retry_after);
                        debug!(
                            method,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            status = status.as_u16(),
                            "slack call rate limited; backing off"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if status.as_u16() == 429 {
                        return Err(SlackApiError::RateLimited { attempts: attempt });
                    }
                    return Err(SlackApiError::Transport {
                        operation: method.to_owned(),
                        message: format!("http status {}", status.as_u16()),
                    });
                }
                Err(error) => {
                    if attempt < self.max_retries && (error.is_timeout() || error.is_connect()) {
                        let delay = retry_delay(self.retry_base_delay_ms, attempt, None);
                        warn!(method, attempt, error = %error, "slack transport error; retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(SlackApiError::Transport {
                        operation: method.to_owned(),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    async fn list_member_channels(&self) -> Result<Vec<ChannelEntry>, SlackApiError> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut payload = json!({
                "exclude_archived": true,
                "types": "public_channel,private_channel",
                "limit": 200,
            });
            if let Some(cursor_value) = &cursor {
                payload["cursor"] = json!(cursor_value);
            }

            let response: ChannelListResponse =
                self.call("conversations.list", payload).await?;
            if !response.ok {
                return Err(api_error("conversations.list", response.error));
            }
            channels.extend(response.channels.unwrap_or_default());

            cursor = response
                .response_metadata
                .and_then(|metadata| metadata.next_cursor)
                .filter(|value| !value.is_empty());
            if cursor.is_none() {
                return Ok(channels);
            }
        }
    }
}

#[async_trait]
impl SlackGateway for SlackApiClient {
    async fn resolve_channel(&self, name: &str) -> Result<ChannelRef, SlackApiError> {
        let wanted = name.trim().trim_start_matches('#');
        let channels = self.list_member_channels().await?;

        channels
            .into_iter()
            .find(|channel| channel.name.eq_ignore_ascii_case(wanted))
            .map(|channel| ChannelRef {
                id: channel.id,
                name: channel.name,
                is_member: channel.is_member,
            })
            .ok_or_else(|| SlackApiError::ChannelNotFound(wanted.to_owned()))
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackApiError> {
        let response: ApiEnvelope = self
            .call("chat.postMessage", json!({ "channel": channel_id, "text": text }))
            .await?;
        if !response.ok {
            return Err(api_error("chat.postMessage", response.error));
        }
        Ok(())
    }

    async fn list_history(
        &self,
        channel_id: &str,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SlackApiError> {
        let response: HistoryResponse = self
            .call(
                "conversations.history",
                json!({ "channel": channel_id, "limit": limit.max(1) }),
            )
            .await?;
        if !response.ok {
            return Err(api_error("conversations.history", response.error));
        }

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|message| SlackMessage {
                user: message.user,
                text: message.text,
                ts: message.ts,
            })
            .collect())
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<DirectChannel, SlackApiError> {
        let response: OpenConversationResponse = self
            .call("conversations.open", json!({ "users": user_id }))
            .await?;
        if !response.ok {
            return Err(api_error("conversations.open", response.error));
        }

        response
            .channel
            .map(|channel| DirectChannel { id: channel.id })
            .ok_or_else(|| SlackApiError::Api {
                operation: "conversations.open".to_owned(),
                code: "missing_channel".to_owned(),
            })
    }

    async fn resolve_dm_user(&self, identifier: &str) -> Result<DmUser, SlackApiError> {
        let mut candidates = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut payload = json!({ "limit": 200 });
            if let Some(cursor_value) = &cursor {
                payload["cursor"] = json!(cursor_value);
            }

            let response: UserListResponse = self.call("users.list", payload).await?;
            if !response.ok {
                return Err(api_error("users.list", response.error));
            }

            for member in response.members.unwrap_or_default() {
                if member.deleted || member.is_bot {
                    continue;
                }
                let profile = member.profile.clone().unwrap_or_default();
                if user_matches(identifier, &profile) {
                    candidates.push(DmUser {
                        slack_user_id: member.id,
                        display_name: profile
                            .display_name
                            .or(profile.real_name)
                            .unwrap_or_else(|| identifier.to_owned()),
                    });
                }
            }

            cursor = response
                .response_metadata
                .and_then(|metadata| metadata.next_cursor)
                .filter(|value| !value.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        match candidates.len() {
            0 => Err(SlackApiError::UserNotFound(identifier.to_owned())),
            1 => Ok(candidates.remove(0)),
            matches => {
                Err(SlackApiError::AmbiguousUser { identifier: identifier.to_owned(), matches })
            }
        }
    }

    async fn search_mentions(
        &self,
        scope: MentionScope,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SlackApiError> {
        let marker = format!("<@{}>", self.bot_user_id().await?);
        let limit = limit.max(1) as usize;

        let channel_ids = match scope {
            MentionScope::Channel(name) => vec![self.resolve_channel(&name).await?.id],
            MentionScope::AllChannels => self
                .list_member_channels()
                .await?
                .into_iter()
                .filter(|channel| channel.is_member)
                .take(MENTION_SCAN_CHANNEL_CAP)
                .map(|channel| channel.id)
                .collect(),
        };

        let mut mentions = Vec::new();
        for channel_id in channel_ids {
            let history = self.list_history(&channel_id, MENTION_SCAN_HISTORY_DEPTH).await?;
            mentions.extend(history.into_iter().filter(|message| message.text.contains(&marker)));
            if mentions.len() >= limit {
                break;
            }
        }

        mentions.truncate(limit);
        Ok(mentions)
    }
}

fn user_matches(identifier: &str, profile: &UserProfile) -> bool {
    let wanted = identifier.trim();
    [&profile.display_name, &profile.real_name, &profile.email]
        .into_iter()
        .flatten()
        .any(|field| field.eq_ignore_ascii_case(wanted))
}

fn api_error(operation: &str, code: Option<String>) -> SlackApiError {
    let code = code.unwrap_or_else(|| "unknown_error".to_owned());
    match code.as_str() {
        "channel_not_found" => SlackApiError::ChannelNotFound(String::new()),
        "user_not_found" | "users_not_found" => SlackApiError::UserNotFound(String::new()),
        _ => SlackApiError::Api { operation: operation.to_owned(), code },
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn retry_delay(base_delay_ms: u64, attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(server_hint) = retry_after {
        return server_hint;
    }
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_delay_ms.saturating_mul(1_u64 << exponent))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        api_error, is_retryable_status, parse_retry_after, retry_delay, user_matches, UserProfile,
    };
    use crate::gateway::SlackApiError;

    #[test]
    fn retry_delay_grows_exponentially_without_server_hint() {
        assert_eq!(retry_delay(500, 1, None), Duration::from_millis(500));
        assert_eq!(retry_delay(500, 2, None), Duration::from_millis(1_000));
        assert_eq!(retry_delay(500, 3, None), Duration::from_millis(2_000));
    }

    #[test]
    fn retry_after_header_wins_over_backoff() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().expect("header"));
        let hint = parse_retry_after(&headers);
        assert_eq!(hint, Some(Duration::from_secs(7)));
        assert_eq!(retry_delay(500, 3, hint), Duration::from_secs(7));
    }

    #[test]
    fn only_rate_limits_and_server_errors_are_retryable() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn slack_error_codes_map_to_typed_errors() {
        assert!(matches!(
            api_error("conversations.history", Some("channel_not_found".to_owned())),
            SlackApiError::ChannelNotFound(_)
        ));
        assert!(matches!(
            api_error("conversations.open", Some("user_not_found".to_owned())),
            SlackApiError::UserNotFound(_)
        ));
        assert!(matches!(
            api_error("chat.postMessage", Some("msg_too_long".to_owned())),
            SlackApiError::Api { code, .. } if code == "msg_too_long"
        ));
        assert!(matches!(
            api_error("chat.postMessage", None),
            SlackApiError::Api { code, .. } if code == "unknown_error"
        ));
    }

    #[test]
    fn user_matching_is_case_insensitive_across_profile_fields() {
        let profile = UserProfile {
            display_name: Some("Ana".to_owned()),
            real_name: Some("Ana Torres".to_owned()),
            email: Some("ana@example.com".to_owned()),
        };

        assert!(user_matches("ana", &profile));
        assert!(user_matches("ANA TORRES", &profile));
        assert!(user_matches("Ana@Example.com", &profile));
        assert!(!user_matches("an", &profile));
        assert!(!user_matches("bob", &profile));
    }
}
