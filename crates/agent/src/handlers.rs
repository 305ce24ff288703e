//! Execution of classified intents against the Slack gateway.
//!
//! Every handler returns a speech-ready summary string; the orchestrator
//! records it as a system turn and speaks it. Slack failures come back as
//! typed errors and are phrased for speech by `spoken_failure`.

use std::sync::Arc;

use tracing::debug;

use hark_core::domain::{PendingAction, PendingKind};
use hark_slack::{MentionScope, SlackApiError, SlackGateway, SlackMessage};

pub struct ActionHandlers {
    slack: Arc<dyn SlackGateway>,
}

impl ActionHandlers {
    pub fn new(slack: Arc<dyn SlackGateway>) -> Self {
        Self { slack }
    }

    /// Executes a confirmed send. Only ever called with an action the user
    /// has explicitly approved.
    pub async fn dispatch_pending(
        &self,
        pending: &PendingAction,
    ) -> Result<String, SlackApiError> {
        match pending.kind {
            PendingKind::Channel => {
                let channel = self
                    .slack
                    .resolve_channel(&pending.target)
                    .await
                    .map_err(|error| named(error, &pending.target))?;
                self.slack.post_message(&channel.id, &pending.content).await?;

                debug!(channel = %channel.name, "dispatched channel message");
                Ok(format!("Sent \"{}\" to #{}.", pending.content, channel.name))
            }
            PendingKind::DirectMessage => {
                let user = self
                    .slack
                    .resolve_dm_user(&pending.target)
                    .await
                    .map_err(|error| named(error, &pending.target))?;
                let dm = self.slack.open_direct_channel(&user.slack_user_id).await?;
                self.slack.post_message(&dm.id, &pending.content).await?;

                debug!(user = %user.display_name, "dispatched direct message");
                Ok(format!("Sent \"{}\" to {}.", pending.content, user.display_name))
            }
        }
    }

    pub async fn fetch_messages(
        &self,
        channel_name: &str,
        count: u32,
    ) -> Result<String, SlackApiError> {
        let channel = self
            .slack
            .resolve_channel(channel_name)
            .await
            .map_err(|error| named(error, channel_name))?;
        let messages = self.slack.list_history(&channel.id, count).await?;
        let messages: Vec<_> = messages.into_iter().take(count as usize).collect();

        if messages.is_empty() {
            return Ok(format!("There are no recent messages in #{}.", channel.name));
        }

        let lead = if messages.len() == 1 {
            format!("Here is the most recent message in #{}:", channel.name)
        } else {
            format!("Here are the {} most recent messages in #{}:", messages.len(), channel.name)
        };
        Ok(format!("{} {}", lead, read_out(&messages)))
    }

    pub async fn fetch_mentions(
        &self,
        channel_name: Option<&str>,
        count: u32,
    ) -> Result<String, SlackApiError> {
        let scope = match channel_name {
            Some(name) => MentionScope::Channel(name.to_owned()),
            None => MentionScope::AllChannels,
        };
        let mentions = self.slack.search_mentions(scope, count).await?;
        let mentions: Vec<_> = mentions.into_iter().take(count as usize).collect();

        let place = match channel_name {
            Some(name) => format!(" in #{name}"),
            None => String::new(),
        };

        // No mentions is a normal outcome, not an error.
        if mentions.is_empty() {
            return Ok(format!("You have no recent mentions{place}."));
        }

        let lead = if mentions.len() == 1 {
            format!("You have one recent mention{place}:")
        } else {
            format!("You have {} recent mentions{place}:", mentions.len())
        };
        Ok(format!("{} {}", lead, read_out(&mentions)))
    }

    pub async fn fetch_direct_messages(
        &self,
        identifier: &str,
        count: u32,
    ) -> Result<String, SlackApiError> {
        let user = self
            .slack
            .resolve_dm_user(identifier)
            .await
            .map_err(|error| named(error, identifier))?;
        let dm = self.slack.open_direct_channel(&user.slack_user_id).await?;
        let messages = self.slack.list_history(&dm.id, count).await?;
        let messages: Vec<_> = messages.into_iter().take(count as usize).collect();

        if messages.is_empty() {
            return Ok(format!("You have no recent direct messages with {}.", user.display_name));
        }

        let lead = if messages.len() == 1 {
            format!("Here is your most recent direct message with {}:", user.display_name)
        } else {
            format!(
                "Here are your {} most recent direct messages with {}:",
                messages.len(),
                user.display_name
            )
        };
        Ok(format!("{} {}", lead, read_out(&messages)))
    }
}

/// Speech-friendly rendering, newest first, exactly as the gateway returned
/// them.
fn read_out(messages: &[SlackMessage]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let sender = message.user.as_deref().unwrap_or("someone");
            format!("{}. {} said: {}", index + 1, sender, message.text)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fills in the requested target on not-found errors that bubbled up from a
/// raw API code without one.
fn named(error: SlackApiError, target: &str) -> SlackApiError {
    match error {
        SlackApiError::ChannelNotFound(name) if name.is_empty() => {
            SlackApiError::ChannelNotFound(target.to_owned())
        }
        SlackApiError::UserNotFound(name) if name.is_empty() => {
            SlackApiError::UserNotFound(target.to_owned())
        }
        other => other,
    }
}

/// What to say when a Slack call fails. Each variant keeps the conversation
/// moving instead of dead-ending it.
pub fn spoken_failure(error: &SlackApiError) -> String {
    match error {
        SlackApiError::ChannelNotFound(name) => {
            format!("Sorry, I couldn't find a channel called {name}. Would you like to try a different channel?")
        }
        SlackApiError::UserNotFound(identifier) => {
            format!("Sorry, I couldn't find anyone matching {identifier}. Could you give me their exact display name or email?")
        }
        SlackApiError::AmbiguousUser { identifier, matches } => {
            format!("{matches} people match {identifier}. Could you be more specific about who you mean?")
        }
        SlackApiError::RateLimited { .. } => {
            "Slack is rate limiting me right now. Please try that again in a moment.".to_owned()
        }
        SlackApiError::MissingCredential => {
            "I'm not connected to your Slack workspace yet.".to_owned()
        }
        SlackApiError::Api { .. } | SlackApiError::Transport { .. } => {
            "Sorry, something went wrong talking to Slack. Please try again.".to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use hark_core::domain::PendingAction;
    use hark_slack::{
        ChannelRef, DirectChannel, DmUser, MentionScope, SlackApiError, SlackGateway,
        SlackMessage,
    };

    use super::{spoken_failure, ActionHandlers};

    fn message(user: &str, text: &str, ts: &str) -> SlackMessage {
        SlackMessage { user: Some(user.to_owned()), text: text.to_owned(), ts: ts.to_owned() }
    }

    #[derive(Default)]
    struct ScriptedGateway {
        channels: Mutex<VecDeque<Result<ChannelRef, SlackApiError>>>,
        users: Mutex<VecDeque<Result<DmUser, SlackApiError>>>,
        histories: Mutex<VecDeque<Result<Vec<SlackMessage>, SlackApiError>>>,
        mentions: Mutex<VecDeque<Result<Vec<SlackMessage>, SlackApiError>>>,
        posted: Mutex<Vec<(String, String)>>,
        mention_scopes: Mutex<Vec<MentionScope>>,
    }

    #[async_trait]
    impl SlackGateway for ScriptedGateway {
        async fn resolve_channel(&self, name: &str) -> Result<ChannelRef, SlackApiError> {
            self.channels
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(SlackApiError::ChannelNotFound(name.to_owned())))
        }

        async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackApiError> {
            self.posted.lock().await.push((channel_id.to_owned(), text.to_owned()));
            Ok(())
        }

        async fn list_history(
            &self,
            _channel_id: &str,
            _limit: u32,
        ) -> Result<Vec<SlackMessage>, SlackApiError> {
            self.histories.lock().await.pop_front().unwrap_or(Ok(Vec::new()))
        }

        async fn open_direct_channel(
            &self,
            user_id: &str,
        ) -> Result<DirectChannel, SlackApiError> {
            Ok(DirectChannel { id: format!("D-{user_id}") })
        }

        async fn resolve_dm_user(&self, identifier: &str) -> Result<DmUser, SlackApiError> {
            self.users
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(SlackApiError::UserNotFound(identifier.to_owned())))
        }

        async fn search_mentions(
            &self,
            scope: MentionScope,
            _limit: u32,
        ) -> Result<Vec<SlackMessage>, SlackApiError> {
            self.mention_scopes.lock().await.push(scope);
            self.mentions.lock().await.pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    fn general() -> ChannelRef {
        ChannelRef { id: "C123".to_owned(), name: "general".to_owned(), is_member: true }
    }

    #[tokio::test]
    async fn dispatching_a_channel_send_posts_and_summarizes() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.channels.lock().await.push_back(Ok(general()));
        let handlers = ActionHandlers::new(gateway.clone());

        let summary = handlers
            .dispatch_pending(&PendingAction::channel("general", "hello team"))
            .await
            .expect("dispatch");

        assert_eq!(summary, "Sent \"hello team\" to #general.");
        assert_eq!(&*gateway.posted.lock().await, &[("C123".to_owned(), "hello team".to_owned())]);
    }

    #[tokio::test]
    async fn dispatching_a_direct_message_opens_the_dm_first() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.users.lock().await.push_back(Ok(DmUser {
            slack_user_id: "U77".to_owned(),
            display_name: "Ana".to_owned(),
        }));
        let handlers = ActionHandlers::new(gateway.clone());

        let summary = handlers
            .dispatch_pending(&PendingAction::direct_message("ana", "lunch?"))
            .await
            .expect("dispatch");

        assert_eq!(summary, "Sent \"lunch?\" to Ana.");
        assert_eq!(&*gateway.posted.lock().await, &[("D-U77".to_owned(), "lunch?".to_owned())]);
    }

    #[tokio::test]
    async fn fetch_messages_keeps_newest_first_and_truncates_to_count() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.channels.lock().await.push_back(Ok(general()));
        gateway.histories.lock().await.push_back(Ok(vec![
            message("U1", "newest", "3"),
            message("U2", "middle", "2"),
            message("U3", "oldest", "1"),
        ]));
        let handlers = ActionHandlers::new(gateway);

        let summary = handlers.fetch_messages("general", 2).await.expect("fetch");

        assert!(summary.starts_with("Here are the 2 most recent messages in #general:"));
        let newest = summary.find("newest").expect("newest present");
        let middle = summary.find("middle").expect("middle present");
        assert!(newest < middle);
        assert!(!summary.contains("oldest"));
    }

    #[tokio::test]
    async fn fetch_messages_reports_an_empty_channel_plainly() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.channels.lock().await.push_back(Ok(general()));
        gateway.histories.lock().await.push_back(Ok(Vec::new()));
        let handlers = ActionHandlers::new(gateway);

        let summary = handlers.fetch_messages("general", 3).await.expect("fetch");
        assert_eq!(summary, "There are no recent messages in #general.");
    }

    #[tokio::test]
    async fn mention_scope_follows_the_requested_channel() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.mentions.lock().await.push_back(Ok(Vec::new()));
        gateway.mentions.lock().await.push_back(Ok(Vec::new()));
        let handlers = ActionHandlers::new(gateway.clone());

        let everywhere = handlers.fetch_mentions(None, 5).await.expect("fetch");
        let scoped = handlers.fetch_mentions(Some("dev"), 5).await.expect("fetch");

        assert_eq!(everywhere, "You have no recent mentions.");
        assert_eq!(scoped, "You have no recent mentions in #dev.");
        assert_eq!(
            &*gateway.mention_scopes.lock().await,
            &[MentionScope::AllChannels, MentionScope::Channel("dev".to_owned())]
        );
    }

    #[tokio::test]
    async fn fetch_direct_messages_reads_the_dm_history() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.users.lock().await.push_back(Ok(DmUser {
            slack_user_id: "U77".to_owned(),
            display_name: "Ana".to_owned(),
        }));
        gateway.histories.lock().await.push_back(Ok(vec![message("Ana", "see you at 2", "9")]));
        let handlers = ActionHandlers::new(gateway);

        let summary = handlers.fetch_direct_messages("ana", 5).await.expect("fetch");
        assert_eq!(
            summary,
            "Here is your most recent direct message with Ana: 1. Ana said: see you at 2"
        );
    }

    #[test]
    fn failure_phrasing_keeps_the_conversation_open() {
        let missing_channel = spoken_failure(&SlackApiError::ChannelNotFound("genral".to_owned()));
        assert!(missing_channel.contains("genral"));
        assert!(missing_channel.contains("different channel"));

        let missing_user = spoken_failure(&SlackApiError::UserNotFound("bob".to_owned()));
        assert!(missing_user.contains("bob"));

        let ambiguous = spoken_failure(&SlackApiError::AmbiguousUser {
            identifier: "alex".to_owned(),
            matches: 3,
        });
        assert!(ambiguous.contains("3 people match alex"));
        assert!(ambiguous.contains("more specific"));
    }
}
