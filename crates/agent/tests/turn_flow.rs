//! Full conversational flows through the orchestrator: scripted oracle
//! completions, a fake Slack workspace, and a recording speech gateway.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use hark_agent::llm::{LlmClient, LlmError};
use hark_agent::orchestrator::CommandOrchestrator;
use hark_core::domain::SessionId;
use hark_db::{ConversationStore, InMemoryConversationStore};
use hark_slack::{
    ChannelRef, DirectChannel, DmUser, MentionScope, SlackApiError, SlackGateway, SlackMessage,
};
use hark_voice::{SpeechGateway, SynthesisError};

struct ScriptedLlm {
    completions: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new(completions: &[&str]) -> Self {
        Self {
            completions: Mutex::new(completions.iter().map(|raw| (*raw).to_owned()).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        self.completions.lock().await.pop_front().ok_or(LlmError::EmptyCompletion)
    }
}

fn message(user: &str, text: &str, ts: &str) -> SlackMessage {
    SlackMessage { user: Some(user.to_owned()), text: text.to_owned(), ts: ts.to_owned() }
}

/// A workspace with #general and #dev, one DM partner, and canned mentions.
#[derive(Default)]
struct FakeWorkspace {
    posted: Mutex<Vec<(String, String)>>,
    mention_scopes: Mutex<Vec<MentionScope>>,
}

#[async_trait]
impl SlackGateway for FakeWorkspace {
    async fn resolve_channel(&self, name: &str) -> Result<ChannelRef, SlackApiError> {
        match name {
            "general" | "dev" => Ok(ChannelRef {
                id: format!("C-{name}"),
                name: name.to_owned(),
                is_member: true,
            }),
            other => Err(SlackApiError::ChannelNotFound(other.to_owned())),
        }
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), SlackApiError> {
        self.posted.lock().await.push((channel_id.to_owned(), text.to_owned()));
        Ok(())
    }

    async fn list_history(
        &self,
        _channel_id: &str,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SlackApiError> {
        let all = vec![
            message("ana", "deploy is done", "4"),
            message("bob", "kicking off the deploy", "3"),
            message("ana", "standup in five", "2"),
            message("bob", "morning all", "1"),
        ];
        Ok(all.into_iter().take(limit as usize).collect())
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<DirectChannel, SlackApiError> {
        Ok(DirectChannel { id: format!("D-{user_id}") })
    }

    async fn resolve_dm_user(&self, identifier: &str) -> Result<DmUser, SlackApiError> {
        Ok(DmUser { slack_user_id: "U9".to_owned(), display_name: identifier.to_owned() })
    }

    async fn search_mentions(
        &self,
        scope: MentionScope,
        limit: u32,
    ) -> Result<Vec<SlackMessage>, SlackApiError> {
        self.mention_scopes.lock().await.push(scope);
        let all = vec![
            message("bob", "can you review my PR?", "6"),
            message("ana", "lunch today?", "5"),
        ];
        Ok(all.into_iter().take(limit as usize).collect())
    }
}

#[derive(Default)]
struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechGateway for RecordingSpeech {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        self.spoken.lock().await.push(text.to_owned());
        Ok(())
    }
}

struct World {
    orchestrator: CommandOrchestrator,
    store: Arc<InMemoryConversationStore>,
    slack: Arc<FakeWorkspace>,
    speech: Arc<RecordingSpeech>,
}

fn world(completions: &[&str]) -> World {
    let store = Arc::new(InMemoryConversationStore::default());
    let slack = Arc::new(FakeWorkspace::default());
    let speech = Arc::new(RecordingSpeech::default());
    let orchestrator = CommandOrchestrator::new(
        store.clone(),
        Arc::new(ScriptedLlm::new(completions)),
        slack.clone(),
        speech.clone(),
    );
    World { orchestrator, store, slack, speech }
}

async fn session(world: &World) -> SessionId {
    world.store.get_or_create_active_session("T0ACME").await.expect("session").id
}

async fn turn(world: &World, id: &SessionId, utterance: &str) -> String {
    world.orchestrator.process_turn(id, utterance).await.expect("turn").expect("spoken reply")
}

#[tokio::test]
async fn propose_confirm_send_round_trip() {
    let world = world(&[
        r#"{"action":"send_message","channel":"general","message":"running late, start without me","reply":"Should I send \"running late, start without me\" to #general?"}"#,
        r#"{"action":"confirm","reply":"Okay."}"#,
    ]);
    let id = session(&world).await;

    let question = turn(&world, &id, "tell general I'm running late, start without me").await;
    assert!(question.contains("running late, start without me"));
    assert!(question.contains("general"));
    assert!(world.slack.posted.lock().await.is_empty());

    let done = turn(&world, &id, "yes").await;
    assert_eq!(done, "Sent \"running late, start without me\" to #general.");
    assert_eq!(
        &*world.slack.posted.lock().await,
        &[("C-general".to_owned(), "running late, start without me".to_owned())]
    );

    // both replies were spoken, in order
    assert_eq!(&*world.speech.spoken.lock().await, &[question, done]);
}

#[tokio::test]
async fn propose_then_cancel_never_touches_slack() {
    let world = world(&[
        r#"{"action":"send_direct_message","user":"ana","message":"got a minute?","reply":"Should I send \"got a minute?\" to ana?"}"#,
        r#"{"action":"cancel","reply":"Okay."}"#,
        r#"{"action":"converse","reply":"Sure, what else can I do?"}"#,
    ]);
    let id = session(&world).await;

    turn(&world, &id, "message ana got a minute?").await;
    let cancelled = turn(&world, &id, "no, never mind").await;
    assert_eq!(cancelled, "Okay, I won't send it.");
    assert!(world.slack.posted.lock().await.is_empty());

    // a later yes must not resurrect the cancelled send
    turn(&world, &id, "yes actually").await;
    assert!(world.slack.posted.lock().await.is_empty());
}

#[tokio::test]
async fn quantity_words_shape_the_fetch_count() {
    // the oracle gives no count; "couple" in the utterance means three
    let world = world(&[
        r#"{"action":"fetch_messages","channel":"general","reply":"Reading them now."}"#,
    ]);
    let id = session(&world).await;

    let readout = turn(&world, &id, "read me the last couple of messages from general").await;

    assert!(readout.starts_with("Here are the 3 most recent messages in #general:"));
    let newest = readout.find("deploy is done").expect("newest first");
    let oldest = readout.find("standup in five").expect("third message");
    assert!(newest < oldest);
    assert!(!readout.contains("morning all"));
}

#[tokio::test]
async fn mention_check_spans_every_channel_when_none_is_named() {
    let world = world(&[
        r#"{"action":"fetch_mentions","channel":"ALL","reply":"Checking your mentions."}"#,
    ]);
    let id = session(&world).await;

    let readout = turn(&world, &id, "did anyone mention me?").await;

    assert!(readout.contains("can you review my PR?"));
    assert!(readout.contains("lunch today?"));
    assert_eq!(&*world.slack.mention_scopes.lock().await, &[MentionScope::AllChannels]);
}

#[tokio::test]
async fn small_talk_stays_conversational() {
    let world = world(&[
        r#"{"action":"converse","reply":"Doing great, thanks for asking. Ready when you are."}"#,
    ]);
    let id = session(&world).await;

    let reply = turn(&world, &id, "hey, how's it going?").await;

    assert_eq!(reply, "Doing great, thanks for asking. Ready when you are.");
    assert!(world.slack.posted.lock().await.is_empty());

    let history = world.store.get_history(&id).await.expect("history");
    assert_eq!(history.len(), 2);
}
