//! Text repl: drives the same turn pipeline as the voice surface, with
//! typed utterances standing in for transcripts and printed replies
//! standing in for playback.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use hark_agent::llm::HttpLlmClient;
use hark_agent::orchestrator::CommandOrchestrator;
use hark_core::config::{AppConfig, LoadOptions, LogFormat};
use hark_db::{connect_with_settings, migrations, ConversationStore, SqlConversationStore};
use hark_slack::SlackApiClient;
use hark_voice::{SpeechGateway, SynthesisError};

use crate::commands::CommandResult;

/// Prints replies instead of synthesizing them.
struct ConsoleSpeech;

#[async_trait]
impl SpeechGateway for ConsoleSpeech {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        println!("hark> {text}");
        Ok(())
    }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub fn run(workspace: &str, config_path: Option<PathBuf>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions { config_path, ..LoadOptions::default() }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "repl",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    init_logging(&config);

    let runtime = match crate::commands::current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(message) => return CommandResult::failure("repl", "runtime_init", message, 3),
    };

    let result = runtime.block_on(drive(&config, workspace));

    match result {
        Ok(turns) => CommandResult::success("repl", format!("session closed after {turns} turns")),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("repl", error_class, message, exit_code)
        }
    }
}

async fn drive(config: &AppConfig, workspace: &str) -> Result<u64, (&'static str, String, u8)> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?;

    let store = Arc::new(SqlConversationStore::new(pool.clone()));
    let slack = SlackApiClient::from_config(&config.slack)
        .map_err(|error| ("slack_client", error.to_string(), 6u8))?;
    let llm = HttpLlmClient::from_config(&config.llm)
        .map_err(|error| ("llm_client", error.to_string(), 6u8))?;

    let orchestrator = CommandOrchestrator::new(
        store.clone(),
        Arc::new(llm),
        Arc::new(slack),
        Arc::new(ConsoleSpeech),
    );

    let session = store
        .get_or_create_active_session(workspace)
        .await
        .map_err(|error| ("session", error.to_string(), 7u8))?;

    println!("Connected to workspace {workspace}. Type an utterance, or `exit` to finish.");

    let mut turns = 0u64;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"you> ").await.ok();
        stdout.flush().await.ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => return Err(("stdin", error.to_string(), 8u8)),
        };

        let utterance = line.trim();
        if utterance.eq_ignore_ascii_case("exit") || utterance.eq_ignore_ascii_case("quit") {
            break;
        }

        match orchestrator.process_turn(&session.id, utterance).await {
            Ok(Some(_)) => turns += 1,
            Ok(None) => {}
            Err(error) => return Err(("turn", error.to_string(), 9u8)),
        }
    }

    orchestrator
        .reset_session(&session.id)
        .await
        .map_err(|error| ("session", error.to_string(), 7u8))?;
    pool.close().await;

    Ok(turns)
}
