use crate::commands::{current_thread_runtime, CommandResult};
use hark_core::config::{AppConfig, LoadOptions};
use hark_db::{connect_with_settings, migrations};

pub fn run() -> CommandResult {
    match execute() {
        Ok(url) => CommandResult::success("migrate", format!("schema is current for `{url}`")),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

fn execute() -> Result<String, (&'static str, String, u8)> {
    let config = AppConfig::load(LoadOptions::default())
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), 2u8))?;

    let runtime =
        current_thread_runtime().map_err(|message| ("runtime_init", message, 3u8))?;

    runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let outcome = migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8));
        pool.close().await;
        outcome
    })?;

    Ok(config.database.url)
}
