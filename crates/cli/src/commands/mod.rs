pub mod doctor;
pub mod migrate;
pub mod repl;

use serde::Serialize;

/// Exit code plus the JSON line a command prints before the process ends.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::render(command, "ok", None, &message.into(), 0)
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::render(command, "error", Some(error_class), &message.into(), exit_code)
    }

    fn render(
        command: &str,
        status: &str,
        error_class: Option<&str>,
        message: &str,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome { command, status, error_class, message };
        let output = serde_json::to_string(&payload).unwrap_or_else(|error| {
            let detail = error.to_string().replace('\\', "\\\\").replace('"', "\\\"");
            format!(
                "{{\"command\":\"{command}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{detail}\"}}"
            )
        });
        Self { exit_code, output }
    }
}

pub(crate) fn current_thread_runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize async runtime: {error}"))
}
