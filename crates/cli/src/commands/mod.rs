pub mod chat;
pub mod config;
pub mod doctor;
pub mod migrate;

use serde::Serialize;

/// What a subcommand hands back to `main`: the text to print and the process exit code.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct StatusPayload<'a> {
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: String,
}

impl CommandResult {
    /// Human-readable output that always exits cleanly.
    pub fn plain(output: String) -> Self {
        Self { exit_code: 0, output }
    }

    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload =
            StatusPayload { command, status: "ok", error_class: None, message: message.into() };
        Self { exit_code: 0, output: render(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = StatusPayload {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
        };
        Self { exit_code, output: render(&payload) }
    }
}

fn render(payload: &StatusPayload<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            payload.command,
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
