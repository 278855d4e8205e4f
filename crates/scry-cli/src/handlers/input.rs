//! Interactive input of `scry run`.

use chrono::Utc;
use scry_core::PromptId;
use serde_json::{Value, json};

/// One parsed stdin line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Payload to send as-is.
    Prompt(Value),
    /// `None` cancels every in-flight prompt.
    Cancel(Option<PromptId>),
    Clear,
    Restart,
    Status,
    Logs(String),
    Unknown(String),
}

/// Parse a line. Blank lines yield `None`.
///
/// A line holding a JSON object is sent verbatim; any other text is wrapped
/// in a prompt frame.
pub fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(command) = line.strip_prefix('/') {
        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        return Some(match (name, arg) {
            ("cancel", id) => Input::Cancel(id.map(PromptId::from)),
            ("clear", None) => Input::Clear,
            ("restart", None) => Input::Restart,
            ("status", None) => Input::Status,
            ("logs", Some(source)) => Input::Logs(source.to_string()),
            _ => Input::Unknown(line.to_string()),
        });
    }

    match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => Some(Input::Prompt(value)),
        _ => Some(Input::Prompt(prompt_frame(line))),
    }
}

fn prompt_frame(text: &str) -> Value {
    json!({
        "action": "prompt",
        "prompt": text,
        "timeStamp": Utc::now().to_rfc3339(),
    })
}

pub const HELP: &str = "commands: /cancel [id], /clear, /restart, /status, /logs <name>";
