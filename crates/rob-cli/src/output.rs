//! Output formats and the JSON envelopes printed on stdout/stderr.

use crate::exit_codes::ExitCode;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Version of the JSON output envelope.
pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";

/// Supported output formats for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text for terminals (default)
    #[default]
    Human,

    /// Structured JSON for scripts
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Wrap a command result in the standard envelope.
pub fn success_envelope(command: &str, result: Value) -> Value {
    json!({
        "schema_version": OUTPUT_SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "command": command,
        "status": "ok",
        "result": result,
    })
}

/// Envelope describing a failed command.
pub fn error_envelope(command: &str, code: ExitCode, message: &str) -> Value {
    json!({
        "schema_version": OUTPUT_SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "command": command,
        "status": "error",
        "error": {
            "code": code.as_i32(),
            "name": code.code_name(),
            "message": message,
        }
    })
}

pub fn to_pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
