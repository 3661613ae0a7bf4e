//! Wire shapes exchanged with the subprocess runner and the remote sandbox.
//!
//! Subprocess protocol: the child receives the invocation context as one
//! JSON document on stdin and must emit exactly one JSON envelope on the
//! last non-empty line of stdout. Anything else on stdout is diagnostic
//! noise and is tolerated but never parsed as the result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope the subprocess runner writes to stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Print output captured inside the child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl WireResponse {
    pub fn ok(result: Value, stdout: String) -> Self {
        Self {
            success: true,
            result: Some(result),
            stdout: Some(stdout),
            error_message: None,
            error_type: None,
            traceback: None,
        }
    }

    pub fn fault(
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        traceback: Option<String>,
        stdout: String,
    ) -> Self {
        Self {
            success: false,
            result: None,
            stdout: Some(stdout),
            error_message: Some(error_message.into()),
            error_type: Some(error_type.into()),
            traceback,
        }
    }
}

/// Parses the envelope from the last non-empty line of a child's stdout.
pub fn parse_last_line(stdout: &str) -> Result<WireResponse, serde_json::Error> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("");
    serde_json::from_str(line.trim())
}

/// Body posted to `{sandbox_url}/execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteExecuteRequest {
    pub script_body: String,
    pub context: Value,
    /// Timeout in whole seconds, enforced by the remote service.
    pub timeout: u64,
}

/// Response body of the remote sandbox; mirrors `ExecutionResult` fields.
/// Every field defaults so a sparse remote payload still deserializes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub trace: Option<String>,
}
