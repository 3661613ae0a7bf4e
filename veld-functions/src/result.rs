//! Request and result value objects shared by every executor.
//!
//! `ExecutionResult` is the one normalized shape callers receive no matter
//! which isolation strategy ran the script. The invariants are enforced by
//! construction: the `success`/`fault` constructors are the only places the
//! flag and the error fields are set together.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default wall-clock budget for one execution.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Isolation strategy for one execution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Let the dispatcher pick by heuristic.
    Auto,
    /// Shared-process execution, lowest latency, no OS isolation.
    InProcess,
    /// Fresh child process per call, hard wall-clock kill.
    Subprocess,
    /// Forward to the remote sandbox service over HTTP.
    Remote,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStrategy::Auto => "auto",
            ExecutionStrategy::InProcess => "in_process",
            ExecutionStrategy::Subprocess => "subprocess",
            ExecutionStrategy::Remote => "remote",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ExecutionStrategy::Auto),
            "in_process" | "in-process" => Ok(ExecutionStrategy::InProcess),
            "subprocess" => Ok(ExecutionStrategy::Subprocess),
            "remote" => Ok(ExecutionStrategy::Remote),
            other => Err(format!("unknown execution strategy '{}'", other)),
        }
    }
}

/// One request to run a script against a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub script_body: String,
    /// Invocation context handed to the script's `main`.
    pub context: Value,
    pub strategy: ExecutionStrategy,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl ExecutionRequest {
    pub fn new(script_body: impl Into<String>, context: Value) -> Self {
        Self {
            script_body: script_body.into(),
            context,
            strategy: ExecutionStrategy::Auto,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Normalized outcome of one execution, regardless of strategy.
///
/// Invariants: `success == false` implies `error_kind` and `error_message`
/// are present; `success == true` implies `error_kind` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub value: Option<Value>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(with = "duration_secs", default)]
    pub duration: Duration,
    pub strategy_used: ExecutionStrategy,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub trace: Option<String>,
}

impl ExecutionResult {
    pub fn success(
        value: Value,
        stdout: String,
        duration: Duration,
        strategy_used: ExecutionStrategy,
    ) -> Self {
        Self {
            success: true,
            value: Some(value),
            stdout,
            stderr: String::new(),
            duration,
            strategy_used,
            error_kind: None,
            error_message: None,
            trace: None,
        }
    }

    pub fn fault(
        kind: impl Into<String>,
        message: impl Into<String>,
        duration: Duration,
        strategy_used: ExecutionStrategy,
    ) -> Self {
        Self {
            success: false,
            value: None,
            stdout: String::new(),
            stderr: String::new(),
            duration,
            strategy_used,
            error_kind: Some(kind.into()),
            error_message: Some(message.into()),
            trace: None,
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_trace(mut self, trace: Option<String>) -> Self {
        self.trace = trace;
        self
    }
}

/// Outcome of a standalone syntax pre-check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub error: Option<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// Durations cross the wire as fractional seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(de)?;
        if secs.is_finite() && secs >= 0.0 {
            Ok(Duration::from_secs_f64(secs))
        } else {
            Err(serde::de::Error::custom("duration must be a non-negative number"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_strategy_parse_and_display_roundtrip() {
        for s in ["auto", "in_process", "subprocess", "remote"] {
            let parsed: ExecutionStrategy = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("warp_drive".parse::<ExecutionStrategy>().is_err());
    }

    #[test]
    fn test_fault_constructor_sets_error_fields() {
        let r = ExecutionResult::fault(
            "ValueError",
            "script does not define 'main'",
            Duration::from_millis(5),
            ExecutionStrategy::InProcess,
        );
        assert!(!r.success);
        assert_eq!(r.error_kind.as_deref(), Some("ValueError"));
        assert!(r.error_message.is_some());
        assert!(r.value.is_none());
    }

    #[test]
    fn test_success_constructor_clears_error_fields() {
        let r = ExecutionResult::success(
            json!(10),
            String::new(),
            Duration::from_millis(1),
            ExecutionStrategy::Subprocess,
        );
        assert!(r.success);
        assert!(r.error_kind.is_none());
        assert_eq!(r.value, Some(json!(10)));
    }

    #[test]
    fn test_result_serializes_duration_as_seconds() {
        let r = ExecutionResult::success(
            json!(null),
            String::new(),
            Duration::from_millis(1500),
            ExecutionStrategy::InProcess,
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["duration"], json!(1.5));
        assert_eq!(v["strategy_used"], json!("in_process"));
    }
}
