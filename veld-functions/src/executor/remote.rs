//! Remote sandbox execution over HTTP.
//!
//! One POST per request, no retries. The client-side deadline is the
//! script timeout plus a fixed grace period so the remote service gets the
//! first chance to time the script out itself and report it properly.

use crate::result::{ExecutionResult, ExecutionStrategy};
use crate::wire::{RemoteEnvelope, RemoteExecuteRequest};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Slack added on top of the script timeout for the HTTP deadline.
const CLIENT_GRACE: Duration = Duration::from_secs(10);

const BODY_EXCERPT_LEN: usize = 512;

pub struct RemoteExecutor;

fn transport_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "TimeoutError"
    } else if e.is_connect() {
        "ConnectionError"
    } else if e.is_decode() {
        "JSONDecodeError"
    } else {
        "RequestError"
    }
}

impl RemoteExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn run(
        &self,
        script_body: &str,
        context: &Value,
        timeout: Duration,
        sandbox_url: &str,
    ) -> ExecutionResult {
        let started = Instant::now();
        let strategy = ExecutionStrategy::Remote;
        let url = format!("{}/execute", sandbox_url.trim_end_matches('/'));

        let client = match reqwest::blocking::Client::builder()
            .timeout(timeout + CLIENT_GRACE)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                return ExecutionResult::fault(
                    "RequestError",
                    format!("cannot build HTTP client: {}", e),
                    started.elapsed(),
                    strategy,
                );
            }
        };

        let body = RemoteExecuteRequest {
            script_body: script_body.to_string(),
            context: context.clone(),
            timeout: timeout.as_secs().max(1),
        };

        log::debug!("forwarding execution to sandbox at {}", url);
        let response = match client.post(&url).json(&body).send() {
            Ok(r) => r,
            Err(e) => {
                return ExecutionResult::fault(
                    transport_kind(&e),
                    format!("sandbox request failed: {}", e),
                    started.elapsed(),
                    strategy,
                );
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let excerpt: String = text.chars().take(BODY_EXCERPT_LEN).collect();
            return ExecutionResult::fault(
                "HTTPError",
                format!("sandbox returned HTTP {}: {}", status.as_u16(), excerpt),
                started.elapsed(),
                strategy,
            );
        }

        let envelope: RemoteEnvelope = match response.json() {
            Ok(v) => v,
            Err(e) => {
                return ExecutionResult::fault(
                    "JSONDecodeError",
                    format!("sandbox response body is not valid JSON: {}", e),
                    started.elapsed(),
                    strategy,
                );
            }
        };

        let duration = envelope
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_else(|| started.elapsed());

        if envelope.success {
            ExecutionResult::success(
                envelope.value.unwrap_or(Value::Null),
                envelope.stdout,
                duration,
                strategy,
            )
            .with_stderr(envelope.stderr)
        } else {
            let kind = envelope
                .error_kind
                .unwrap_or_else(|| "RuntimeError".to_string());
            let message = envelope
                .error_message
                .unwrap_or_else(|| "remote sandbox reported failure".to_string());
            ExecutionResult::fault(kind, message, duration, strategy)
                .with_stdout(envelope.stdout)
                .with_stderr(envelope.stderr)
                .with_trace(envelope.trace)
        }
    }
}

impl Default for RemoteExecutor {
    fn default() -> Self {
        Self::new()
    }
}
