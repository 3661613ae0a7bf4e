//! Child-side runner used by the subprocess strategy.
//!
//! Protocol: argv[1] names the script file, the invocation context arrives
//! as one JSON document on stdin, and the result leaves as one JSON
//! envelope on the final stdout line. Exit code 0 for a clean run, 1 when
//! the script faulted. The parent process owns the wall clock and kills a
//! runner that overstays it.

use serde_json::Value;
use std::io::Read;
use std::process::ExitCode;
use std::time::Duration;
use veld_functions::wire::WireResponse;
use veld_functions::{FunctionsConfig, InProcessExecutor};

/// Only bounds a runaway script if the parent itself is gone.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(3600);

fn main() -> ExitCode {
    let envelope = run();
    let clean = envelope.success;
    match serde_json::to_string(&envelope) {
        Ok(line) => println!("{}", line),
        Err(e) => {
            eprintln!("cannot serialize result envelope: {}", e);
            println!(
                r#"{{"success":false,"error_type":"SubprocessError","error_message":"runner failed to serialize its result"}}"#
            );
            return ExitCode::FAILURE;
        }
    }
    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run() -> WireResponse {
    let script_path = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            return WireResponse::fault(
                "SubprocessError",
                "usage: veld-fn-runner <script-file>",
                None,
                String::new(),
            );
        }
    };

    let script_body = match std::fs::read_to_string(&script_path) {
        Ok(s) => s,
        Err(e) => {
            return WireResponse::fault(
                "SubprocessError",
                format!("cannot read script file {}: {}", script_path, e),
                None,
                String::new(),
            );
        }
    };

    let mut raw_context = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut raw_context) {
        return WireResponse::fault(
            "SubprocessError",
            format!("cannot read context from stdin: {}", e),
            None,
            String::new(),
        );
    }
    let context: Value = if raw_context.trim().is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        match serde_json::from_str(raw_context.trim()) {
            Ok(v) => v,
            Err(e) => {
                return WireResponse::fault(
                    "JSONDecodeError",
                    format!("context is not valid JSON: {}", e),
                    None,
                    String::new(),
                );
            }
        }
    };

    // The parent enforces the operations and wall-clock budget by killing
    // the whole process, so the in-process limits are opened up here.
    let config = FunctionsConfig {
        max_operations: u64::MAX,
        ..FunctionsConfig::default()
    };
    let result = InProcessExecutor::new(config).run(&script_body, &context, None, FALLBACK_TIMEOUT);

    if result.success {
        WireResponse::ok(result.value.unwrap_or(Value::Null), result.stdout)
    } else {
        WireResponse::fault(
            result
                .error_kind
                .unwrap_or_else(|| "RuntimeError".to_string()),
            result
                .error_message
                .unwrap_or_else(|| "script failed without a message".to_string()),
            result.trace,
            result.stdout,
        )
    }
}
