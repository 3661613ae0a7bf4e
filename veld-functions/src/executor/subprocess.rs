//! Child-process execution with a hard wall-clock kill.
//!
//! The script body is written to a temporary file and handed to the
//! `veld-fn-runner` binary; the context travels as one JSON document on the
//! child's stdin and the result comes back as a JSON envelope on the last
//! non-empty stdout line. Stdout and stderr are drained on their own
//! threads so a verbose child cannot fill a pipe and stall the wait loop.

use crate::config::FunctionsConfig;
use crate::result::{ExecutionResult, ExecutionStrategy};
use crate::wire;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const RUNNER_BIN: &str = "veld-fn-runner";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct SubprocessExecutor {
    config: FunctionsConfig,
}

impl SubprocessExecutor {
    pub fn new(config: FunctionsConfig) -> Self {
        Self { config }
    }

    /// Locates the runner binary: explicit config path first, then next to
    /// the current executable (and one directory up, which covers test
    /// harness layouts).
    fn resolve_runner(&self) -> Result<PathBuf, String> {
        if let Some(path) = &self.config.runner_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(format!(
                "configured runner path {} does not exist",
                path.display()
            ));
        }

        let exe = std::env::current_exe()
            .map_err(|e| format!("cannot locate current executable: {}", e))?;
        let name = format!("{}{}", RUNNER_BIN, std::env::consts::EXE_SUFFIX);
        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(dir) = exe.parent() {
            dirs.push(dir.to_path_buf());
            if let Some(up) = dir.parent() {
                dirs.push(up.to_path_buf());
            }
        }
        for dir in &dirs {
            let candidate = dir.join(&name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(format!("runner binary '{}' not found near {}", name, exe.display()))
    }

    pub fn run(&self, script_body: &str, context: &Value, timeout: Duration) -> ExecutionResult {
        let started = Instant::now();
        let strategy = ExecutionStrategy::Subprocess;

        let runner = match self.resolve_runner() {
            Ok(path) => path,
            Err(message) => {
                return ExecutionResult::fault(
                    "SubprocessError",
                    message,
                    started.elapsed(),
                    strategy,
                );
            }
        };

        let mut script_file = match tempfile::NamedTempFile::new() {
            Ok(f) => f,
            Err(e) => {
                return ExecutionResult::fault(
                    "SubprocessError",
                    format!("cannot create script file: {}", e),
                    started.elapsed(),
                    strategy,
                );
            }
        };
        if let Err(e) = script_file
            .write_all(script_body.as_bytes())
            .and_then(|_| script_file.flush())
        {
            return ExecutionResult::fault(
                "SubprocessError",
                format!("cannot write script file: {}", e),
                started.elapsed(),
                strategy,
            );
        }

        let mut child = match Command::new(&runner)
            .arg(script_file.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                return ExecutionResult::fault(
                    "SubprocessError",
                    format!("cannot spawn {}: {}", runner.display(), e),
                    started.elapsed(),
                    strategy,
                );
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            // A write failure here means the child already died; the wait
            // loop below will surface its exit status.
            if let Err(e) = stdin.write_all(context.to_string().as_bytes()) {
                log::warn!("failed to write context to child stdin: {}", e);
            }
        }

        let stdout_reader = child.stdout.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = std::io::Read::read_to_string(&mut pipe, &mut buf);
                buf
            })
        });
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = std::io::Read::read_to_string(&mut pipe, &mut buf);
                buf
            })
        });

        let deadline = started + timeout;
        let mut exit_status = None;
        let mut timed_out = false;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    exit_status = Some(status);
                    break;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        timed_out = true;
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return ExecutionResult::fault(
                        "SubprocessError",
                        format!("failed while waiting on child: {}", e),
                        started.elapsed(),
                        strategy,
                    );
                }
            }
        }

        let raw_stdout = stdout_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let raw_stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let duration = started.elapsed();

        if timed_out {
            log::info!("subprocess killed after exceeding {:?}", timeout);
            return ExecutionResult::fault(
                "TimeoutError",
                format!("script exceeded the {:.1}s wall-clock budget", timeout.as_secs_f64()),
                duration,
                strategy,
            )
            .with_stdout(raw_stdout)
            .with_stderr(raw_stderr);
        }

        match wire::parse_last_line(&raw_stdout) {
            Ok(envelope) if envelope.success => ExecutionResult::success(
                envelope.result.unwrap_or(Value::Null),
                envelope.stdout.unwrap_or_default(),
                duration,
                strategy,
            )
            .with_stderr(raw_stderr),
            Ok(envelope) => {
                let kind = envelope
                    .error_type
                    .unwrap_or_else(|| "RuntimeError".to_string());
                let message = envelope
                    .error_message
                    .unwrap_or_else(|| "script failed without a message".to_string());
                ExecutionResult::fault(kind, message, duration, strategy)
                    .with_stdout(envelope.stdout.unwrap_or_default())
                    .with_stderr(raw_stderr)
                    .with_trace(envelope.traceback)
            }
            Err(e) => {
                let (kind, message) = match exit_status {
                    Some(status) if !status.success() => (
                        "SubprocessError",
                        format!("child exited with {}", status),
                    ),
                    _ => (
                        "JSONDecodeError",
                        format!("child produced an unparseable result envelope: {}", e),
                    ),
                };
                ExecutionResult::fault(kind, message, duration, strategy)
                    .with_stdout(raw_stdout)
                    .with_stderr(raw_stderr)
            }
        }
    }
}
