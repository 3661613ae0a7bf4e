//! Shared-process execution under the restricted engine.
//!
//! Lowest latency, no OS isolation. Runaway scripts are bounded by the
//! wall-clock deadline armed on the engine's progress hook and by the
//! operations budget; neither involves a separate process.

use crate::capability::{register_capabilities, CapabilityApi};
use crate::config::FunctionsConfig;
use crate::engine::{
    arm_deadline, capture_output, check_entry_point, classify_fault, dynamic_to_json,
    json_to_dynamic, restricted_engine,
};
use crate::result::{ExecutionResult, ExecutionStrategy};
use crate::validator::validate;
use rhai::{Dynamic, Scope};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct InProcessExecutor {
    config: FunctionsConfig,
}

impl InProcessExecutor {
    pub fn new(config: FunctionsConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        script_body: &str,
        context: &Value,
        capability: Option<Arc<CapabilityApi>>,
        timeout: Duration,
    ) -> ExecutionResult {
        let started = Instant::now();
        let strategy = ExecutionStrategy::InProcess;

        let validation = validate(script_body, &self.config);
        if !validation.valid {
            let message = validation
                .error
                .unwrap_or_else(|| "malformed script".to_string());
            return ExecutionResult::fault("SyntaxError", message, started.elapsed(), strategy);
        }

        let mut engine = restricted_engine(&self.config);
        let output = capture_output(&mut engine);
        arm_deadline(&mut engine, Instant::now() + timeout);
        if let Some(api) = capability {
            register_capabilities(&mut engine, api);
        }

        let ast = match engine.compile(script_body) {
            Ok(ast) => ast,
            Err(err) => {
                return ExecutionResult::fault(
                    "SyntaxError",
                    err.to_string(),
                    started.elapsed(),
                    strategy,
                );
            }
        };

        if let Err(message) = check_entry_point(&ast) {
            return ExecutionResult::fault("ValueError", message, started.elapsed(), strategy);
        }

        let arg = match json_to_dynamic(context) {
            Ok(d) => d,
            Err(err) => {
                return ExecutionResult::fault(
                    "TypeError",
                    format!("context is not representable in the script runtime: {}", err),
                    started.elapsed(),
                    strategy,
                );
            }
        };

        let mut scope = Scope::new();
        let outcome = engine.call_fn::<Dynamic>(&mut scope, &ast, "main", (arg,));
        let stdout = output.lock().map(|b| b.clone()).unwrap_or_default();
        let duration = started.elapsed();

        match outcome {
            Ok(returned) => {
                ExecutionResult::success(dynamic_to_json(&returned), stdout, duration, strategy)
            }
            Err(err) => {
                let fault = classify_fault(&err);
                log::debug!(
                    "in-process script fault: kind={} message={}",
                    fault.kind,
                    fault.message
                );
                ExecutionResult::fault(fault.kind, fault.message, duration, strategy)
                    .with_stdout(stdout)
                    .with_trace(fault.trace)
            }
        }
    }
}
