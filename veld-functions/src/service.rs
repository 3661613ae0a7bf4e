//! High-level facade over the dispatcher and function registry.
//!
//! Responsibilities:
//! - Validate script text without running it.
//! - Execute ad-hoc script bodies with optional strategy and timeout
//!   overrides, falling back to configured defaults.
//! - Execute stored functions looked up by id through a `FunctionRegistry`.
//!
//! Lookup failures for stored functions are script-level faults, not service
//! errors: a caller asking for a function that does not exist gets a normal
//! failed `ExecutionResult` so the same reporting path handles both cases.

use crate::config::FunctionsConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{FunctionsError, FunctionsResult};
use crate::result::{ExecutionRequest, ExecutionResult, ExecutionStrategy, Validation};
use crate::validator::validate;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use veld_store::{DataStoreSession, FunctionRegistry};

pub struct FunctionService {
    dispatcher: Dispatcher,
    registry: Option<Arc<dyn FunctionRegistry>>,
}

impl FunctionService {
    pub fn new(config: FunctionsConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(config),
            registry: None,
        }
    }

    pub fn with_session(config: FunctionsConfig, session: Arc<dyn DataStoreSession>) -> Self {
        Self {
            dispatcher: Dispatcher::new(config).with_session(session),
            registry: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn FunctionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &FunctionsConfig {
        self.dispatcher.config()
    }

    /// Syntax and length check only. A script that validates here can still
    /// fail at run time, but it will never fail with a parse error.
    pub fn validate(&self, script_body: &str) -> Validation {
        validate(script_body, self.dispatcher.config())
    }

    pub fn execute(
        &self,
        script_body: &str,
        context: Value,
        strategy: Option<ExecutionStrategy>,
        timeout: Option<Duration>,
    ) -> FunctionsResult<ExecutionResult> {
        let strategy = strategy.unwrap_or(ExecutionStrategy::Auto);
        let timeout = timeout.unwrap_or_else(|| self.dispatcher.config().default_timeout());

        if script_body.trim().is_empty() {
            return Ok(ExecutionResult::fault(
                "ValueError",
                "script body is empty".to_string(),
                Duration::ZERO,
                strategy,
            ));
        }

        let request = ExecutionRequest::new(script_body, context)
            .with_strategy(strategy)
            .with_timeout(timeout);
        self.dispatcher.dispatch(&request)
    }

    /// Runs a stored function by id. Requires a registry to be configured;
    /// an unknown id comes back as a failed result rather than an error.
    pub fn execute_by_function_id(
        &self,
        function_id: &str,
        context: Value,
        strategy: Option<ExecutionStrategy>,
        timeout: Option<Duration>,
    ) -> FunctionsResult<ExecutionResult> {
        let registry = self.registry.as_ref().ok_or_else(|| {
            FunctionsError::Config("no function registry is configured".to_string())
        })?;

        let definition = registry.get_function(function_id)?;
        match definition {
            Some(def) => {
                log::debug!("executing stored function '{}' ({})", def.api_name, def.id);
                self.execute(&def.script_body, context, strategy, timeout)
            }
            None => Ok(ExecutionResult::fault(
                "ValueError",
                format!("no function with id '{}'", function_id),
                Duration::ZERO,
                strategy.unwrap_or(ExecutionStrategy::Auto),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use veld_store::{FunctionDefinition, MemoryStore};

    fn service_with_store() -> (FunctionService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = FunctionService::with_session(
            FunctionsConfig::default(),
            Arc::clone(&store) as Arc<dyn DataStoreSession>,
        )
        .with_registry(Arc::clone(&store) as Arc<dyn FunctionRegistry>);
        (service, store)
    }

    #[test]
    fn test_validate_accepts_well_formed_script() {
        let service = FunctionService::new(FunctionsConfig::default());
        let v = service.validate("fn main(ctx) { ctx.x + 1 }");
        assert!(v.valid, "unexpected: {:?}", v.error);
    }

    #[test]
    fn test_validate_rejects_broken_script() {
        let service = FunctionService::new(FunctionsConfig::default());
        let v = service.validate("fn main(ctx) {");
        assert!(!v.valid);
        assert!(v.error.is_some());
    }

    #[test]
    fn test_valid_script_never_reports_syntax_error() {
        // Runtime faults are fine; a script that passed validation must not
        // come back as a parse failure.
        let service = FunctionService::new(FunctionsConfig::default());
        let script = "fn main(ctx) { 1 / 0 }";
        assert!(service.validate(script).valid);
        let r = service.execute(script, json!({}), None, None).unwrap();
        assert!(!r.success);
        assert_ne!(r.error_kind.as_deref(), Some("SyntaxError"));
    }

    #[test]
    fn test_execute_uses_config_defaults() {
        let service = FunctionService::new(FunctionsConfig::default());
        let r = service
            .execute("fn main(ctx) { ctx.x * 2 }", json!({"x": 5}), None, None)
            .unwrap();
        assert!(r.success, "fault: {:?}", r.error_message);
        assert_eq!(r.value, Some(json!(10)));
    }

    #[test]
    fn test_empty_script_is_value_error_result() {
        let service = FunctionService::new(FunctionsConfig::default());
        let r = service.execute("   \n", json!({}), None, None).unwrap();
        assert!(!r.success);
        assert_eq!(r.error_kind.as_deref(), Some("ValueError"));
    }

    #[test]
    fn test_execute_by_function_id_runs_stored_script() {
        let (service, store) = service_with_store();
        store
            .add_function(FunctionDefinition {
                id: "fn-double".to_string(),
                api_name: "double".to_string(),
                script_body: "fn main(ctx) { ctx.n * 2 }".to_string(),
                input_schema: None,
                output_type: None,
            })
            .unwrap();
        let r = service
            .execute_by_function_id("fn-double", json!({"n": 21}), None, None)
            .unwrap();
        assert!(r.success, "fault: {:?}", r.error_message);
        assert_eq!(r.value, Some(json!(42)));
    }

    #[test]
    fn test_unknown_function_id_is_failed_result_not_error() {
        let (service, _store) = service_with_store();
        let r = service
            .execute_by_function_id("missing", json!({}), None, None)
            .unwrap();
        assert!(!r.success);
        assert_eq!(r.error_kind.as_deref(), Some("ValueError"));
        assert!(r.error_message.unwrap().contains("missing"));
    }

    #[test]
    fn test_missing_registry_is_config_error() {
        let service = FunctionService::new(FunctionsConfig::default());
        match service.execute_by_function_id("any", json!({}), None, None) {
            Err(FunctionsError::Config(msg)) => assert!(msg.contains("registry")),
            other => panic!("expected Config error, got {:?}", other.map(|r| r.success)),
        }
    }
}
