//! Strategy selection and result normalization.
//!
//! The dispatcher is the single entry point for running one request: it
//! resolves `Auto` through the routing heuristic, invokes exactly one
//! executor, and hands back the normalized result tagged with the strategy
//! actually used. Script faults never escape as errors here; only a
//! malformed request or missing configuration does.

use crate::capability::{CapabilityApi, CAPABILITY_FUNCTION_NAMES};
use crate::config::FunctionsConfig;
use crate::error::{FunctionsError, FunctionsResult};
use crate::executor::{InProcessExecutor, RemoteExecutor, SubprocessExecutor};
use crate::result::{ExecutionRequest, ExecutionResult, ExecutionStrategy};
use std::sync::Arc;
use uuid::Uuid;
use veld_store::DataStoreSession;

/// Extracts the first module name of an import-like statement, tolerating
/// quoted module paths and dotted submodules.
fn import_target(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = ["import ", "use ", "from "]
        .iter()
        .find_map(|kw| trimmed.strip_prefix(kw))?;
    let token: String = rest
        .trim_start()
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
        .collect();
    let base = token.split('.').next().unwrap_or("");
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

/// First heavy library imported by the script, if any.
pub fn detect_heavy_import(script_body: &str, heavy_imports: &[String]) -> Option<String> {
    script_body
        .lines()
        .filter_map(import_target)
        .find(|base| heavy_imports.iter().any(|h| h == base))
}

/// True when any capability function name occurs in the script text.
pub fn references_capability(script_body: &str) -> bool {
    CAPABILITY_FUNCTION_NAMES
        .iter()
        .any(|name| script_body.contains(name))
}

/// Routing heuristic for `Auto`, a pure function of the script text and
/// session availability.
pub fn choose_strategy(
    script_body: &str,
    has_session: bool,
    heavy_imports: &[String],
) -> ExecutionStrategy {
    if let Some(lib) = detect_heavy_import(script_body, heavy_imports) {
        log::debug!("routing to subprocess: heavy import '{}'", lib);
        return ExecutionStrategy::Subprocess;
    }
    if references_capability(script_body) {
        // Without a session the capability API cannot be wired in; route to
        // subprocess so capability calls fail fast as undefined names
        // instead of silently running with a half-configured namespace.
        return if has_session {
            ExecutionStrategy::InProcess
        } else {
            ExecutionStrategy::Subprocess
        };
    }
    ExecutionStrategy::InProcess
}

pub struct Dispatcher {
    config: FunctionsConfig,
    session: Option<Arc<dyn DataStoreSession>>,
}

impl Dispatcher {
    pub fn new(config: FunctionsConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn with_session(mut self, session: Arc<dyn DataStoreSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn config(&self) -> &FunctionsConfig {
        &self.config
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn dispatch(&self, request: &ExecutionRequest) -> FunctionsResult<ExecutionResult> {
        if request.timeout.is_zero() {
            return Err(FunctionsError::Config(
                "execution timeout must be greater than zero".to_string(),
            ));
        }

        let strategy = match request.strategy {
            ExecutionStrategy::Auto => choose_strategy(
                &request.script_body,
                self.session.is_some(),
                &self.config.heavy_imports,
            ),
            explicit => explicit,
        };

        let execution_id = Uuid::new_v4();
        log::info!(
            "execution {} dispatching via {} (timeout {:.1}s)",
            execution_id,
            strategy,
            request.timeout.as_secs_f64()
        );

        let result = match strategy {
            ExecutionStrategy::InProcess => self.run_in_process(request),
            ExecutionStrategy::Subprocess => SubprocessExecutor::new(self.config.clone()).run(
                &request.script_body,
                &request.context,
                request.timeout,
            ),
            ExecutionStrategy::Remote => {
                let url = self.config.sandbox_url.as_deref().ok_or_else(|| {
                    FunctionsError::Config(
                        "remote strategy requested but no sandbox_url is configured".to_string(),
                    )
                })?;
                RemoteExecutor::new().run(
                    &request.script_body,
                    &request.context,
                    request.timeout,
                    url,
                )
            }
            ExecutionStrategy::Auto => {
                return Err(FunctionsError::Internal(
                    "heuristic resolved to Auto".to_string(),
                ));
            }
        };

        log::info!(
            "execution {} finished: success={} kind={:?} in {:.3}s",
            execution_id,
            result.success,
            result.error_kind,
            result.duration.as_secs_f64()
        );
        Ok(result)
    }

    fn run_in_process(&self, request: &ExecutionRequest) -> ExecutionResult {
        let capability = self
            .session
            .as_ref()
            .map(|s| Arc::new(CapabilityApi::new(Arc::clone(s), request.context.clone())));

        let result = InProcessExecutor::new(self.config.clone()).run(
            &request.script_body,
            &request.context,
            capability.clone(),
            request.timeout,
        );

        if let Some(api) = capability {
            let log = api.call_log();
            if !log.is_empty() {
                log::debug!(
                    "capability log: {}",
                    serde_json::to_string(&log).unwrap_or_else(|_| format!("{} calls", log.len()))
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use veld_store::MemoryStore;

    fn heavy() -> Vec<String> {
        crate::config::default_heavy_imports()
    }

    #[test]
    fn test_heavy_import_routes_to_subprocess() {
        let script = "import \"numpy\" as np;\nfn main(ctx) { 1 }";
        assert_eq!(
            choose_strategy(script, true, &heavy()),
            ExecutionStrategy::Subprocess
        );
        assert_eq!(
            choose_strategy(script, false, &heavy()),
            ExecutionStrategy::Subprocess
        );
    }

    #[test]
    fn test_dotted_and_from_style_imports_detected() {
        let script = "from pandas.io import stuff\nfn main(ctx) { 1 }";
        assert_eq!(detect_heavy_import(script, &heavy()), Some("pandas".to_string()));
    }

    #[test]
    fn test_capability_reference_depends_on_session() {
        let script = "fn main(ctx) { get_object(ctx.id) }";
        assert_eq!(
            choose_strategy(script, true, &heavy()),
            ExecutionStrategy::InProcess
        );
        assert_eq!(
            choose_strategy(script, false, &heavy()),
            ExecutionStrategy::Subprocess
        );
    }

    #[test]
    fn test_plain_script_defaults_to_in_process() {
        let script = "fn main(ctx) { ctx.x + 1 }";
        assert_eq!(
            choose_strategy(script, false, &heavy()),
            ExecutionStrategy::InProcess
        );
    }

    #[test]
    fn test_heavy_import_wins_over_capability_reference() {
        let script = "import \"torch\" as t;\nfn main(ctx) { get_object(ctx.id) }";
        assert_eq!(
            choose_strategy(script, true, &heavy()),
            ExecutionStrategy::Subprocess
        );
    }

    #[test]
    fn test_dispatch_runs_in_process_with_session_capability() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let type_id = store.add_object_type("note", "Note").unwrap();
        store.create_object(&type_id, json!({"body": "hi"})).unwrap();

        let dispatcher = Dispatcher::new(FunctionsConfig::default()).with_session(store);
        let request = ExecutionRequest::new(
            r#"fn main(ctx) { query_objects("note").len() }"#,
            json!({}),
        );
        let result = dispatcher.dispatch(&request).unwrap();
        assert!(result.success, "fault: {:?}", result.error_message);
        assert_eq!(result.value, Some(json!(1)));
        assert_eq!(result.strategy_used, ExecutionStrategy::InProcess);
    }

    #[test]
    fn test_zero_timeout_is_dispatcher_error() {
        let dispatcher = Dispatcher::new(FunctionsConfig::default());
        let request = ExecutionRequest::new("fn main(ctx) { 1 }", json!({}))
            .with_timeout(Duration::ZERO);
        match dispatcher.dispatch(&request) {
            Err(FunctionsError::Config(msg)) => assert!(msg.contains("timeout")),
            other => panic!("expected Config error, got {:?}", other.map(|r| r.success)),
        }
    }

    #[test]
    fn test_remote_without_url_is_dispatcher_error() {
        let dispatcher = Dispatcher::new(FunctionsConfig::default());
        let request = ExecutionRequest::new("fn main(ctx) { 1 }", json!({}))
            .with_strategy(ExecutionStrategy::Remote);
        match dispatcher.dispatch(&request) {
            Err(FunctionsError::Config(msg)) => assert!(msg.contains("sandbox_url")),
            other => panic!("expected Config error, got {:?}", other.map(|r| r.success)),
        }
    }

    #[test]
    fn test_explicit_strategy_skips_heuristic() {
        // Heavy import would route to subprocess under Auto, but an explicit
        // InProcess request is honored.
        let dispatcher = Dispatcher::new(FunctionsConfig::default());
        let request = ExecutionRequest::new(
            "import \"numpy\" as np;\nfn main(ctx) { 2 }",
            json!({}),
        )
        .with_strategy(ExecutionStrategy::InProcess);
        let result = dispatcher.dispatch(&request).unwrap();
        assert_eq!(result.strategy_used, ExecutionStrategy::InProcess);
    }
}
