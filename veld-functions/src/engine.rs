//! Restricted script engine construction and fault classification.
//!
//! The engine starts from a raw core with no registered functions and gains
//! back only an explicit allow-list of built-in packages: arithmetic,
//! logic, string/number conversions, collections, iteration helpers and
//! printing. Filesystem, process, network and reflective access never enter
//! the namespace, so a script reaching for them fails with a
//! name-not-defined fault rather than a security error.

use crate::config::FunctionsConfig;
use rhai::packages::{
    ArithmeticPackage, BasicArrayPackage, BasicFnPackage, BasicIteratorPackage, BasicMapPackage,
    BasicMathPackage, BasicStringPackage, LanguageCorePackage, LogicPackage, MoreStringPackage,
    Package,
};
use rhai::{Dynamic, Engine, EvalAltResult, Position, AST};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const DEADLINE_TOKEN: &str = "wall-clock deadline exceeded";

/// Builds the restricted engine with resource limits applied.
pub fn restricted_engine(config: &FunctionsConfig) -> Engine {
    let mut engine = Engine::new_raw();

    engine.register_global_module(LanguageCorePackage::new().as_shared_module());
    engine.register_global_module(ArithmeticPackage::new().as_shared_module());
    engine.register_global_module(LogicPackage::new().as_shared_module());
    engine.register_global_module(BasicMathPackage::new().as_shared_module());
    engine.register_global_module(BasicStringPackage::new().as_shared_module());
    engine.register_global_module(MoreStringPackage::new().as_shared_module());
    engine.register_global_module(BasicArrayPackage::new().as_shared_module());
    engine.register_global_module(BasicMapPackage::new().as_shared_module());
    engine.register_global_module(BasicIteratorPackage::new().as_shared_module());
    engine.register_global_module(BasicFnPackage::new().as_shared_module());

    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_operations(config.max_operations);
    engine.set_max_string_size(1024 * 1024);
    engine.set_max_array_size(65_536);
    engine.set_max_map_size(65_536);

    engine
}

/// Redirects the script's `print`/`debug` output into a shared buffer.
pub fn capture_output(engine: &mut Engine) -> Arc<Mutex<String>> {
    let buffer = Arc::new(Mutex::new(String::new()));
    let print_buf = Arc::clone(&buffer);
    engine.on_print(move |text| {
        if let Ok(mut b) = print_buf.lock() {
            b.push_str(text);
            b.push('\n');
        }
    });
    let debug_buf = Arc::clone(&buffer);
    engine.on_debug(move |text, _source, _pos| {
        if let Ok(mut b) = debug_buf.lock() {
            b.push_str(text);
            b.push('\n');
        }
    });
    buffer
}

/// Terminates evaluation once the wall-clock deadline passes. The
/// resulting fault classifies as `TimeoutError`.
pub fn arm_deadline(engine: &mut Engine, deadline: Instant) {
    engine.on_progress(move |_ops| {
        if Instant::now() >= deadline {
            Some(DEADLINE_TOKEN.into())
        } else {
            None
        }
    });
}

/// Verifies the compiled script defines `main` with a single parameter.
/// The returned message is surfaced as a `ValueError`-class fault.
pub fn check_entry_point(ast: &AST) -> Result<(), String> {
    match ast.iter_functions().find(|f| f.name == "main") {
        None => Err("script does not define a 'main' entry point".to_string()),
        Some(f) if f.params.len() != 1 => Err(format!(
            "'main' must accept exactly one argument (the context), found {}",
            f.params.len()
        )),
        Some(_) => Ok(()),
    }
}

pub fn json_to_dynamic(value: &Value) -> Result<Dynamic, Box<EvalAltResult>> {
    rhai::serde::to_dynamic(value)
}

/// Converts a script value into JSON, falling back to its string
/// rendering when the value is not representable in the wire format.
pub fn dynamic_to_json(value: &Dynamic) -> Value {
    match rhai::serde::from_dynamic::<Value>(value) {
        Ok(v) => v,
        Err(_) => Value::String(value.to_string()),
    }
}

/// A classified script-level fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFault {
    pub kind: String,
    pub message: String,
    pub trace: Option<String>,
}

fn fmt_pos(pos: Position) -> String {
    match pos.line() {
        Some(line) => format!(" (line {})", line),
        None => String::new(),
    }
}

/// Maps an evaluation error onto the fault taxonomy. Faults raised inside
/// function calls are unwrapped so the innermost cause names the kind,
/// with the call chain preserved in the trace.
pub fn classify_fault(err: &EvalAltResult) -> ScriptFault {
    let mut frames: Vec<String> = Vec::new();
    let mut cause: &EvalAltResult = err;
    while let EvalAltResult::ErrorInFunctionCall(name, _, inner, pos) = cause {
        frames.push(format!("in call to '{}'{}", name, fmt_pos(*pos)));
        cause = inner;
    }

    let (kind, message) = match cause {
        EvalAltResult::ErrorArithmetic(msg, _) => {
            if msg.to_lowercase().contains("zero") {
                ("ZeroDivisionError", msg.clone())
            } else {
                ("ArithmeticError", msg.clone())
            }
        }
        EvalAltResult::ErrorVariableNotFound(name, _) => (
            "NameError",
            format!("name '{}' is not defined", name),
        ),
        EvalAltResult::ErrorFunctionNotFound(sig, _) => (
            "NameError",
            format!("name '{}' is not defined", sig),
        ),
        EvalAltResult::ErrorPropertyNotFound(name, _) => {
            ("KeyError", format!("property '{}' not found", name))
        }
        EvalAltResult::ErrorIndexNotFound(idx, _) => {
            ("KeyError", format!("index '{}' not found", idx))
        }
        EvalAltResult::ErrorArrayBounds(len, idx, _) => (
            "IndexError",
            format!("array index {} out of bounds (length {})", idx, len),
        ),
        EvalAltResult::ErrorStringBounds(len, idx, _) => (
            "IndexError",
            format!("string index {} out of bounds (length {})", idx, len),
        ),
        EvalAltResult::ErrorMismatchDataType(want, got, _) => (
            "TypeError",
            format!("expected value of type {}, got {}", want, got),
        ),
        EvalAltResult::ErrorMismatchOutputType(want, got, _) => (
            "TypeError",
            format!("expected return of type {}, got {}", want, got),
        ),
        EvalAltResult::ErrorIndexingType(t, _) => {
            ("TypeError", format!("type {} cannot be indexed", t))
        }
        EvalAltResult::ErrorTooManyOperations(_) => (
            "TimeoutError",
            "operations budget exhausted".to_string(),
        ),
        EvalAltResult::ErrorTerminated(token, _) => ("TimeoutError", token.to_string()),
        EvalAltResult::ErrorStackOverflow(_) => {
            ("RecursionError", "call stack overflow".to_string())
        }
        EvalAltResult::ErrorDataTooLarge(what, _) => {
            ("MemoryError", format!("{} exceeds the size limit", what))
        }
        EvalAltResult::ErrorRuntime(val, _) => ("RuntimeError", val.to_string()),
        other => ("RuntimeError", other.to_string()),
    };

    let mut trace_lines = Vec::with_capacity(frames.len() + 1);
    if let Some(line) = cause.position().line() {
        trace_lines.push(format!("at line {}", line));
    }
    trace_lines.extend(frames);
    let trace = if trace_lines.is_empty() {
        None
    } else {
        Some(trace_lines.join("\n"))
    };

    ScriptFault {
        kind: kind.to_string(),
        message,
        trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rhai::Scope;
    use serde_json::json;

    fn run_main(script: &str, context: Value) -> Result<Dynamic, Box<EvalAltResult>> {
        let config = FunctionsConfig::default();
        let engine = restricted_engine(&config);
        let ast = engine.compile(script).expect("script should compile");
        let arg = json_to_dynamic(&context).expect("context should convert");
        let mut scope = Scope::new();
        engine.call_fn::<Dynamic>(&mut scope, &ast, "main", (arg,))
    }

    #[test]
    fn test_division_by_zero_classifies() {
        let err = run_main("fn main(ctx) { 1 / 0 }", json!({})).unwrap_err();
        let fault = classify_fault(&err);
        assert_eq!(fault.kind, "ZeroDivisionError");
    }

    #[test]
    fn test_disallowed_operation_is_name_error() {
        // No file/process/network functions are registered, so reaching for
        // one is an undefined name, not a security failure.
        let err = run_main(r#"fn main(ctx) { open("/etc/passwd") }"#, json!({})).unwrap_err();
        let fault = classify_fault(&err);
        assert_eq!(fault.kind, "NameError");
        assert!(fault.message.contains("open"));
    }

    #[test]
    fn test_missing_property_is_key_error() {
        let err = run_main("fn main(ctx) { ctx.absent + 1 }", json!({"x": 1})).unwrap_err();
        let fault = classify_fault(&err);
        assert_eq!(fault.kind, "KeyError");
    }

    #[test]
    fn test_value_roundtrip_through_dynamic() {
        let v = json!({"a": [1, 2, 3], "b": {"nested": true}, "c": "text"});
        let d = json_to_dynamic(&v).unwrap();
        assert_eq!(dynamic_to_json(&d), v);
    }

    #[test]
    fn test_entry_point_checks() {
        let config = FunctionsConfig::default();
        let engine = restricted_engine(&config);

        let ok = engine.compile("fn main(ctx) { 1 }").unwrap();
        assert!(check_entry_point(&ok).is_ok());

        let missing = engine.compile("fn helper() { 1 }").unwrap();
        assert!(check_entry_point(&missing).unwrap_err().contains("main"));

        let wrong_arity = engine.compile("fn main(a, b) { 1 }").unwrap();
        assert!(check_entry_point(&wrong_arity).unwrap_err().contains("exactly one"));
    }

    #[test]
    fn test_print_capture() {
        let config = FunctionsConfig::default();
        let mut engine = restricted_engine(&config);
        let buffer = capture_output(&mut engine);
        let ast = engine
            .compile(r#"fn main(ctx) { print("hello"); 1 }"#)
            .unwrap();
        let mut scope = Scope::new();
        let _ = engine
            .call_fn::<Dynamic>(&mut scope, &ast, "main", (Dynamic::UNIT,))
            .unwrap();
        assert_eq!(buffer.lock().unwrap().as_str(), "hello\n");
    }

    #[test]
    fn test_deadline_terminates_loop() {
        let config = FunctionsConfig {
            // Keep the operations budget out of the way so the wall clock
            // is what fires.
            max_operations: u64::MAX,
            ..FunctionsConfig::default()
        };
        let mut engine = restricted_engine(&config);
        arm_deadline(&mut engine, Instant::now() + std::time::Duration::from_millis(50));
        let ast = engine
            .compile("fn main(ctx) { let n = 0; loop { n += 1; } }")
            .unwrap();
        let mut scope = Scope::new();
        let err = engine
            .call_fn::<Dynamic>(&mut scope, &ast, "main", (Dynamic::UNIT,))
            .unwrap_err();
        let fault = classify_fault(&err);
        assert_eq!(fault.kind, "TimeoutError");
    }
}
