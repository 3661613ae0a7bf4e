//! Standalone syntax pre-check.
//!
//! Compiles the script without running any of it. A parse failure is
//! reported with the offending line number; oversized scripts are rejected
//! before parsing. This never returns an error to the caller.

use crate::config::FunctionsConfig;
use crate::engine::restricted_engine;
use crate::result::Validation;

pub fn validate(script_body: &str, config: &FunctionsConfig) -> Validation {
    if script_body.len() > config.max_script_len {
        return Validation::invalid(format!(
            "script is {} bytes, exceeding the {} byte limit",
            script_body.len(),
            config.max_script_len
        ));
    }

    let engine = restricted_engine(config);
    match engine.compile(script_body) {
        Ok(_) => Validation::ok(),
        Err(err) => {
            let line = err
                .1
                .line()
                .map(|l| format!("line {}: ", l))
                .unwrap_or_default();
            Validation::invalid(format!("{}{}", line, err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_script_passes() {
        let config = FunctionsConfig::default();
        let v = validate("fn main(ctx) { ctx.x * 2 }", &config);
        assert_eq!(v, Validation::ok());
    }

    #[test]
    fn test_malformed_script_reports_line() {
        let config = FunctionsConfig::default();
        let v = validate("fn main(ctx) {\n  let x = ;\n}", &config);
        assert!(!v.valid);
        let msg = v.error.unwrap();
        assert!(msg.contains("line 2"), "unexpected message: {}", msg);
    }

    #[test]
    fn test_oversized_script_rejected_before_parse() {
        let config = FunctionsConfig {
            max_script_len: 16,
            ..FunctionsConfig::default()
        };
        let v = validate("fn main(ctx) { ctx }", &config);
        assert!(!v.valid);
        assert!(v.error.unwrap().contains("byte limit"));
    }

    #[test]
    fn test_validator_does_not_execute() {
        // A script with a divide-by-zero body still validates; only the
        // parse is performed.
        let config = FunctionsConfig::default();
        let v = validate("fn main(ctx) { 1 / 0 }", &config);
        assert!(v.valid);
    }
}
