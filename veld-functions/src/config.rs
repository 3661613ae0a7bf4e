//! Configuration for the execution subsystem.
//!
//! Loaded once at startup (TOML file and/or `VELD_FN_*` environment
//! overrides) and passed by reference into the dispatcher; there is no
//! global configuration lookup at call time.

use crate::error::{FunctionsError, FunctionsResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_script_len() -> usize {
    64 * 1024
}

fn default_max_operations() -> u64 {
    25_000_000
}

static HEAVY_IMPORTS: Lazy<Vec<String>> = Lazy::new(|| {
    [
        "numpy",
        "pandas",
        "scipy",
        "sklearn",
        "torch",
        "tensorflow",
        "keras",
        "xgboost",
        "PIL",
        "cv2",
        "matplotlib",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
});

/// Library names that force subprocess routing when imported by a script.
pub fn default_heavy_imports() -> Vec<String> {
    HEAVY_IMPORTS.clone()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionsConfig {
    /// Wall-clock budget applied when a request does not carry its own.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Scripts longer than this fail validation before parsing.
    #[serde(default = "default_max_script_len")]
    pub max_script_len: usize,
    /// Operations budget for in-process evaluation.
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    /// Base URL of the remote sandbox service, if one is deployed.
    #[serde(default)]
    pub sandbox_url: Option<String>,
    /// Import names routed to subprocess execution.
    #[serde(default = "default_heavy_imports")]
    pub heavy_imports: Vec<String>,
    /// Explicit path to the subprocess runner binary. When unset the
    /// runner is looked up next to the current executable.
    #[serde(default)]
    pub runner_path: Option<PathBuf>,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_script_len: default_max_script_len(),
            max_operations: default_max_operations(),
            sandbox_url: None,
            heavy_imports: default_heavy_imports(),
            runner_path: None,
        }
    }
}

impl FunctionsConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn from_toml_str(s: &str) -> FunctionsResult<Self> {
        toml::from_str(s).map_err(|e| FunctionsError::Config(format!("invalid TOML config: {}", e)))
    }

    /// Applies `VELD_FN_*` environment overrides on top of the current
    /// values. Unset variables leave fields untouched; malformed numeric
    /// values are a configuration error.
    pub fn apply_env_overrides(mut self) -> FunctionsResult<Self> {
        if let Ok(v) = std::env::var("VELD_FN_DEFAULT_TIMEOUT_SECS") {
            self.default_timeout_secs = v.parse().map_err(|_| {
                FunctionsError::Config(format!("VELD_FN_DEFAULT_TIMEOUT_SECS: invalid value '{}'", v))
            })?;
        }
        if let Ok(v) = std::env::var("VELD_FN_MAX_SCRIPT_LEN") {
            self.max_script_len = v.parse().map_err(|_| {
                FunctionsError::Config(format!("VELD_FN_MAX_SCRIPT_LEN: invalid value '{}'", v))
            })?;
        }
        if let Ok(v) = std::env::var("VELD_FN_MAX_OPERATIONS") {
            self.max_operations = v.parse().map_err(|_| {
                FunctionsError::Config(format!("VELD_FN_MAX_OPERATIONS: invalid value '{}'", v))
            })?;
        }
        if let Ok(v) = std::env::var("VELD_FN_SANDBOX_URL") {
            if !v.is_empty() {
                self.sandbox_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("VELD_FN_RUNNER_PATH") {
            if !v.is_empty() {
                self.runner_path = Some(PathBuf::from(v));
            }
        }
        Ok(self)
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> FunctionsResult<Self> {
        Self::default().apply_env_overrides()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let cfg = FunctionsConfig::default();
        assert_eq!(cfg.default_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.max_script_len, 64 * 1024);
        assert!(cfg.sandbox_url.is_none());
        assert!(cfg.heavy_imports.iter().any(|s| s == "numpy"));
    }

    #[test]
    fn test_from_toml_partial_overrides() {
        let cfg = FunctionsConfig::from_toml_str(
            r#"
            default_timeout_secs = 5
            sandbox_url = "http://sandbox.internal:8800"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.default_timeout_secs, 5);
        assert_eq!(cfg.sandbox_url.as_deref(), Some("http://sandbox.internal:8800"));
        // untouched fields keep their defaults
        assert_eq!(cfg.max_operations, default_max_operations());
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(FunctionsConfig::from_toml_str("default_timeout_secs = \"soon\"").is_err());
    }
}
