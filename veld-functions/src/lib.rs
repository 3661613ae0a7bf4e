//! Dynamic execution of user-authored functions against a data store.
//!
//! Responsibilities:
//! - Parse-check and run untrusted scripts under a restricted engine.
//! - Route each request to an isolation strategy (in-process, subprocess,
//!   remote sandbox) either explicitly or through a routing heuristic.
//! - Expose a capability API so scripts can read and write store objects
//!   through the caller's session.
//! - Normalize every outcome into one result shape, with script faults
//!   reported as data rather than errors.
//!
//! Design goals:
//! - Script faults never panic the host and never surface as `Err`; only a
//!   malformed request or missing configuration does.
//! - Wall-clock timeouts hold on every strategy, including runaway loops.
//! - The capability surface is a closed allow-list; anything not registered
//!   fails inside the script as an undefined name.

pub mod capability;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod executor;
pub mod result;
pub mod service;
pub mod validator;
pub mod wire;

pub use capability::{CapabilityApi, CapabilityCallRecord, CAPABILITY_FUNCTION_NAMES};
pub use config::FunctionsConfig;
pub use dispatcher::{choose_strategy, Dispatcher};
pub use error::{FunctionsError, FunctionsResult};
pub use executor::{InProcessExecutor, RemoteExecutor, SubprocessExecutor};
pub use result::{
    ExecutionRequest, ExecutionResult, ExecutionStrategy, Validation, DEFAULT_TIMEOUT,
};
pub use service::FunctionService;
pub use validator::validate;
