//! Isolation strategies for running one script.
//!
//! Each executor catches every fault a script can produce and folds it into
//! a normalized `ExecutionResult`; none of them panic or return `Err` for
//! script-level failures.

pub mod in_process;
pub mod remote;
pub mod subprocess;

pub use in_process::InProcessExecutor;
pub use remote::RemoteExecutor;
pub use subprocess::SubprocessExecutor;
