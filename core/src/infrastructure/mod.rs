//! Process plumbing shared by the shell gateways.
//!
//! `runner` starts local processes (with an optional timeout); `remote`
//! builds the `remote_exec` / `remote_copy` invocations that reach the
//! target host.

pub mod remote;
pub mod runner;

pub use remote::Remote;
pub use runner::{CommandRunner, Invocation, MockRunner, RunError, ShellRunner};

use crate::error::CdistError;

/// Map a process failure onto the error a gateway reports, keeping timeouts
/// distinct.
pub(crate) fn script_error(err: RunError, wrap: impl FnOnce(String) -> CdistError) -> CdistError {
    match err {
        RunError::Timeout { program, timeout } => CdistError::Timeout { program, timeout },
        other => wrap(other.to_string()),
    }
}
