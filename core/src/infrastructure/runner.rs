//! Process runner abstraction.
//!
//! `CommandRunner` is the trait gateways use to start external programs.
//! `ShellRunner` is the production implementation; `MockRunner` records
//! invocations and returns preset responses.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::context::Env;

/// Shell used for every local script, with `-e` so a failing command aborts.
pub const SHELL: &str = "/bin/sh";


// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One program to start: argv plus the variables layered over the
/// inherited environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Env,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            env: Env::new(),
        }
    }

    /// `/bin/sh -e <script>`: scripts need not be executable.
    pub fn script(script: &Path) -> Self {
        Invocation::new(SHELL)
            .arg("-e")
            .arg(script.display().to_string())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: Env) -> Self {
        self.env.extend(env);
        self
    }

    /// argv joined with spaces, for logs and error messages.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}


// ---------------------------------------------------------------------------
// RunError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {}: {stderr}", .status.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{} timed out after {timeout:?}", .program.display())]
    Timeout { program: PathBuf, timeout: Duration },
}


// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

pub trait CommandRunner {
    /// Run to completion and return stdout. Non-zero exit is an error.
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>, RunError>;
}


/// Production runner: spawns the process directly, no intermediate shell.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    timeout: Option<Duration>,
}

impl ShellRunner {
    pub fn new() -> Self {
        ShellRunner { timeout: None }
    }

    /// Kill any child still running after `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        ShellRunner { timeout }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>, RunError> {
        debug!(command = %invocation.command_line(), "running");
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let (status, stdout, stderr) = match self.timeout {
            None => {
                let output = child.wait_with_output().map_err(|source| RunError::Spawn {
                    program: invocation.program.clone(),
                    source,
                })?;
                (output.status, output.stdout, output.stderr)
            }
            Some(timeout) => {
                // Pipes are drained on threads while the child is waited on.
                let stdout_reader = spawn_reader(child.stdout.take());
                let stderr_reader = spawn_reader(child.stderr.take());
                let waited = child.wait_timeout(timeout).map_err(|source| RunError::Spawn {
                    program: invocation.program.clone(),
                    source,
                })?;
                let Some(status) = waited else {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunError::Timeout {
                        program: invocation.program.clone(),
                        timeout,
                    });
                };
                let stdout = stdout_reader.join().unwrap_or_default();
                let stderr = stderr_reader.join().unwrap_or_default();
                (status, stdout, stderr)
            }
        };

        if status.success() {
            Ok(stdout)
        } else {
            Err(RunError::Failed {
                command: invocation.command_line(),
                status: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim_end().to_string(),
            })
        }
    }
}


fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}


// ---------------------------------------------------------------------------
// MockRunner
// ---------------------------------------------------------------------------

/// Test-double runner that records invocations and returns pre-configured
/// responses in order. Once exhausted it answers with empty output.
pub struct MockRunner {
    responses: RefCell<VecDeque<Result<Vec<u8>, String>>>,
    invocations: RefCell<Vec<Invocation>>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner {
            responses: RefCell::new(VecDeque::new()),
            invocations: RefCell::new(Vec::new()),
        }
    }

    pub fn with_responses(responses: Vec<Result<&str, &str>>) -> Self {
        let runner = MockRunner::new();
        for response in responses {
            runner.push_response(response);
        }
        runner
    }

    pub fn push_response(&self, response: Result<&str, &str>) {
        self.responses.borrow_mut().push_back(
            response
                .map(|out| out.as_bytes().to_vec())
                .map_err(String::from),
        );
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.borrow().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>, RunError> {
        self.invocations.borrow_mut().push(invocation.clone());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(out)) => Ok(out),
            Some(Err(stderr)) => Err(RunError::Failed {
                command: invocation.command_line(),
                status: Some(1),
                stderr,
            }),
            None => Ok(Vec::new()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_invocation_uses_sh_e() {
        let inv = Invocation::script(Path::new("/conf/manifest/init"));
        assert_eq!(inv.command_line(), "/bin/sh -e /conf/manifest/init");
    }

    #[test]
    fn mock_runner_records_and_replays_in_order() {
        let runner = MockRunner::with_responses(vec![Ok("first"), Err("boom"), Ok("third")]);
        assert_eq!(runner.run(&Invocation::new("a")).unwrap(), b"first");
        assert!(matches!(
            runner.run(&Invocation::new("b")),
            Err(RunError::Failed { .. })
        ));
        assert_eq!(runner.run(&Invocation::new("c")).unwrap(), b"third");
        assert_eq!(runner.run(&Invocation::new("d")).unwrap(), b"");
        assert_eq!(runner.command_lines(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn shell_runner_captures_stdout_and_env() {
        let mut env = Env::new();
        env.insert("__target_host".into(), "web1".into());
        let inv = Invocation::new(SHELL)
            .arg("-c")
            .arg("echo \"$__target_host\"")
            .envs(env);
        let out = ShellRunner::new().run(&inv).unwrap();
        assert_eq!(out, b"web1\n");
    }

    #[test]
    fn shell_runner_reports_nonzero_exit_with_stderr() {
        let inv = Invocation::new(SHELL).arg("-c").arg("echo nope >&2; exit 3");
        match ShellRunner::new().run(&inv) {
            Err(RunError::Failed { status, stderr, .. }) => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn shell_runner_missing_program_is_spawn_error() {
        let inv = Invocation::new("/nonexistent/cdist-test-binary");
        assert!(matches!(
            ShellRunner::new().run(&inv),
            Err(RunError::Spawn { .. })
        ));
    }

    #[test]
    fn shell_runner_times_out() {
        let inv = Invocation::new(SHELL).arg("-c").arg("sleep 5");
        let runner = ShellRunner::with_timeout(Some(Duration::from_millis(200)));
        match runner.run(&inv) {
            Err(err @ RunError::Timeout { .. }) => {
                assert_eq!(err.to_string(), "/bin/sh timed out after 200ms");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn shell_runner_with_timeout_still_captures_output() {
        let inv = Invocation::new(SHELL).arg("-c").arg("echo done");
        let runner = ShellRunner::with_timeout(Some(Duration::from_secs(10)));
        assert_eq!(runner.run(&inv).unwrap(), b"done\n");
    }
}
