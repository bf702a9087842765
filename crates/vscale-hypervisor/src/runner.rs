//! Process execution for the management CLI.
//!
//! `ProcessRunner` is the production implementation. With the `testing`
//! feature, `ScriptedRunner` answers from in-memory queues so the control
//! loop can be driven without a hypervisor installed.

#[cfg(any(test, feature = "testing"))]
use std::collections::VecDeque;
use std::process::Stdio;
#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{HypervisorError, HypervisorResult};

pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Captured result of one finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub program: String,
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Stdout followed by stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into `HypervisorError::ExitStatus`.
    pub fn into_checked(self) -> HypervisorResult<String> {
        if self.success() {
            Ok(self.output)
        } else {
            Err(HypervisorError::ExitStatus {
                program: self.program,
                code: self.code,
                output: self.output,
            })
        }
    }
}

/// Runs one external command to completion.
///
/// Implementations must not interpret the exit status; callers decide what
/// a non-zero exit means via [`CommandOutput::into_checked`].
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, HypervisorResult<CommandOutput>>;
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, program: &str, args: &[String]) -> HypervisorResult<CommandOutput> {
        debug!(%program, ?args, "running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the `output()` future on timeout drops the child, which
        // kills it because of `kill_on_drop`.
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| HypervisorError::Spawn {
                program: program.to_string(),
                source,
            })?,
            Err(_) => {
                return Err(HypervisorError::Timeout {
                    program: program.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            program: program.to_string(),
            code: output.status.code(),
            output: text,
        })
    }
}

impl CommandRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, HypervisorResult<CommandOutput>> {
        Box::pin(self.execute(program, args))
    }
}

/// In-memory runner with scripted responses.
///
/// `metrics query` calls pop from the query queue and fail with exit code 1
/// once it is empty. `controlvm` calls pop from the actuation queue and
/// succeed once it is empty. Anything else succeeds with no output.
/// Every invocation is recorded as `program` followed by its arguments.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    queries: Mutex<VecDeque<(i32, String)>>,
    actuations: Mutex<VecDeque<(i32, String)>>,
    calls: Mutex<Vec<Vec<String>>>,
}

#[cfg(any(test, feature = "testing"))]
impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful `metrics query` response.
    pub fn push_query(&self, output: impl Into<String>) {
        lock(&self.queries).push_back((0, output.into()));
    }

    /// Queue a failing `metrics query` response.
    pub fn push_query_failure(&self, code: i32, output: impl Into<String>) {
        lock(&self.queries).push_back((code, output.into()));
    }

    /// Queue a failing `controlvm` response.
    pub fn push_actuation_failure(&self, code: i32, output: impl Into<String>) {
        lock(&self.actuations).push_back((code, output.into()));
    }

    /// Every call made so far, program first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    /// Calls whose first argument is `controlvm`.
    pub fn actuations(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.get(1).map(String::as_str) == Some("controlvm"))
            .collect()
    }

    fn respond(&self, program: &str, args: &[String]) -> CommandOutput {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        lock(&self.calls).push(call);

        let head: Vec<&str> = args.iter().take(2).map(String::as_str).collect();
        let (code, output) = match head.as_slice() {
            ["metrics", "query"] => lock(&self.queries)
                .pop_front()
                .unwrap_or_else(|| (1, "no scripted sample left\n".to_string())),
            ["controlvm", ..] => lock(&self.actuations)
                .pop_front()
                .unwrap_or_else(|| (0, String::new())),
            _ => (0, String::new()),
        };

        CommandOutput {
            program: program.to_string(),
            code: Some(code),
            output,
        }
    }
}

#[cfg(any(test, feature = "testing"))]
impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, HypervisorResult<CommandOutput>> {
        let out = self.respond(program, args);
        Box::pin(async move { Ok(out) })
    }
}

#[cfg(any(test, feature = "testing"))]
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
