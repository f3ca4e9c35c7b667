//! Running host utilities for the automation backends.

use async_trait::async_trait;
use std::time::Duration;
use tern_execution::{CodeExecutor, ExecutionLimits};
use tracing::debug;

use crate::AutomationError;

/// One invocation of a host utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

#[async_trait]
pub trait ProgramRunner: Send + Sync {
    /// Run to completion and return stdout; a non-zero exit is an error.
    async fn run(&self, invocation: &Invocation) -> Result<String, AutomationError>;
}

/// Runs invocations as real subprocesses with a hard timeout.
pub struct ProcessRunner {
    executor: CodeExecutor,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            executor: CodeExecutor::new(ExecutionLimits {
                timeout,
                output_limit: 4 * 1024 * 1024,
            }),
        }
    }
}

#[async_trait]
impl ProgramRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, AutomationError> {
        debug!("automation: {} {:?}", invocation.program, invocation.args);
        let result = self
            .executor
            .run_program(
                &invocation.program,
                &invocation.args,
                invocation.stdin.as_deref().map(str::as_bytes),
            )
            .await
            .map_err(|e| {
                AutomationError::Unavailable(format!("could not start {}: {}", invocation.program, e))
            })?;

        if result.timed_out {
            return Err(AutomationError::Timeout {
                program: invocation.program.clone(),
                seconds: self.executor.limits().timeout.as_secs(),
            });
        }
        if !result.success {
            let detail = if result.stderr.trim().is_empty() {
                result.stdout.trim().to_string()
            } else {
                result.stderr.trim().to_string()
            };
            return Err(AutomationError::CommandFailed {
                program: invocation.program.clone(),
                status: result.exit_code,
                detail,
            });
        }
        Ok(result.stdout)
    }
}
