//! Shell command execution tool.

use std::time::Duration;

use tern_execution::{CodeExecutor, ExecutionLimits};
use tracing::debug;

use crate::ui_writer::UiWriter;

use super::{ToolContext, ToolOutcome};

/// Execute the `Bash` tool.
pub async fn execute_bash<W: UiWriter>(input: &serde_json::Value, ctx: &ToolContext<'_, W>) -> ToolOutcome {
    let command = match input.get("command").and_then(|v| v.as_str()) {
        Some(cmd) if !cmd.trim().is_empty() => cmd,
        _ => return ToolOutcome::error("Missing 'command' argument"),
    };
    let requested_timeout = input
        .get("timeout_secs")
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs);

    let executor = CodeExecutor::new(ExecutionLimits {
        timeout: Duration::from_secs(ctx.config.bash_timeout_seconds),
        output_limit: ctx.config.bash_output_limit_bytes,
    });

    struct ToolOutputReceiver<'a, W: UiWriter> {
        ui_writer: &'a W,
    }

    impl<'a, W: UiWriter> tern_execution::OutputReceiver for ToolOutputReceiver<'a, W> {
        fn on_output_line(&self, line: &str) {
            self.ui_writer.print_tool_output_line(line);
        }
    }

    let receiver = ToolOutputReceiver {
        ui_writer: ctx.ui_writer,
    };

    debug!("Running Bash tool in {}: {}", ctx.working_dir.display(), command);

    let result = match executor
        .execute_bash_in_dir(command, ctx.working_dir, requested_timeout, &receiver, ctx.cancel)
        .await
    {
        Ok(result) => result,
        Err(e) => return ToolOutcome::error(format!("Execution error: {:#}", e)),
    };

    let body = if result.output.trim().is_empty() {
        "(no output)".to_string()
    } else {
        result.output.trim_end().to_string()
    };

    if result.timed_out {
        let limit = requested_timeout
            .unwrap_or(executor.limits().timeout)
            .min(executor.limits().timeout);
        ToolOutcome::error(format!(
            "{}\n[command timed out after {}s and was killed]",
            body,
            limit.as_secs()
        ))
    } else if result.cancelled {
        ToolOutcome::error(format!("{}\n[command cancelled by operator]", body))
    } else if result.success {
        ToolOutcome::success(format!("{}\n[{}]", body, result.status_line()))
    } else {
        ToolOutcome::error(format!("{}\n[{}]", body, result.status_line()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ui_writer::NullUiWriter;
    use serde_json::json;
    use tern_config::AgentConfig;
    use tokio_util::sync::CancellationToken;

    async fn run(input: serde_json::Value, config: &AgentConfig, dir: &std::path::Path) -> ToolOutcome {
        let cancel = CancellationToken::new();
        let ctx = ToolContext {
            working_dir: dir,
            config,
            ui_writer: &NullUiWriter,
            controller: None,
            cancel: &cancel,
        };
        execute_bash(&input, &ctx).await
    }

    #[tokio::test]
    async fn test_successful_command() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run(json!({"command": "echo hi"}), &AgentConfig::default(), dir.path()).await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.output, "hi\n[exit status 0]");
    }

    #[tokio::test]
    async fn test_failing_command_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run(
            json!({"command": "echo oops >&2; exit 4"}),
            &AgentConfig::default(),
            dir.path(),
        )
        .await;
        assert!(outcome.is_error);
        assert!(outcome.output.contains("oops"));
        assert!(outcome.output.ends_with("[exit status 4]"));
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let outcome = run(json!({"command": "ls"}), &AgentConfig::default(), dir.path()).await;
        assert!(outcome.output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_timeout_is_killed_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            bash_timeout_seconds: 1,
            ..AgentConfig::default()
        };
        let started = std::time::Instant::now();
        let outcome = run(json!({"command": "sleep 30"}), &config, dir.path()).await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(outcome.is_error);
        assert!(outcome.output.contains("timed out after 1s and was killed"));
    }

    #[tokio::test]
    async fn test_empty_output_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run(json!({"command": "true"}), &AgentConfig::default(), dir.path()).await;
        assert_eq!(outcome.output, "(no output)\n[exit status 0]");
    }

    #[tokio::test]
    async fn test_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run(json!({"command": "  "}), &AgentConfig::default(), dir.path()).await;
        assert!(outcome.is_error);
    }
}
