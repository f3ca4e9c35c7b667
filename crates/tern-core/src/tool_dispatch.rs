//! Tool dispatch module - routes tool calls to their implementations.
//!
//! Input is validated against the tool's declared schema first; a call that
//! fails validation never reaches the implementation.

use tracing::{debug, warn};

use crate::tools::{computer, file_ops, schema, search, shell, ToolContext, ToolName, ToolOutcome};
use crate::ui_writer::UiWriter;

/// Check that a call names a known, enabled tool and has valid input.
pub fn check_call(name: &str, input: &serde_json::Value, computer_enabled: bool) -> Result<ToolName, ToolOutcome> {
    let tool = match name.parse::<ToolName>() {
        Ok(tool) => tool,
        Err(e) => {
            warn!("Model requested unknown tool '{}'", name);
            let known: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
            return Err(ToolOutcome::error(format!("{}; available tools: {}", e, known.join(", "))));
        }
    };

    if tool == ToolName::Computer && !computer_enabled {
        return Err(ToolOutcome::error(
            "Computer control is disabled (set computer_control.enabled = true)",
        ));
    }

    if let Err(e) = schema::validate(tool, input) {
        debug!("Rejected {} input: {}", name, e);
        return Err(ToolOutcome::error(format!("Invalid input for {}: {}", name, e)));
    }

    Ok(tool)
}

/// Validate and run one tool call.
pub async fn dispatch_tool<W: UiWriter>(
    name: &str,
    input: &serde_json::Value,
    ctx: &ToolContext<'_, W>,
) -> ToolOutcome {
    debug!("Dispatching tool: {}", name);

    match check_call(name, input, ctx.controller.is_some()) {
        Ok(tool) => run_tool(tool, input, ctx).await,
        Err(outcome) => outcome,
    }
}

/// Run an already validated call.
pub async fn run_tool<W: UiWriter>(tool: ToolName, input: &serde_json::Value, ctx: &ToolContext<'_, W>) -> ToolOutcome {
    match tool {
        ToolName::Bash => shell::execute_bash(input, ctx).await,
        ToolName::Read => file_ops::execute_read(input, ctx).await,
        ToolName::Write => file_ops::execute_write(input, ctx).await,
        ToolName::Edit => file_ops::execute_edit(input, ctx).await,
        ToolName::Glob => search::execute_glob(input, ctx).await,
        ToolName::Grep => search::execute_grep(input, ctx).await,
        ToolName::Computer => computer::execute_computer(input, ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_writer::NullUiWriter;
    use serde_json::json;
    use tern_config::AgentConfig;
    use tokio_util::sync::CancellationToken;

    async fn dispatch(name: &str, input: serde_json::Value) -> ToolOutcome {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::default();
        let cancel = CancellationToken::new();
        let ctx = ToolContext {
            working_dir: dir.path(),
            config: &config,
            ui_writer: &NullUiWriter,
            controller: None,
            cancel: &cancel,
        };
        dispatch_tool(name, &input, &ctx).await
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let outcome = dispatch("Delete", json!({})).await;
        assert!(outcome.is_error);
        assert!(outcome.output.contains("unknown tool 'Delete'"));
        assert!(outcome.output.contains("Bash, Read"));
    }

    #[tokio::test]
    async fn test_invalid_input_is_tool_error() {
        let outcome = dispatch("Read", json!({"path": 42})).await;
        assert!(outcome.is_error);
        assert!(outcome.output.starts_with("Invalid input for Read: path: "), "{}", outcome.output);

        let outcome = dispatch("Write", json!({"path": "a.txt"})).await;
        assert!(outcome.output.contains("\"content\" is a required property"));

        let outcome = dispatch("Glob", json!("*.rs")).await;
        assert!(outcome.is_error);
    }

    #[tokio::test]
    async fn test_computer_disabled() {
        let outcome = dispatch("Computer", json!({"action": "screenshot"})).await;
        assert!(outcome.is_error);
        assert!(outcome.output.contains("disabled"));
    }

    #[test]
    fn test_check_call() {
        assert_eq!(check_call("Read", &json!({"path": "a"}), false), Ok(ToolName::Read));
        assert!(check_call("Computer", &json!({"action": "screenshot"}), false).is_err());
        assert_eq!(
            check_call("Computer", &json!({"action": "screenshot"}), true),
            Ok(ToolName::Computer)
        );
        assert!(check_call("Computer", &json!({"action": "jump"}), true).is_err());
    }

    #[tokio::test]
    async fn test_valid_call_reaches_tool() {
        let outcome = dispatch("Glob", json!({"pattern": "*.nothing"})).await;
        assert!(!outcome.is_error);
    }
}
