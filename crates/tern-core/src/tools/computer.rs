//! The `Computer` tool: desktop automation exposed to the model.

use std::sync::Arc;

use tern_computer_control::{
    AutomationError, CaptureTarget, ComputerController, KeyChord, MouseButton, Point, ScrollDirection,
};
use tern_providers::ContentBlock;
use tracing::debug;

use crate::ui_writer::UiWriter;

use super::{ToolContext, ToolOutcome};

pub const ACTIONS: &[&str] = &[
    "screenshot",
    "click",
    "move",
    "drag",
    "scroll",
    "type",
    "key",
    "clipboard_get",
    "clipboard_set",
    "list_windows",
    "focus_window",
];

/// Actions that only observe the desktop.
pub fn is_read_only_action(action: &str) -> bool {
    matches!(action, "screenshot" | "clipboard_get" | "list_windows")
}

/// Execute the `Computer` tool.
pub async fn execute_computer<W: UiWriter>(input: &serde_json::Value, ctx: &ToolContext<'_, W>) -> ToolOutcome {
    let Some(controller) = ctx.controller else {
        return ToolOutcome::error("Computer control is disabled (set computer_control.enabled = true)");
    };
    let Some(action) = input.get("action").and_then(|v| v.as_str()) else {
        return ToolOutcome::error("Missing 'action' argument");
    };
    debug!("Computer action '{}' via {}", action, controller.backend_name());

    match run_action(controller, action, input).await {
        Ok(outcome) => outcome,
        Err(e) => ToolOutcome::error(format!("{} failed: {}", action, e)),
    }
}

async fn run_action(
    controller: &Arc<dyn ComputerController>,
    action: &str,
    input: &serde_json::Value,
) -> Result<ToolOutcome, AutomationError> {
    let outcome = match action {
        "screenshot" => {
            let target = match str_arg(input, "window") {
                Some(title) if !title.trim().is_empty() => CaptureTarget::Window(title.to_string()),
                _ => CaptureTarget::FullScreen,
            };
            let shot = controller.take_screenshot(target).await?;
            ToolOutcome::success(format!(
                "Captured {}x{} screenshot ({})",
                shot.width,
                shot.height,
                shot.path.display()
            ))
            .with_attachment(ContentBlock::image(&shot.media_type, shot.base64))
        }
        "click" => {
            let at = optional_point(input, "x", "y")?;
            let button = match str_arg(input, "button") {
                Some(b) => b.parse::<MouseButton>()?,
                None => MouseButton::default(),
            };
            let double = input.get("double").and_then(|v| v.as_bool()).unwrap_or(false);
            controller.click(at, button, double).await?;
            match at {
                Some(p) => ToolOutcome::success(format!("Clicked {:?} at ({}, {})", button, p.x, p.y)),
                None => ToolOutcome::success(format!("Clicked {:?} at the current position", button)),
            }
        }
        "move" => {
            let to = required_point(input, "x", "y")?;
            controller.move_pointer(to).await?;
            ToolOutcome::success(format!("Moved pointer to ({}, {})", to.x, to.y))
        }
        "drag" => {
            let from = required_point(input, "x", "y")?;
            let to = required_point(input, "to_x", "to_y")?;
            controller.drag(from, to).await?;
            ToolOutcome::success(format!(
                "Dragged from ({}, {}) to ({}, {})",
                from.x, from.y, to.x, to.y
            ))
        }
        "scroll" => {
            let direction: ScrollDirection = str_arg(input, "direction")
                .ok_or_else(|| invalid("scroll needs 'direction'"))?
                .parse()?;
            let amount = input.get("amount").and_then(|v| v.as_u64()).unwrap_or(3) as u32;
            controller.scroll(direction, amount).await?;
            ToolOutcome::success(format!("Scrolled {:?} by {}", direction, amount))
        }
        "type" => {
            let text = str_arg(input, "text").ok_or_else(|| invalid("type needs 'text'"))?;
            controller.type_text(text).await?;
            ToolOutcome::success(format!("Typed {} characters", text.chars().count()))
        }
        "key" => {
            let chord: KeyChord = str_arg(input, "keys")
                .ok_or_else(|| invalid("key needs 'keys', e.g. \"ctrl+s\""))?
                .parse()?;
            controller.key_chord(&chord).await?;
            ToolOutcome::success(format!("Pressed {}", chord))
        }
        "clipboard_get" => {
            let text = controller.clipboard_get().await?;
            if text.is_empty() {
                ToolOutcome::success("(clipboard is empty)")
            } else {
                ToolOutcome::success(text)
            }
        }
        "clipboard_set" => {
            let text = str_arg(input, "text").ok_or_else(|| invalid("clipboard_set needs 'text'"))?;
            controller.clipboard_set(text).await?;
            ToolOutcome::success(format!("Clipboard set ({} characters)", text.chars().count()))
        }
        "list_windows" => {
            let windows = controller.list_windows().await?;
            if windows.is_empty() {
                ToolOutcome::success("No windows found")
            } else {
                ToolOutcome::success(
                    windows
                        .iter()
                        .map(|w| w.to_string())
                        .collect::<Vec<_>>()
                        .join("\n"),
                )
            }
        }
        "focus_window" => {
            let title = str_arg(input, "title").ok_or_else(|| invalid("focus_window needs 'title'"))?;
            let window = controller.focus_window(title).await?;
            ToolOutcome::success(format!("Focused {}", window))
        }
        other => {
            return Err(invalid(&format!(
                "unknown action '{}'; expected one of {}",
                other,
                ACTIONS.join(", ")
            )))
        }
    };
    Ok(outcome)
}

fn str_arg<'v>(input: &'v serde_json::Value, key: &str) -> Option<&'v str> {
    input.get(key).and_then(|v| v.as_str())
}

fn invalid(message: &str) -> AutomationError {
    AutomationError::InvalidArgument(message.to_string())
}

fn coordinate(input: &serde_json::Value, key: &str) -> Option<i32> {
    input
        .get(key)
        .and_then(|v| v.as_i64())
        .and_then(|n| i32::try_from(n).ok())
}

fn optional_point(input: &serde_json::Value, x: &str, y: &str) -> Result<Option<Point>, AutomationError> {
    match (coordinate(input, x), coordinate(input, y)) {
        (Some(x), Some(y)) => Ok(Some(Point::new(x, y))),
        (None, None) => Ok(None),
        _ => Err(invalid(&format!("'{}' and '{}' must be given together", x, y))),
    }
}

fn required_point(input: &serde_json::Value, x: &str, y: &str) -> Result<Point, AutomationError> {
    optional_point(input, x, y)?.ok_or_else(|| invalid(&format!("'{}' and '{}' are required", x, y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_writer::NullUiWriter;
    use serde_json::json;
    use tern_computer_control::UnavailableController;
    use tern_config::AgentConfig;
    use tokio_util::sync::CancellationToken;

    async fn run(controller: Option<&Arc<dyn ComputerController>>, input: serde_json::Value) -> ToolOutcome {
        let config = AgentConfig::default();
        let cancel = CancellationToken::new();
        let dir = std::env::temp_dir();
        let ctx = ToolContext {
            working_dir: &dir,
            config: &config,
            ui_writer: &NullUiWriter,
            controller,
            cancel: &cancel,
        };
        execute_computer(&input, &ctx).await
    }

    #[tokio::test]
    async fn test_disabled_without_controller() {
        let outcome = run(None, json!({"action": "screenshot"})).await;
        assert!(outcome.is_error);
        assert!(outcome.output.contains("disabled"));
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_tool_error() {
        let controller: Arc<dyn ComputerController> = Arc::new(UnavailableController::new("no display"));
        let outcome = run(Some(&controller), json!({"action": "click", "x": 1, "y": 2})).await;
        assert!(outcome.is_error);
        assert!(outcome.output.starts_with("click failed"));
    }

    #[tokio::test]
    async fn test_argument_errors() {
        let controller: Arc<dyn ComputerController> = Arc::new(UnavailableController::new("none"));
        let outcome = run(Some(&controller), json!({"action": "click", "x": 1})).await;
        assert!(outcome.output.contains("must be given together"));

        let outcome = run(Some(&controller), json!({"action": "dance"})).await;
        assert!(outcome.output.contains("unknown action"));

        let outcome = run(Some(&controller), json!({"action": "key", "keys": "ctrl+"})).await;
        assert!(outcome.is_error);
    }

    #[test]
    fn test_read_only_actions() {
        for action in ACTIONS {
            let expected = matches!(*action, "screenshot" | "clipboard_get" | "list_windows");
            assert_eq!(is_read_only_action(action), expected, "{}", action);
        }
    }
}
