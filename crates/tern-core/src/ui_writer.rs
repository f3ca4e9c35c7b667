use crate::diff::FileDiff;
use crate::tools::ToolOutcome;

/// Interface for UI output operations
/// This trait abstracts all UI operations so the agent loop stays independent
/// of how (or whether) output reaches a terminal.
pub trait UiWriter: Send + Sync {
    /// Print a simple message
    fn print(&self, message: &str);

    /// Print a message with a newline
    fn println(&self, message: &str);

    /// Print agent response inline (for streaming)
    fn print_agent_response(&self, content: &str);

    /// Called once the model has finished a response.
    fn finish_agent_response(&self) {}

    /// Print a tool execution header
    fn print_tool_header(&self, tool_name: &str, tool_args: Option<&serde_json::Value>);

    /// Print a line of live tool output
    fn print_tool_output_line(&self, line: &str);

    /// Print the result of a finished tool
    fn print_tool_result(&self, tool_name: &str, outcome: &ToolOutcome);

    /// Render a file change
    fn print_diff(&self, diff: &FileDiff);

    /// Print a short status line (retries, limits, cancellation)
    fn print_status(&self, message: &str);

    /// Show a busy indicator while waiting on the model
    fn start_thinking(&self) {}

    /// Hide the busy indicator
    fn stop_thinking(&self) {}

    /// Flush any buffered output
    fn flush(&self);
}

/// A no-op implementation for when UI output is not needed
pub struct NullUiWriter;

impl UiWriter for NullUiWriter {
    fn print(&self, _message: &str) {}
    fn println(&self, _message: &str) {}
    fn print_agent_response(&self, _content: &str) {}
    fn print_tool_header(&self, _tool_name: &str, _tool_args: Option<&serde_json::Value>) {}
    fn print_tool_output_line(&self, _line: &str) {}
    fn print_tool_result(&self, _tool_name: &str, _outcome: &ToolOutcome) {}
    fn print_diff(&self, _diff: &FileDiff) {}
    fn print_status(&self, _message: &str) {}
    fn flush(&self) {}
}
