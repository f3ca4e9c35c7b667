use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tern_core::ui_writer::UiWriter;
use tern_core::{FileDiff, ToolOutcome};

use crate::display::{render_diff, render_markdown, truncate_line};

/// Widest argument preview in a tool header.
const MAX_HEADER_ARG_CHARS: usize = 80;

/// Console implementation of UiWriter that prints to stdout
pub struct ConsoleUiWriter {
    /// Responses arrive whole, so they can be rendered as markdown.
    markdown: bool,
    spinner: Mutex<Option<ProgressBar>>,
    /// Whether the current response printed text not yet ended by a newline.
    open_response_line: Mutex<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConsoleUiWriter {
    pub fn new() -> Self {
        Self {
            markdown: false,
            spinner: Mutex::new(None),
            open_response_line: Mutex::new(false),
        }
    }

    /// Writer for non-streaming mode.
    pub fn with_markdown() -> Self {
        Self {
            markdown: true,
            ..Self::new()
        }
    }

    fn thinking_spinner() -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.dim} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Thinking...");
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn close_response_line(&self) {
        let mut open = lock(&self.open_response_line);
        if *open {
            println!();
            *open = false;
        }
    }
}

impl Default for ConsoleUiWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// The argument worth showing next to a tool name.
pub fn primary_argument(tool_name: &str, args: &serde_json::Value) -> Option<String> {
    let keys: &[&str] = match tool_name {
        "Bash" => &["command"],
        "Read" | "Write" | "Edit" => &["path"],
        "Glob" | "Grep" => &["pattern"],
        "Computer" => &["action"],
        _ => &["path", "command"],
    };
    let value = keys
        .iter()
        .find_map(|k| args.get(*k).and_then(|v| v.as_str()))?;
    let mut shown = truncate_line(value, MAX_HEADER_ARG_CHARS);
    if tool_name == "Read" {
        let offset = args.get("offset").and_then(|v| v.as_u64());
        let limit = args.get("limit").and_then(|v| v.as_u64());
        if offset.is_some() || limit.is_some() {
            let start = offset.unwrap_or(1);
            match limit {
                Some(limit) => shown.push_str(&format!(" [{}..{}]", start, start + limit.saturating_sub(1))),
                None => shown.push_str(&format!(" [{}..]", start)),
            }
        }
    }
    if tool_name == "Computer" {
        if let (Some(x), Some(y)) = (args.get("x"), args.get("y")) {
            shown.push_str(&format!(" ({}, {})", x, y));
        }
    }
    Some(shown)
}

/// One-line result summary shown under a tool's output.
pub fn result_summary(outcome: &ToolOutcome) -> String {
    let line_count = outcome.output.lines().count();
    let first = truncate_line(&outcome.output, MAX_HEADER_ARG_CHARS);
    if outcome.is_error {
        first
    } else if line_count > 1 {
        format!("{} lines", line_count)
    } else {
        first
    }
}

impl UiWriter for ConsoleUiWriter {
    fn print(&self, message: &str) {
        print!("{}", message);
    }

    fn println(&self, message: &str) {
        println!("{}", message);
    }

    fn print_agent_response(&self, content: &str) {
        if content.is_empty() {
            return;
        }
        if self.markdown {
            print!("{}", render_markdown(content));
            *lock(&self.open_response_line) = false;
            return;
        }
        print!("{}", content);
        let _ = io::stdout().flush();
        *lock(&self.open_response_line) = !content.ends_with('\n');
    }

    fn finish_agent_response(&self) {
        self.close_response_line();
    }

    fn print_tool_header(&self, tool_name: &str, tool_args: Option<&serde_json::Value>) {
        self.close_response_line();
        println!();
        match tool_args.and_then(|args| primary_argument(tool_name, args)) {
            Some(arg) => println!("┌─\x1b[1;32m {}\x1b[0m\x1b[35m | {}\x1b[0m", tool_name, arg),
            None => println!("┌─\x1b[1;32m {}\x1b[0m", tool_name),
        }
    }

    fn print_tool_output_line(&self, line: &str) {
        println!("│ \x1b[2m{}\x1b[0m", line);
    }

    fn print_tool_result(&self, _tool_name: &str, outcome: &ToolOutcome) {
        if outcome.is_error {
            println!("└─ \x1b[31m✗ {}\x1b[0m", result_summary(outcome));
        } else {
            println!("└─ \x1b[32m✓\x1b[0m \x1b[2m{}\x1b[0m", result_summary(outcome));
        }
    }

    fn print_diff(&self, diff: &FileDiff) {
        print!("{}", render_diff(diff));
        let _ = io::stdout().flush();
    }

    fn print_status(&self, message: &str) {
        self.stop_thinking();
        self.close_response_line();
        println!("\x1b[33m» {}\x1b[0m", message);
    }

    fn start_thinking(&self) {
        let mut spinner = lock(&self.spinner);
        if spinner.is_none() {
            *spinner = Some(Self::thinking_spinner());
        }
    }

    fn stop_thinking(&self) {
        if let Some(pb) = lock(&self.spinner).take() {
            pb.finish_and_clear();
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}
