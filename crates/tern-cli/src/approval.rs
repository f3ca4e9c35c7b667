//! Interactive confirmation for side-effectful tool calls.

use async_trait::async_trait;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use tern_core::{ApprovalDecision, ApprovalRequest, ToolApprover};

/// What the operator typed at the confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    /// Approve this and every later call in the session.
    Always,
}

/// Parse a confirmation answer. Anything unrecognised counts as no.
pub fn parse_answer(input: &str) -> Answer {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Answer::Yes,
        "a" | "always" => Answer::Always,
        _ => Answer::No,
    }
}

/// Asks on the terminal before each side effect.
pub struct ConsoleApprover {
    approve_all: AtomicBool,
}

impl ConsoleApprover {
    pub fn new() -> Self {
        Self {
            approve_all: AtomicBool::new(false),
        }
    }
}

impl Default for ConsoleApprover {
    fn default() -> Self {
        Self::new()
    }
}

fn read_answer(prompt: String) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

#[async_trait]
impl ToolApprover for ConsoleApprover {
    async fn review(&self, request: &ApprovalRequest) -> ApprovalDecision {
        if self.approve_all.load(Ordering::Relaxed) {
            return ApprovalDecision::Approved;
        }

        let prompt = format!(
            "{}? Allow {}: {}{} [y/N/a] ",
            SetForegroundColor(Color::Yellow),
            request.tool_name,
            request.summary,
            ResetColor
        );
        let line = match tokio::task::spawn_blocking(move || read_answer(prompt)).await {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                warn!("Could not read confirmation: {}", e);
                return ApprovalDecision::Denied;
            }
            Err(e) => {
                warn!("Confirmation prompt failed: {}", e);
                return ApprovalDecision::Denied;
            }
        };

        let answer = parse_answer(&line);
        debug!("{} confirmation: {:?}", request.tool_name, answer);
        match answer {
            Answer::Yes => ApprovalDecision::Approved,
            Answer::Always => {
                self.approve_all.store(true, Ordering::Relaxed);
                ApprovalDecision::Approved
            }
            Answer::No => ApprovalDecision::Denied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), Answer::Yes);
        assert_eq!(parse_answer(" YES "), Answer::Yes);
        assert_eq!(parse_answer("a"), Answer::Always);
        assert_eq!(parse_answer(""), Answer::No);
        assert_eq!(parse_answer("sure"), Answer::No);
    }

    #[tokio::test]
    async fn test_always_skips_prompt() {
        let approver = ConsoleApprover::new();
        approver.approve_all.store(true, Ordering::Relaxed);
        let request = ApprovalRequest {
            tool_name: "Bash".to_string(),
            summary: "run `ls`".to_string(),
            input: json!({"command": "ls"}),
        };
        assert_eq!(approver.review(&request).await, ApprovalDecision::Approved);
    }
}
