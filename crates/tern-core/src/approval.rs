//! Confirmation policy for side-effectful tools.
//!
//! The agent awaits an approver before running anything that changes files,
//! spawns processes or drives the desktop. Interactive front ends prompt the
//! operator; unattended runs plug in a fixed policy.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub tool_name: String,
    /// Human-readable description of what is about to happen.
    pub summary: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

#[async_trait]
pub trait ToolApprover: Send + Sync {
    async fn review(&self, request: &ApprovalRequest) -> ApprovalDecision;
}

/// Approves everything.
pub struct AutoApprove;

#[async_trait]
impl ToolApprover for AutoApprove {
    async fn review(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Approved
    }
}

/// Denies everything.
pub struct AutoDeny;

#[async_trait]
impl ToolApprover for AutoDeny {
    async fn review(&self, _request: &ApprovalRequest) -> ApprovalDecision {
        ApprovalDecision::Denied
    }
}

/// Describe a tool call in one line for a confirmation prompt.
pub fn summarize_call(tool_name: &str, input: &serde_json::Value) -> String {
    let field = |key: &str| input.get(key).and_then(|v| v.as_str()).unwrap_or("");
    match tool_name {
        "Bash" => format!("run `{}`", field("command")),
        "Write" => {
            let bytes = field("content").len();
            format!("write {} ({} bytes)", field("path"), bytes)
        }
        "Edit" => format!("edit {}", field("path")),
        "Computer" => {
            let action = field("action");
            match action {
                "type" | "clipboard_set" => format!("computer {}: {:?}", action, field("text")),
                "key" => format!("computer key {}", field("keys")),
                "focus_window" => format!("computer focus window {:?}", field("title")),
                _ => match (input.get("x"), input.get("y")) {
                    (Some(x), Some(y)) => format!("computer {} at ({}, {})", action, x, y),
                    _ => format!("computer {}", action),
                },
            }
        }
        other => format!("{} {}", other, input),
    }
}
