//! The fixed tool catalog the model may invoke.
//!
//! Tools are organized by category:
//! - `shell` - Bash command execution
//! - `file_ops` - Read, Write and Edit
//! - `search` - Glob and Grep
//! - `computer` - desktop automation, only offered when enabled
//!
//! Every tool reports failure through [`ToolOutcome::error`] instead of an
//! `Err`, so the model sees what went wrong and can adapt.

pub mod computer;
pub mod file_ops;
pub mod schema;
pub mod search;
pub mod shell;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tern_computer_control::ComputerController;
use tern_config::AgentConfig;
use tern_providers::ContentBlock;
use tokio_util::sync::CancellationToken;

use crate::diff::FileDiff;
use crate::ui_writer::UiWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Bash,
    Read,
    Write,
    Edit,
    Glob,
    Grep,
    Computer,
}

impl ToolName {
    pub const ALL: [ToolName; 7] = [
        ToolName::Bash,
        ToolName::Read,
        ToolName::Write,
        ToolName::Edit,
        ToolName::Glob,
        ToolName::Grep,
        ToolName::Computer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Bash => "Bash",
            ToolName::Read => "Read",
            ToolName::Write => "Write",
            ToolName::Edit => "Edit",
            ToolName::Glob => "Glob",
            ToolName::Grep => "Grep",
            ToolName::Computer => "Computer",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown tool '{}'", s))
    }
}

/// Uniform result of a tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub is_error: bool,
    pub output: String,
    /// File change made by Write or Edit
    pub diff: Option<FileDiff>,
    /// Extra content for the model, such as a screenshot
    pub attachment: Option<ContentBlock>,
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            is_error: false,
            output: output.into(),
            diff: None,
            attachment: None,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            is_error: true,
            output: output.into(),
            diff: None,
            attachment: None,
        }
    }

    pub fn with_diff(mut self, diff: FileDiff) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn with_attachment(mut self, block: ContentBlock) -> Self {
        self.attachment = Some(block);
        self
    }
}

/// Context passed to tool implementations.
///
/// The working directory is explicit here; tools never consult or change the
/// process-wide current directory.
pub struct ToolContext<'a, W: UiWriter> {
    pub working_dir: &'a Path,
    pub config: &'a AgentConfig,
    pub ui_writer: &'a W,
    pub controller: Option<&'a Arc<dyn ComputerController>>,
    pub cancel: &'a CancellationToken,
}

impl<'a, W: UiWriter> ToolContext<'a, W> {
    /// Resolve a tool-supplied path against the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve_path(self.working_dir, path)
    }

    /// Path as shown back to the model: relative when under the working directory.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(self.working_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Expand `~` and join relative paths onto `working_dir`.
pub fn resolve_path(working_dir: &Path, path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path.trim());
    let candidate = Path::new(expanded.as_ref());
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        working_dir.join(candidate)
    }
}

/// Whether a call may change files, spawn processes or drive the desktop.
pub fn is_side_effect(name: &str, input: &serde_json::Value) -> bool {
    match name.parse::<ToolName>() {
        Ok(ToolName::Bash) | Ok(ToolName::Write) | Ok(ToolName::Edit) => true,
        Ok(ToolName::Read) | Ok(ToolName::Glob) | Ok(ToolName::Grep) => false,
        Ok(ToolName::Computer) => {
            let action = input.get("action").and_then(|a| a.as_str()).unwrap_or("");
            !computer::is_read_only_action(action)
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_names_round_trip() {
        for name in ToolName::ALL {
            assert_eq!(name.as_str().parse::<ToolName>(), Ok(name));
        }
        assert!("bash".parse::<ToolName>().is_err());
        assert!("Delete".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_resolve_path() {
        let wd = Path::new("/work/project");
        assert_eq!(resolve_path(wd, "src/main.rs"), PathBuf::from("/work/project/src/main.rs"));
        assert_eq!(resolve_path(wd, "/etc/hosts"), PathBuf::from("/etc/hosts"));
        let home = resolve_path(wd, "~/notes.txt");
        assert!(home.is_absolute());
        assert!(home.ends_with("notes.txt"));
    }

    #[test]
    fn test_side_effect_classification() {
        assert!(is_side_effect("Bash", &json!({"command": "ls"})));
        assert!(is_side_effect("Write", &json!({})));
        assert!(is_side_effect("Edit", &json!({})));
        assert!(!is_side_effect("Read", &json!({})));
        assert!(!is_side_effect("Glob", &json!({})));
        assert!(!is_side_effect("Grep", &json!({})));
        assert!(!is_side_effect("Computer", &json!({"action": "screenshot"})));
        assert!(!is_side_effect("Computer", &json!({"action": "list_windows"})));
        assert!(is_side_effect("Computer", &json!({"action": "click"})));
        assert!(is_side_effect("Computer", &json!({"action": "clipboard_set"})));
    }
}
