//! File reading, writing, and editing tools.

use std::path::Path;

use tracing::debug;

use crate::diff::FileDiff;
use crate::ui_writer::UiWriter;

use super::{ToolContext, ToolOutcome};

/// Reads larger than this are cut with a marker.
const MAX_READ_BYTES: usize = 256 * 1024;

/// Bytes inspected when deciding whether a file is binary.
const BINARY_PROBE_BYTES: usize = 8 * 1024;

fn str_arg<'v>(input: &'v serde_json::Value, key: &str) -> Option<&'v str> {
    input.get(key).and_then(|v| v.as_str())
}

pub(crate) fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_PROBE_BYTES)].contains(&0)
}

/// Execute the `Read` tool.
pub async fn execute_read<W: UiWriter>(input: &serde_json::Value, ctx: &ToolContext<'_, W>) -> ToolOutcome {
    let Some(path_str) = str_arg(input, "path") else {
        return ToolOutcome::error("Missing 'path' argument");
    };
    let path = ctx.resolve_path(path_str);
    debug!("Reading {}", path.display());

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ToolOutcome::error(format!("File not found: {}", path_str));
        }
        Err(_) if path.is_dir() => {
            return ToolOutcome::error(format!("'{}' is a directory; use Glob to list files", path_str));
        }
        Err(e) => return ToolOutcome::error(format!("Failed to read file '{}': {}", path_str, e)),
    };

    if looks_binary(&bytes) {
        return ToolOutcome::error(format!(
            "'{}' appears to be a binary file ({} bytes); not shown",
            path_str,
            bytes.len()
        ));
    }
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => return ToolOutcome::error(format!("'{}' is not valid UTF-8 text", path_str)),
    };

    let offset = input.get("offset").and_then(|v| v.as_u64()).map(|n| n as usize);
    let limit = input.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);

    if offset.is_none() && limit.is_none() {
        return ToolOutcome::success(cap_read(content));
    }

    match line_window(&content, offset.unwrap_or(1), limit) {
        Ok(window) => ToolOutcome::success(cap_read(window)),
        Err(message) => ToolOutcome::error(message),
    }
}

/// Lines `[offset, offset + limit)` with 1-based `offset`, line endings kept.
fn line_window(content: &str, offset: usize, limit: Option<usize>) -> Result<String, String> {
    let offset = offset.max(1);
    let total = content.lines().count();
    if offset > total.max(1) {
        return Err(format!(
            "offset {} is past the end of the file ({} lines)",
            offset, total
        ));
    }
    let take = limit.unwrap_or(usize::MAX);
    Ok(content
        .split_inclusive('\n')
        .skip(offset - 1)
        .take(take)
        .collect())
}

fn cap_read(mut content: String) -> String {
    if content.len() <= MAX_READ_BYTES {
        return content;
    }
    let total = content.len();
    let mut cut = MAX_READ_BYTES;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content.truncate(cut);
    content.push_str(&format!(
        "\n[... file truncated at {} of {} bytes; use offset and limit to read the rest ...]",
        cut, total
    ));
    content
}

/// Execute the `Write` tool.
pub async fn execute_write<W: UiWriter>(input: &serde_json::Value, ctx: &ToolContext<'_, W>) -> ToolOutcome {
    let (Some(path_str), Some(content)) = (str_arg(input, "path"), str_arg(input, "content")) else {
        return ToolOutcome::error("Missing 'path' or 'content' argument");
    };
    let path = ctx.resolve_path(path_str);
    if path.is_dir() {
        return ToolOutcome::error(format!("'{}' is a directory", path_str));
    }

    let previous = read_existing_text(&path).await;

    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return ToolOutcome::error(format!(
                "Failed to create directory '{}': {}",
                parent.display(),
                e
            ));
        }
    }

    if let Err(e) = tokio::fs::write(&path, content).await {
        return ToolOutcome::error(format!("Failed to write to file '{}': {}", path_str, e));
    }
    debug!("Wrote {} bytes to {}", content.len(), path.display());

    let display = ctx.display_path(&path);
    let diff = FileDiff::compute(&display, previous.as_deref(), content);
    let verb = if diff.created { "Created" } else { "Wrote" };
    ToolOutcome::success(format!(
        "{} {} ({} bytes, {} lines)",
        verb,
        display,
        content.len(),
        content.lines().count()
    ))
    .with_diff(diff)
}

async fn read_existing_text(path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(path).await.ok()?;
    if looks_binary(&bytes) {
        return Some(String::new());
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Execute the `Edit` tool.
///
/// Replaces exactly one occurrence of `old_string`. When the text is absent or
/// occurs more than once the file is left untouched.
pub async fn execute_edit<W: UiWriter>(input: &serde_json::Value, ctx: &ToolContext<'_, W>) -> ToolOutcome {
    let (Some(path_str), Some(old_string), Some(new_string)) = (
        str_arg(input, "path"),
        str_arg(input, "old_string"),
        str_arg(input, "new_string"),
    ) else {
        return ToolOutcome::error("Missing 'path', 'old_string' or 'new_string' argument");
    };
    if old_string.is_empty() {
        return ToolOutcome::error("'old_string' must not be empty; use Write to create or overwrite a file");
    }

    let path = ctx.resolve_path(path_str);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ToolOutcome::error(format!("File not found: {}", path_str));
        }
        Err(e) => return ToolOutcome::error(format!("Failed to read file '{}': {}", path_str, e)),
    };

    let updated = match replace_unique(&content, old_string, new_string) {
        Ok(updated) => updated,
        Err(message) => return ToolOutcome::error(format!("{} in {}", message, path_str)),
    };

    if let Err(e) = tokio::fs::write(&path, &updated).await {
        return ToolOutcome::error(format!("Failed to write to file '{}': {}", path_str, e));
    }

    let display = ctx.display_path(&path);
    let diff = FileDiff::compute(&display, Some(&content), &updated);
    ToolOutcome::success(format!("Edited {} ({})", display, diff.summary())).with_diff(diff)
}

/// Replace the single occurrence of `old` in `content`.
pub fn replace_unique(content: &str, old: &str, new: &str) -> Result<String, String> {
    let Some(start) = content.find(old) else {
        return Err("text not found".to_string());
    };
    let occurrences = count_occurrences(content, old);
    if occurrences > 1 {
        return Err(format!(
            "text is not unique ({} occurrences); include more surrounding context so it matches exactly once",
            occurrences
        ));
    }
    let mut updated = String::with_capacity(content.len() - old.len() + new.len());
    updated.push_str(&content[..start]);
    updated.push_str(new);
    updated.push_str(&content[start + old.len()..]);
    Ok(updated)
}

/// Occurrences of a non-empty `needle`, overlapping ones included.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    let step = needle.chars().next().map_or(1, char::len_utf8);
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        count += 1;
        from += pos + step;
        if from > haystack.len() {
            break;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_writer::NullUiWriter;
    use serde_json::json;
    use tern_config::AgentConfig;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        dir: tempfile::TempDir,
        config: AgentConfig,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                config: AgentConfig::default(),
                cancel: CancellationToken::new(),
            }
        }

        fn ctx(&self) -> ToolContext<'_, NullUiWriter> {
            ToolContext {
                working_dir: self.dir.path(),
                config: &self.config,
                ui_writer: &NullUiWriter,
                controller: None,
                cancel: &self.cancel,
            }
        }
    }

    #[tokio::test]
    async fn test_write_then_read_exact_content() {
        let fx = Fixture::new();
        let outcome = execute_write(&json!({"path": "notes.txt", "content": "hello"}), &fx.ctx()).await;
        assert!(!outcome.is_error, "{}", outcome.output);
        assert!(outcome.diff.as_ref().unwrap().created);

        let read = execute_read(&json!({"path": "notes.txt"}), &fx.ctx()).await;
        assert!(!read.is_error);
        assert_eq!(read.output, "hello");
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let fx = Fixture::new();
        let input = json!({"path": "a/b/c.txt", "content": "same\n"});
        let first = execute_write(&input, &fx.ctx()).await;
        let second = execute_write(&input, &fx.ctx()).await;
        assert!(!first.is_error && !second.is_error);
        assert!(second.diff.as_ref().unwrap().is_empty());
        assert_eq!(std::fs::read(fx.dir.path().join("a/b/c.txt")).unwrap(), b"same\n");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_tool_error() {
        let fx = Fixture::new();
        let outcome = execute_read(&json!({"path": "nope.txt"}), &fx.ctx()).await;
        assert!(outcome.is_error);
        assert_eq!(outcome.output, "File not found: nope.txt");
    }

    #[tokio::test]
    async fn test_read_line_window() {
        let fx = Fixture::new();
        std::fs::write(fx.dir.path().join("f.txt"), "one\ntwo\nthree\nfour\n").unwrap();
        let outcome = execute_read(&json!({"path": "f.txt", "offset": 2, "limit": 2}), &fx.ctx()).await;
        assert_eq!(outcome.output, "two\nthree\n");

        let tail = execute_read(&json!({"path": "f.txt", "offset": 4}), &fx.ctx()).await;
        assert_eq!(tail.output, "four\n");

        let past = execute_read(&json!({"path": "f.txt", "offset": 9}), &fx.ctx()).await;
        assert!(past.is_error);
    }

    #[tokio::test]
    async fn test_read_rejects_binary_and_directories() {
        let fx = Fixture::new();
        std::fs::write(fx.dir.path().join("blob.bin"), [0u8, 1, 2, 3]).unwrap();
        std::fs::create_dir(fx.dir.path().join("sub")).unwrap();

        let binary = execute_read(&json!({"path": "blob.bin"}), &fx.ctx()).await;
        assert!(binary.is_error);
        assert!(binary.output.contains("binary"));

        let dir = execute_read(&json!({"path": "sub"}), &fx.ctx()).await;
        assert!(dir.is_error);
    }

    #[tokio::test]
    async fn test_read_caps_large_files() {
        let fx = Fixture::new();
        std::fs::write(fx.dir.path().join("big.txt"), "x".repeat(MAX_READ_BYTES + 10)).unwrap();
        let outcome = execute_read(&json!({"path": "big.txt"}), &fx.ctx()).await;
        assert!(!outcome.is_error);
        assert!(outcome.output.contains("file truncated"));
    }

    #[tokio::test]
    async fn test_edit_replaces_unique_match_only() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("src.rs");
        std::fs::write(&path, "fn main() {\n    println!(\"hi\");\n}\n").unwrap();

        let outcome = execute_edit(
            &json!({"path": "src.rs", "old_string": "\"hi\"", "new_string": "\"bye\""}),
            &fx.ctx(),
        )
        .await;
        assert!(!outcome.is_error, "{}", outcome.output);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "fn main() {\n    println!(\"bye\");\n}\n"
        );
        assert_eq!(outcome.diff.unwrap().summary(), "+1 -1");
    }

    #[tokio::test]
    async fn test_edit_fails_closed_when_absent() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("a.txt");
        std::fs::write(&path, "alpha beta\n").unwrap();
        let before = std::fs::read(&path).unwrap();

        let outcome = execute_edit(
            &json!({"path": "a.txt", "old_string": "gamma", "new_string": "delta"}),
            &fx.ctx(),
        )
        .await;
        assert!(outcome.is_error);
        assert!(outcome.output.contains("text not found"));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_edit_fails_closed_when_ambiguous() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("a.txt");
        std::fs::write(&path, "x = 1\nx = 1\n").unwrap();
        let before = std::fs::read(&path).unwrap();

        let outcome = execute_edit(
            &json!({"path": "a.txt", "old_string": "x = 1", "new_string": "x = 2"}),
            &fx.ctx(),
        )
        .await;
        assert!(outcome.is_error);
        assert!(outcome.output.contains("2 occurrences"));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_edit_rejects_empty_target() {
        let fx = Fixture::new();
        std::fs::write(fx.dir.path().join("a.txt"), "abc").unwrap();
        let outcome = execute_edit(
            &json!({"path": "a.txt", "old_string": "", "new_string": "x"}),
            &fx.ctx(),
        )
        .await;
        assert!(outcome.is_error);
        assert_eq!(std::fs::read_to_string(fx.dir.path().join("a.txt")).unwrap(), "abc");
    }

    #[test]
    fn test_replace_unique_keeps_other_bytes() {
        assert_eq!(replace_unique("a-b-c", "-b-", "+").unwrap(), "a+c");
        assert_eq!(replace_unique("aaa", "aa", "b").unwrap_err(), "text is not unique (2 occurrences); include more surrounding context so it matches exactly once");
    }
}
