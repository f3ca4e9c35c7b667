//! Glob and Grep: pattern search over the working tree.
//!
//! Both walk with `walkdir` and prune version-control and dependency
//! directories before descending, so nothing under them is ever reported.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use regex::RegexBuilder;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::ui_writer::UiWriter;

use super::file_ops::looks_binary;
use super::{ToolContext, ToolOutcome};

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".jj",
    "node_modules",
    "bower_components",
    "target",
    "vendor",
    ".venv",
    "venv",
    "__pycache__",
    ".tox",
    ".mypy_cache",
    ".gradle",
];

/// Files larger than this are skipped by Grep.
const MAX_GREP_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Matched lines longer than this are shortened.
const MAX_GREP_LINE_CHARS: usize = 300;

pub fn is_excluded_dir_name(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(is_excluded_dir_name)
}

/// True when some component of `relative` names an excluded directory.
fn has_excluded_component(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(is_excluded_dir_name),
        _ => false,
    })
}

/// Resolve the optional `path` argument to a search root.
fn search_root<W: UiWriter>(input: &serde_json::Value, ctx: &ToolContext<'_, W>) -> Result<PathBuf, String> {
    let root = match input.get("path").and_then(|v| v.as_str()) {
        Some(p) if !p.trim().is_empty() => ctx.resolve_path(p),
        _ => ctx.working_dir.to_path_buf(),
    };
    if !root.exists() {
        return Err(format!("Path not found: {}", root.display()));
    }
    let relative = root.strip_prefix(ctx.working_dir).unwrap_or(&root);
    if has_excluded_component(relative) {
        return Err(format!(
            "'{}' is inside an excluded directory ({})",
            relative.display(),
            EXCLUDED_DIRS.join(", ")
        ));
    }
    Ok(root)
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// A compiled Glob pattern.
///
/// Patterns without a `/` match file names at any depth (`*.rs`). Patterns
/// with one match the path relative to the search root, and a leading `**/`
/// also matches at the root itself.
struct GlobMatcher {
    pattern: Pattern,
    root_level: Option<Pattern>,
    name_only: bool,
}

impl GlobMatcher {
    fn new(raw: &str) -> Result<Self, String> {
        let raw = raw.trim().trim_start_matches("./");
        let pattern = Pattern::new(raw).map_err(|e| format!("Invalid glob pattern '{}': {}", raw, e))?;
        let root_level = raw
            .strip_prefix("**/")
            .map(Pattern::new)
            .transpose()
            .map_err(|e| format!("Invalid glob pattern '{}': {}", raw, e))?;
        Ok(Self {
            pattern,
            root_level,
            name_only: !raw.contains('/'),
        })
    }

    fn matches(&self, relative: &Path) -> bool {
        let options = match_options();
        if self.name_only {
            return relative
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| self.pattern.matches_with(name, options));
        }
        let text = relative.to_string_lossy().replace('\\', "/");
        self.pattern.matches_with(&text, options)
            || self
                .root_level
                .as_ref()
                .is_some_and(|p| p.matches_with(&text, options))
    }
}

/// Execute the `Glob` tool.
pub async fn execute_glob<W: UiWriter>(input: &serde_json::Value, ctx: &ToolContext<'_, W>) -> ToolOutcome {
    let Some(raw_pattern) = input.get("pattern").and_then(|v| v.as_str()) else {
        return ToolOutcome::error("Missing 'pattern' argument");
    };
    let matcher = match GlobMatcher::new(raw_pattern) {
        Ok(m) => m,
        Err(e) => return ToolOutcome::error(e),
    };
    let root = match search_root(input, ctx) {
        Ok(root) => root,
        Err(e) => return ToolOutcome::error(e),
    };
    let cap = ctx.config.max_glob_results.max(1);
    debug!("Glob '{}' under {}", raw_pattern, root.display());

    let mut matches: Vec<String> = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let relative = e.path().strip_prefix(&root).unwrap_or(e.path());
            matcher.matches(relative)
        })
        .map(|e| ctx.display_path(e.path()))
        .collect();

    if matches.is_empty() {
        return ToolOutcome::success(format!("No files matched '{}'.", raw_pattern));
    }

    matches.sort();
    let total = matches.len();
    if total > cap {
        matches.truncate(cap);
        matches.push(format!("[... {} more files not shown; narrow the pattern ...]", total - cap));
    }
    ToolOutcome::success(matches.join("\n"))
}

/// Execute the `Grep` tool.
pub async fn execute_grep<W: UiWriter>(input: &serde_json::Value, ctx: &ToolContext<'_, W>) -> ToolOutcome {
    let Some(raw_pattern) = input.get("pattern").and_then(|v| v.as_str()) else {
        return ToolOutcome::error("Missing 'pattern' argument");
    };
    let case_insensitive = input
        .get("case_insensitive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let regex = match RegexBuilder::new(raw_pattern)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(r) => r,
        Err(e) => return ToolOutcome::error(format!("Invalid regex '{}': {}", raw_pattern, e)),
    };
    let include = match input.get("include").and_then(|v| v.as_str()) {
        Some(glob) => match GlobMatcher::new(glob) {
            Ok(m) => Some(m),
            Err(e) => return ToolOutcome::error(e),
        },
        None => None,
    };
    let root = match search_root(input, ctx) {
        Ok(root) => root,
        Err(e) => return ToolOutcome::error(e),
    };
    let cap = ctx.config.max_grep_matches.max(1);
    debug!("Grep '{}' under {}", raw_pattern, root.display());

    let mut files: Vec<PathBuf> = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.metadata().map(|m| m.len() <= MAX_GREP_FILE_BYTES).unwrap_or(false))
        .filter(|e| {
            include.as_ref().map_or(true, |m| {
                let relative = e.path().strip_prefix(&root).unwrap_or(e.path());
                m.matches(relative)
            })
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();

    let mut results = Vec::new();
    let mut total = 0usize;
    for file in &files {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let Ok(bytes) = tokio::fs::read(file).await else {
            continue;
        };
        if looks_binary(&bytes) {
            continue;
        }
        let text = String::from_utf8_lossy(&bytes);
        for (index, line) in text.lines().enumerate() {
            if regex.is_match(line) {
                total += 1;
                if results.len() < cap {
                    results.push(format!(
                        "{}:{}: {}",
                        ctx.display_path(file),
                        index + 1,
                        shorten(line.trim_end())
                    ));
                }
            }
        }
    }

    if results.is_empty() {
        return ToolOutcome::success(format!("No matches for '{}'.", raw_pattern));
    }
    if total > results.len() {
        results.push(format!(
            "[... {} more matches not shown; narrow the pattern or path ...]",
            total - results.len()
        ));
    }
    ToolOutcome::success(results.join("\n"))
}

fn shorten(line: &str) -> String {
    if line.chars().count() <= MAX_GREP_LINE_CHARS {
        return line.to_string();
    }
    let mut short: String = line.chars().take(MAX_GREP_LINE_CHARS).collect();
    short.push_str(" ...");
    short
}
