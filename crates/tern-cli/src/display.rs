//! Display utilities for the tern CLI.
//!
//! Rendering helpers shared by the interactive prompt, the command handlers
//! and the console UI writer. Functions returning `String` do no I/O so they
//! can be tested directly.

use crossterm::style::{Attribute, Color, ResetColor, SetAttribute, SetForegroundColor};
use std::path::Path;
use termimad::MadSkin;

use tern_core::tools::search::is_excluded_dir_name;
use tern_core::{DiffLineKind, FileDiff};

/// Default depth for `/tree`.
pub const DEFAULT_TREE_DEPTH: usize = 3;

/// Entries listed per directory before the rest are summarised.
const MAX_TREE_ENTRIES: usize = 50;

/// Format a workspace path for display, replacing home directory with ~.
pub fn format_workspace_path(workspace_path: &Path) -> String {
    let path_str = workspace_path.display().to_string();
    dirs::home_dir()
        .and_then(|home| {
            path_str
                .strip_prefix(&home.display().to_string())
                .map(|s| format!("~{}", s))
        })
        .unwrap_or(path_str)
}

/// Print the workspace path in a consistent format.
pub fn print_workspace_path(workspace_path: &Path) {
    println!(
        "{}-> {}{}",
        SetForegroundColor(Color::DarkGrey),
        format_workspace_path(workspace_path),
        ResetColor
    );
}

pub fn print_error(message: &str) {
    println!("{}✗ {}{}", SetForegroundColor(Color::Red), message, ResetColor);
}

pub fn print_success(message: &str) {
    println!("{}✓ {}{}", SetForegroundColor(Color::Green), message, ResetColor);
}

pub fn print_dim(message: &str) {
    println!("{}{}{}", SetForegroundColor(Color::DarkGrey), message, ResetColor);
}

pub fn print_heading(title: &str) {
    println!(
        "{}{}{}{}{}",
        SetAttribute(Attribute::Bold),
        SetForegroundColor(Color::Magenta),
        title,
        ResetColor,
        SetAttribute(Attribute::Reset)
    );
}

/// Skin used for model output.
pub fn markdown_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.bold.set_fg(termimad::crossterm::style::Color::Green);
    skin.italic.set_fg(termimad::crossterm::style::Color::Cyan);
    skin.headers[0].set_fg(termimad::crossterm::style::Color::Magenta);
    skin.headers[1].set_fg(termimad::crossterm::style::Color::Magenta);
    skin.code_block.set_fg(termimad::crossterm::style::Color::Yellow);
    skin.inline_code.set_fg(termimad::crossterm::style::Color::Yellow);
    skin
}

/// Render markdown (headings, lists, code blocks) as styled terminal text.
pub fn render_markdown(text: &str) -> String {
    markdown_skin().term_text(text).to_string()
}

/// Render a file diff: a header, then `+`/`-` lines colored by kind.
pub fn render_diff(diff: &FileDiff) -> String {
    let mut out = String::new();
    let action = if diff.created { "created" } else { "modified" };
    out.push_str(&format!(
        "{}{}── {} ({}, {}){}\n",
        SetAttribute(Attribute::Bold),
        SetForegroundColor(Color::Cyan),
        diff.path,
        action,
        diff.summary(),
        ResetColor
    ));
    out.push_str(&format!("{}", SetAttribute(Attribute::Reset)));

    for line in &diff.lines {
        let (color, marker) = match line.kind {
            DiffLineKind::Added => (Color::Green, "+"),
            DiffLineKind::Removed => (Color::Red, "-"),
            DiffLineKind::Context => (Color::DarkGrey, " "),
            DiffLineKind::Separator => (Color::DarkGrey, "⋮"),
        };
        let text = line.text.trim_end_matches(['\n', '\r']);
        out.push_str(&format!(
            "{}{}{}{}\n",
            SetForegroundColor(color),
            marker,
            text,
            ResetColor
        ));
    }
    out
}

/// Prefix each line with its 1-based number, starting at `first_line`.
pub fn number_lines(content: &str, first_line: usize) -> String {
    let last = first_line + content.lines().count().saturating_sub(1);
    let width = last.to_string().len().max(3);
    content
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>width$} │ {}", first_line + i, line, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a directory tree with branch connectors, `depth` levels deep.
///
/// Version-control and dependency directories are listed but not expanded.
pub fn render_tree(root: &Path, depth: usize) -> std::io::Result<String> {
    let metadata = std::fs::metadata(root)?;
    if !metadata.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }

    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string());
    let mut out = format!("{}/\n", name);
    let mut counts = (0usize, 0usize);
    write_tree_level(root, "", depth, &mut out, &mut counts);
    out.push_str(&format!(
        "\n{} director{}, {} file{}",
        counts.0,
        if counts.0 == 1 { "y" } else { "ies" },
        counts.1,
        if counts.1 == 1 { "" } else { "s" }
    ));
    Ok(out)
}

fn write_tree_level(dir: &Path, prefix: &str, depth: usize, out: &mut String, counts: &mut (usize, usize)) {
    if depth == 0 {
        return;
    }
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };

    let mut entries: Vec<(String, bool)> = read_dir
        .filter_map(|e| e.ok())
        .map(|e| {
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (e.file_name().to_string_lossy().to_string(), is_dir)
        })
        .collect();
    // Directories first, then by name
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let hidden = entries.len().saturating_sub(MAX_TREE_ENTRIES);
    entries.truncate(MAX_TREE_ENTRIES);
    let count = entries.len();

    for (i, (name, is_dir)) in entries.into_iter().enumerate() {
        let last = i + 1 == count && hidden == 0;
        let connector = if last { "└── " } else { "├── " };
        if is_dir {
            counts.0 += 1;
            if is_excluded_dir_name(&name) {
                out.push_str(&format!("{}{}{}/ …\n", prefix, connector, name));
                continue;
            }
            out.push_str(&format!("{}{}{}/\n", prefix, connector, name));
            let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
            write_tree_level(&dir.join(&name), &child_prefix, depth - 1, out, counts);
        } else {
            counts.1 += 1;
            out.push_str(&format!("{}{}{}\n", prefix, connector, name));
        }
    }

    if hidden > 0 {
        out.push_str(&format!("{}└── … {} more\n", prefix, hidden));
    }
}

/// Shorten `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_line(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars && !text.contains('\n') {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut)
}
