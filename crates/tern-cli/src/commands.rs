//! Interactive command handlers for the tern CLI.
//!
//! Handles `/` commands in interactive mode. Most are thin wrappers that run
//! one tool directly, without going through the model.

use anyhow::Result;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use serde_json::json;
use std::path::Path;
use tracing::debug;

use tern_computer_control::{CaptureTarget, KeyChord, MouseButton, ScrollDirection};
use tern_core::tools::resolve_path;
use tern_core::ui_writer::UiWriter;
use tern_core::{Agent, FileDiff, ToolOutcome};
use tern_providers::{ContentBlock, MessageRole};

use crate::display::{
    number_lines, print_dim, print_error, print_heading, print_success, render_diff, render_tree, truncate_line,
    DEFAULT_TREE_DEPTH,
};
use crate::task_execution::execute_tool_interruptible;

/// Turns shown by `/history` without an argument.
const DEFAULT_HISTORY_TURNS: usize = 10;

/// What the read loop does after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Continue,
    /// Leave the read loop.
    Exit,
    /// Send this to the agent as if the operator had typed it.
    Forward {
        text: String,
        attachments: Vec<ContentBlock>,
    },
}

pub struct CommandSpec {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "/help", usage: "/help", description: "Show this list" },
    CommandSpec { name: "/read", usage: "/read <path> [start] [end]", description: "Show a file with line numbers" },
    CommandSpec { name: "/edit", usage: "/edit <path>", description: "Change a file: describe it for the assistant, replace or append text" },
    CommandSpec { name: "/write", usage: "/write <path>", description: "Write a file from typed content (end with a lone '.')" },
    CommandSpec { name: "/search", usage: "/search <pattern> [path]", description: "Search file contents with a regex" },
    CommandSpec { name: "/tree", usage: "/tree [path] [depth]", description: "Show a directory tree" },
    CommandSpec { name: "/run", usage: "/run <command>", description: "Run a shell command" },
    CommandSpec { name: "/git", usage: "/git <args>", description: "Run git" },
    CommandSpec { name: "/screen", usage: "/screen [question]", description: "Capture the screen; with a question, ask the assistant about it" },
    CommandSpec { name: "/click", usage: "/click [x y] [left|right|middle] [double]", description: "Click the pointer" },
    CommandSpec { name: "/type", usage: "/type <text>", description: "Type text with the keyboard" },
    CommandSpec { name: "/key", usage: "/key <chord>", description: "Press a key chord such as ctrl+shift+t" },
    CommandSpec { name: "/move", usage: "/move <x> <y>", description: "Move the pointer" },
    CommandSpec { name: "/scroll", usage: "/scroll <up|down|left|right> [amount]", description: "Scroll" },
    CommandSpec { name: "/windows", usage: "/windows [focus <title>]", description: "List windows or focus one" },
    CommandSpec { name: "/clipboard", usage: "/clipboard [set <text>]", description: "Show or set the clipboard" },
    CommandSpec { name: "/clear", usage: "/clear", description: "Clear the conversation and the screen" },
    CommandSpec { name: "/config", usage: "/config [key [value]]", description: "Show, get or set configuration" },
    CommandSpec { name: "/model", usage: "/model [name]", description: "Show or switch the model" },
    CommandSpec { name: "/history", usage: "/history [n]", description: "Show the last n turns" },
    CommandSpec { name: "/context", usage: "/context", description: "Show project, automation and usage information" },
    CommandSpec { name: "/about", usage: "/about", description: "Version and backend information" },
    CommandSpec { name: "/exit", usage: "/exit, /quit", description: "Leave tern" },
];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Read { path: String, start: Option<usize>, end: Option<usize> },
    Edit { path: String },
    Write { path: String },
    Search { pattern: String, path: Option<String> },
    Tree { path: Option<String>, depth: usize },
    Run { command: String },
    Git { args: String },
    Screen { question: Option<String> },
    Click { at: Option<(i64, i64)>, button: String, double: bool },
    Type { text: String },
    Key { chord: String },
    Move { x: i64, y: i64 },
    Scroll { direction: String, amount: Option<u64> },
    Windows { focus: Option<String> },
    Clipboard { set: Option<String> },
    Clear,
    Config { key: Option<String>, value: Option<String> },
    Model { name: Option<String> },
    History { count: usize },
    Context,
    About,
    Exit,
}

fn usage(name: &str) -> String {
    let spec = COMMANDS
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.usage)
        .unwrap_or(name);
    format!("Usage: {}", spec)
}

/// Split on whitespace, keeping quoted runs together.
pub fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut has_token = false;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                has_token = true;
            }
            None if c.is_whitespace() => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            None => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("'{}' is not a number. {}", value, usage(name)))
}

impl Command {
    /// Parse a line starting with `/`.
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let name = name.to_lowercase();
        let args = split_args(rest);
        let rest_opt = (!rest.is_empty()).then(|| rest.to_string());

        let command = match name.as_str() {
            "/help" | "/?" => Command::Help,
            "/read" => {
                let path = args.first().ok_or_else(|| usage("/read"))?.clone();
                let start = args.get(1).map(|s| parse_number("/read", s)).transpose()?;
                let end = args.get(2).map(|s| parse_number("/read", s)).transpose()?;
                if let (Some(start), Some(end)) = (start, end) {
                    if end < start {
                        return Err(format!("End line {} is before start line {}", end, start));
                    }
                }
                Command::Read { path, start, end }
            }
            "/edit" => Command::Edit {
                path: args.first().ok_or_else(|| usage("/edit"))?.clone(),
            },
            "/write" => Command::Write {
                path: args.first().ok_or_else(|| usage("/write"))?.clone(),
            },
            "/search" => Command::Search {
                pattern: args.first().ok_or_else(|| usage("/search"))?.clone(),
                path: args.get(1).cloned(),
            },
            "/tree" => match args.as_slice() {
                [] => Command::Tree { path: None, depth: DEFAULT_TREE_DEPTH },
                [single] => match single.parse::<usize>() {
                    Ok(depth) => Command::Tree { path: None, depth },
                    Err(_) => Command::Tree { path: Some(single.clone()), depth: DEFAULT_TREE_DEPTH },
                },
                [path, depth, ..] => Command::Tree {
                    path: Some(path.clone()),
                    depth: parse_number("/tree", depth)?,
                },
            },
            "/run" => Command::Run {
                command: rest_opt.ok_or_else(|| usage("/run"))?,
            },
            "/git" => Command::Git {
                args: rest_opt.unwrap_or_else(|| "status".to_string()),
            },
            "/screen" => Command::Screen { question: rest_opt },
            "/click" => parse_click(&args)?,
            "/type" => Command::Type {
                text: rest_opt.ok_or_else(|| usage("/type"))?,
            },
            "/key" => {
                let chord = args.first().ok_or_else(|| usage("/key"))?;
                chord.parse::<KeyChord>().map_err(|e| e.to_string())?;
                Command::Key { chord: chord.clone() }
            }
            "/move" => match args.as_slice() {
                [x, y] => Command::Move {
                    x: parse_number("/move", x)?,
                    y: parse_number("/move", y)?,
                },
                _ => return Err(usage("/move")),
            },
            "/scroll" => {
                let direction = args.first().ok_or_else(|| usage("/scroll"))?;
                direction.parse::<ScrollDirection>().map_err(|e| e.to_string())?;
                let amount = args.get(1).map(|s| parse_number::<u64>("/scroll", s)).transpose()?;
                if amount == Some(0) {
                    return Err("Scroll amount must be at least 1".to_string());
                }
                Command::Scroll {
                    direction: direction.to_lowercase(),
                    amount,
                }
            }
            "/windows" => match args.first().map(|s| s.as_str()) {
                None => Command::Windows { focus: None },
                Some("focus") => {
                    let title = rest.strip_prefix("focus").unwrap_or("").trim();
                    if title.is_empty() {
                        return Err(usage("/windows"));
                    }
                    Command::Windows {
                        focus: Some(title.trim_matches('"').to_string()),
                    }
                }
                Some(_) => return Err(usage("/windows")),
            },
            "/clipboard" => match args.first().map(|s| s.as_str()) {
                None => Command::Clipboard { set: None },
                Some("set") => Command::Clipboard {
                    set: Some(rest.strip_prefix("set").unwrap_or("").trim().to_string()),
                },
                Some(_) => return Err(usage("/clipboard")),
            },
            "/clear" => Command::Clear,
            "/config" => {
                let key = args.first().cloned();
                let value = key.as_ref().and_then(|k| {
                    let value = rest.strip_prefix(k.as_str()).unwrap_or("").trim();
                    (!value.is_empty()).then(|| value.trim_matches('"').to_string())
                });
                Command::Config { key, value }
            }
            "/model" => Command::Model { name: rest_opt },
            "/history" => Command::History {
                count: match args.first() {
                    Some(n) => parse_number("/history", n)?,
                    None => DEFAULT_HISTORY_TURNS,
                },
            },
            "/context" => Command::Context,
            "/about" => Command::About,
            "/exit" | "/quit" => Command::Exit,
            other => {
                return Err(format!(
                    "Unknown command '{}'. Type /help to see available commands.",
                    other
                ))
            }
        };
        Ok(command)
    }
}

fn parse_click(args: &[String]) -> Result<Command, String> {
    let mut rest = args;
    let mut at = None;
    if let [x, y, tail @ ..] = args {
        if let (Ok(x), Ok(y)) = (x.parse::<i64>(), y.parse::<i64>()) {
            at = Some((x, y));
            rest = tail;
        }
    }

    let mut button = MouseButton::Left;
    let mut double = false;
    for arg in rest {
        if arg.eq_ignore_ascii_case("double") {
            double = true;
        } else {
            button = arg
                .parse::<MouseButton>()
                .map_err(|e| format!("{}. {}", e, usage("/click")))?;
        }
    }
    Ok(Command::Click {
        at,
        button: format!("{:?}", button).to_lowercase(),
        double,
    })
}

/// Source of follow-up operator input for commands that ask questions.
pub trait Prompter {
    /// One line, or `None` when the operator cancelled (Ctrl-C / Ctrl-D).
    fn read_line(&mut self, prompt: &str) -> Option<String>;

    fn confirm(&mut self, question: &str) -> bool {
        self.read_line(&format!("{} [y/N] ", question))
            .map(|answer| matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
            .unwrap_or(false)
    }
}

impl<H: rustyline::Helper> Prompter for rustyline::Editor<H, rustyline::history::DefaultHistory> {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        self.readline(prompt).ok()
    }
}

/// Read lines until one containing only `.`. `None` if input was cancelled.
pub fn read_block<P: Prompter>(prompter: &mut P, intro: &str) -> Option<String> {
    print_dim(intro);
    let mut lines = Vec::new();
    loop {
        let line = prompter.read_line("| ")?;
        if line.trim_end() == "." {
            break;
        }
        lines.push(line);
    }
    let mut block = lines.join("\n");
    if !block.is_empty() {
        block.push('\n');
    }
    Some(block)
}

fn print_outcome(outcome: &ToolOutcome) {
    if outcome.is_error {
        print_error(&outcome.output);
    } else {
        println!("{}", outcome.output);
    }
}

/// Run a command. Errors are reported by the caller; the session continues.
pub async fn handle_command<W: UiWriter, P: Prompter>(
    command: Command,
    agent: &mut Agent<W>,
    prompter: &mut P,
    config_path: &Path,
) -> Result<CommandOutcome> {
    debug!("Command: {:?}", command);
    match command {
        Command::Help => print_help(),
        Command::Read { path, start, end } => {
            let first = start.unwrap_or(1);
            let mut input = json!({ "path": path });
            if start.is_some() || end.is_some() {
                input["offset"] = json!(first);
            }
            if let Some(end) = end {
                input["limit"] = json!(end + 1 - first);
            }
            let outcome = agent.execute_tool("Read", &input, &Default::default()).await;
            if outcome.is_error {
                print_error(&outcome.output);
            } else if outcome.output.is_empty() {
                print_dim("(empty file)");
            } else {
                println!("{}", number_lines(&outcome.output, first));
            }
        }
        Command::Edit { path } => return edit_file(agent, prompter, &path).await,
        Command::Write { path } => write_file(agent, prompter, &path).await,
        Command::Search { pattern, path } => {
            let mut input = json!({ "pattern": pattern });
            if let Some(path) = path {
                input["path"] = json!(path);
            }
            print_outcome(&agent.execute_tool("Grep", &input, &Default::default()).await);
        }
        Command::Tree { path, depth } => {
            let root = resolve_path(agent.working_dir(), path.as_deref().unwrap_or("."));
            println!("{}", render_tree(&root, depth)?);
        }
        Command::Run { command } => run_shell(agent, command).await,
        Command::Git { args } => run_shell(agent, format!("git {}", args)).await,
        Command::Screen { question } => return capture_screen(agent, question).await,
        Command::Click { at, button, double } => {
            let mut input = json!({ "action": "click", "button": button, "double": double });
            if let Some((x, y)) = at {
                input["x"] = json!(x);
                input["y"] = json!(y);
            }
            computer(agent, input).await;
        }
        Command::Type { text } => computer(agent, json!({ "action": "type", "text": text })).await,
        Command::Key { chord } => computer(agent, json!({ "action": "key", "keys": chord })).await,
        Command::Move { x, y } => computer(agent, json!({ "action": "move", "x": x, "y": y })).await,
        Command::Scroll { direction, amount } => {
            let mut input = json!({ "action": "scroll", "direction": direction });
            if let Some(amount) = amount {
                input["amount"] = json!(amount);
            }
            computer(agent, input).await;
        }
        Command::Windows { focus: None } => computer(agent, json!({ "action": "list_windows" })).await,
        Command::Windows { focus: Some(title) } => {
            computer(agent, json!({ "action": "focus_window", "title": title })).await
        }
        Command::Clipboard { set: None } => computer(agent, json!({ "action": "clipboard_get" })).await,
        Command::Clipboard { set: Some(text) } => {
            computer(agent, json!({ "action": "clipboard_set", "text": text })).await
        }
        Command::Clear => {
            agent.clear_history()?;
            let _ = crossterm::execute!(
                std::io::stdout(),
                crossterm::terminal::Clear(crossterm::terminal::ClearType::All),
                crossterm::cursor::MoveTo(0, 0)
            );
            print_success("Conversation cleared");
        }
        Command::Config { key, value } => configure(agent, key, value, config_path)?,
        Command::Model { name: None } => {
            println!("{} | {}", agent.provider_name(), agent.model());
        }
        Command::Model { name: Some(name) } => {
            agent.set_model(&name)?;
            print_success(&format!("Model set to {}", agent.model()));
        }
        Command::History { count } => print_history(agent, count),
        Command::Context => print_context(agent),
        Command::About => print_about(agent),
        Command::Exit => return Ok(CommandOutcome::Exit),
    }
    Ok(CommandOutcome::Continue)
}

fn print_help() {
    println!();
    print_heading("Commands:");
    let width = COMMANDS.iter().map(|c| c.usage.len()).max().unwrap_or(0);
    for spec in COMMANDS {
        println!(
            "  {}{:width$}{}  {}",
            SetForegroundColor(Color::Cyan),
            spec.usage,
            ResetColor,
            spec.description,
            width = width
        );
    }
    println!();
    print_dim("Anything else is sent to the assistant. End a line with \\ to continue it.");
    println!();
}

async fn run_shell<W: UiWriter>(agent: &Agent<W>, command: String) {
    let input = json!({ "command": command });
    let ui = agent.ui_writer();
    ui.print_tool_header("Bash", Some(&input));
    let outcome = execute_tool_interruptible(agent, "Bash", &input).await;
    ui.print_tool_result("Bash", &outcome);
}

async fn computer<W: UiWriter>(agent: &Agent<W>, input: serde_json::Value) {
    print_outcome(&agent.execute_tool("Computer", &input, &Default::default()).await);
}

async fn capture_screen<W: UiWriter>(agent: &Agent<W>, question: Option<String>) -> Result<CommandOutcome> {
    let Some(controller) = agent.controller() else {
        print_error("Computer control is disabled; enable it with /config computer_control.enabled true");
        return Ok(CommandOutcome::Continue);
    };
    let shot = match controller.take_screenshot(CaptureTarget::FullScreen).await {
        Ok(shot) => shot,
        Err(e) => {
            print_error(&format!("Screen capture failed: {}", e));
            return Ok(CommandOutcome::Continue);
        }
    };
    print_success(&format!(
        "Captured {}x{} screenshot ({})",
        shot.width,
        shot.height,
        shot.path.display()
    ));

    Ok(match question {
        Some(text) => CommandOutcome::Forward {
            text,
            attachments: vec![ContentBlock::image(&shot.media_type, shot.base64)],
        },
        None => CommandOutcome::Continue,
    })
}

async fn edit_file<W: UiWriter, P: Prompter>(agent: &Agent<W>, prompter: &mut P, path: &str) -> Result<CommandOutcome> {
    let full_path = resolve_path(agent.working_dir(), path);
    if !full_path.is_file() {
        print_error(&format!("File not found: {}", path));
        return Ok(CommandOutcome::Continue);
    }

    println!("How do you want to change {}?", path);
    println!("  [1] Describe the change for the assistant");
    println!("  [2] Replace text");
    println!("  [3] Append text");
    println!("  [4] Cancel");
    let choice = prompter.read_line("Choice (1-4): ").unwrap_or_default();

    match choice.trim() {
        "1" | "describe" => {
            let Some(description) = prompter.read_line("Describe the change: ") else {
                return Ok(CommandOutcome::Continue);
            };
            let description = description.trim();
            if description.is_empty() {
                print_dim("Nothing to do.");
                return Ok(CommandOutcome::Continue);
            }
            Ok(CommandOutcome::Forward {
                text: format!("Edit the file {}: {}", path, description),
                attachments: Vec::new(),
            })
        }
        "2" | "replace" => {
            let Some(old) = read_block(prompter, "Text to replace (end with a lone '.'):") else {
                return Ok(CommandOutcome::Continue);
            };
            let Some(new) = read_block(prompter, "Replacement (end with a lone '.'):") else {
                return Ok(CommandOutcome::Continue);
            };
            // Single-line answers should not gain a trailing newline
            let (old, new) = if old.lines().count() <= 1 && new.lines().count() <= 1 {
                (old.trim_end_matches('\n').to_string(), new.trim_end_matches('\n').to_string())
            } else {
                (old, new)
            };
            let input = json!({ "path": path, "old_string": old, "new_string": new });
            let outcome = agent.execute_tool("Edit", &input, &Default::default()).await;
            report_file_change(&outcome);
            Ok(CommandOutcome::Continue)
        }
        "3" | "append" => {
            let Some(addition) = read_block(prompter, "Text to append (end with a lone '.'):") else {
                return Ok(CommandOutcome::Continue);
            };
            let existing = std::fs::read_to_string(&full_path)?;
            let mut updated = existing.clone();
            if !updated.is_empty() && !updated.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(&addition);
            confirm_and_write(agent, prompter, path, Some(&existing), updated).await;
            Ok(CommandOutcome::Continue)
        }
        _ => {
            print_dim("Cancelled.");
            Ok(CommandOutcome::Continue)
        }
    }
}

async fn write_file<W: UiWriter, P: Prompter>(agent: &Agent<W>, prompter: &mut P, path: &str) {
    let full_path = resolve_path(agent.working_dir(), path);
    if full_path.is_dir() {
        print_error(&format!("{} is a directory", path));
        return;
    }
    let Some(content) = read_block(prompter, "Enter the content; end with a line containing only '.':") else {
        print_dim("Cancelled.");
        return;
    };
    let existing = std::fs::read_to_string(&full_path).ok();
    confirm_and_write(agent, prompter, path, existing.as_deref(), content).await;
}

async fn confirm_and_write<W: UiWriter, P: Prompter>(
    agent: &Agent<W>,
    prompter: &mut P,
    path: &str,
    existing: Option<&str>,
    content: String,
) {
    let preview = FileDiff::compute(path, existing, &content);
    if preview.is_empty() && existing.is_some() {
        print_dim("No changes.");
        return;
    }
    print!("{}", render_diff(&preview));
    if !prompter.confirm(&format!("Write {}?", path)) {
        print_dim("Cancelled.");
        return;
    }
    let outcome = agent
        .execute_tool("Write", &json!({ "path": path, "content": content }), &Default::default())
        .await;
    report_file_change(&outcome);
}

fn report_file_change(outcome: &ToolOutcome) {
    if outcome.is_error {
        print_error(&outcome.output);
        return;
    }
    if let Some(diff) = &outcome.diff {
        print!("{}", render_diff(diff));
    }
    print_success(&outcome.output);
}

fn configure<W: UiWriter>(
    agent: &mut Agent<W>,
    key: Option<String>,
    value: Option<String>,
    config_path: &Path,
) -> Result<()> {
    match (key, value) {
        (None, _) => {
            let mut shown = agent.config().clone();
            if shown.provider.api_key.is_some() {
                shown.provider.api_key = Some("********".to_string());
            }
            print_dim(&format!("# {}", config_path.display()));
            print!("{}", shown.to_toml()?);
        }
        (Some(key), None) => {
            let value = if key == "provider.api_key" {
                "********".to_string()
            } else {
                agent.config().get_value(&key)?
            };
            println!("{} = {}", key, value);
        }
        (Some(key), Some(value)) => {
            agent.set_config_value(&key, &value)?;
            agent.config().save(config_path)?;
            print_success(&format!("{} = {} (saved to {})", key, agent.config().get_value(&key)?, config_path.display()));
        }
    }
    Ok(())
}

/// One-line rendering of a stored turn.
pub fn describe_turn(role: &MessageRole, content: &[ContentBlock]) -> String {
    let label = match role {
        MessageRole::User => "you",
        MessageRole::Assistant => "tern",
    };
    let parts: Vec<String> = content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => truncate_line(text, 100),
            ContentBlock::ToolUse { name, .. } => format!("[{} call]", name),
            ContentBlock::ToolResult { is_error: true, .. } => "[tool error]".to_string(),
            ContentBlock::ToolResult { .. } => "[tool result]".to_string(),
            ContentBlock::Image { .. } => "[image]".to_string(),
        })
        .collect();
    format!("{}: {}", label, parts.join(" "))
}

fn print_history<W: UiWriter>(agent: &Agent<W>, count: usize) {
    let turns = agent.history_tail(count);
    if turns.is_empty() {
        print_dim("No conversation yet.");
        return;
    }
    for message in turns {
        println!("{}", describe_turn(&message.role, &message.content));
    }
}

fn print_context<W: UiWriter>(agent: &Agent<W>) {
    print_heading("Project");
    println!("{}", agent.project_context());
    println!();
    print_heading("Automation");
    match agent.controller() {
        Some(controller) => {
            println!("Backend: {}", controller.backend_name());
            println!("{}", controller.capabilities());
        }
        None => println!("Disabled"),
    }
    println!();
    print_heading("Session");
    let session = agent.session();
    println!("Working directory: {}", session.working_directory.display());
    println!("Memory key: {}", session.working_directory_hash);
    println!("Turns: {}", session.history.len());
    let usage = agent.usage();
    println!(
        "Tokens this run: {} in, {} out ({} total)",
        usage.input_tokens,
        usage.output_tokens,
        usage.total()
    );
}

fn print_about<W: UiWriter>(agent: &Agent<W>) {
    println!("tern {}", env!("CARGO_PKG_VERSION"));
    println!("Provider: {} ({})", agent.provider_name(), agent.model());
    match agent.controller() {
        Some(controller) => println!("Automation: {}", controller.backend_name()),
        None => println!("Automation: disabled"),
    }
    println!("Platform: {}-{}", std::env::consts::OS, std::env::consts::ARCH);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tempfile::TempDir;
    use tern_config::Config;
    use tern_core::ui_writer::NullUiWriter;
    use tern_providers::mock::MockProvider;
    use tern_providers::{Message, ProviderRegistry};

    struct ScriptedPrompter {
        answers: VecDeque<String>,
    }

    impl ScriptedPrompter {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn read_line(&mut self, _prompt: &str) -> Option<String> {
            self.answers.pop_front()
        }
    }

    fn test_agent(dir: &Path) -> Agent<NullUiWriter> {
        let mut registry = ProviderRegistry::new();
        registry.register(MockProvider::new());
        Agent::with_providers(Config::default(), NullUiWriter, dir.to_path_buf(), registry)
    }

    async fn run(line: &str, agent: &mut Agent<NullUiWriter>, answers: &[&str], config_path: &Path) -> CommandOutcome {
        let command = Command::parse(line).unwrap();
        let mut prompter = ScriptedPrompter::new(answers);
        handle_command(command, agent, &mut prompter, config_path).await.unwrap()
    }

    #[test]
    fn test_split_args() {
        assert_eq!(split_args("a b  c"), vec!["a", "b", "c"]);
        assert_eq!(split_args("\"fn main\" src"), vec!["fn main", "src"]);
        assert_eq!(split_args("'it''s'"), vec!["its"]);
        assert_eq!(split_args("\"\""), vec![""]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(Command::parse("/help"), Ok(Command::Help));
        assert_eq!(Command::parse("/EXIT"), Ok(Command::Exit));
        assert_eq!(Command::parse("/quit"), Ok(Command::Exit));
        assert_eq!(Command::parse("/clear"), Ok(Command::Clear));
        assert_eq!(Command::parse("/context"), Ok(Command::Context));
        assert_eq!(Command::parse("/about"), Ok(Command::About));
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = Command::parse("/frobnicate now").unwrap_err();
        assert!(err.contains("Unknown command '/frobnicate'"));
    }

    #[test]
    fn test_parse_read() {
        assert_eq!(
            Command::parse("/read src/main.rs 10 20"),
            Ok(Command::Read { path: "src/main.rs".into(), start: Some(10), end: Some(20) })
        );
        assert_eq!(
            Command::parse("/read a.txt"),
            Ok(Command::Read { path: "a.txt".into(), start: None, end: None })
        );
        assert!(Command::parse("/read").unwrap_err().starts_with("Usage: /read"));
        assert!(Command::parse("/read a.txt ten").is_err());
        assert!(Command::parse("/read a.txt 9 3").is_err());
    }

    #[test]
    fn test_parse_rest_of_line_commands() {
        assert_eq!(
            Command::parse("/run cargo test -- --nocapture"),
            Ok(Command::Run { command: "cargo test -- --nocapture".into() })
        );
        assert_eq!(Command::parse("/git"), Ok(Command::Git { args: "status".into() }));
        assert_eq!(Command::parse("/git log -3"), Ok(Command::Git { args: "log -3".into() }));
        assert_eq!(Command::parse("/type hello world"), Ok(Command::Type { text: "hello world".into() }));
        assert_eq!(Command::parse("/screen"), Ok(Command::Screen { question: None }));
        assert_eq!(
            Command::parse("/screen what is this dialog?"),
            Ok(Command::Screen { question: Some("what is this dialog?".into()) })
        );
        assert!(Command::parse("/run").is_err());
    }

    #[test]
    fn test_parse_tree() {
        assert_eq!(Command::parse("/tree"), Ok(Command::Tree { path: None, depth: 3 }));
        assert_eq!(Command::parse("/tree 1"), Ok(Command::Tree { path: None, depth: 1 }));
        assert_eq!(Command::parse("/tree src"), Ok(Command::Tree { path: Some("src".into()), depth: 3 }));
        assert_eq!(Command::parse("/tree src 2"), Ok(Command::Tree { path: Some("src".into()), depth: 2 }));
    }

    #[test]
    fn test_parse_automation_commands() {
        assert_eq!(
            Command::parse("/click"),
            Ok(Command::Click { at: None, button: "left".into(), double: false })
        );
        assert_eq!(
            Command::parse("/click 100 200 right double"),
            Ok(Command::Click { at: Some((100, 200)), button: "right".into(), double: true })
        );
        assert!(Command::parse("/click 1 2 sideways").is_err());
        assert_eq!(Command::parse("/move 5 6"), Ok(Command::Move { x: 5, y: 6 }));
        assert!(Command::parse("/move 5").is_err());
        assert_eq!(
            Command::parse("/scroll Down 4"),
            Ok(Command::Scroll { direction: "down".into(), amount: Some(4) })
        );
        assert!(Command::parse("/scroll sideways").is_err());
        assert!(Command::parse("/scroll up 0").is_err());
        assert_eq!(Command::parse("/key ctrl+shift+t"), Ok(Command::Key { chord: "ctrl+shift+t".into() }));
        assert_eq!(Command::parse("/windows"), Ok(Command::Windows { focus: None }));
        assert_eq!(
            Command::parse("/windows focus Visual Studio Code"),
            Ok(Command::Windows { focus: Some("Visual Studio Code".into()) })
        );
        assert_eq!(Command::parse("/clipboard"), Ok(Command::Clipboard { set: None }));
        assert_eq!(
            Command::parse("/clipboard set some text"),
            Ok(Command::Clipboard { set: Some("some text".into()) })
        );
    }

    #[test]
    fn test_parse_config_and_history() {
        assert_eq!(Command::parse("/config"), Ok(Command::Config { key: None, value: None }));
        assert_eq!(
            Command::parse("/config agent.max_iterations"),
            Ok(Command::Config { key: Some("agent.max_iterations".into()), value: None })
        );
        assert_eq!(
            Command::parse("/config provider.model claude-3-5-haiku"),
            Ok(Command::Config { key: Some("provider.model".into()), value: Some("claude-3-5-haiku".into()) })
        );
        assert_eq!(Command::parse("/history"), Ok(Command::History { count: 10 }));
        assert_eq!(Command::parse("/history 3"), Ok(Command::History { count: 3 }));
        assert_eq!(Command::parse("/model"), Ok(Command::Model { name: None }));
    }

    #[test]
    fn test_every_listed_command_parses() {
        for spec in COMMANDS {
            let line = match spec.name {
                "/read" | "/edit" | "/write" | "/search" => format!("{} x", spec.name),
                "/run" | "/type" => format!("{} echo", spec.name),
                "/key" => "/key enter".to_string(),
                "/move" => "/move 1 2".to_string(),
                "/scroll" => "/scroll up".to_string(),
                other => other.to_string(),
            };
            assert!(Command::parse(&line).is_ok(), "{} should parse", line);
        }
    }

    #[tokio::test]
    async fn test_exit_outcome() {
        let dir = TempDir::new().unwrap();
        let mut agent = test_agent(dir.path());
        let outcome = run("/exit", &mut agent, &[], &dir.path().join("c.toml")).await;
        assert_eq!(outcome, CommandOutcome::Exit);
    }

    #[tokio::test]
    async fn test_write_command_writes_after_confirmation() {
        let dir = TempDir::new().unwrap();
        let mut agent = test_agent(dir.path());
        let outcome = run(
            "/write notes.txt",
            &mut agent,
            &["hello", "world", ".", "y"],
            &dir.path().join("c.toml"),
        )
        .await;
        assert_eq!(outcome, CommandOutcome::Continue);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
            "hello\nworld\n"
        );
    }

    #[tokio::test]
    async fn test_write_command_declined() {
        let dir = TempDir::new().unwrap();
        let mut agent = test_agent(dir.path());
        run("/write notes.txt", &mut agent, &["hello", ".", "n"], &dir.path().join("c.toml")).await;
        assert!(!dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_edit_replace() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.cfg"), "port = 80\nhost = local\n").unwrap();
        let mut agent = test_agent(dir.path());
        run(
            "/edit app.cfg",
            &mut agent,
            &["2", "port = 80", ".", "port = 8080", "."],
            &dir.path().join("c.toml"),
        )
        .await;
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.cfg")).unwrap(),
            "port = 8080\nhost = local\n"
        );
    }

    #[tokio::test]
    async fn test_edit_append() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("todo.md"), "- one").unwrap();
        let mut agent = test_agent(dir.path());
        run("/edit todo.md", &mut agent, &["3", "- two", ".", "yes"], &dir.path().join("c.toml")).await;
        assert_eq!(
            std::fs::read_to_string(dir.path().join("todo.md")).unwrap(),
            "- one\n- two\n"
        );
    }

    #[tokio::test]
    async fn test_edit_describe_forwards_to_agent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn a() {}\n").unwrap();
        let mut agent = test_agent(dir.path());
        let outcome = run(
            "/edit lib.rs",
            &mut agent,
            &["1", "rename a to start"],
            &dir.path().join("c.toml"),
        )
        .await;
        assert_eq!(
            outcome,
            CommandOutcome::Forward {
                text: "Edit the file lib.rs: rename a to start".into(),
                attachments: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_edit_cancel_leaves_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "same").unwrap();
        let mut agent = test_agent(dir.path());
        let outcome = run("/edit keep.txt", &mut agent, &["4"], &dir.path().join("c.toml")).await;
        assert_eq!(outcome, CommandOutcome::Continue);
        assert_eq!(std::fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "same");
    }

    #[tokio::test]
    async fn test_config_set_persists() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        let mut agent = test_agent(dir.path());
        run("/config agent.history_limit 12", &mut agent, &[], &config_path).await;
        assert_eq!(agent.config().agent.history_limit, 12);
        let saved = Config::load(config_path.to_str()).unwrap();
        assert_eq!(saved.agent.history_limit, 12);
    }

    #[tokio::test]
    async fn test_invalid_config_value_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut agent = test_agent(dir.path());
        let command = Command::parse("/config agent.max_iterations lots").unwrap();
        let mut prompter = ScriptedPrompter::new(&[]);
        let result = handle_command(command, &mut agent, &mut prompter, &dir.path().join("c.toml")).await;
        assert!(result.is_err());
        assert_eq!(agent.config().agent.max_iterations, 25);
    }

    #[tokio::test]
    async fn test_model_switch() {
        let dir = TempDir::new().unwrap();
        let mut agent = test_agent(dir.path());
        run("/model mock-2", &mut agent, &[], &dir.path().join("c.toml")).await;
        assert_eq!(agent.model(), "mock-2");
    }

    #[tokio::test]
    async fn test_screen_without_automation_continues() {
        let dir = TempDir::new().unwrap();
        let mut agent = test_agent(dir.path());
        let outcome = run("/screen what is open?", &mut agent, &[], &dir.path().join("c.toml")).await;
        assert_eq!(outcome, CommandOutcome::Continue);
    }

    #[test]
    fn test_describe_turn() {
        let message = Message::new(
            MessageRole::Assistant,
            vec![
                ContentBlock::text("Checking"),
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "Read".into(),
                    input: json!({"path": "a"}),
                },
            ],
        );
        assert_eq!(describe_turn(&message.role, &message.content), "tern: Checking [Read call]");
        let results = vec![ContentBlock::tool_result("t1", "boom", true)];
        assert_eq!(describe_turn(&MessageRole::User, &results), "you: [tool error]");
    }
}
