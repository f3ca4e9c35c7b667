//! Interactive mode for the tern CLI.

use anyhow::Result;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use rustyline::error::ReadlineError;
use rustyline::{Config, Editor};
use std::path::Path;
use tracing::{debug, error};

use tern_core::ui_writer::UiWriter;
use tern_core::Agent;

use crate::commands::{handle_command, Command, CommandOutcome};
use crate::completion::TernHelper;
use crate::display::{print_dim, print_error, print_workspace_path};
use crate::task_execution::execute_turn;

/// Build the interactive prompt string.
///
/// - Multiline mode: `"... > "`
/// - Otherwise: `"tern> "`
pub fn build_prompt(in_multiline: bool) -> String {
    if in_multiline {
        "... > ".to_string()
    } else {
        "tern> ".to_string()
    }
}

fn is_exit_word(input: &str) -> bool {
    matches!(input, "exit" | "quit")
}

fn print_banner<W: UiWriter>(agent: &Agent<W>, workspace_path: &Path) {
    println!();
    println!("tern {}", env!("CARGO_PKG_VERSION"));
    println!(
        "{}{}{} | {}{}{}",
        SetForegroundColor(Color::Cyan),
        agent.provider_name(),
        ResetColor,
        SetForegroundColor(Color::Yellow),
        agent.model(),
        ResetColor
    );
    let project = agent.project_context();
    if let Some(language) = &project.language {
        print_dim(&format!("{} project", language));
    }
    let turns = agent.session().history.len();
    if turns > 0 {
        print_dim(&format!("Resuming conversation ({} turns); /clear starts fresh", turns));
    }
    print_workspace_path(workspace_path);
    print_dim("Type /help for commands, exit or Ctrl-D to leave.");
    println!();
}

/// Run the read-eval loop until the operator leaves.
pub async fn run_interactive<W: UiWriter>(mut agent: Agent<W>, workspace_path: &Path, config_path: &Path) -> Result<()> {
    print_banner(&agent, workspace_path);

    let config = Config::builder()
        .completion_type(rustyline::CompletionType::List)
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(TernHelper::new()));

    let history_file = tern_core::paths::history_file();
    if let Err(e) = rl.load_history(&history_file) {
        debug!("No input history loaded from {}: {}", history_file.display(), e);
    }

    let mut multiline_buffer = String::new();
    let mut in_multiline = false;

    loop {
        let prompt = build_prompt(in_multiline);
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                if in_multiline {
                    print_dim("Multi-line input cancelled");
                    multiline_buffer.clear();
                    in_multiline = false;
                }
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                error!("Error reading input: {:?}", err);
                break;
            }
        };

        let trimmed = line.trim_end();
        if let Some(without_backslash) = trimmed.strip_suffix('\\') {
            multiline_buffer.push_str(without_backslash);
            multiline_buffer.push('\n');
            in_multiline = true;
            continue;
        }

        let input = if in_multiline {
            multiline_buffer.push_str(&line);
            in_multiline = false;
            std::mem::take(&mut multiline_buffer).trim().to_string()
        } else {
            line.trim().to_string()
        };

        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(&input);

        if is_exit_word(&input) {
            break;
        }

        if input.starts_with('/') {
            let command = match Command::parse(&input) {
                Ok(command) => command,
                Err(message) => {
                    print_error(&message);
                    continue;
                }
            };
            match handle_command(command, &mut agent, &mut rl, config_path).await {
                Ok(CommandOutcome::Continue) => {}
                Ok(CommandOutcome::Exit) => break,
                Ok(CommandOutcome::Forward { text, attachments }) => {
                    let _ = execute_turn(&mut agent, &text, attachments).await;
                }
                Err(e) => print_error(&format!("{:#}", e)),
            }
            continue;
        }

        let _ = execute_turn(&mut agent, &input, Vec::new()).await;
    }

    if let Some(parent) = history_file.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = rl.save_history(&history_file) {
        debug!("Could not save input history: {}", e);
    }

    print_dim("Goodbye.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_default() {
        assert_eq!(build_prompt(false), "tern> ");
    }

    #[test]
    fn test_build_prompt_multiline() {
        assert_eq!(build_prompt(true), "... > ");
    }

    #[test]
    fn test_exit_words() {
        assert!(is_exit_word("exit"));
        assert!(is_exit_word("quit"));
        assert!(!is_exit_word("exit now"));
        assert!(!is_exit_word("/exit"));
    }
}
