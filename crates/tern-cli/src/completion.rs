//! Tab completion support for tern interactive mode.
//!
//! Provides:
//! - Command completion for `/` commands (at start of line)
//! - File path completion for path-like words anywhere in the line, and for
//!   any argument of commands that take a path
//! - Direction completion for `/scroll`

use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use crate::commands::COMMANDS;

/// Commands whose arguments are file or directory paths.
const PATH_COMMANDS: &[&str] = &["/read ", "/edit ", "/write ", "/tree ", "/search "];

const SCROLL_DIRECTIONS: &[&str] = &["up", "down", "left", "right"];

/// Helper struct for rustyline that provides tab completion.
pub struct TernHelper {
    file_completer: FilenameCompleter,
}

impl TernHelper {
    pub fn new() -> Self {
        Self {
            file_completer: FilenameCompleter::new(),
        }
    }

    /// Find the start of the current "word" being typed, respecting quotes.
    /// Returns (word_start, word) where word_start is the byte index.
    fn extract_word<'a>(&self, line: &'a str, pos: usize) -> (usize, &'a str) {
        let line_to_cursor = &line[..pos];

        let mut word_start = 0;
        let mut in_quotes = false;
        let mut quote_char = ' ';
        let mut prev_was_backslash = false;

        let chars: Vec<(usize, char)> = line_to_cursor.char_indices().collect();
        for (idx, &(i, c)) in chars.iter().enumerate() {
            if in_quotes {
                if c == quote_char && !prev_was_backslash {
                    in_quotes = false;
                }
            } else if !prev_was_backslash {
                match c {
                    '"' | '\'' => {
                        in_quotes = true;
                        quote_char = c;
                        word_start = i;
                    }
                    ' ' | '\t' => {
                        word_start = chars.get(idx + 1).map(|&(next, _)| next).unwrap_or(pos);
                    }
                    _ => {}
                }
            }
            prev_was_backslash = c == '\\' && !prev_was_backslash;
        }

        (word_start, &line_to_cursor[word_start..])
    }

    fn is_path_prefix(&self, word: &str) -> bool {
        let word = word.trim_start_matches(['"', '\'']);

        word.starts_with("./")
            || word.starts_with("../")
            || word.starts_with("~/")
            || word.starts_with('/')
            || word == "."
            || word == ".."
            || word == "~"
    }

    fn strip_quotes<'a>(&self, word: &'a str) -> &'a str {
        word.trim_start_matches(['"', '\'']).trim_end_matches(['"', '\''])
    }

    /// "~/My\ Files" -> "~/My Files"
    fn unescape_path(&self, path: &str) -> String {
        let mut result = String::with_capacity(path.len());
        let mut chars = path.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\' && chars.peek().is_some() {
                if let Some(next) = chars.next() {
                    result.push(next);
                }
            } else {
                result.push(c);
            }
        }
        result
    }

    fn complete_path(&self, word: &str, word_start: usize, ctx: &Context<'_>) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let has_leading_quote = word.starts_with('"') || word.starts_with('\'');
        let quote_char = if has_leading_quote { &word[..1] } else { "" };
        let has_escapes = word.contains('\\');

        let path = self.unescape_path(self.strip_quotes(word));
        let (_, completions) = self.file_completer.complete(&path, path.len(), ctx)?;

        let adjusted = completions
            .into_iter()
            .map(|pair| {
                let has_spaces = pair.replacement.contains(' ');
                let replacement = if has_leading_quote {
                    format!("{}{}{}", quote_char, pair.replacement, quote_char)
                } else if has_escapes && has_spaces {
                    pair.replacement.replace(' ', "\\ ")
                } else if has_spaces {
                    format!("\"{}\"", pair.replacement)
                } else {
                    pair.replacement
                };
                Pair {
                    display: pair.display,
                    replacement,
                }
            })
            .collect();
        Ok((word_start, adjusted))
    }
}

impl Default for TernHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for TernHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let line_to_cursor = &line[..pos];
        let (word_start, word) = self.extract_word(line, pos);

        // "/re" is a command; "/etc" falls through to path completion
        if word_start == 0 && word.starts_with('/') && !word[1..].contains('/') {
            let mut matches: Vec<Pair> = COMMANDS
                .iter()
                .map(|spec| spec.name)
                .chain(std::iter::once("/quit"))
                .filter(|name| name.starts_with(word))
                .map(|name| Pair {
                    display: name.to_string(),
                    replacement: name.to_string(),
                })
                .collect();
            matches.dedup_by(|a, b| a.replacement == b.replacement);
            if !matches.is_empty() {
                return Ok((0, matches));
            }
        }

        if word_start > 0 && self.is_path_prefix(word) {
            return self.complete_path(word, word_start, ctx);
        }

        if word_start > 0 && PATH_COMMANDS.iter().any(|cmd| line_to_cursor.starts_with(cmd)) {
            return self.complete_path(word, word_start, ctx);
        }

        if line_to_cursor.starts_with("/scroll ") && word_start == "/scroll ".len() {
            let matches = SCROLL_DIRECTIONS
                .iter()
                .filter(|d| d.starts_with(word))
                .map(|d| Pair {
                    display: d.to_string(),
                    replacement: d.to_string(),
                })
                .collect();
            return Ok((word_start, matches));
        }

        Ok((pos, vec![]))
    }
}

impl Hinter for TernHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for TernHelper {}

impl Validator for TernHelper {}

impl Helper for TernHelper {}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::DefaultHistory;

    fn complete(line: &str) -> (usize, Vec<String>) {
        let helper = TernHelper::new();
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);
        let (start, pairs) = helper.complete(line, line.len(), &ctx).unwrap();
        (start, pairs.into_iter().map(|p| p.replacement).collect())
    }

    #[test]
    fn test_command_completion() {
        let (start, matches) = complete("/his");
        assert_eq!(start, 0);
        assert_eq!(matches, vec!["/history"]);
    }

    #[test]
    fn test_command_completion_multiple() {
        let (start, matches) = complete("/c");
        assert_eq!(start, 0);
        for expected in ["/click", "/clipboard", "/clear", "/config", "/context"] {
            assert!(matches.iter().any(|m| m == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_quit_alias_completes() {
        let (_, matches) = complete("/q");
        assert_eq!(matches, vec!["/quit"]);
    }

    #[test]
    fn test_path_prefix_detection() {
        let helper = TernHelper::new();

        assert!(helper.is_path_prefix("./"));
        assert!(helper.is_path_prefix("./src"));
        assert!(helper.is_path_prefix("../"));
        assert!(helper.is_path_prefix("~/Documents"));
        assert!(helper.is_path_prefix("/etc"));
        assert!(helper.is_path_prefix("\"~/"));
        assert!(helper.is_path_prefix(".."));

        assert!(!helper.is_path_prefix("hello"));
        assert!(!helper.is_path_prefix("src"));
    }

    #[test]
    fn test_extract_word() {
        let helper = TernHelper::new();
        assert_eq!(helper.extract_word("hello world", 11), (6, "world"));
        assert_eq!(helper.extract_word("/read ./src/main.rs", 19), (6, "./src/main.rs"));
        assert_eq!(helper.extract_word("/read \"./My Files/doc", 21), (6, "\"./My Files/doc"));
        assert_eq!(helper.extract_word("/read ", 6), (6, ""));
    }

    #[test]
    fn test_unescape_path() {
        let helper = TernHelper::new();
        assert_eq!(helper.unescape_path("~/My\\ Files"), "~/My Files");
        assert_eq!(helper.unescape_path("plain"), "plain");
    }

    #[test]
    fn test_path_argument_completion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "").unwrap();
        let line = format!("/read {}/no", dir.path().display());
        let (start, matches) = complete(&line);
        assert_eq!(start, 6);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("notes.md"));
    }

    #[test]
    fn test_scroll_directions() {
        let (start, matches) = complete("/scroll d");
        assert_eq!(start, 8);
        assert_eq!(matches, vec!["down"]);
    }

    #[test]
    fn test_no_completion_for_regular_input() {
        let (start, matches) = complete("hello world");
        assert_eq!(start, 11);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_no_completion_for_quoted_text() {
        let (_, matches) = complete("explain \"hello world");
        assert!(matches.is_empty());
    }
}
