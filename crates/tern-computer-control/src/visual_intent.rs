//! Decides whether an operator request is about what is on screen.
//!
//! Capturing the screen is slow and privacy-sensitive, so anything short of
//! a clear reference to visual state answers `false`.

/// Phrases that refer to the live display.
const VISUAL_PHRASES: &[&str] = &[
    "screenshot",
    "screen shot",
    "screen capture",
    "my screen",
    "the screen",
    "on screen",
    "on-screen",
    "this screen",
    "what do you see",
    "what can you see",
    "what am i looking at",
    "what i'm looking at",
    "look at my",
    "this window",
    "that window",
    "my window",
    "on my display",
    "my display",
    "my desktop",
    "this dialog",
    "this popup",
    "this pop-up",
    "visible on",
];

/// Code and UI vocabulary that contains the words above without meaning the display.
const LITERAL_TERMS: &[&str] = &[
    "screen reader",
    "splash screen",
    "loading screen",
    "lock screen",
    "screen size",
    "screen width",
    "screen height",
    "screen resolution",
    "screenshot test",
    "screenshot tests",
    "screenshot testing",
    "screenshot function",
    "screenshot module",
];

/// Drop inline and fenced code so identifiers like `the_screen` don't count.
fn strip_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_code = false;
    for (i, segment) in text.split('`').enumerate() {
        if i > 0 {
            in_code = !in_code;
        }
        if !in_code {
            out.push_str(segment);
            out.push(' ');
        }
    }
    out
}

pub fn references_visual_state(text: &str) -> bool {
    let mut normalized = strip_code(text).to_lowercase();
    for term in LITERAL_TERMS {
        normalized = normalized.replace(term, " ");
    }
    VISUAL_PHRASES.iter().any(|phrase| contains_phrase(&normalized, phrase))
}

/// Phrase match on word boundaries.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    haystack.match_indices(phrase).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + phrase.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visual_requests() {
        assert!(references_visual_state("What do you see on my screen?"));
        assert!(references_visual_state("take a screenshot and tell me what's wrong"));
        assert!(references_visual_state("Why is this window frozen?"));
        assert!(references_visual_state("click the OK button in this dialog"));
    }

    #[test]
    fn test_non_visual_requests() {
        assert!(!references_visual_state("refactor the parser module"));
        assert!(!references_visual_state("add a screen reader label to the button"));
        assert!(!references_visual_state("the splash screen shows too long"));
        assert!(!references_visual_state("fix the screenshots directory permissions"));
    }

    #[test]
    fn test_code_spans_are_ignored() {
        assert!(!references_visual_state("rename `the screen` to `display`"));
        assert!(references_visual_state("rename `x` then check the screen"));
    }

    #[test]
    fn test_ambiguous_defaults_to_false() {
        assert!(!references_visual_state(""));
        assert!(!references_visual_state("look at the window function in utils.rs"));
    }
}
