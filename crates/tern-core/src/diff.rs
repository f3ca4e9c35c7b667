//! Line-level diffs of file changes made by Write and Edit.
//!
//! The diff is structured data; rendering (colors, gutters) belongs to the
//! presentation layer.

use similar::{ChangeTag, TextDiff};

/// Lines of unchanged context kept around each change.
const CONTEXT_RADIUS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Added,
    Removed,
    Context,
    /// Marks skipped unchanged lines between hunks.
    Separator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub lines: Vec<DiffLine>,
    pub added: usize,
    pub removed: usize,
    pub created: bool,
}

impl FileDiff {
    /// Diff `old` against `new`. `old` is `None` for a newly created file.
    pub fn compute(path: &str, old: Option<&str>, new: &str) -> Self {
        let created = old.is_none();
        let old = old.unwrap_or("");
        let diff = TextDiff::from_lines(old, new);

        let mut lines = Vec::new();
        let mut added = 0;
        let mut removed = 0;

        for (i, group) in diff.grouped_ops(CONTEXT_RADIUS).iter().enumerate() {
            if i > 0 {
                lines.push(DiffLine {
                    kind: DiffLineKind::Separator,
                    text: "...".to_string(),
                });
            }
            for op in group {
                for change in diff.iter_changes(op) {
                    let kind = match change.tag() {
                        ChangeTag::Insert => {
                            added += 1;
                            DiffLineKind::Added
                        }
                        ChangeTag::Delete => {
                            removed += 1;
                            DiffLineKind::Removed
                        }
                        ChangeTag::Equal => DiffLineKind::Context,
                    };
                    lines.push(DiffLine {
                        kind,
                        text: change.value().trim_end_matches(['\n', '\r']).to_string(),
                    });
                }
            }
        }

        Self {
            path: path.to_string(),
            lines,
            added,
            removed,
            created,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }

    /// One-line summary such as `+3 -1`.
    pub fn summary(&self) -> String {
        format!("+{} -{}", self.added, self.removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_file_is_all_additions() {
        let diff = FileDiff::compute("a.txt", None, "one\ntwo\n");
        assert!(diff.created);
        assert_eq!(diff.added, 2);
        assert_eq!(diff.removed, 0);
        assert!(diff.lines.iter().all(|l| l.kind == DiffLineKind::Added));
        assert_eq!(diff.lines[1].text, "two");
    }

    #[test]
    fn test_single_line_change() {
        let old = "a\nb\nc\n";
        let new = "a\nB\nc\n";
        let diff = FileDiff::compute("x", Some(old), new);
        assert_eq!(diff.summary(), "+1 -1");
        let kinds: Vec<_> = diff.lines.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiffLineKind::Context,
                DiffLineKind::Removed,
                DiffLineKind::Added,
                DiffLineKind::Context
            ]
        );
    }

    #[test]
    fn test_identical_content_is_empty() {
        let diff = FileDiff::compute("x", Some("same\n"), "same\n");
        assert!(diff.is_empty());
        assert!(diff.lines.is_empty());
    }

    #[test]
    fn test_distant_changes_are_separated() {
        let old: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let new = old.replace("line 2\n", "LINE 2\n").replace("line 27\n", "LINE 27\n");
        let diff = FileDiff::compute("x", Some(&old), &new);
        assert_eq!(diff.added, 2);
        assert!(diff.lines.iter().any(|l| l.kind == DiffLineKind::Separator));
    }
}
