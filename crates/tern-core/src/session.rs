//! Session state and its persisted memory.
//!
//! One JSON document per working directory, named by the directory hash,
//! holding the most recent turns. Writes go to a temp file that is renamed
//! over the old document, so a crash mid-write leaves the previous version.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tern_providers::{ContentBlock, Message, MessageRole};
use tracing::{debug, warn};

use crate::paths::{memory_dir, working_dir_hash};

/// Stands in for image payloads, which are not written to disk.
pub const IMAGE_PLACEHOLDER: &str = "[image omitted from saved history]";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub working_directory: PathBuf,
    pub working_directory_hash: String,
    pub selected_model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<Message>,
}

impl Session {
    pub fn new(working_directory: &Path, selected_model: &str) -> Self {
        let now = Utc::now();
        Self {
            working_directory: working_directory.to_path_buf(),
            working_directory_hash: working_dir_hash(working_directory),
            selected_model: selected_model.to_string(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// The last `n` turns, oldest first.
    pub fn tail(&self, n: usize) -> &[Message] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// History in a shape the endpoint accepts.
    ///
    /// Truncation can leave the stored history starting with tool results or
    /// an assistant turn, and a failed exchange can leave two operator turns
    /// in a row. Leading orphans are dropped and consecutive turns of the
    /// same role merged; the stored history is not modified.
    pub fn request_messages(&self) -> Vec<Message> {
        let start = self
            .history
            .iter()
            .position(|m| m.role == MessageRole::User && !m.has_tool_results())
            .unwrap_or(self.history.len());

        let mut messages: Vec<Message> = Vec::with_capacity(self.history.len() - start);
        for message in &self.history[start..] {
            match messages.last_mut() {
                Some(last) if last.role == message.role => {
                    last.content.extend(message.content.iter().cloned());
                }
                _ => messages.push(message.clone()),
            }
        }
        messages
    }
}

/// Reads and writes persisted sessions.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    dir: PathBuf,
    limit: usize,
}

impl MemoryStore {
    pub fn new(dir: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            dir: dir.into(),
            limit,
        }
    }

    /// Store under `~/.tern/memory` (or `$TERN_HOME/memory`).
    pub fn default_location(limit: usize) -> Self {
        Self::new(memory_dir(), limit)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hash))
    }

    pub fn load(&self, hash: &str) -> Result<Option<Session>> {
        let path = self.path_for(hash);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session memory {}", path.display()))?;
        let session: Session = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt session memory {}", path.display()))?;
        Ok(Some(session))
    }

    /// Hydrate the session for `working_dir`, or start a new one.
    ///
    /// An unreadable document is logged and replaced on the next save rather
    /// than blocking startup.
    pub fn load_or_new(&self, working_dir: &Path, model: &str) -> Session {
        let hash = working_dir_hash(working_dir);
        match self.load(&hash) {
            Ok(Some(mut session)) => {
                debug!(
                    "Loaded session memory {} ({} turns)",
                    hash,
                    session.history.len()
                );
                session.selected_model = model.to_string();
                session
            }
            Ok(None) => Session::new(working_dir, model),
            Err(e) => {
                warn!("Ignoring session memory: {:#}", e);
                Session::new(working_dir, model)
            }
        }
    }

    /// Persist the most recent `limit` turns atomically.
    pub fn save(&self, session: &Session) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let mut stored = session.clone();
        stored.updated_at = Utc::now();
        let start = stored.history.len().saturating_sub(self.limit);
        stored.history.drain(..start);
        for message in &mut stored.history {
            for block in &mut message.content {
                if matches!(block, ContentBlock::Image { .. }) {
                    *block = ContentBlock::text(IMAGE_PLACEHOLDER);
                }
            }
        }

        let path = self.path_for(&stored.working_directory_hash);
        let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
        let json = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
        }
        debug!(
            "Persisted {} turns to {}",
            stored.history.len(),
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turns(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user_text(format!("question {}", i))
                } else {
                    Message::assistant_text(format!("answer {}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_round_trip_keeps_last_n_in_order() {
        let memory = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(memory.path(), 4);

        let mut session = Session::new(work.path(), "model-a");
        session.history = turns(7);
        store.save(&session).unwrap();

        let loaded = store.load_or_new(work.path(), "model-a");
        assert_eq!(loaded.history, session.history[3..].to_vec());
        assert_eq!(loaded.created_at, session.created_at);
        assert_eq!(loaded.working_directory_hash, session.working_directory_hash);
    }

    #[test]
    fn test_short_history_is_kept_whole() {
        let memory = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(memory.path(), 50);

        let mut session = Session::new(work.path(), "m");
        session.history = turns(3);
        store.save(&session).unwrap();
        assert_eq!(store.load_or_new(work.path(), "m").history, session.history);
    }

    #[test]
    fn test_missing_and_corrupt_memory_start_fresh() {
        let memory = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(memory.path(), 10);

        assert!(store.load_or_new(work.path(), "m").history.is_empty());

        let hash = working_dir_hash(work.path());
        std::fs::write(store.path_for(&hash), "{not json").unwrap();
        assert!(store.load(&hash).is_err());
        assert!(store.load_or_new(work.path(), "m").history.is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_files_and_strips_images() {
        let memory = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(memory.path(), 10);

        let mut session = Session::new(work.path(), "m");
        session.push(Message::new(
            MessageRole::User,
            vec![
                ContentBlock::text("look"),
                ContentBlock::image("image/png", "AAAA".to_string()),
            ],
        ));
        store.save(&session).unwrap();

        let names: Vec<String> = std::fs::read_dir(memory.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.json", session.working_directory_hash)]);

        let loaded = store.load_or_new(work.path(), "m");
        assert_eq!(loaded.history[0].content[1], ContentBlock::text(IMAGE_PLACEHOLDER));
        // The in-memory session still has the image
        assert!(matches!(session.history[0].content[1], ContentBlock::Image { .. }));
    }

    #[test]
    fn test_sessions_are_keyed_by_directory() {
        let memory = tempfile::tempdir().unwrap();
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(memory.path(), 10);

        let mut session = Session::new(a.path(), "m");
        session.push(Message::user_text("only in a"));
        store.save(&session).unwrap();

        assert_eq!(store.load_or_new(a.path(), "m").history.len(), 1);
        assert!(store.load_or_new(b.path(), "m").history.is_empty());
    }

    #[test]
    fn test_request_messages_drop_leading_orphans() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::new(work.path(), "m");
        session.history = vec![
            Message::new(
                MessageRole::User,
                vec![ContentBlock::tool_result("t1", "ok", false)],
            ),
            Message::assistant_text("done"),
            Message::user_text("next"),
            Message::assistant_text("sure"),
        ];
        let messages = session.request_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "next");
        assert_eq!(session.history.len(), 4);
    }

    #[test]
    fn test_request_messages_merge_repeated_roles() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::new(work.path(), "m");
        session.history = vec![
            Message::user_text("first try"),
            Message::user_text("second try"),
            Message::new(
                MessageRole::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "a".to_string(),
                    name: "Read".to_string(),
                    input: json!({"path": "x"}),
                }],
            ),
        ];
        let messages = session.request_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content.len(), 2);
    }

    #[test]
    fn test_tail() {
        let work = tempfile::tempdir().unwrap();
        let mut session = Session::new(work.path(), "m");
        session.history = turns(5);
        assert_eq!(session.tail(2).len(), 2);
        assert_eq!(session.tail(2)[1].text(), "question 4");
        assert_eq!(session.tail(10).len(), 5);
    }
}
