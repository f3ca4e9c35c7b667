//! Path utilities for tern's per-user state.
//!
//! Everything lives under `~/.tern/` unless `TERN_HOME` points elsewhere:
//! - `memory/<hash>.json` - one persisted session per working directory
//! - `history` - the line-editor history file

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Environment variable overriding the state directory.
pub const TERN_HOME_ENV: &str = "TERN_HOME";

/// Root of tern's per-user state.
pub fn tern_home() -> PathBuf {
    if let Ok(custom) = std::env::var(TERN_HOME_ENV) {
        if !custom.trim().is_empty() {
            return PathBuf::from(shellexpand::tilde(&custom).as_ref());
        }
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".tern")
}

/// Directory holding persisted session memory.
pub fn memory_dir() -> PathBuf {
    tern_home().join("memory")
}

/// Line-editor history for the interactive prompt.
pub fn history_file() -> PathBuf {
    tern_home().join("history")
}

/// Stable identifier for a working directory: the first 16 hex characters of
/// the SHA-256 of its canonical absolute path.
pub fn working_dir_hash(dir: &Path) -> String {
    let canonical = dir
        .canonicalize()
        .unwrap_or_else(|_| absolute(dir));
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn absolute(dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(dir)
    }
}
