//! JSONL error journal
//!
//! Per-unit failures are appended here and the run presses on; the sync
//! driver's retry mode replays exactly the journaled paths.

use crate::types::ChangeStatus;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Process,
    Delete,
    Upsert,
    DiffSubmodule,
}

/// One journal line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub file_path: String,
    pub operation: Operation,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ChangeStatus>,
}

/// Append-only JSONL journal at a fixed path
#[derive(Debug, Clone)]
pub struct ErrorJournal {
    path: PathBuf,
}

impl ErrorJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. Journal failures are swallowed; recovery relies
    /// on idempotent commit-range replay.
    pub fn append(&self, entry: &JournalEntry) {
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
            writeln!(file, "{line}")
        })();

        if let Err(err) = result {
            log::warn!("failed to journal error for {}: {err}", entry.file_path);
        }
    }

    pub fn record(
        &self,
        file_path: &str,
        operation: Operation,
        message: impl std::fmt::Display,
        status: Option<ChangeStatus>,
    ) {
        self.append(&JournalEntry {
            file_path: file_path.to_owned(),
            operation,
            message: message.to_string(),
            status,
        });
    }

    /// Read all entries; unparseable lines are skipped
    pub fn read_entries(&self) -> Vec<JournalEntry> {
        let Ok(text) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        text.lines().filter_map(|line| serde_json::from_str(line).ok()).collect()
    }

    /// Truncate the journal (after a successful retry run)
    pub fn clear(&self) {
        if self.path.exists() {
            if let Err(err) = std::fs::write(&self.path, "") {
                log::warn!("failed to clear journal: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let journal = ErrorJournal::new(dir.path().join("errors.jsonl"));

        journal.record("src/a.py", Operation::Process, "boom", Some(ChangeStatus::Modified));
        journal.record("src/b.py", Operation::Delete, "gone", None);

        let entries = journal.read_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_path, "src/a.py");
        assert_eq!(entries[0].operation, Operation::Process);
        assert_eq!(entries[0].status, Some(ChangeStatus::Modified));
        assert!(entries[1].status.is_none());
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let journal = ErrorJournal::new("/nonexistent/errors.jsonl");
        assert!(journal.read_entries().is_empty());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let journal = ErrorJournal::new(dir.path().join("errors.jsonl"));
        journal.record("x", Operation::Upsert, "err", None);
        journal.clear();
        assert!(journal.read_entries().is_empty());
    }

    #[test]
    fn test_operation_serialization() {
        let entry = JournalEntry {
            file_path: "lib".to_owned(),
            operation: Operation::DiffSubmodule,
            message: "m".to_owned(),
            status: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"diff-submodule\""));
    }
}
