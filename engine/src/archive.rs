//! Archival snapshots of upserted vector sets
//!
//! After a successful ingestion the materialized vectors are written to
//! an object store under `archives/{repository}/{ref}.json`. The store
//! itself is external; the filesystem implementation backs local runs.

use crate::types::VectorRecord;
use std::path::PathBuf;
use thiserror::Error;

/// Object store errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Opaque key -> bytes storage
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ArchiveError>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArchiveError>;
}

/// Filesystem-backed object store rooted at a directory
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ArchiveError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        let path = self.root.join(key);
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Conventional archive key for a repository snapshot
pub fn archive_key(repository: &str, commit_sha: &str) -> String {
    format!("archives/{repository}/{commit_sha}.json")
}

/// Write the vector set exactly as it was upserted
pub fn archive_vectors(
    store: &dyn ObjectStore,
    repository: &str,
    commit_sha: &str,
    records: &[VectorRecord],
) -> Result<(), ArchiveError> {
    let body = serde_json::to_vec(records)?;
    store.put(&archive_key(repository, commit_sha), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_key() {
        assert_eq!(archive_key("owner/repo", "abc"), "archives/owner/repo/abc.json");
    }

    #[test]
    fn test_fs_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path());

        store.put("archives/demo/x.json", b"[]").unwrap();
        assert_eq!(store.get("archives/demo/x.json").unwrap().unwrap(), b"[]");
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_archive_vectors_writes_json_array() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path());
        archive_vectors(&store, "owner/demo", "abc", &[]).unwrap();

        let bytes = store.get("archives/owner/demo/abc.json").unwrap().unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
        assert!(parsed.is_empty());
    }
}
