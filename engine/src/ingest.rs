//! Repository ingester
//!
//! Clone -> walk -> chunk -> embed -> upsert, with an archival snapshot
//! and two-phase commit activation. Files are processed by a bounded
//! worker pool; a bad file is journaled and never aborts the run. The
//! pre-delete-then-upsert order per file makes retries idempotent.

use crate::archive::{archive_vectors, ObjectStore};
use crate::cancel::CancelToken;
use crate::chunker::{ChunkerConfig, SemanticChunker};
use crate::embedding::{Embedder, EmbeddingError, HybridWeights};
use crate::git::{GitError, GitRepo};
use crate::journal::{ErrorJournal, Operation};
use crate::languages::registry;
use crate::metadata::MetadataAssembler;
use crate::store::{Filter, StoreError, VectorStore};
use crate::tokenizer::Tokenizer;
use crate::types::{RepoContext, VectorRecord};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Extensions never ingested (images, archives, compiled artifacts)
pub const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "pdf", "zip", "tar", "gz", "tgz", "so",
    "dll", "exe", "bin", "dat", "class", "o", "a", "jar", "pyc", "woff", "woff2", "ttf", "eot",
    "mp3", "mp4", "mov", "avi",
];

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("archive error: {0}")]
    Archive(#[from] crate::archive::ArchiveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker pool error: {0}")]
    Pool(String),

    #[error("cancelled")]
    Cancelled,
}

/// Ingestion run summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub repository: String,
    pub commit_sha: String,
    pub namespace: String,
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub chunks_upserted: usize,
}

/// Ingester tuning
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub max_workers: usize,
    pub overlap_tokens: u32,
    pub clone_timeout: Duration,
    /// Hybrid embedding weights; None embeds content only
    pub hybrid: Option<HybridWeights>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_workers: 4,
            overlap_tokens: 0,
            clone_timeout: Duration::from_secs(600),
            hybrid: None,
        }
    }
}

/// The ingestion pipeline with constructor-injected collaborators
pub struct Ingester {
    chunker: SemanticChunker,
    assembler: MetadataAssembler,
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStore>,
    archive: Option<Arc<dyn ObjectStore>>,
    journal: ErrorJournal,
    pool: rayon::ThreadPool,
    options: IngestOptions,
}

impl Ingester {
    pub fn new(
        tokenizer: Arc<Tokenizer>,
        embedder: Arc<Embedder>,
        store: Arc<dyn VectorStore>,
        archive: Option<Arc<dyn ObjectStore>>,
        journal: ErrorJournal,
        options: IngestOptions,
    ) -> Result<Self, IngestError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_workers.max(1))
            .build()
            .map_err(|e| IngestError::Pool(e.to_string()))?;

        let chunker_config = ChunkerConfig {
            overlap_tokens: options.overlap_tokens,
            ..ChunkerConfig::default()
        };

        Ok(Self {
            chunker: SemanticChunker::with_config(Arc::clone(&tokenizer), chunker_config),
            assembler: MetadataAssembler::new(tokenizer),
            embedder,
            store,
            archive,
            journal,
            pool,
            options,
        })
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn journal(&self) -> &ErrorJournal {
        &self.journal
    }

    /// Full ingestion of a repository at a ref.
    ///
    /// New vectors are staged with `live = false`; once every file and
    /// batch has succeeded they are flipped live, the namespace's
    /// active-ref pointer moves, and prior-commit vectors are removed.
    /// A failure before the flip leaves retrieval untouched.
    pub fn ingest_repository(
        &self,
        url: &str,
        repository: &str,
        reference: Option<&str>,
        namespace: &str,
        cancel: &CancelToken,
    ) -> Result<IngestReport, IngestError> {
        // The temp clone is owned by this run and removed on drop, even
        // on failure
        let temp = tempfile::tempdir()?;
        let clone_dir = temp.path().join("repo");
        log::info!("cloning {url} into {}", clone_dir.display());
        let repo = GitRepo::clone_at(url, reference, &clone_dir, self.options.clone_timeout)?;
        let commit_sha = repo.current_commit()?;
        let ctx = RepoContext::new(repository, commit_sha.clone(), namespace);

        let files = walk_files(&clone_dir);
        log::info!("{repository}@{}: {} candidate files", &commit_sha[..8.min(commit_sha.len())], files.len());

        let processed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let all_records: Mutex<Vec<VectorRecord>> = Mutex::new(Vec::new());

        self.pool.install(|| {
            files.par_iter().for_each(|rel_path| {
                if cancel.is_cancelled() {
                    skipped.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                match self.process_file(&ctx, &clone_dir, rel_path, false, cancel) {
                    Ok(records) if records.is_empty() => {
                        skipped.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(records) => match self.upsert_file(&ctx, rel_path, &records, cancel) {
                        Ok(()) => {
                            processed.fetch_add(1, Ordering::SeqCst);
                            all_records.lock().extend(records);
                        }
                        Err(err) => {
                            failed.fetch_add(1, Ordering::SeqCst);
                            self.journal.record(rel_path, Operation::Upsert, &err, None);
                        }
                    },
                    Err(err) => {
                        failed.fetch_add(1, Ordering::SeqCst);
                        self.journal.record(rel_path, Operation::Process, &err, None);
                    }
                }
            });
        });

        if cancel.is_cancelled() {
            // Staged vectors stay in the store; they are not live and do
            // not affect retrieval
            return Err(IngestError::Cancelled);
        }

        let records = std::mem::take(&mut *all_records.lock());

        if let Some(archive) = &self.archive {
            archive_vectors(archive.as_ref(), repository, &ctx.commit_sha, &records)?;
        }

        self.activate(&ctx, &records, cancel)?;

        Ok(IngestReport {
            repository: repository.to_owned(),
            commit_sha: ctx.commit_sha,
            namespace: namespace.to_owned(),
            files_processed: processed.into_inner(),
            files_failed: failed.into_inner(),
            files_skipped: skipped.into_inner(),
            chunks_upserted: records.len(),
        })
    }

    /// Chunk, assemble, and embed one file into vector records
    pub fn process_file(
        &self,
        ctx: &RepoContext,
        root: &Path,
        rel_path: &str,
        live: bool,
        cancel: &CancelToken,
    ) -> Result<Vec<VectorRecord>, IngestError> {
        let bytes = std::fs::read(root.join(rel_path))?;
        let chunks = self.chunker.chunk_file(rel_path, &bytes);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let text = String::from_utf8_lossy(&bytes);
        let spec = registry().detect(rel_path, &text);

        let mut records: Vec<crate::types::ChunkRecord> = Vec::with_capacity(chunks.len());
        for raw in chunks {
            if raw.content.trim().is_empty() {
                log::warn!("skipping empty chunk in {rel_path}");
                continue;
            }
            records
                .push(self.assembler.assemble(ctx, rel_path, spec.language, spec.file_type, raw, live));
        }
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = match self.options.hybrid {
            Some(weights) => {
                let file_context = file_context_line(rel_path, &records);
                let mut vectors = Vec::with_capacity(records.len());
                for record in &records {
                    vectors.push(self.embedder.embed_hybrid(
                        &record.content,
                        &record.summary,
                        Some(&file_context),
                        weights,
                        cancel,
                    )?);
                }
                vectors
            }
            None => {
                // Content-only embedding: paths and metadata never reach
                // the embedded text
                let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
                self.embedder.embed_batch(&contents, cancel)?
            }
        };

        Ok(records
            .into_iter()
            .zip(vectors)
            .map(|(record, values)| VectorRecord { id: record.chunk_id.clone(), values, metadata: record })
            .collect())
    }

    /// Pre-delete the file's prior vectors, then upsert the new ones.
    /// The delete happens-before the upsert for this file; no cross-file
    /// ordering is required.
    pub fn upsert_file(
        &self,
        ctx: &RepoContext,
        rel_path: &str,
        records: &[VectorRecord],
        cancel: &CancelToken,
    ) -> Result<(), IngestError> {
        self.store.delete_by_filter(&ctx.namespace, &Filter::eq("file_path", rel_path), cancel)?;
        self.store.upsert(&ctx.namespace, records, cancel)?;
        Ok(())
    }

    /// Two-phase activation: flip the staged vectors live, move the
    /// active-ref pointer, then drop vectors of any other commit.
    pub fn activate(
        &self,
        ctx: &RepoContext,
        records: &[VectorRecord],
        cancel: &CancelToken,
    ) -> Result<(), IngestError> {
        let live_records: Vec<VectorRecord> = records
            .iter()
            .map(|r| {
                let mut record = r.clone();
                record.metadata.live = true;
                record
            })
            .collect();
        self.store.upsert(&ctx.namespace, &live_records, cancel)?;
        self.store.set_live(&ctx.namespace, &Filter::eq("ref", &ctx.commit_sha), true, cancel)?;
        self.store.set_active_ref(&ctx.namespace, &ctx.commit_sha)?;
        self.store.delete_by_filter(&ctx.namespace, &Filter::ne("ref", &ctx.commit_sha), cancel)?;
        log::info!("activated {}@{} in namespace {}", ctx.repository, ctx.commit_sha, ctx.namespace);
        Ok(())
    }
}

/// Cheap file-level context line for hybrid embedding
fn file_context_line(rel_path: &str, chunks: &[crate::types::ChunkRecord]) -> String {
    let symbols: Vec<&str> =
        chunks.iter().filter_map(|c| c.symbol_name.as_deref()).take(8).collect();
    if symbols.is_empty() {
        format!("File {rel_path}")
    } else {
        format!("File {rel_path} defining {}", symbols.join(", "))
    }
}

/// Walk all non-hidden files under the root, skipping the binary
/// extension blocklist. Paths are repository-relative with `/`
/// separators, sorted for deterministic processing order.
pub fn walk_files(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if name.starts_with('.') {
                continue;
            }

            let Ok(file_type) = entry.file_type() else { continue };
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
                if BINARY_EXTENSIONS.contains(&ext.as_str()) {
                    continue;
                }
                if let Ok(rel) = path.strip_prefix(root) {
                    files.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
    }

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_walk_files_skips_hidden_and_binary() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("src/main.py"), "print(1)\n").unwrap();
        std::fs::write(root.join("logo.png"), [0x89, 0x50]).unwrap();
        std::fs::write(root.join(".env"), "SECRET=1\n").unwrap();
        std::fs::write(root.join(".git/config"), "[core]\n").unwrap();
        std::fs::write(root.join("README.md"), "# hi\n").unwrap();

        let files = walk_files(root);
        assert_eq!(files, vec!["README.md", "src/main.py"]);
    }

    #[test]
    fn test_file_context_line() {
        let line = file_context_line("src/app.py", &[]);
        assert_eq!(line, "File src/app.py");
    }
}
