//! Queue worker
//!
//! Consumes ingestion jobs, decides between a full ingest and an
//! incremental commit-range sync, and activates the commit. Correctness
//! under at-least-once delivery comes from stable chunk ids and
//! pre-delete semantics; a job that keeps failing is returned to the
//! queue and dead-lettered by it after max attempts.

use crate::cancel::CancelToken;
use crate::git::{GitError, GitRepo};
use crate::ingest::{IngestError, Ingester};
use crate::queue::{JobQueue, QueueError};
use crate::store::StoreError;
use crate::sync::SyncDriver;
use crate::types::{IngestJob, RepoContext};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Worker errors
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("git error: {0}")]
    Git(#[from] GitError),
}

/// Consumes jobs and drives the ingestion pipeline
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    ingester: Arc<Ingester>,
    sync: SyncDriver,
    clone_timeout: Duration,
}

impl Worker {
    pub fn new(queue: Arc<dyn JobQueue>, ingester: Arc<Ingester>, clone_timeout: Duration) -> Self {
        let sync = SyncDriver::new(Arc::clone(&ingester));
        Self { queue, ingester, sync, clone_timeout }
    }

    /// Run until cancelled, sleeping while the queue is empty
    pub fn run(&self, cancel: &CancelToken, idle_sleep: Duration) {
        while !cancel.is_cancelled() {
            match self.run_once(cancel) {
                Ok(true) => {}
                Ok(false) => std::thread::sleep(idle_sleep),
                Err(err) => {
                    log::error!("worker iteration failed: {err}");
                    std::thread::sleep(idle_sleep);
                }
            }
        }
    }

    /// Process at most one message; returns whether one was handled
    pub fn run_once(&self, cancel: &CancelToken) -> Result<bool, WorkerError> {
        let Some(message) = self.queue.receive()? else {
            return Ok(false);
        };

        log::info!(
            "processing job for {} at {} (attempt {})",
            message.job.repository,
            message.job.commit_sha,
            message.attempt
        );

        match self.handle(&message.job, cancel) {
            Ok(()) => {
                self.queue.ack(&message.id)?;
            }
            Err(err) => {
                log::error!("job for {} failed: {err}", message.job.repository);
                self.queue.nack(&message.id)?;
            }
        }
        Ok(true)
    }

    fn handle(&self, job: &IngestJob, cancel: &CancelToken) -> Result<(), WorkerError> {
        let url = clone_url(&job.repository);
        let active = self.ingester.store().active_ref(&job.namespace)?;

        match active {
            Some(ref active_sha) if *active_sha == job.commit_sha => {
                log::info!("{} already active at {}, nothing to do", job.namespace, active_sha);
                Ok(())
            }
            Some(active_sha) => self.incremental(job, &url, &active_sha, cancel),
            None => {
                let reference =
                    if job.commit_sha.is_empty() { None } else { Some(job.commit_sha.as_str()) };
                self.ingester.ingest_repository(
                    &url,
                    &job.repository,
                    reference,
                    &job.namespace,
                    cancel,
                )?;
                Ok(())
            }
        }
    }

    /// Sync the range from the active commit to the pushed one. Falls
    /// back to a full ingest when the active commit is unknown to the
    /// fresh clone (force push, history rewrite).
    fn incremental(
        &self,
        job: &IngestJob,
        url: &str,
        from: &str,
        cancel: &CancelToken,
    ) -> Result<(), WorkerError> {
        let temp = tempfile::tempdir().map_err(IngestError::Io)?;
        let clone_dir = temp.path().join("repo");
        let repo =
            GitRepo::clone_at(url, Some(&job.commit_sha), &clone_dir, self.clone_timeout)?;

        if repo.rev_parse(from).is_err() {
            log::warn!(
                "active commit {from} not found in {}; falling back to full ingest",
                job.repository
            );
            drop(repo);
            drop(temp);
            self.ingester.ingest_repository(
                url,
                &job.repository,
                Some(&job.commit_sha),
                &job.namespace,
                cancel,
            )?;
            return Ok(());
        }

        let ctx = RepoContext::new(&job.repository, &job.commit_sha, &job.namespace);
        let report = self.sync.sync_range(&repo, &ctx, from, &job.commit_sha, cancel)?;
        log::info!(
            "sync of {} complete: {} processed, {} deleted, {} failed",
            job.repository,
            report.files_processed,
            report.files_deleted,
            report.files_failed
        );
        Ok(())
    }
}

/// Clone URL for a repository identifier; full URLs pass through
fn clone_url(repository: &str) -> String {
    if repository.contains("://") || repository.starts_with("git@") {
        repository.to_owned()
    } else {
        format!("https://github.com/{repository}.git")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_url() {
        assert_eq!(clone_url("owner/repo"), "https://github.com/owner/repo.git");
        assert_eq!(clone_url("https://example.test/x.git"), "https://example.test/x.git");
        assert_eq!(clone_url("git@github.com:o/r.git"), "git@github.com:o/r.git");
    }
}
