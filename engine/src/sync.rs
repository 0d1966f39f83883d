//! Incremental sync driver
//!
//! Converts a `(from_rev, to_rev)` commit range into a file-level A/M/D
//! plan, expanding renames and nested submodule pointer changes, then
//! applies it: deletes for removed files, pre-delete-then-ingest for
//! added and modified ones. Replays of the same range are idempotent
//! because chunk ids are stable and upserts are preceded by deletes.

use crate::cancel::CancelToken;
use crate::git::{DiffEntry, GitError, GitRepo};
use crate::ingest::Ingester;
use crate::journal::Operation;
use crate::store::Filter;
use crate::types::{ChangeStatus, PlannedChange, RepoContext};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Sync run summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub files_processed: usize,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub chunks_upserted: usize,
}

/// Plans and applies commit-range syncs
pub struct SyncDriver {
    ingester: Arc<Ingester>,
}

impl SyncDriver {
    pub fn new(ingester: Arc<Ingester>) -> Self {
        Self { ingester }
    }

    /// Build the A/M/D plan for a commit range.
    ///
    /// Superproject renames expand to `D old` + `M new`. Submodule
    /// pointer changes expand to file-level changes inside the
    /// submodule; a submodule that cannot be diffed is journaled and
    /// skipped.
    pub fn plan(&self, repo: &GitRepo, from: &str, to: &str) -> Result<Vec<PlannedChange>, GitError> {
        let mut plan = Vec::new();

        for entry in repo.diff_name_status(from, to)? {
            expand_entry(&mut plan, &entry, "");
        }

        for submodule in repo.submodule_pointer_changes(from, to)? {
            let result = if submodule.is_added() {
                repo.submodule_ls_tree(&submodule.path, &submodule.new_sha).map(|files| {
                    files
                        .into_iter()
                        .map(|f| {
                            PlannedChange::new(ChangeStatus::Added, format!("{}/{f}", submodule.path))
                        })
                        .collect::<Vec<_>>()
                })
            } else if submodule.is_removed() {
                repo.submodule_ls_tree(&submodule.path, &submodule.old_sha).map(|files| {
                    files
                        .into_iter()
                        .map(|f| {
                            PlannedChange::new(
                                ChangeStatus::Deleted,
                                format!("{}/{f}", submodule.path),
                            )
                        })
                        .collect::<Vec<_>>()
                })
            } else {
                repo.submodule_diff_name_status(&submodule.path, &submodule.old_sha, &submodule.new_sha)
                    .map(|entries| {
                        let mut sub_plan = Vec::new();
                        for entry in entries {
                            expand_entry(&mut sub_plan, &entry, &submodule.path);
                        }
                        sub_plan
                    })
            };

            match result {
                Ok(changes) => plan.extend(changes),
                Err(err) => {
                    self.ingester.journal().record(
                        &submodule.path,
                        Operation::DiffSubmodule,
                        &err,
                        None,
                    );
                }
            }
        }

        Ok(plan)
    }

    /// Apply a plan against the checkout at `root`
    pub fn apply(
        &self,
        root: &Path,
        ctx: &RepoContext,
        plan: &[PlannedChange],
        cancel: &CancelToken,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let journal = self.ingester.journal();

        for change in plan {
            if cancel.is_cancelled() {
                report.files_skipped += 1;
                continue;
            }

            match change.status {
                ChangeStatus::Deleted => {
                    let filter = Filter::eq("file_path", change.file_path.as_str());
                    match self.ingester.store().delete_by_filter(&ctx.namespace, &filter, cancel) {
                        Ok(()) => report.files_deleted += 1,
                        Err(err) => {
                            report.files_failed += 1;
                            journal.record(
                                &change.file_path,
                                Operation::Delete,
                                &err,
                                Some(ChangeStatus::Deleted),
                            );
                        }
                    }
                }
                ChangeStatus::Added | ChangeStatus::Modified => {
                    if !root.join(&change.file_path).is_file() {
                        report.files_skipped += 1;
                        journal.record(
                            &change.file_path,
                            Operation::Process,
                            format!("file marked as {} but not found", change.status.letter()),
                            Some(change.status),
                        );
                        continue;
                    }
                    match self.sync_one(root, ctx, change, cancel) {
                        Ok(chunks) => {
                            report.files_processed += 1;
                            report.chunks_upserted += chunks;
                        }
                        Err((operation, message)) => {
                            report.files_failed += 1;
                            journal.record(
                                &change.file_path,
                                operation,
                                message,
                                Some(change.status),
                            );
                        }
                    }
                }
            }
        }

        report
    }

    /// Plan and apply a commit range, then move the active-ref pointer
    pub fn sync_range(
        &self,
        repo: &GitRepo,
        ctx_base: &RepoContext,
        from: &str,
        to: &str,
        cancel: &CancelToken,
    ) -> Result<SyncReport, GitError> {
        let to_sha = repo.rev_parse(to)?;
        let ctx = RepoContext::new(&ctx_base.repository, to_sha.clone(), &ctx_base.namespace);

        let plan = self.plan(repo, from, &to_sha)?;
        log::info!(
            "sync {} {}..{}: {} planned changes",
            ctx.repository,
            &from[..8.min(from.len())],
            &to_sha[..8.min(to_sha.len())],
            plan.len()
        );

        let report = self.apply(repo.path(), &ctx, &plan, cancel);
        if report.files_failed == 0 && !cancel.is_cancelled() {
            if let Err(err) = self.ingester.store().set_active_ref(&ctx.namespace, &to_sha) {
                log::warn!("failed to advance active ref for {}: {err}", ctx.namespace);
            }
        }
        Ok(report)
    }

    /// Re-run only the paths recorded in the error journal
    pub fn retry_errors(
        &self,
        root: &Path,
        ctx: &RepoContext,
        cancel: &CancelToken,
    ) -> SyncReport {
        let entries = self.ingester.journal().read_entries();
        let plan: Vec<PlannedChange> = entries
            .iter()
            .map(|entry| {
                PlannedChange::new(entry.status.unwrap_or(ChangeStatus::Modified), &entry.file_path)
            })
            .collect();

        self.ingester.journal().clear();
        self.apply(root, ctx, &plan, cancel)
    }

    fn sync_one(
        &self,
        root: &Path,
        ctx: &RepoContext,
        change: &PlannedChange,
        cancel: &CancelToken,
    ) -> Result<usize, (Operation, String)> {
        let records = self
            .ingester
            .process_file(ctx, root, &change.file_path, true, cancel)
            .map_err(|e| (Operation::Process, e.to_string()))?;
        if records.is_empty() {
            return Ok(0);
        }
        self.ingester
            .upsert_file(ctx, &change.file_path, &records, cancel)
            .map_err(|e| (Operation::Upsert, e.to_string()))?;
        Ok(records.len())
    }
}

/// Expand one diff entry into plan entries, applying the rename rule
fn expand_entry(plan: &mut Vec<PlannedChange>, entry: &DiffEntry, prefix: &str) {
    let with_prefix = |path: &str| {
        if prefix.is_empty() {
            path.to_owned()
        } else {
            format!("{prefix}/{path}")
        }
    };

    let status_char = entry.status.chars().next().unwrap_or(' ');
    match status_char {
        'R' if entry.paths.len() >= 2 => {
            plan.push(PlannedChange::new(ChangeStatus::Deleted, with_prefix(&entry.paths[0])));
            plan.push(PlannedChange::new(ChangeStatus::Modified, with_prefix(&entry.paths[1])));
        }
        'C' if entry.paths.len() >= 2 => {
            plan.push(PlannedChange::new(ChangeStatus::Added, with_prefix(&entry.paths[1])));
        }
        _ => {
            if let (Some(status), Some(path)) =
                (ChangeStatus::from_char(status_char), entry.paths.first())
            {
                plan.push(PlannedChange::new(status, with_prefix(path)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: &str, paths: &[&str]) -> DiffEntry {
        DiffEntry { status: status.to_owned(), paths: paths.iter().map(|p| (*p).to_owned()).collect() }
    }

    #[test]
    fn test_expand_rename() {
        let mut plan = Vec::new();
        expand_entry(&mut plan, &entry("R100", &["foo.py", "bar.py"]), "");
        assert_eq!(
            plan,
            vec![
                PlannedChange::new(ChangeStatus::Deleted, "foo.py"),
                PlannedChange::new(ChangeStatus::Modified, "bar.py"),
            ]
        );
    }

    #[test]
    fn test_expand_copy_adds_target() {
        let mut plan = Vec::new();
        expand_entry(&mut plan, &entry("C75", &["src.py", "copy.py"]), "");
        assert_eq!(plan, vec![PlannedChange::new(ChangeStatus::Added, "copy.py")]);
    }

    #[test]
    fn test_expand_plain_statuses() {
        let mut plan = Vec::new();
        expand_entry(&mut plan, &entry("A", &["new.py"]), "");
        expand_entry(&mut plan, &entry("M", &["mod.py"]), "");
        expand_entry(&mut plan, &entry("D", &["old.py"]), "");
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].status, ChangeStatus::Added);
        assert_eq!(plan[2].status, ChangeStatus::Deleted);
    }

    #[test]
    fn test_expand_with_submodule_prefix() {
        let mut plan = Vec::new();
        expand_entry(&mut plan, &entry("A", &["new.py"]), "lib");
        assert_eq!(plan[0].file_path, "lib/new.py");
    }

    #[test]
    fn test_unknown_status_skipped() {
        let mut plan = Vec::new();
        expand_entry(&mut plan, &entry("T", &["typechange"]), "");
        assert!(plan.is_empty());
    }
}
