//! Git integration
//!
//! Subprocess-based wrapper used by the ingester (clone + checkout) and
//! the incremental sync driver (commit-range diffs, including submodule
//! pointer expansion).

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Git errors
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Not a git repository")]
    NotAGitRepo,

    #[error("Git command failed: {0}")]
    CommandFailed(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Git command timed out after {0:?}")]
    Timeout(Duration),
}

/// One line of `git diff --name-status` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    /// Raw status column ("A", "M", "D", "R100", ...)
    pub status: String,
    /// One path, or two for renames/copies (old then new)
    pub paths: Vec<String>,
}

/// A submodule whose pointer moved between two superproject commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleChange {
    pub path: String,
    pub old_sha: String,
    pub new_sha: String,
}

impl SubmoduleChange {
    /// All-zero SHA on the old side means the submodule was added
    pub fn is_added(&self) -> bool {
        self.old_sha.chars().all(|c| c == '0')
    }

    /// All-zero SHA on the new side means the submodule was removed
    pub fn is_removed(&self) -> bool {
        self.new_sha.chars().all(|c| c == '0')
    }
}

static SUBMODULE_RE: OnceLock<Regex> = OnceLock::new();

fn submodule_re() -> &'static Regex {
    SUBMODULE_RE.get_or_init(|| {
        Regex::new(r"^Submodule\s+(\S+)\s+([0-9a-f]{7,})\.{2,3}([0-9a-f]{7,})").expect("valid regex")
    })
}

/// Git repository wrapper
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    /// Open a git repository
    pub fn open(path: &Path) -> Result<Self, GitError> {
        if !path.join(".git").exists() {
            return Err(GitError::NotAGitRepo);
        }
        Ok(Self { path: path.to_path_buf() })
    }

    /// Check if path is a git repository
    pub fn is_git_repo(path: &Path) -> bool {
        path.join(".git").exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone `url` into `target` and check out `reference` when given.
    /// The clone carries a hard deadline; a hung network clone is killed.
    pub fn clone_at(
        url: &str,
        reference: Option<&str>,
        target: &Path,
        timeout: Duration,
    ) -> Result<Self, GitError> {
        run_with_timeout(
            Command::new("git").args(["clone", "--quiet", "--recurse-submodules", url]).arg(target),
            timeout,
        )?;

        let repo = Self { path: target.to_path_buf() };
        if let Some(reference) = reference {
            repo.run_git(&["checkout", "--quiet", reference])?;
        }
        Ok(repo)
    }

    /// Get current commit hash
    pub fn current_commit(&self) -> Result<String, GitError> {
        self.rev_parse("HEAD")
    }

    /// Resolve a revision to a full commit hash
    pub fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        let output = self.run_git(&["rev-parse", rev])?;
        Ok(output.trim().to_owned())
    }

    /// Get list of files tracked by git
    pub fn ls_files(&self) -> Result<Vec<String>, GitError> {
        let output = self.run_git(&["ls-files"])?;
        Ok(output.lines().map(String::from).collect())
    }

    /// Files changed between two commits, rename columns preserved
    pub fn diff_name_status(&self, from: &str, to: &str) -> Result<Vec<DiffEntry>, GitError> {
        let output = self.run_git(&["diff", "--name-status", from, to])?;
        Ok(parse_name_status(&output))
    }

    /// Submodules whose pointer changed between two commits
    pub fn submodule_pointer_changes(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<SubmoduleChange>, GitError> {
        let output = self.run_git(&["diff", "--submodule=short", from, to])?;

        let mut changes = Vec::new();
        for line in output.lines() {
            if let Some(caps) = submodule_re().captures(line.trim()) {
                changes.push(SubmoduleChange {
                    path: caps[1].to_owned(),
                    old_sha: caps[2].to_owned(),
                    new_sha: caps[3].to_owned(),
                });
            }
        }
        Ok(changes)
    }

    /// All files in a submodule tree at a revision
    pub fn submodule_ls_tree(&self, sub_path: &str, rev: &str) -> Result<Vec<String>, GitError> {
        let output = self.run_submodule_git(sub_path, &["ls-tree", "-r", "--name-only", rev])?;
        Ok(output.lines().filter(|l| !l.trim().is_empty()).map(String::from).collect())
    }

    /// name-status diff inside a submodule
    pub fn submodule_diff_name_status(
        &self,
        sub_path: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<DiffEntry>, GitError> {
        let output =
            self.run_submodule_git(sub_path, &["diff", "--name-status", from, to])?;
        Ok(parse_name_status(&output))
    }

    /// Run git inside a submodule checkout, falling back to its git dir
    /// under `.git/modules/` when the working tree is absent
    fn run_submodule_git(&self, sub_path: &str, args: &[&str]) -> Result<String, GitError> {
        let worktree = self.path.join(sub_path);
        if worktree.is_dir() {
            let worktree_str = worktree.to_string_lossy().into_owned();
            let mut full = vec!["-C", worktree_str.as_str()];
            full.extend_from_slice(args);
            return run_command(Command::new("git").args(&full));
        }

        let gitdir = self.path.join(".git").join("modules").join(sub_path);
        let gitdir_str = gitdir.to_string_lossy().into_owned();
        let mut full = vec!["--git-dir", gitdir_str.as_str()];
        full.extend_from_slice(args);
        run_command(Command::new("git").args(&full))
    }

    /// Run a git command in the repository and return stdout
    fn run_git(&self, args: &[&str]) -> Result<String, GitError> {
        run_command(Command::new("git").current_dir(&self.path).args(args))
    }
}

fn parse_name_status(output: &str) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let mut cols = line.split('\t');
        let Some(status) = cols.next().filter(|s| !s.is_empty()) else { continue };
        let paths: Vec<String> = cols.map(String::from).collect();
        if paths.is_empty() {
            continue;
        }
        entries.push(DiffEntry { status: status.to_owned(), paths });
    }
    entries
}

fn run_command(cmd: &mut Command) -> Result<String, GitError> {
    let output = cmd.output().map_err(|e| GitError::CommandFailed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CommandFailed(stderr.trim().to_owned()));
    }

    String::from_utf8(output.stdout).map_err(|e| GitError::ParseError(e.to_string()))
}

/// Run a command with a hard deadline, killing the child on expiry
fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<(), GitError> {
    let mut child = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| GitError::CommandFailed(e.to_string()))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return Ok(());
                }
                return Err(GitError::CommandFailed(format!("exit status {status}")));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GitError::Timeout(timeout));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => return Err(GitError::CommandFailed(err.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::str_to_string)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").current_dir(dir).args(args).output().unwrap();
        assert!(status.status.success(), "git {args:?} failed");
    }

    fn init_test_repo() -> TempDir {
        let temp = TempDir::new().unwrap();
        git(temp.path(), &["init", "-q"]);
        git(temp.path(), &["config", "user.email", "test@test.com"]);
        git(temp.path(), &["config", "user.name", "Test"]);
        std::fs::write(temp.path().join("test.txt"), "hello").unwrap();
        git(temp.path(), &["add", "."]);
        git(temp.path(), &["commit", "-q", "-m", "Initial commit"]);
        temp
    }

    #[test]
    fn test_open_repo() {
        let temp = init_test_repo();
        assert!(GitRepo::open(temp.path()).is_ok());
    }

    #[test]
    fn test_not_a_repo() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(GitRepo::open(temp.path()), Err(GitError::NotAGitRepo)));
    }

    #[test]
    fn test_current_commit() {
        let temp = init_test_repo();
        let repo = GitRepo::open(temp.path()).unwrap();
        let commit = repo.current_commit().unwrap();
        assert_eq!(commit.len(), 40);
    }

    #[test]
    fn test_diff_name_status_with_rename() {
        let temp = init_test_repo();
        let repo = GitRepo::open(temp.path()).unwrap();
        let first = repo.current_commit().unwrap();

        std::fs::rename(temp.path().join("test.txt"), temp.path().join("renamed.txt")).unwrap();
        std::fs::write(temp.path().join("new.txt"), "fresh").unwrap();
        git(temp.path(), &["add", "-A"]);
        git(temp.path(), &["commit", "-q", "-m", "rename"]);
        let second = repo.current_commit().unwrap();

        let entries = repo.diff_name_status(&first, &second).unwrap();
        let rename = entries.iter().find(|e| e.status.starts_with('R')).unwrap();
        assert_eq!(rename.paths, vec!["test.txt", "renamed.txt"]);
        let added = entries.iter().find(|e| e.status == "A").unwrap();
        assert_eq!(added.paths, vec!["new.txt"]);
    }

    #[test]
    fn test_parse_name_status() {
        let parsed = parse_name_status("A\tsrc/a.py\nR100\told.py\tnew.py\nD\tgone.py\n");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].status, "R100");
        assert_eq!(parsed[1].paths.len(), 2);
    }

    #[test]
    fn test_submodule_regex() {
        let line = "Submodule lib 1234abc..5678def (commits)";
        let caps = submodule_re().captures(line).unwrap();
        assert_eq!(&caps[1], "lib");
        assert_eq!(&caps[2], "1234abc");
        assert_eq!(&caps[3], "5678def");
    }

    #[test]
    fn test_submodule_added_detection() {
        let change = SubmoduleChange {
            path: "lib".to_string(),
            old_sha: "0000000".to_string(),
            new_sha: "abc1234".to_string(),
        };
        assert!(change.is_added());
        assert!(!change.is_removed());
    }

    #[test]
    fn test_run_with_timeout_kills() {
        let result = run_with_timeout(
            Command::new("sleep").arg("10"),
            Duration::from_millis(100),
        );
        assert!(matches!(result, Err(GitError::Timeout(_))));
    }

    #[test]
    fn test_clone_at_local_path() {
        let source = init_test_repo();
        let target = TempDir::new().unwrap();
        let dest = target.path().join("clone");
        let repo = GitRepo::clone_at(
            &source.path().to_string_lossy(),
            None,
            &dest,
            Duration::from_secs(60),
        )
        .unwrap();
        assert!(repo.ls_files().unwrap().contains(&"test.txt".to_string()));
    }
}
