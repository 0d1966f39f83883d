//! End-to-end pipeline tests
//!
//! Exercise the full chunk -> embed -> upsert -> activate -> query loop
//! against the in-memory store, a deterministic stub embedding
//! provider, and real git repositories created on the fly. No network
//! services are contacted.

use codeloom_engine::embedding::{Embedder, EmbeddingError, EmbeddingProvider};
use codeloom_engine::git::GitRepo;
use codeloom_engine::query::executor::RetrievalExecutor;
use codeloom_engine::store::MemoryVectorStore;
use codeloom_engine::webhook::sign_payload;
use codeloom_engine::{
    CancelToken, ChangeStatus, ChunkType, Config, QueryPlanner, RepoContext, RetrievalOptions,
    Service, StrategyKind, SyncDriver, Tokenizer, VectorStore, WebhookHeaders, WebhookOutcome,
};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: usize = 16;

/// Deterministic embedding: hashed bag of words, unit-normalized.
/// Similar texts share tokens and therefore direction.
struct StubProvider;

impl EmbeddingProvider for StubProvider {
    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; DIMENSION];
                let words = text
                    .split(|c: char| !c.is_alphanumeric() && c != '_')
                    .filter(|w| !w.is_empty());
                for word in words {
                    let mut hash = 2166136261u32;
                    for b in word.to_lowercase().bytes() {
                        hash ^= b as u32;
                        hash = hash.wrapping_mul(16777619);
                    }
                    vector[(hash as usize) % DIMENSION] += 1.0;
                }
                let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut vector {
                        *x /= norm;
                    }
                }
                vector
            })
            .collect())
    }
}

struct Harness {
    service: Service,
    store: Arc<MemoryVectorStore>,
    _scratch: TempDir,
}

fn harness() -> Harness {
    let scratch = TempDir::new().unwrap();
    let mut config = Config::default();
    config.embedding.dimension = DIMENSION;
    config.archive.root = scratch.path().join("archives").to_string_lossy().into_owned();
    config.ingest.errors_path =
        scratch.path().join("errors.jsonl").to_string_lossy().into_owned();
    config.ingest.max_workers = 2;

    let store = Arc::new(MemoryVectorStore::new());
    let embedder = Arc::new(Embedder::new(Arc::new(StubProvider)));
    let service = Service::assemble(
        config,
        Arc::clone(&store) as Arc<dyn VectorStore>,
        Arc::new(Tokenizer::new()),
        embedder,
    )
    .unwrap();

    Harness { service, store, _scratch: scratch }
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git").current_dir(dir).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn init_repo(dir: &Path) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.email", "test@test.com"]);
    git(dir, &["config", "user.name", "Test"]);
}

fn commit_all(dir: &Path, message: &str) -> String {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
    let output =
        Command::new("git").current_dir(dir).args(["rev-parse", "HEAD"]).output().unwrap();
    String::from_utf8(output.stdout).unwrap().trim().to_owned()
}

const PY_FILE: &str = "\
import os

def a():
    return 1

def b():
    if True:
        return 2

def c():
    return 3
";

#[test]
fn test_ingest_python_repo_end_to_end() {
    let harness = harness();
    let repo_dir = TempDir::new().unwrap();
    init_repo(repo_dir.path());
    std::fs::write(repo_dir.path().join("app.py"), PY_FILE).unwrap();
    std::fs::write(repo_dir.path().join("README.md"), "# Demo\nA demo repo.\n").unwrap();
    let commit = commit_all(repo_dir.path(), "initial");

    let cancel = CancelToken::new();
    let report = harness
        .service
        .ingester()
        .ingest_repository(
            &repo_dir.path().to_string_lossy(),
            "owner/demo",
            None,
            "demo",
            &cancel,
        )
        .unwrap();

    assert_eq!(report.commit_sha, commit);
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.files_failed, 0);

    let records = harness.store.records("demo");
    assert_eq!(records.len(), report.chunks_upserted);
    assert!(records.iter().all(|r| r.metadata.live));
    assert!(records.iter().all(|r| r.metadata.commit_sha == commit));
    assert_eq!(harness.store.active_ref("demo").unwrap(), Some(commit));

    // Seed scenario: three function chunks with symbol names a, b, c
    let mut functions: Vec<String> = records
        .iter()
        .filter(|r| r.metadata.file_path == "app.py")
        .filter(|r| r.metadata.chunk_type == ChunkType::Function)
        .filter_map(|r| r.metadata.symbol_name.clone())
        .collect();
    functions.sort();
    assert_eq!(functions, vec!["a", "b", "c"]);

    for record in records.iter().filter(|r| r.metadata.file_path == "app.py") {
        assert!(record.metadata.signals.token_count <= 1024);
        assert!(record.metadata.line_end >= record.metadata.line_start);
    }
}

#[test]
fn test_chunk_ids_stable_across_runs() {
    let repo_dir = TempDir::new().unwrap();
    init_repo(repo_dir.path());
    std::fs::write(repo_dir.path().join("app.py"), PY_FILE).unwrap();
    commit_all(repo_dir.path(), "initial");

    let cancel = CancelToken::new();
    let mut id_sets = Vec::new();
    for _ in 0..2 {
        let harness = harness();
        harness
            .service
            .ingester()
            .ingest_repository(
                &repo_dir.path().to_string_lossy(),
                "owner/demo",
                None,
                "demo",
                &cancel,
            )
            .unwrap();
        let mut ids: Vec<String> =
            harness.store.records("demo").iter().map(|r| r.id.clone()).collect();
        ids.sort();
        id_sets.push(ids);
    }
    assert_eq!(id_sets[0], id_sets[1]);
    assert!(!id_sets[0].is_empty());
}

#[test]
fn test_reingest_same_commit_is_noop() {
    let harness = harness();
    let repo_dir = TempDir::new().unwrap();
    init_repo(repo_dir.path());
    std::fs::write(repo_dir.path().join("app.py"), PY_FILE).unwrap();
    commit_all(repo_dir.path(), "initial");

    let cancel = CancelToken::new();
    let url = repo_dir.path().to_string_lossy().into_owned();
    harness.service.ingester().ingest_repository(&url, "owner/demo", None, "demo", &cancel).unwrap();

    let mut before: Vec<_> = harness
        .store
        .records("demo")
        .into_iter()
        .map(|r| (r.id, r.values, r.metadata.content_sha))
        .collect();
    before.sort_by(|a, b| a.0.cmp(&b.0));

    harness.service.ingester().ingest_repository(&url, "owner/demo", None, "demo", &cancel).unwrap();

    let mut after: Vec<_> = harness
        .store
        .records("demo")
        .into_iter()
        .map(|r| (r.id, r.values, r.metadata.content_sha))
        .collect();
    after.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(before, after);
}

#[test]
fn test_rename_sync_changes_chunk_id() {
    let harness = harness();
    let repo_dir = TempDir::new().unwrap();
    init_repo(repo_dir.path());
    std::fs::write(repo_dir.path().join("foo.py"), "def a():\n    return 1\n").unwrap();
    let first = commit_all(repo_dir.path(), "first");

    let cancel = CancelToken::new();
    let url = repo_dir.path().to_string_lossy().into_owned();
    harness.service.ingester().ingest_repository(&url, "owner/demo", None, "demo", &cancel).unwrap();

    let old_ids: Vec<String> = harness.store.records("demo").iter().map(|r| r.id.clone()).collect();

    git(repo_dir.path(), &["mv", "foo.py", "bar.py"]);
    let second = commit_all(repo_dir.path(), "rename");

    let repo = GitRepo::open(repo_dir.path()).unwrap();
    let driver = SyncDriver::new(Arc::clone(harness.service.ingester()));
    let ctx = RepoContext::new("owner/demo", "", "demo");
    let report = driver.sync_range(&repo, &ctx, &first, &second, &cancel).unwrap();

    assert_eq!(report.files_deleted, 1);
    assert_eq!(report.files_processed, 1);

    let records = harness.store.records("demo");
    assert!(records.iter().all(|r| r.metadata.file_path == "bar.py"));
    // file_path is part of the identity, so the id must differ
    assert!(records.iter().all(|r| !old_ids.contains(&r.id)));
    assert_eq!(harness.store.active_ref("demo").unwrap(), Some(second));
}

#[test]
fn test_submodule_pointer_expansion() {
    // Submodule with one file
    let sub_dir = TempDir::new().unwrap();
    init_repo(sub_dir.path());
    std::fs::write(sub_dir.path().join("existing.py"), "def x():\n    return 0\n").unwrap();
    commit_all(sub_dir.path(), "sub first");

    // Superproject referencing it
    let super_dir = TempDir::new().unwrap();
    init_repo(super_dir.path());
    std::fs::write(super_dir.path().join("top.txt"), "top\n").unwrap();
    git(
        super_dir.path(),
        &[
            "-c",
            "protocol.file.allow=always",
            "submodule",
            "add",
            "-q",
            &sub_dir.path().to_string_lossy(),
            "lib",
        ],
    );
    let first = commit_all(super_dir.path(), "super first");

    // Move the submodule pointer: one new file inside
    std::fs::write(sub_dir.path().join("new.py"), "def fresh():\n    return 1\n").unwrap();
    commit_all(sub_dir.path(), "sub second");
    let lib_dir = super_dir.path().join("lib");
    git(&lib_dir, &["-c", "protocol.file.allow=always", "fetch", "-q", "origin", "main"]);
    git(&lib_dir, &["checkout", "-q", "FETCH_HEAD"]);
    let second = commit_all(super_dir.path(), "super second");

    let harness = harness();
    let repo = GitRepo::open(super_dir.path()).unwrap();
    let driver = SyncDriver::new(Arc::clone(harness.service.ingester()));
    let plan = driver.plan(&repo, &first, &second).unwrap();

    // Only the new submodule file appears, as an addition
    let additions: Vec<_> =
        plan.iter().filter(|c| c.status == ChangeStatus::Added).collect();
    assert_eq!(additions.len(), 1);
    assert_eq!(additions[0].file_path, "lib/new.py");
    assert!(!plan.iter().any(|c| c.file_path.contains("existing.py")));
}

#[test]
fn test_amd_replay_leaves_store_empty() {
    let harness = harness();
    let repo_dir = TempDir::new().unwrap();
    init_repo(repo_dir.path());

    // Commit A is empty; commit B adds files
    git(repo_dir.path(), &["commit", "-q", "--allow-empty", "-m", "empty"]);
    let output = Command::new("git")
        .current_dir(repo_dir.path())
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    let a = String::from_utf8(output.stdout).unwrap().trim().to_owned();

    std::fs::write(repo_dir.path().join("one.py"), "def one():\n    return 1\n").unwrap();
    std::fs::write(repo_dir.path().join("two.py"), "def two():\n    return 2\n").unwrap();
    let b = commit_all(repo_dir.path(), "add files");

    let cancel = CancelToken::new();
    let repo = GitRepo::open(repo_dir.path()).unwrap();
    let driver = SyncDriver::new(Arc::clone(harness.service.ingester()));
    let ctx = RepoContext::new("owner/demo", "", "demo");

    // Forward: files appear
    let forward = driver.sync_range(&repo, &ctx, &a, &b, &cancel).unwrap();
    assert_eq!(forward.files_processed, 2);
    assert!(!harness.store.records("demo").is_empty());

    // Backward: check out A so deleted files are absent from the tree
    git(repo_dir.path(), &["checkout", "-q", &a]);
    let backward = driver.sync_range(&repo, &ctx, &b, &a, &cancel).unwrap();
    assert_eq!(backward.files_deleted, 2);
    assert!(harness.store.records("demo").is_empty());
}

#[test]
fn test_query_fusion_prefers_entity_match() {
    let harness = harness();
    let cancel = CancelToken::new();

    // Namespace "alpha" holds the chunker; "beta" holds unrelated code
    let alpha_dir = TempDir::new().unwrap();
    init_repo(alpha_dir.path());
    std::fs::write(
        alpha_dir.path().join("chunker.py"),
        "def chunk_file(path):\n    \"\"\"The chunker splits a file into chunks.\"\"\"\n    return []\n",
    )
    .unwrap();
    commit_all(alpha_dir.path(), "alpha");

    let beta_dir = TempDir::new().unwrap();
    init_repo(beta_dir.path());
    std::fs::write(
        beta_dir.path().join("unrelated.py"),
        "def billing_report(month):\n    return month\n",
    )
    .unwrap();
    commit_all(beta_dir.path(), "beta");

    let ingester = harness.service.ingester();
    ingester
        .ingest_repository(&alpha_dir.path().to_string_lossy(), "o/alpha", None, "alpha", &cancel)
        .unwrap();
    ingester
        .ingest_repository(&beta_dir.path().to_string_lossy(), "o/beta", None, "beta", &cancel)
        .unwrap();

    let planner = QueryPlanner::new();
    let query = "where is the chunker?";
    let analysis = planner.analyze(query);
    let namespaces = vec!["alpha".to_owned(), "beta".to_owned()];
    let strategies = planner.plan(&analysis, &namespaces);

    // The plan includes a direct entity search and the semantic baseline
    assert!(strategies.iter().any(|s| s.kind == StrategyKind::DirectEntity));
    assert!(strategies.iter().any(|s| s.kind == StrategyKind::SemanticRepository));

    let executor =
        RetrievalExecutor::new(Arc::clone(harness.service.embedder()), harness.service.store().clone());
    let matches = executor
        .execute(query, &analysis, &strategies, RetrievalOptions::default(), &cancel)
        .unwrap();

    assert!(!matches.is_empty());
    let top = &matches[0];
    assert_eq!(top.hit.metadata.file_path, "chunker.py");
    assert_eq!(top.strategy, StrategyKind::DirectEntity);
}

#[test]
fn test_webhook_to_worker_loop() {
    let harness = harness();
    let cancel = CancelToken::new();

    let repo_dir = TempDir::new().unwrap();
    init_repo(repo_dir.path());
    std::fs::write(repo_dir.path().join("app.py"), PY_FILE).unwrap();
    let commit = commit_all(repo_dir.path(), "initial");

    // A file:// repository URL stands in for the forge
    let url = format!("file://{}", repo_dir.path().to_string_lossy());
    let body = serde_json::json!({
        "repository": { "full_name": url },
        "after": commit,
        "ref": "refs/heads/main",
        "pusher": { "name": "dev" },
    })
    .to_string()
    .into_bytes();

    let secret = harness.service.config().webhook.secret.clone();
    let headers = WebhookHeaders {
        signature: Some(sign_payload(&secret, &body)),
        event: Some("push".to_owned()),
        delivery: Some("delivery-1".to_owned()),
    };

    let receiver = harness.service.webhook_receiver();
    let outcome = receiver.handle(&headers, &body).unwrap();
    assert!(matches!(outcome, WebhookOutcome::Enqueued(_)));

    // Replays of the same delivery are acknowledged without enqueue
    assert!(matches!(receiver.handle(&headers, &body).unwrap(), WebhookOutcome::Duplicate));

    let worker = harness.service.worker();
    assert!(worker.run_once(&cancel).unwrap());
    assert!(!worker.run_once(&cancel).unwrap(), "queue should hold exactly one job");

    let namespace = RepoContext::namespace_for(&url);
    let records = harness.store.records(&namespace);
    assert!(!records.is_empty());
    assert_eq!(harness.store.active_ref(&namespace).unwrap(), Some(commit));
}

#[test]
fn test_archive_snapshot_written() {
    let harness = harness();
    let repo_dir = TempDir::new().unwrap();
    init_repo(repo_dir.path());
    std::fs::write(repo_dir.path().join("app.py"), "def a():\n    return 1\n").unwrap();
    let commit = commit_all(repo_dir.path(), "initial");

    let cancel = CancelToken::new();
    harness
        .service
        .ingester()
        .ingest_repository(&repo_dir.path().to_string_lossy(), "owner/demo", None, "demo", &cancel)
        .unwrap();

    let archive_path = Path::new(&harness.service.config().archive.root)
        .join("archives")
        .join("owner/demo")
        .join(format!("{commit}.json"));
    let body = std::fs::read_to_string(archive_path).unwrap();
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    assert!(!parsed.is_empty());
    assert!(parsed[0].get("id").is_some());
}
