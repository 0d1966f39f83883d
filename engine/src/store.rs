//! Vector store adapter
//!
//! Idempotent upsert/delete/query over namespaces, one namespace per
//! repository. Two implementations: [`MemoryVectorStore`] for local
//! development and tests, and [`RestVectorStore`] speaking a
//! Pinecone-style REST wire format.
//!
//! The per-namespace `active_ref` pointer is the atomic commit switch:
//! retrieval filters on `ref == active_ref`, so staged vectors never
//! affect answers regardless of their `live` metadata.

use crate::backoff::{Backoff, Transient};
use crate::cancel::CancelToken;
use crate::types::{ChunkRecord, QueryMatch, VectorRecord};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Vectors per upsert request; larger batches are fragmented
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Reserved id of the per-namespace activation pointer
pub const ACTIVE_REF_SENTINEL: &str = "__meta__active_ref";

/// Vector store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),

    #[error("store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("filter not supported by this store: {0}")]
    UnsupportedFilter(String),

    #[error("cancelled")]
    Cancelled,
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

/// Metadata filter algebra.
///
/// `Contains` (substring match) is evaluated natively by the memory
/// store; a REST store that cannot serialize it reports
/// [`StoreError::UnsupportedFilter`] and callers degrade to client-side
/// filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, String),
    Ne(String, String),
    In(String, Vec<String>),
    Contains(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Contains(field.into(), value.into())
    }

    /// Evaluate against a chunk record
    pub fn matches(&self, record: &ChunkRecord) -> bool {
        match self {
            Self::Eq(field, value) => field_value(record, field).as_deref() == Some(value),
            Self::Ne(field, value) => field_value(record, field).as_deref() != Some(value),
            Self::In(field, values) => field_value(record, field)
                .map(|v| values.iter().any(|candidate| *candidate == v))
                .unwrap_or(false),
            Self::Contains(field, needle) => {
                let needle = needle.to_lowercase();
                field_value(record, field)
                    .map(|v| v.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            }
            Self::And(filters) => filters.iter().all(|f| f.matches(record)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }

    /// Whether the filter needs substring support
    pub fn uses_contains(&self) -> bool {
        match self {
            Self::Contains(..) => true,
            Self::And(filters) | Self::Or(filters) => filters.iter().any(|f| f.uses_contains()),
            _ => false,
        }
    }

    /// Serialize to the REST store's filter JSON
    fn to_wire(&self) -> Result<serde_json::Value, StoreError> {
        Ok(match self {
            Self::Eq(field, value) => json!({ field: { "$eq": value } }),
            Self::Ne(field, value) => json!({ field: { "$ne": value } }),
            Self::In(field, values) => json!({ field: { "$in": values } }),
            Self::Contains(field, _) => {
                return Err(StoreError::UnsupportedFilter(format!("substring match on {field}")))
            }
            Self::And(filters) => {
                let parts: Result<Vec<_>, _> = filters.iter().map(|f| f.to_wire()).collect();
                json!({ "$and": parts? })
            }
            Self::Or(filters) => {
                let parts: Result<Vec<_>, _> = filters.iter().map(|f| f.to_wire()).collect();
                json!({ "$or": parts? })
            }
        })
    }
}

/// Metadata fields addressable by filters
fn field_value(record: &ChunkRecord, field: &str) -> Option<String> {
    match field {
        "file_path" => Some(record.file_path.clone()),
        "repository" | "repo_name" => Some(record.repository.clone()),
        "ref" | "commit_sha" => Some(record.commit_sha.clone()),
        "language" => Some(record.language.clone()),
        "file_extension" => Some(record.file_extension.clone()),
        "file_type" => Some(record.file_type.name().to_owned()),
        "chunk_type" => Some(record.chunk_type.name().to_owned()),
        "symbol_name" => record.symbol_name.clone(),
        "content" | "chunk_content" => Some(record.content.clone()),
        "live" => Some(record.live.to_string()),
        "chunk_id" => Some(record.chunk_id.clone()),
        _ => None,
    }
}

/// Per-namespace vector count, as reported by describe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub name: String,
    pub vector_count: usize,
}

/// The opaque vector database: KV-with-ANN-search keyed by
/// (namespace, id)
pub trait VectorStore: Send + Sync {
    /// Idempotent upsert; re-writing identical records is a no-op
    fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
        cancel: &CancelToken,
    ) -> Result<(), StoreError>;

    /// Delete everything matching the filter. A missing namespace is a
    /// no-op, not an error.
    fn delete_by_filter(
        &self,
        namespace: &str,
        filter: &Filter,
        cancel: &CancelToken,
    ) -> Result<(), StoreError>;

    /// Nearest-neighbor search. A missing namespace returns no matches.
    fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
        cancel: &CancelToken,
    ) -> Result<Vec<QueryMatch>, StoreError>;

    /// Enumerate active namespaces with vector counts
    fn describe(&self) -> Result<Vec<NamespaceStats>, StoreError>;

    /// The currently active commit for a namespace
    fn active_ref(&self, namespace: &str) -> Result<Option<String>, StoreError>;

    /// Atomically switch the namespace's active commit
    fn set_active_ref(&self, namespace: &str, commit_sha: &str) -> Result<(), StoreError>;

    /// Best-effort flip of the `live` metadata flag on matching vectors.
    /// The activation pointer, not this flag, is authoritative for
    /// retrieval.
    fn set_live(
        &self,
        namespace: &str,
        filter: &Filter,
        live: bool,
        cancel: &CancelToken,
    ) -> Result<(), StoreError>;

    /// Whether `Filter::Contains` can be pushed down to the store
    fn supports_contains(&self) -> bool;
}

// ---------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------

#[derive(Default)]
struct MemoryNamespace {
    records: HashMap<String, VectorRecord>,
    active_ref: Option<String>,
}

/// In-process store used by local development mode and the test suite
#[derive(Default)]
pub struct MemoryVectorStore {
    namespaces: RwLock<HashMap<String, MemoryNamespace>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot all records of one namespace (test/introspection aid)
    pub fn records(&self, namespace: &str) -> Vec<VectorRecord> {
        self.namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.records.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl VectorStore for MemoryVectorStore {
    fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
        cancel: &CancelToken,
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut namespaces = self.namespaces.write();
        let ns = namespaces.entry(namespace.to_owned()).or_default();
        for record in records {
            ns.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn delete_by_filter(
        &self,
        namespace: &str,
        filter: &Filter,
        cancel: &CancelToken,
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut namespaces = self.namespaces.write();
        if let Some(ns) = namespaces.get_mut(namespace) {
            ns.records.retain(|_, record| !filter.matches(&record.metadata));
        }
        Ok(())
    }

    fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
        cancel: &CancelToken,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let namespaces = self.namespaces.read();
        let Some(ns) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<QueryMatch> = ns
            .records
            .values()
            .filter(|record| filter.map(|f| f.matches(&record.metadata)).unwrap_or(true))
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: cosine(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    fn describe(&self) -> Result<Vec<NamespaceStats>, StoreError> {
        let namespaces = self.namespaces.read();
        let mut stats: Vec<NamespaceStats> = namespaces
            .iter()
            .map(|(name, ns)| NamespaceStats { name: name.clone(), vector_count: ns.records.len() })
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stats)
    }

    fn active_ref(&self, namespace: &str) -> Result<Option<String>, StoreError> {
        Ok(self.namespaces.read().get(namespace).and_then(|ns| ns.active_ref.clone()))
    }

    fn set_active_ref(&self, namespace: &str, commit_sha: &str) -> Result<(), StoreError> {
        let mut namespaces = self.namespaces.write();
        namespaces.entry(namespace.to_owned()).or_default().active_ref =
            Some(commit_sha.to_owned());
        Ok(())
    }

    fn set_live(
        &self,
        namespace: &str,
        filter: &Filter,
        live: bool,
        cancel: &CancelToken,
    ) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut namespaces = self.namespaces.write();
        if let Some(ns) = namespaces.get_mut(namespace) {
            for record in ns.records.values_mut() {
                if filter.matches(&record.metadata) {
                    record.metadata.live = live;
                }
            }
        }
        Ok(())
    }

    fn supports_contains(&self) -> bool {
        true
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ---------------------------------------------------------------------
// REST store
// ---------------------------------------------------------------------

#[derive(Deserialize)]
struct WireQueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireStats {
    #[serde(default)]
    namespaces: HashMap<String, WireNamespaceStats>,
}

#[derive(Deserialize)]
struct WireNamespaceStats {
    #[serde(default, alias = "vectorCount")]
    vector_count: usize,
}

#[derive(Deserialize)]
struct WireFetchResponse {
    #[serde(default)]
    vectors: HashMap<String, WireFetchVector>,
}

#[derive(Deserialize)]
struct WireFetchVector {
    metadata: Option<serde_json::Value>,
}

/// Pinecone-style REST adapter
pub struct RestVectorStore {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    dimension: usize,
    backoff: Backoff,
}

impl RestVectorStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            dimension,
            backoff: Backoff::default(),
        })
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value, StoreError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(StoreError::Request(format!("{status}: {message}")));
            }
            return Err(StoreError::Rejected { status: status.as_u16(), message });
        }

        response.json().map_err(|e| StoreError::Request(e.to_string()))
    }

    fn post_retrying(
        &self,
        path: &str,
        body: &serde_json::Value,
        cancel: &CancelToken,
    ) -> Result<serde_json::Value, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.backoff.retry(cancel, || self.post(path, body))
    }
}

impl VectorStore for RestVectorStore {
    fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
        cancel: &CancelToken,
    ) -> Result<(), StoreError> {
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let vectors: Vec<serde_json::Value> = batch
                .iter()
                .map(|r| json!({ "id": r.id, "values": r.values, "metadata": r.metadata }))
                .collect();
            self.post_retrying(
                "/vectors/upsert",
                &json!({ "namespace": namespace, "vectors": vectors }),
                cancel,
            )?;
        }
        Ok(())
    }

    fn delete_by_filter(
        &self,
        namespace: &str,
        filter: &Filter,
        cancel: &CancelToken,
    ) -> Result<(), StoreError> {
        let wire = filter.to_wire()?;
        let result = self.post_retrying(
            "/vectors/delete",
            &json!({ "namespace": namespace, "filter": wire }),
            cancel,
        );
        match result {
            Ok(_) => Ok(()),
            // First ingestion of a repo: the namespace does not exist yet
            Err(StoreError::Rejected { message, .. })
                if message.to_lowercase().contains("namespace not found") =>
            {
                log::info!("namespace {namespace} absent on delete; skipping");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
        cancel: &CancelToken,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let mut body = json!({
            "namespace": namespace,
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(filter) = filter {
            body["filter"] = filter.to_wire()?;
        }

        let result = self.post_retrying("/query", &body, cancel);
        let value = match result {
            Ok(value) => value,
            Err(StoreError::Rejected { message, .. })
                if message.to_lowercase().contains("namespace not found") =>
            {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let parsed: WireQueryResponse =
            serde_json::from_value(value).map_err(|e| StoreError::Request(e.to_string()))?;

        Ok(parsed
            .matches
            .into_iter()
            .filter(|m| m.id != ACTIVE_REF_SENTINEL)
            .filter_map(|m| {
                let metadata: ChunkRecord = serde_json::from_value(m.metadata?).ok()?;
                Some(QueryMatch { id: m.id, score: m.score, metadata })
            })
            .collect())
    }

    fn describe(&self) -> Result<Vec<NamespaceStats>, StoreError> {
        let value = self.post("/describe_index_stats", &json!({}))?;
        let parsed: WireStats =
            serde_json::from_value(value).map_err(|e| StoreError::Request(e.to_string()))?;
        let mut stats: Vec<NamespaceStats> = parsed
            .namespaces
            .into_iter()
            .map(|(name, ns)| NamespaceStats { name, vector_count: ns.vector_count })
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stats)
    }

    fn active_ref(&self, namespace: &str) -> Result<Option<String>, StoreError> {
        let value = self.post(
            "/vectors/fetch",
            &json!({ "namespace": namespace, "ids": [ACTIVE_REF_SENTINEL] }),
        );
        let value = match value {
            Ok(value) => value,
            Err(StoreError::Rejected { message, .. })
                if message.to_lowercase().contains("namespace not found") =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let parsed: WireFetchResponse =
            serde_json::from_value(value).map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(parsed
            .vectors
            .get(ACTIVE_REF_SENTINEL)
            .and_then(|v| v.metadata.as_ref())
            .and_then(|m| m.get("ref"))
            .and_then(|r| r.as_str())
            .map(String::from))
    }

    fn set_active_ref(&self, namespace: &str, commit_sha: &str) -> Result<(), StoreError> {
        // The pointer is a sentinel vector; a unit first component keeps
        // it valid for stores that reject all-zero vectors
        let mut values = vec![0.0f32; self.dimension];
        if let Some(first) = values.first_mut() {
            *first = 1.0;
        }
        self.post_retrying(
            "/vectors/upsert",
            &json!({
                "namespace": namespace,
                "vectors": [{
                    "id": ACTIVE_REF_SENTINEL,
                    "values": values,
                    "metadata": { "ref": commit_sha },
                }],
            }),
            &CancelToken::new(),
        )?;
        Ok(())
    }

    fn set_live(
        &self,
        namespace: &str,
        _filter: &Filter,
        _live: bool,
        _cancel: &CancelToken,
    ) -> Result<(), StoreError> {
        // Metadata updates by filter are not part of the wire protocol;
        // the activation pointer remains authoritative and prior-commit
        // vectors are removed by delete_by_filter afterwards.
        log::debug!("set_live is advisory on the REST store (namespace {namespace})");
        Ok(())
    }

    fn supports_contains(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkSignals, ChunkType, FileType};

    fn record(id: &str, path: &str, commit: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_owned(),
            values,
            metadata: ChunkRecord {
                chunk_id: id.to_owned(),
                content_sha: "sha".to_owned(),
                repository: "owner/demo".to_owned(),
                commit_sha: commit.to_owned(),
                file_path: path.to_owned(),
                line_start: 1,
                line_end: 2,
                content: "def a(): pass".to_owned(),
                language: "python".to_owned(),
                file_extension: "py".to_owned(),
                file_type: FileType::Code,
                chunk_type: ChunkType::Function,
                symbol_name: Some("a".to_owned()),
                parents: Vec::new(),
                imports: Vec::new(),
                signals: ChunkSignals::default(),
                live: false,
                timestamp_last_modified: chrono::Utc::now(),
                summary: String::new(),
                tags: Vec::new(),
                violations: Vec::new(),
            },
        }
    }

    #[test]
    fn test_upsert_idempotent() {
        let store = MemoryVectorStore::new();
        let cancel = CancelToken::new();
        let records = vec![record("id1", "a.py", "c1", vec![1.0, 0.0])];

        store.upsert("ns", &records, &cancel).unwrap();
        store.upsert("ns", &records, &cancel).unwrap();
        assert_eq!(store.records("ns").len(), 1);
    }

    #[test]
    fn test_delete_by_file_path() {
        let store = MemoryVectorStore::new();
        let cancel = CancelToken::new();
        store
            .upsert(
                "ns",
                &[
                    record("id1", "a.py", "c1", vec![1.0, 0.0]),
                    record("id2", "b.py", "c1", vec![0.0, 1.0]),
                ],
                &cancel,
            )
            .unwrap();

        store.delete_by_filter("ns", &Filter::eq("file_path", "a.py"), &cancel).unwrap();
        let remaining = store.records("ns");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].metadata.file_path, "b.py");
    }

    #[test]
    fn test_delete_missing_namespace_is_noop() {
        let store = MemoryVectorStore::new();
        let result =
            store.delete_by_filter("ghost", &Filter::eq("file_path", "x"), &CancelToken::new());
        assert!(result.is_ok());
    }

    #[test]
    fn test_query_missing_namespace_empty() {
        let store = MemoryVectorStore::new();
        let matches = store.query("ghost", &[1.0, 0.0], 5, None, &CancelToken::new()).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_query_ranks_by_similarity() {
        let store = MemoryVectorStore::new();
        let cancel = CancelToken::new();
        store
            .upsert(
                "ns",
                &[
                    record("near", "a.py", "c1", vec![1.0, 0.0]),
                    record("far", "b.py", "c1", vec![0.0, 1.0]),
                ],
                &cancel,
            )
            .unwrap();

        let matches = store.query("ns", &[1.0, 0.1], 2, None, &cancel).unwrap();
        assert_eq!(matches[0].id, "near");
        assert!(matches[0].score > matches[1].score);
    }

    #[test]
    fn test_query_with_ref_filter() {
        let store = MemoryVectorStore::new();
        let cancel = CancelToken::new();
        store
            .upsert(
                "ns",
                &[
                    record("old", "a.py", "c1", vec![1.0, 0.0]),
                    record("new", "a.py", "c2", vec![1.0, 0.0]),
                ],
                &cancel,
            )
            .unwrap();

        let matches =
            store.query("ns", &[1.0, 0.0], 10, Some(&Filter::eq("ref", "c2")), &cancel).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "new");
    }

    #[test]
    fn test_active_ref_pointer() {
        let store = MemoryVectorStore::new();
        assert_eq!(store.active_ref("ns").unwrap(), None);
        store.set_active_ref("ns", "c2").unwrap();
        assert_eq!(store.active_ref("ns").unwrap(), Some("c2".to_owned()));
    }

    #[test]
    fn test_set_live_by_filter() {
        let store = MemoryVectorStore::new();
        let cancel = CancelToken::new();
        store.upsert("ns", &[record("id1", "a.py", "c1", vec![1.0])], &cancel).unwrap();
        store.set_live("ns", &Filter::eq("ref", "c1"), true, &cancel).unwrap();
        assert!(store.records("ns")[0].metadata.live);
    }

    #[test]
    fn test_contains_filter() {
        let record = record("id1", "src/chunker.py", "c1", vec![1.0]);
        assert!(Filter::contains("file_path", "chunker").matches(&record.metadata));
        assert!(!Filter::contains("file_path", "planner").matches(&record.metadata));
    }

    #[test]
    fn test_filter_wire_serialization() {
        let filter = Filter::And(vec![
            Filter::eq("file_path", "a.py"),
            Filter::ne("ref", "c1"),
        ]);
        let wire = filter.to_wire().unwrap();
        assert_eq!(wire["$and"][0]["file_path"]["$eq"], "a.py");
        assert_eq!(wire["$and"][1]["ref"]["$ne"], "c1");
    }

    #[test]
    fn test_contains_not_serializable() {
        let filter = Filter::contains("content", "foo");
        assert!(matches!(filter.to_wire(), Err(StoreError::UnsupportedFilter(_))));
        assert!(filter.uses_contains());
    }

    #[test]
    fn test_describe() {
        let store = MemoryVectorStore::new();
        let cancel = CancelToken::new();
        store.upsert("alpha", &[record("id1", "a.py", "c1", vec![1.0])], &cancel).unwrap();
        store.upsert("beta", &[record("id2", "b.py", "c1", vec![1.0])], &cancel).unwrap();

        let stats = store.describe().unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "alpha");
        assert_eq!(stats[0].vector_count, 1);
    }
}
