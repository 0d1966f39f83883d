//! Core type definitions for Codeloom

use serde::{Deserialize, Serialize};

/// Broad classification of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Code,
    Docs,
    Config,
    Notebook,
    Markup,
    Data,
    Other,
}

impl FileType {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Docs => "docs",
            Self::Config => "config",
            Self::Notebook => "notebook",
            Self::Markup => "markup",
            Self::Data => "data",
            Self::Other => "other",
        }
    }
}

/// Structural kind of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Function,
    Class,
    Method,
    Module,
    MarkdownSection,
    ConfigBlock,
    Cell,
    HtmlBlock,
    XmlNode,
    Fallback,
}

impl ChunkType {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::Module => "module",
            Self::MarkdownSection => "markdown_section",
            Self::ConfigBlock => "config_block",
            Self::Cell => "cell",
            Self::HtmlBlock => "html_block",
            Self::XmlNode => "xml_node",
            Self::Fallback => "fallback",
        }
    }
}

/// Quality and ranking signals computed from chunk content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkSignals {
    /// Token count under the pinned tokenizer
    pub token_count: u32,
    /// Content length in bytes
    pub content_length: u32,
    /// Control-flow branch count + 1
    pub cyclomatic_complexity: u32,
    /// Maximum indentation/brace nesting depth
    pub nesting_depth: u32,
    pub has_docstring: bool,
    pub has_error_handling: bool,
    pub has_logging: bool,
    pub has_validation: bool,
    /// Comment lines / total lines
    pub comment_ratio: f32,
}

/// Chunker output before identity and signals are attached.
///
/// Line numbers are 1-based and inclusive. `content` holds the exact
/// LF-normalized slice of the file covering those lines.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    pub chunk_type: ChunkType,
    /// Qualified symbol name, if the chunk opens with a declaration
    pub symbol_name: Option<String>,
    /// Enclosing scopes, ordered outer to inner
    pub parents: Vec<String>,
    /// Textual import statements seen in the chunk
    pub imports: Vec<String>,
    /// Set when a single indivisible unit exceeded the token budget
    pub oversize: bool,
    /// Trailing tokens of the previous chunk, prepended as plain context
    /// when overlap is enabled. Never counted in token_count.
    pub context_prefix: Option<String>,
}

impl RawChunk {
    pub fn new(content: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            content: content.into(),
            start_line,
            end_line,
            chunk_type: ChunkType::Fallback,
            symbol_name: None,
            parents: Vec::new(),
            imports: Vec::new(),
            oversize: false,
            context_prefix: None,
        }
    }

    /// Line count covered by this chunk
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Repository-level context for an ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoContext {
    /// Repository identifier (e.g. "modelearth/codechat")
    pub repository: String,
    /// Commit SHA the content was read at
    pub commit_sha: String,
    /// Vector store namespace (one per repository)
    pub namespace: String,
}

impl RepoContext {
    pub fn new(
        repository: impl Into<String>,
        commit_sha: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            commit_sha: commit_sha.into(),
            namespace: namespace.into(),
        }
    }

    /// Derive the conventional namespace from a repository name
    /// ("owner/repo" -> "repo")
    pub fn namespace_for(repository: &str) -> String {
        repository.rsplit('/').next().unwrap_or(repository).to_owned()
    }
}

/// The canonical chunk record persisted as vector metadata.
///
/// String fields are stored unescaped; `content` is verbatim after LF
/// normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    // Identity
    pub chunk_id: String,
    pub content_sha: String,
    pub repository: String,
    #[serde(rename = "ref")]
    pub commit_sha: String,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,

    // Content
    pub content: String,
    pub language: String,
    pub file_extension: String,
    pub file_type: FileType,

    // Structure
    pub chunk_type: ChunkType,
    pub symbol_name: Option<String>,
    pub parents: Vec<String>,
    pub imports: Vec<String>,

    // Signals
    #[serde(flatten)]
    pub signals: ChunkSignals,

    // Lifecycle
    pub live: bool,
    pub timestamp_last_modified: chrono::DateTime<chrono::Utc>,

    // Derived context
    pub summary: String,
    pub tags: Vec<String>,

    /// Invariant violations recorded at assembly (oversize units etc.)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

/// A vector plus its metadata, as written to the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkRecord,
}

/// A single query hit returned by the vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkRecord,
}

/// File change status from a git diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

impl ChangeStatus {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::Added),
            'M' => Some(Self::Modified),
            'D' => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Single-letter form used in journals and plans
    pub fn letter(&self) -> &'static str {
        match self {
            Self::Added => "A",
            Self::Modified => "M",
            Self::Deleted => "D",
        }
    }
}

/// One entry of an A/M/D file plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub status: ChangeStatus,
    pub file_path: String,
}

impl PlannedChange {
    pub fn new(status: ChangeStatus, file_path: impl Into<String>) -> Self {
        Self { status, file_path: file_path.into() }
    }
}

/// An ingestion job as carried on the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestJob {
    pub repository: String,
    pub commit_sha: String,
    pub pusher: String,
    pub namespace: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_for() {
        assert_eq!(RepoContext::namespace_for("modelearth/codechat"), "codechat");
        assert_eq!(RepoContext::namespace_for("standalone"), "standalone");
    }

    #[test]
    fn test_chunk_type_names() {
        assert_eq!(ChunkType::MarkdownSection.name(), "markdown_section");
        assert_eq!(ChunkType::Fallback.name(), "fallback");
    }

    #[test]
    fn test_raw_chunk_line_count() {
        let chunk = RawChunk::new("a\nb\n", 10, 11);
        assert_eq!(chunk.line_count(), 2);
    }

    #[test]
    fn test_change_status_roundtrip() {
        assert_eq!(ChangeStatus::from_char('A'), Some(ChangeStatus::Added));
        assert_eq!(ChangeStatus::Modified.letter(), "M");
        assert_eq!(ChangeStatus::from_char('R'), None);
    }
}
