//! Metadata assembly for chunk records
//!
//! Combines chunker output with repository context into the canonical
//! chunk record: stable identity (content sha + chunk id), quality
//! signals, and derived summary/tags. Identity is always recomputed
//! here, never trusted from input.

use crate::tokenizer::Tokenizer;
use crate::types::{ChunkRecord, ChunkSignals, FileType, RawChunk, RepoContext};
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};

static CONTROL_FLOW_RE: OnceLock<Regex> = OnceLock::new();
static DOCSTRING_RE: OnceLock<Regex> = OnceLock::new();
static ERROR_RE: OnceLock<Regex> = OnceLock::new();
static LOGGING_RE: OnceLock<Regex> = OnceLock::new();
static VALIDATION_RE: OnceLock<Regex> = OnceLock::new();

fn control_flow_re() -> &'static Regex {
    CONTROL_FLOW_RE.get_or_init(|| {
        Regex::new(r"\b(?:if|elif|else if|for|while|case|when|catch|except|and|or)\b|&&|\|\||\?")
            .expect("valid regex")
    })
}

fn docstring_re() -> &'static Regex {
    DOCSTRING_RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*(?:///|//!|"{3}|'{3}|/\*\*)"#).expect("valid regex")
    })
}

fn error_re() -> &'static Regex {
    ERROR_RE.get_or_init(|| {
        Regex::new(r"\b(?:try|catch|except|finally|rescue|panic|Result|unwrap_or|raise|throw)\b")
            .expect("valid regex")
    })
}

fn logging_re() -> &'static Regex {
    LOGGING_RE.get_or_init(|| {
        Regex::new(r"\b(?:log(?:ger)?\s*[.:]|console\.(?:log|warn|error)|print(?:ln)?[!(]|tracing::|eprintln!)")
            .expect("valid regex")
    })
}

fn validation_re() -> &'static Regex {
    VALIDATION_RE.get_or_init(|| {
        Regex::new(r"\b(?:validate|assert|is_valid|check_|ensure|require)\w*\b|\bif\s+not\s")
            .expect("valid regex")
    })
}

/// sha256 hex of LF-normalized content
pub fn content_sha(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// The stable chunk identity:
/// `sha1(repository|ref|file_path|line_start:line_end|content_sha)`
pub fn chunk_id(
    repository: &str,
    commit_sha: &str,
    file_path: &str,
    line_start: u32,
    line_end: u32,
    content_sha: &str,
) -> String {
    let key = format!("{repository}|{commit_sha}|{file_path}|{line_start}:{line_end}|{content_sha}");
    hex::encode(Sha1::digest(key.as_bytes()))
}

/// Builds canonical chunk records from raw chunker output
pub struct MetadataAssembler {
    tokenizer: Arc<Tokenizer>,
}

impl MetadataAssembler {
    pub fn new(tokenizer: Arc<Tokenizer>) -> Self {
        Self { tokenizer }
    }

    /// Assemble the canonical record for one raw chunk.
    ///
    /// `live` reflects the staging state of the in-flight commit;
    /// activation flips it separately.
    pub fn assemble(
        &self,
        repo: &RepoContext,
        file_path: &str,
        language: &str,
        file_type: FileType,
        raw: RawChunk,
        live: bool,
    ) -> ChunkRecord {
        let sha = content_sha(&raw.content);
        let id = chunk_id(&repo.repository, &repo.commit_sha, file_path, raw.start_line, raw.end_line, &sha);

        let signals = self.signals(&raw.content);
        let mut violations = Vec::new();
        if raw.oversize {
            violations.push("token_count exceeds profile maximum for an indivisible unit".to_owned());
        }
        if raw.end_line < raw.start_line {
            violations.push(format!("line range inverted: {}..{}", raw.start_line, raw.end_line));
        }

        let summary = match &raw.symbol_name {
            Some(symbol) => format!(
                "Chunk from {} containing {} {}",
                file_path,
                raw.chunk_type.name(),
                symbol
            ),
            None => format!("Chunk from {} containing {}", file_path, raw.chunk_type.name()),
        };

        let file_extension = file_path
            .rsplit('.')
            .next()
            .filter(|e| *e != file_path && !e.contains('/'))
            .unwrap_or("")
            .to_owned();

        ChunkRecord {
            chunk_id: id,
            content_sha: sha,
            repository: repo.repository.clone(),
            commit_sha: repo.commit_sha.clone(),
            file_path: file_path.to_owned(),
            line_start: raw.start_line,
            line_end: raw.end_line,
            content: raw.content,
            language: language.to_owned(),
            file_extension,
            file_type,
            chunk_type: raw.chunk_type,
            symbol_name: raw.symbol_name,
            parents: raw.parents,
            imports: raw.imports,
            signals,
            live,
            timestamp_last_modified: chrono::Utc::now(),
            tags: vec![language.to_owned(), raw.chunk_type.name().to_owned()],
            summary,
            violations,
        }
    }

    fn signals(&self, content: &str) -> ChunkSignals {
        let total_lines = content.lines().count().max(1);
        let comment_lines = content
            .lines()
            .filter(|l| {
                let t = l.trim();
                t.starts_with("//")
                    || t.starts_with('#')
                    || t.starts_with("* ")
                    || t.starts_with("/*")
                    || t.starts_with("<!--")
                    || t.starts_with("--")
            })
            .count();

        let nesting_depth = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                l.chars()
                    .take_while(|c| *c == ' ' || *c == '\t')
                    .map(|c| if c == '\t' { 4u32 } else { 1 })
                    .sum::<u32>()
                    / 4
            })
            .max()
            .unwrap_or(0);

        ChunkSignals {
            token_count: self.tokenizer.count(content),
            content_length: content.len() as u32,
            cyclomatic_complexity: control_flow_re().find_iter(content).count() as u32 + 1,
            nesting_depth,
            has_docstring: docstring_re().is_match(content),
            has_error_handling: error_re().is_match(content),
            has_logging: logging_re().is_match(content),
            has_validation: validation_re().is_match(content),
            comment_ratio: comment_lines as f32 / total_lines as f32,
        }
    }
}
