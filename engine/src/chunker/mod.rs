//! Semantic chunking of source files
//!
//! Splits a file into ordered, semantically bounded chunks honoring
//! function/class/section boundaries. All language awareness comes from
//! the registry table; this module is the single engine that interprets
//! it. The chunker holds no state across calls and never returns an
//! error: malformed input degrades to size-only splitting with
//! `ChunkType::Fallback`.
//!
//! When overlap is disabled (the default) the concatenated `content` of
//! the emitted chunks reproduces the LF-normalized file exactly.

mod data;
mod markdown;
mod markup;
mod notebook;

use crate::languages::{registry, LanguageSpec, SizeProfile};
use crate::tokenizer::Tokenizer;
use crate::types::{ChunkType, FileType, RawChunk};
use std::sync::Arc;

/// Chunker tuning knobs
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Tokens of trailing context from chunk k prepended to chunk k+1.
    /// 0 disables overlap.
    pub overlap_tokens: u32,
    /// Preview bytes included in summary chunks for small textual files
    pub summary_preview_bytes: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { overlap_tokens: 0, summary_preview_bytes: 500 }
    }
}

/// The language-aware semantic chunker.
///
/// A pure function of (content, extension, config); safe to share across
/// worker threads.
pub struct SemanticChunker {
    tokenizer: Arc<Tokenizer>,
    config: ChunkerConfig,
}

impl SemanticChunker {
    pub fn new(tokenizer: Arc<Tokenizer>) -> Self {
        Self { tokenizer, config: ChunkerConfig::default() }
    }

    pub fn with_config(tokenizer: Arc<Tokenizer>, config: ChunkerConfig) -> Self {
        Self { tokenizer, config }
    }

    /// Chunk a file's raw bytes.
    ///
    /// Binary or undecodable content yields a single summary chunk.
    /// Empty-after-trim content yields no chunks.
    pub fn chunk_file(&self, file_path: &str, bytes: &[u8]) -> Vec<RawChunk> {
        if looks_binary(bytes) {
            return vec![self.summary_chunk(file_path, bytes)];
        }

        let text = String::from_utf8_lossy(bytes);
        let content = normalize_line_endings(&text);

        if content.trim().is_empty() {
            return Vec::new();
        }

        let spec = registry().detect(file_path, &content);
        let complexity = self.tokenizer.estimate_complexity(&content, spec.file_type);
        let profile = spec.profile.scaled(complexity);

        let mut chunks = match (spec.file_type, spec.language) {
            (FileType::Notebook, _) => notebook::chunk(&self.tokenizer, &content, profile)
                .unwrap_or_else(|| self.fallback_chunks(&content, profile)),
            (FileType::Docs, _) => markdown::chunk(&self.tokenizer, &content, profile),
            (FileType::Markup, lang) => markup::chunk(&self.tokenizer, &content, profile, lang),
            (_, "json") | (_, "yaml") => data::chunk(&self.tokenizer, &content, profile),
            (_, "toml") | (_, "ini") => self.config_chunks(&content, profile),
            (_, "csv") => vec![self.tabular_summary(file_path, &content)],
            (FileType::Other, _) => self.fallback_chunks(&content, profile),
            _ => self.code_chunks(&content, spec, profile),
        };

        if self.config.overlap_tokens > 0 {
            self.apply_overlap(&mut chunks);
        }

        chunks
    }

    /// Language-aware line accumulation with unit boundaries.
    ///
    /// Top-level declarations start a new chunk; the first chunk absorbs
    /// any leading imports and comments. Inside a unit the token budget
    /// is enforced by splitting at the most recent blank line.
    fn code_chunks(&self, content: &str, spec: &LanguageSpec, profile: SizeProfile) -> Vec<RawChunk> {
        let max_tokens = profile.max_tokens;
        let mut chunks: Vec<RawChunk> = Vec::new();
        // Enclosing scopes as (name, indent); indentation delimits scope
        // ends across both indent- and brace-style languages in practice
        let mut scopes: Vec<(String, u32)> = Vec::new();
        let mut cur = Accumulator::new(1);

        for (idx, line) in content.split_inclusive('\n').enumerate() {
            let line_no = (idx + 1) as u32;
            let stripped = line.trim_end_matches('\n');
            let body = stripped.trim();
            let indent = indent_width(stripped);

            if !body.is_empty() {
                while scopes.last().is_some_and(|(_, s)| indent <= *s) {
                    scopes.pop();
                }
            }

            let func = spec.match_function(stripped);
            let class = spec.match_class(stripped);
            let is_decl = func.is_some() || class.is_some();

            // A top-level declaration closes the previous unit
            if is_decl && scopes.is_empty() && cur.has_unit && !cur.is_empty() {
                chunks.push(cur.finish());
                cur = Accumulator::new(line_no);
            }

            let line_tokens = self.tokenizer.count(line);

            if cur.tokens + line_tokens > max_tokens && !cur.is_empty() {
                let (done, carry) = cur.split_at_last_blank(&self.tokenizer, line_no);
                chunks.push(done);
                cur = carry;
                if cur.tokens + line_tokens > max_tokens && !cur.is_empty() {
                    let next = cur.continuation(line_no);
                    chunks.push(cur.finish());
                    cur = next;
                }
            }

            if line_tokens > max_tokens && cur.is_empty() {
                // Indivisible lexical unit: emit alone, flag the violation
                let mut oversize = RawChunk::new(line, line_no, line_no);
                oversize.chunk_type = cur.chunk_type;
                oversize.parents = scopes.iter().map(|(n, _)| n.clone()).collect();
                oversize.oversize = true;
                chunks.push(oversize);
                cur = Accumulator::new(line_no + 1);
                continue;
            }

            cur.push(line, line_no, line_tokens);

            if spec.match_import(stripped) {
                cur.imports.push(body.to_owned());
            }

            if let Some(name) = class {
                if !cur.has_unit {
                    cur.begin_unit(
                        ChunkType::Class,
                        qualified(&scopes, &name),
                        scopes.iter().map(|(n, _)| n.clone()).collect(),
                    );
                }
                scopes.push((name, indent));
            } else if let Some(name) = func {
                if !cur.has_unit {
                    let kind = if scopes.is_empty() { ChunkType::Function } else { ChunkType::Method };
                    cur.begin_unit(
                        kind,
                        qualified(&scopes, &name),
                        scopes.iter().map(|(n, _)| n.clone()).collect(),
                    );
                }
                scopes.push((name, indent));
            }
        }

        if !cur.is_empty() {
            chunks.push(cur.finish());
        }

        chunks
    }

    /// Size-only splitting for unknown languages and parse failures
    fn fallback_chunks(&self, content: &str, profile: SizeProfile) -> Vec<RawChunk> {
        split_lines_by_budget(&self.tokenizer, content, profile.max_tokens, 1, ChunkType::Fallback)
    }

    /// TOML/INI: section headers open new blocks
    fn config_chunks(&self, content: &str, profile: SizeProfile) -> Vec<RawChunk> {
        let max_tokens = profile.max_tokens;
        let mut chunks: Vec<RawChunk> = Vec::new();
        let mut cur = Accumulator::new(1);
        cur.chunk_type = ChunkType::ConfigBlock;

        for (idx, line) in content.split_inclusive('\n').enumerate() {
            let line_no = (idx + 1) as u32;
            let body = line.trim();
            let is_section = body.starts_with('[') && body.ends_with(']');

            if is_section && cur.has_unit && !cur.is_empty() {
                chunks.push(cur.finish());
                cur = Accumulator::new(line_no);
                cur.chunk_type = ChunkType::ConfigBlock;
            }

            let line_tokens = self.tokenizer.count(line);
            if cur.tokens + line_tokens > max_tokens && !cur.is_empty() {
                let next = cur.continuation(line_no);
                chunks.push(cur.finish());
                cur = next;
            }

            cur.push(line, line_no, line_tokens);

            if is_section && cur.symbol_name.is_none() {
                cur.has_unit = true;
                cur.symbol_name = Some(body.trim_matches(['[', ']']).to_owned());
            }
        }

        if !cur.is_empty() {
            chunks.push(cur.finish());
        }
        for chunk in &mut chunks {
            chunk.chunk_type = ChunkType::ConfigBlock;
        }
        chunks
    }

    /// Header + first-rows preview for CSV/TSV
    fn tabular_summary(&self, file_path: &str, content: &str) -> RawChunk {
        let mut lines = content.lines();
        let header = lines.next().unwrap_or_default();
        let preview: Vec<&str> = lines.take(5).collect();
        let total = content.lines().count() as u32;

        let summary = format!(
            "Tabular file: {}\nColumns: {}\nRows (showing first {}):\n{}\n",
            file_path,
            header,
            preview.len(),
            preview.join("\n"),
        );

        let mut chunk = RawChunk::new(summary, 1, total.max(1));
        chunk.chunk_type = ChunkType::Fallback;
        chunk
    }

    /// Single summary chunk for binary or unreadable files
    fn summary_chunk(&self, file_path: &str, bytes: &[u8]) -> RawChunk {
        let name = file_path.rsplit('/').next().unwrap_or(file_path);
        let mut summary = format!("File: {}\nSize: {} bytes\n", name, bytes.len());

        if bytes.len() < self.config.summary_preview_bytes * 2 {
            let preview_len = bytes.len().min(self.config.summary_preview_bytes);
            if let Ok(text) = std::str::from_utf8(&bytes[..preview_len]) {
                summary.push_str("Preview:\n");
                summary.push_str(text);
            }
        }

        let mut chunk = RawChunk::new(summary, 1, 1);
        chunk.chunk_type = ChunkType::Fallback;
        chunk
    }

    /// Prepend trailing context of chunk k to chunk k+1
    fn apply_overlap(&self, chunks: &mut [RawChunk]) {
        let budget = self.config.overlap_tokens;
        for i in 1..chunks.len() {
            let prev = &chunks[i - 1];
            let mut taken: Vec<&str> = Vec::new();
            let mut tokens = 0u32;
            for line in prev.content.lines().rev() {
                let t = self.tokenizer.count(line);
                if tokens + t > budget {
                    break;
                }
                tokens += t;
                taken.push(line);
            }
            if !taken.is_empty() {
                taken.reverse();
                chunks[i].context_prefix = Some(taken.join("\n"));
            }
        }
    }
}

/// Accumulates lines into one pending chunk
struct Accumulator {
    content: String,
    start_line: u32,
    end_line: u32,
    tokens: u32,
    chunk_type: ChunkType,
    symbol_name: Option<String>,
    parents: Vec<String>,
    imports: Vec<String>,
    has_unit: bool,
    /// Offset and line number of the last blank line in `content`
    last_blank: Option<(usize, u32)>,
}

impl Accumulator {
    fn new(start_line: u32) -> Self {
        Self {
            content: String::new(),
            start_line,
            end_line: start_line,
            tokens: 0,
            chunk_type: ChunkType::Module,
            symbol_name: None,
            parents: Vec::new(),
            imports: Vec::new(),
            has_unit: false,
            last_blank: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    fn push(&mut self, line: &str, line_no: u32, tokens: u32) {
        if self.content.is_empty() {
            self.start_line = line_no;
        }
        if line.trim().is_empty() {
            self.last_blank = Some((self.content.len() + line.len(), line_no));
        }
        self.content.push_str(line);
        self.end_line = line_no;
        self.tokens += tokens;
    }

    fn begin_unit(&mut self, kind: ChunkType, symbol: String, parents: Vec<String>) {
        self.chunk_type = kind;
        self.symbol_name = Some(symbol);
        self.parents = parents;
        self.has_unit = true;
    }

    /// A fresh accumulator that continues the current unit
    fn continuation(&self, start_line: u32) -> Self {
        let mut next = Self::new(start_line);
        next.chunk_type = self.chunk_type;
        next.symbol_name = self.symbol_name.clone();
        next.parents = self.parents.clone();
        next.has_unit = self.has_unit;
        next
    }

    /// Split the buffer at the last blank line, keeping the remainder
    /// pending. Falls back to emitting the whole buffer.
    fn split_at_last_blank(&mut self, tokenizer: &Tokenizer, next_line: u32) -> (RawChunk, Self) {
        match self.last_blank {
            Some((offset, blank_line)) if offset < self.content.len() => {
                let rest = self.content.split_off(offset);
                let done = RawChunk {
                    content: std::mem::take(&mut self.content),
                    start_line: self.start_line,
                    end_line: blank_line,
                    chunk_type: self.chunk_type,
                    symbol_name: self.symbol_name.clone(),
                    parents: self.parents.clone(),
                    imports: std::mem::take(&mut self.imports),
                    oversize: false,
                    context_prefix: None,
                };
                let mut carry = self.continuation(blank_line + 1);
                carry.tokens = tokenizer.count(&rest);
                carry.end_line = self.end_line;
                carry.content = rest;
                (done, carry)
            }
            _ => {
                let done = self.take_chunk();
                let carry = self.continuation(next_line);
                (done, carry)
            }
        }
    }

    fn take_chunk(&mut self) -> RawChunk {
        RawChunk {
            content: std::mem::take(&mut self.content),
            start_line: self.start_line,
            end_line: self.end_line,
            chunk_type: self.chunk_type,
            symbol_name: self.symbol_name.clone(),
            parents: self.parents.clone(),
            imports: std::mem::take(&mut self.imports),
            oversize: false,
            context_prefix: None,
        }
    }

    fn finish(mut self) -> RawChunk {
        self.take_chunk()
    }
}

/// Split lines greedily by token budget, preserving exact content
pub(super) fn split_lines_by_budget(
    tokenizer: &Tokenizer,
    content: &str,
    max_tokens: u32,
    first_line: u32,
    kind: ChunkType,
) -> Vec<RawChunk> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut start = first_line;
    let mut tokens = 0u32;
    let mut end = first_line;

    for (idx, line) in content.split_inclusive('\n').enumerate() {
        let line_no = first_line + idx as u32;
        let line_tokens = tokenizer.count(line);

        if tokens + line_tokens > max_tokens && !buf.is_empty() {
            let mut chunk = RawChunk::new(std::mem::take(&mut buf), start, end);
            chunk.chunk_type = kind;
            chunks.push(chunk);
            start = line_no;
            tokens = 0;
        }

        if line_tokens > max_tokens && buf.is_empty() {
            let mut chunk = RawChunk::new(line, line_no, line_no);
            chunk.chunk_type = kind;
            chunk.oversize = true;
            chunks.push(chunk);
            start = line_no + 1;
            continue;
        }

        buf.push_str(line);
        tokens += line_tokens;
        end = line_no;
    }

    if !buf.is_empty() {
        let mut chunk = RawChunk::new(buf, start, end);
        chunk.chunk_type = kind;
        chunks.push(chunk);
    }

    chunks
}

fn qualified(scopes: &[(String, u32)], name: &str) -> String {
    if scopes.is_empty() {
        name.to_owned()
    } else {
        let mut parts: Vec<&str> = scopes.iter().map(|(n, _)| n.as_str()).collect();
        parts.push(name);
        parts.join(".")
    }
}

fn indent_width(line: &str) -> u32 {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Normalize CRLF and lone CR to LF
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_owned();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// NUL byte in the head of the file means binary
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8_192).any(|b| *b == 0)
}
