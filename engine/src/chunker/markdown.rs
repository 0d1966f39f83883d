//! Markdown and plain-text documentation chunking
//!
//! Sections are delimited by heading lines. Oversized sections split at
//! blank lines, then list items, then sentence boundaries, then
//! arbitrary line boundaries as the last resort. The ancestor heading
//! chain is carried in `parents`.

use crate::languages::SizeProfile;
use crate::tokenizer::Tokenizer;
use crate::types::{ChunkType, RawChunk};
use regex::Regex;
use std::sync::OnceLock;

static HEADING_RE: OnceLock<Regex> = OnceLock::new();
static LIST_ITEM_RE: OnceLock<Regex> = OnceLock::new();
static SENTENCE_RE: OnceLock<Regex> = OnceLock::new();

fn heading_re() -> &'static Regex {
    HEADING_RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("valid regex"))
}

fn list_item_re() -> &'static Regex {
    LIST_ITEM_RE.get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d+\.)\s+").expect("valid regex"))
}

fn sentence_re() -> &'static Regex {
    SENTENCE_RE.get_or_init(|| Regex::new(r"[.!?]\s+").expect("valid regex"))
}

pub(super) fn chunk(tokenizer: &Tokenizer, content: &str, profile: SizeProfile) -> Vec<RawChunk> {
    let max_tokens = profile.max_tokens;
    let mut chunks: Vec<RawChunk> = Vec::new();
    // Ancestor headings as (level, title)
    let mut heading_stack: Vec<(u8, String)> = Vec::new();
    let mut section = Section::new(1);

    for (idx, line) in content.split_inclusive('\n').enumerate() {
        let line_no = (idx + 1) as u32;
        let stripped = line.trim_end_matches('\n');

        if let Some(caps) = heading_re().captures(stripped) {
            if !section.is_empty() {
                section.flush(tokenizer, max_tokens, &mut chunks);
            }
            let level = caps[1].len() as u8;
            let title = caps[2].trim().to_owned();
            while heading_stack.last().is_some_and(|(l, _)| *l >= level) {
                heading_stack.pop();
            }
            section = Section::new(line_no);
            section.title = Some(title.clone());
            section.parents = heading_stack.iter().map(|(_, t)| t.clone()).collect();
            heading_stack.push((level, title));
        }

        section.push(line, line_no);
    }

    if !section.is_empty() {
        section.flush(tokenizer, max_tokens, &mut chunks);
    }

    chunks
}

/// One heading-delimited section, pending emission
struct Section {
    lines: Vec<(u32, String)>,
    start_line: u32,
    title: Option<String>,
    parents: Vec<String>,
}

impl Section {
    fn new(start_line: u32) -> Self {
        Self { lines: Vec::new(), start_line, title: None, parents: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn push(&mut self, line: &str, line_no: u32) {
        if self.lines.is_empty() {
            self.start_line = line_no;
        }
        self.lines.push((line_no, line.to_owned()));
    }

    /// Emit the section, splitting when it exceeds the budget
    fn flush(&mut self, tokenizer: &Tokenizer, max_tokens: u32, out: &mut Vec<RawChunk>) {
        let lines = std::mem::take(&mut self.lines);
        let mut buf: Vec<(u32, String)> = Vec::new();
        let mut tokens = 0u32;
        // Cut candidates inside `buf`: position after the last blank
        // line, and after the line preceding the last list-item start
        let mut last_blank: Option<usize> = None;
        let mut last_list: Option<usize> = None;

        for (line_no, line) in lines {
            let line_tokens = tokenizer.count(&line);

            if tokens + line_tokens > max_tokens && !buf.is_empty() {
                let cut = last_blank
                    .or(last_list)
                    .filter(|c| *c > 0 && *c < buf.len())
                    .unwrap_or(buf.len());
                let rest = buf.split_off(cut);
                self.emit(std::mem::take(&mut buf), out);
                buf = rest;
                tokens = buf.iter().map(|(_, l)| tokenizer.count(l)).sum();
                last_blank = None;
                last_list = None;
            }

            if line_tokens > max_tokens && buf.is_empty() {
                self.emit_long_line(tokenizer, max_tokens, line_no, &line, out);
                continue;
            }

            if line.trim().is_empty() {
                last_blank = Some(buf.len() + 1);
            } else if list_item_re().is_match(&line) {
                last_list = Some(buf.len());
            }
            buf.push((line_no, line));
            tokens += line_tokens;
        }

        if !buf.is_empty() {
            self.emit(buf, out);
        }
    }

    fn emit(&self, lines: Vec<(u32, String)>, out: &mut Vec<RawChunk>) {
        let Some(&(start, _)) = lines.first() else { return };
        let end = lines.last().map(|(n, _)| *n).unwrap_or(start);
        let content: String = lines.into_iter().map(|(_, l)| l).collect();

        let mut chunk = RawChunk::new(content, start, end);
        chunk.chunk_type = ChunkType::MarkdownSection;
        chunk.symbol_name = self.title.clone();
        chunk.parents = self.parents.clone();
        out.push(chunk);
    }

    /// Sentence-boundary splitting for one line over the budget, falling
    /// back to fixed character windows. Pieces share the line number and
    /// concatenate back to the original line.
    fn emit_long_line(
        &self,
        tokenizer: &Tokenizer,
        max_tokens: u32,
        line_no: u32,
        line: &str,
        out: &mut Vec<RawChunk>,
    ) {
        let mut pieces: Vec<&str> = Vec::new();
        let mut prev = 0usize;
        for m in sentence_re().find_iter(line) {
            pieces.push(&line[prev..m.end()]);
            prev = m.end();
        }
        if prev < line.len() {
            pieces.push(&line[prev..]);
        }

        let mut acc = String::new();
        let mut flush_acc = |acc: &mut String, out: &mut Vec<RawChunk>| {
            if acc.is_empty() {
                return;
            }
            let mut chunk = RawChunk::new(std::mem::take(acc), line_no, line_no);
            chunk.chunk_type = ChunkType::MarkdownSection;
            chunk.symbol_name = self.title.clone();
            chunk.parents = self.parents.clone();
            out.push(chunk);
        };

        for piece in pieces {
            if tokenizer.count(piece) > max_tokens {
                flush_acc(&mut acc, out);
                for window in char_windows(piece, 3_000) {
                    let mut chunk = RawChunk::new(window, line_no, line_no);
                    chunk.chunk_type = ChunkType::MarkdownSection;
                    chunk.symbol_name = self.title.clone();
                    chunk.parents = self.parents.clone();
                    chunk.oversize = tokenizer.count(&chunk.content) > max_tokens;
                    out.push(chunk);
                }
                continue;
            }
            if !acc.is_empty() && tokenizer.count(&acc) + tokenizer.count(piece) > max_tokens {
                flush_acc(&mut acc, out);
            }
            acc.push_str(piece);
        }
        flush_acc(&mut acc, out);
    }
}

/// Fixed-size character windows on UTF-8 boundaries
fn char_windows(text: &str, window: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::with_capacity(window);
    for c in text.chars() {
        if current.len() + c.len_utf8() > window {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
