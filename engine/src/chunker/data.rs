//! Structural chunking for JSON and YAML
//!
//! Chunks are keyed by top-level members; oversized members recurse one
//! structural level down, and arrays split at their midpoint. Member
//! blocks are detected textually (bracket depth for JSON, indentation
//! for YAML) so chunk contents remain exact slices of the file.

use super::split_lines_by_budget;
use crate::languages::SizeProfile;
use crate::tokenizer::Tokenizer;
use crate::types::{ChunkType, RawChunk};

/// A source line with its structural position
struct SrcLine<'a> {
    no: u32,
    raw: &'a str,
    indent: u32,
    trimmed: &'a str,
    /// Bracket depth at the start of the line (JSON)
    depth_before: i32,
}

pub(super) fn chunk(tokenizer: &Tokenizer, content: &str, profile: SizeProfile) -> Vec<RawChunk> {
    let lines = scan_lines(content);
    if lines.is_empty() {
        return Vec::new();
    }

    let first = lines.iter().find(|l| !l.trimmed.is_empty());
    let json_like = matches!(first.map(|l| l.trimmed.as_bytes()[0]), Some(b'{') | Some(b'['));

    // A document that does not parse gets size-only fallback splitting
    let parses = if json_like {
        serde_json::from_str::<serde_json::Value>(content).is_ok()
    } else {
        serde_yaml::from_str::<serde_yaml::Value>(content).is_ok()
    };
    if !parses {
        let first_line = lines.first().map(|l| l.no).unwrap_or(1);
        return split_lines_by_budget(tokenizer, content, profile.max_tokens, first_line, ChunkType::Fallback);
    }

    let mut chunks = if json_like {
        split_level(tokenizer, &lines, Level::JsonDepth(1), profile.max_tokens)
    } else {
        split_level(tokenizer, &lines, Level::YamlIndent(0), profile.max_tokens)
    };

    for chunk in &mut chunks {
        if chunk.chunk_type == ChunkType::Fallback {
            continue;
        }
        chunk.chunk_type = ChunkType::ConfigBlock;
    }
    chunks
}

#[derive(Debug, Clone, Copy)]
enum Level {
    JsonDepth(i32),
    YamlIndent(u32),
}

/// Split a run of lines at member boundaries of the given level, packing
/// consecutive members greedily up to the token budget.
fn split_level(
    tokenizer: &Tokenizer,
    lines: &[SrcLine<'_>],
    level: Level,
    max_tokens: u32,
) -> Vec<RawChunk> {
    let starts = member_starts(lines, level);

    // No structure at this level: fall back to plain budget splitting
    if starts.len() <= 1 {
        let content: String = lines.iter().map(|l| l.raw).collect();
        let tokens = tokenizer.count(&content);
        if tokens <= max_tokens {
            return vec![make_chunk(lines, member_key(lines, &starts))];
        }
        let first_line = lines.first().map(|l| l.no).unwrap_or(1);
        return split_lines_by_budget(tokenizer, &content, max_tokens, first_line, ChunkType::Fallback);
    }

    // Block i spans [boundary i, boundary i+1); the preamble before the
    // first boundary attaches to block 0, the tail after the last
    // boundary to the final block
    let mut blocks: Vec<&[SrcLine<'_>]> = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let begin = if i == 0 { 0 } else { start };
        let end = starts.get(i + 1).copied().unwrap_or(lines.len());
        blocks.push(&lines[begin..end]);
    }

    if is_array_level(lines, level) && blocks.len() > 1 {
        // Arrays split at the midpoint, then each half recurses
        let mid = blocks.len() / 2;
        let cut = starts[mid];
        let mut out = split_half(tokenizer, &lines[..cut], level, max_tokens);
        out.extend(split_half(tokenizer, &lines[cut..], level, max_tokens));
        return out;
    }

    let mut out: Vec<RawChunk> = Vec::new();
    let mut pending: Vec<&SrcLine<'_>> = Vec::new();
    let mut pending_tokens = 0u32;
    let mut pending_key: Option<String> = None;

    for block in blocks {
        let text: String = block.iter().map(|l| l.raw).collect();
        let tokens = tokenizer.count(&text);
        let key = block.iter().find(|l| !l.trimmed.is_empty()).and_then(|l| key_of(l.trimmed));

        if tokens > max_tokens {
            if !pending.is_empty() {
                out.push(make_chunk_refs(&pending, pending_key.take()));
                pending.clear();
                pending_tokens = 0;
            }
            out.extend(descend(tokenizer, block, level, max_tokens));
            continue;
        }

        if pending_tokens + tokens > max_tokens && !pending.is_empty() {
            out.push(make_chunk_refs(&pending, pending_key.take()));
            pending.clear();
            pending_tokens = 0;
        }

        if pending.is_empty() {
            pending_key = key;
        }
        pending.extend(block.iter());
        pending_tokens += tokens;
    }

    if !pending.is_empty() {
        out.push(make_chunk_refs(&pending, pending_key));
    }

    out
}

fn split_half(
    tokenizer: &Tokenizer,
    lines: &[SrcLine<'_>],
    level: Level,
    max_tokens: u32,
) -> Vec<RawChunk> {
    let content: String = lines.iter().map(|l| l.raw).collect();
    if tokenizer.count(&content) <= max_tokens {
        vec![make_chunk(lines, None)]
    } else {
        split_level(tokenizer, lines, level, max_tokens)
    }
}

/// Recurse one structural level into an oversized member block
fn descend(
    tokenizer: &Tokenizer,
    block: &[SrcLine<'_>],
    level: Level,
    max_tokens: u32,
) -> Vec<RawChunk> {
    let next = match level {
        Level::JsonDepth(d) => Level::JsonDepth(d + 1),
        Level::YamlIndent(i) => {
            let child = block
                .iter()
                .filter(|l| !l.trimmed.is_empty() && l.indent > i)
                .map(|l| l.indent)
                .min();
            match child {
                Some(indent) => Level::YamlIndent(indent),
                None => {
                    let content: String = block.iter().map(|l| l.raw).collect();
                    let first_line = block.first().map(|l| l.no).unwrap_or(1);
                    return split_lines_by_budget(
                        tokenizer,
                        &content,
                        max_tokens,
                        first_line,
                        ChunkType::Fallback,
                    );
                }
            }
        }
    };
    split_level(tokenizer, block, next, max_tokens)
}

/// Indices of lines starting a member at this level
fn member_starts(lines: &[SrcLine<'_>], level: Level) -> Vec<usize> {
    let mut starts = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.trimmed.is_empty() || line.trimmed.starts_with('#') {
            continue;
        }
        let is_start = match level {
            Level::JsonDepth(d) => {
                line.depth_before == d
                    && (line.trimmed.starts_with('"')
                        || line.trimmed.starts_with('{')
                        || line.trimmed.starts_with('['))
            }
            Level::YamlIndent(indent) => {
                line.indent == indent
                    && (line.trimmed.starts_with("- ")
                        || line.trimmed == "-"
                        || looks_like_yaml_key(line.trimmed))
            }
        };
        if is_start {
            starts.push(i);
        }
    }
    starts
}

/// Whether the boundaries at this level are array items
fn is_array_level(lines: &[SrcLine<'_>], level: Level) -> bool {
    let starts = member_starts(lines, level);
    let Some(&first) = starts.first() else { return false };
    match level {
        Level::JsonDepth(_) => {
            // The enclosing opener decides: scan backwards for '[' / '{'
            // in the lines before the first member
            lines[..first]
                .iter()
                .rev()
                .flat_map(|l| l.trimmed.chars().rev())
                .find(|c| matches!(c, '[' | '{'))
                == Some('[')
        }
        Level::YamlIndent(_) => lines[first].trimmed.starts_with('-'),
    }
}

fn looks_like_yaml_key(trimmed: &str) -> bool {
    match trimmed.split_once(':') {
        Some((key, _)) => !key.is_empty() && !key.contains(' ') || key.ends_with('"'),
        None => false,
    }
}

fn key_of(trimmed: &str) -> Option<String> {
    let (key, _) = trimmed.split_once(':')?;
    let key = key.trim().trim_matches('"').trim_matches('\'');
    if key.is_empty() || key.starts_with('-') {
        None
    } else {
        Some(key.to_owned())
    }
}

fn make_chunk(lines: &[SrcLine<'_>], symbol: Option<String>) -> RawChunk {
    let refs: Vec<&SrcLine<'_>> = lines.iter().collect();
    make_chunk_refs(&refs, symbol)
}

fn make_chunk_refs(lines: &[&SrcLine<'_>], symbol: Option<String>) -> RawChunk {
    let start = lines.first().map(|l| l.no).unwrap_or(1);
    let end = lines.last().map(|l| l.no).unwrap_or(start);
    let content: String = lines.iter().map(|l| l.raw).collect();
    let mut chunk = RawChunk::new(content, start, end);
    chunk.chunk_type = ChunkType::ConfigBlock;
    chunk.symbol_name = symbol;
    chunk
}

fn member_key(lines: &[SrcLine<'_>], starts: &[usize]) -> Option<String> {
    let idx = starts.first().copied()?;
    key_of(lines.get(idx)?.trimmed)
}

/// Precompute line numbers, indentation, and JSON bracket depth
fn scan_lines(content: &str) -> Vec<SrcLine<'_>> {
    let mut lines = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;

    for (idx, raw) in content.split_inclusive('\n').enumerate() {
        let stripped = raw.trim_end_matches('\n');
        let depth_before = depth;

        let mut escaped = false;
        for c in stripped.chars() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' | '[' => depth += 1,
                '}' | ']' => depth -= 1,
                _ => {}
            }
        }
        // Strings do not span lines in well-formed JSON
        in_string = false;

        lines.push(SrcLine {
            no: (idx + 1) as u32,
            raw,
            indent: stripped.chars().take_while(|c| *c == ' ').count() as u32,
            trimmed: stripped.trim(),
            depth_before,
        });
    }

    lines
}
