//! HTML/XML chunking at element granularity
//!
//! Boundaries fall on elements at the current nesting depth; an element
//! that exceeds the token budget splits along its child elements, and a
//! leaf that still exceeds the budget falls back to plain line/byte
//! splitting. Tag depth is tracked textually per line so chunk contents
//! remain exact slices of the file.

use super::split_lines_by_budget;
use crate::languages::SizeProfile;
use crate::tokenizer::Tokenizer;
use crate::types::{ChunkType, RawChunk};
use regex::Regex;
use std::sync::OnceLock;

static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| {
        Regex::new(r"</?([a-zA-Z][\w:-]*)[^>]*?(/?)>|<!--|-->|<!\[CDATA\[|\]\]>")
            .expect("valid regex")
    })
}

/// Elements that never have closing tags in HTML
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

struct TaggedLine<'a> {
    no: u32,
    raw: &'a str,
    depth_before: i32,
    /// First element name opened on this line
    opens: Option<String>,
}

pub(super) fn chunk(
    tokenizer: &Tokenizer,
    content: &str,
    profile: SizeProfile,
    language: &str,
) -> Vec<RawChunk> {
    let kind = if language == "xml" { ChunkType::XmlNode } else { ChunkType::HtmlBlock };
    let lines = scan(content);
    split_depth(tokenizer, &lines, 1, profile.max_tokens, kind)
}

fn split_depth(
    tokenizer: &Tokenizer,
    lines: &[TaggedLine<'_>],
    depth: i32,
    max_tokens: u32,
    kind: ChunkType,
) -> Vec<RawChunk> {
    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.depth_before == depth && l.opens.is_some())
        .map(|(i, _)| i)
        .collect();

    if starts.len() <= 1 {
        let content: String = lines.iter().map(|l| l.raw).collect();
        if tokenizer.count(&content) <= max_tokens {
            let mut chunk = make_chunk(lines, kind);
            chunk.symbol_name = starts
                .first()
                .and_then(|&i| lines[i].opens.clone())
                .or_else(|| lines.iter().find_map(|l| l.opens.clone()));
            return vec![chunk];
        }
        match starts.first() {
            // One oversized element: descend into its children
            Some(_) if depth < 16 => {
                return split_depth(tokenizer, lines, depth + 1, max_tokens, kind);
            }
            // Leaf content: byte-level chunking is the last resort
            _ => {
                let first_line = lines.first().map(|l| l.no).unwrap_or(1);
                return split_lines_by_budget(tokenizer, &content, max_tokens, first_line, kind);
            }
        }
    }

    let mut out = Vec::new();
    let mut pending: Vec<&TaggedLine<'_>> = Vec::new();
    let mut pending_tokens = 0u32;
    let mut pending_symbol: Option<String> = None;

    for (i, &start) in starts.iter().enumerate() {
        let begin = if i == 0 { 0 } else { start };
        let end = starts.get(i + 1).copied().unwrap_or(lines.len());
        let block = &lines[begin..end];
        let text: String = block.iter().map(|l| l.raw).collect();
        let tokens = tokenizer.count(&text);

        if tokens > max_tokens {
            if !pending.is_empty() {
                out.push(make_chunk_refs(&pending, kind, pending_symbol.take()));
                pending.clear();
                pending_tokens = 0;
            }
            out.extend(split_depth(tokenizer, block, depth + 1, max_tokens, kind));
            continue;
        }

        if pending_tokens + tokens > max_tokens && !pending.is_empty() {
            out.push(make_chunk_refs(&pending, kind, pending_symbol.take()));
            pending.clear();
            pending_tokens = 0;
        }

        if pending.is_empty() {
            pending_symbol = lines[start].opens.clone();
        }
        pending.extend(block.iter());
        pending_tokens += tokens;
    }

    if !pending.is_empty() {
        out.push(make_chunk_refs(&pending, kind, pending_symbol));
    }

    out
}

fn make_chunk(lines: &[TaggedLine<'_>], kind: ChunkType) -> RawChunk {
    let refs: Vec<&TaggedLine<'_>> = lines.iter().collect();
    make_chunk_refs(&refs, kind, None)
}

fn make_chunk_refs(lines: &[&TaggedLine<'_>], kind: ChunkType, symbol: Option<String>) -> RawChunk {
    let start = lines.first().map(|l| l.no).unwrap_or(1);
    let end = lines.last().map(|l| l.no).unwrap_or(start);
    let content: String = lines.iter().map(|l| l.raw).collect();
    let mut chunk = RawChunk::new(content, start, end);
    chunk.chunk_type = kind;
    chunk.symbol_name = symbol;
    chunk
}

/// Per-line tag depth scan; comments and CDATA suppress tag counting
fn scan(content: &str) -> Vec<TaggedLine<'_>> {
    let mut lines = Vec::new();
    let mut depth = 0i32;
    let mut in_comment = false;
    let mut in_cdata = false;

    for (idx, raw) in content.split_inclusive('\n').enumerate() {
        let depth_before = depth;
        let mut opens = None;

        for m in tag_re().find_iter(raw) {
            let token = m.as_str();
            match token {
                "<!--" => in_comment = true,
                "-->" => in_comment = false,
                "<![CDATA[" => in_cdata = true,
                "]]>" => in_cdata = false,
                _ if in_comment || in_cdata => {}
                _ => {
                    let caps = tag_re().captures(token).expect("token re-matches");
                    let name = caps.get(1).map(|n| n.as_str().to_lowercase()).unwrap_or_default();
                    let self_closing = caps.get(2).is_some_and(|s| s.as_str() == "/");
                    if token.starts_with("</") {
                        depth -= 1;
                    } else if !self_closing
                        && !VOID_TAGS.contains(&name.as_str())
                        && !token.starts_with("<?")
                        && !token.starts_with("<!")
                    {
                        if opens.is_none() && depth == depth_before {
                            opens = Some(name.clone());
                        }
                        depth += 1;
                    }
                }
            }
        }

        lines.push(TaggedLine { no: (idx + 1) as u32, raw, depth_before, opens });
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = "\
<html>
<head>
<title>Demo</title>
</head>
<body>
<div class=\"main\">
<p>Hello</p>
</div>
</body>
</html>
";

    #[test]
    fn test_element_boundaries() {
        let tokenizer = Tokenizer::new();
        let chunks = chunk(&tokenizer, HTML, SizeProfile { min_tokens: 8, max_tokens: 24 }, "html");
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::HtmlBlock));
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, HTML);
    }

    #[test]
    fn test_small_document_single_chunk() {
        let chunks = chunk(&Tokenizer::new(), HTML, SizeProfile::GENERIC, "html");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_xml_node_type() {
        let xml = "<root>\n<item id=\"1\">a</item>\n<item id=\"2\">b</item>\n</root>\n";
        let chunks = chunk(&Tokenizer::new(), xml, SizeProfile::GENERIC, "xml");
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::XmlNode));
    }

    #[test]
    fn test_oversized_element_splits_on_children() {
        let mut html = String::from("<html>\n<body>\n");
        for i in 0..100 {
            html.push_str(&format!("<section>\n<p>block number {i} with text</p>\n</section>\n"));
        }
        html.push_str("</body>\n</html>\n");
        let tokenizer = Tokenizer::new();
        let chunks = chunk(&tokenizer, &html, SizeProfile { min_tokens: 32, max_tokens: 128 }, "html");
        assert!(chunks.len() > 2);
        for c in &chunks {
            assert!(c.oversize || tokenizer.count(&c.content) <= 128);
        }
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, html);
    }

    #[test]
    fn test_comments_do_not_affect_depth() {
        let html = "<div>\n<!-- <div> not real -->\n<p>x</p>\n</div>\n";
        let chunks = chunk(&Tokenizer::new(), html, SizeProfile::GENERIC, "html");
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, html);
    }
}
