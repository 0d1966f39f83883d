//! Jupyter notebook chunking
//!
//! One chunk per cell. Markdown cells become `markdown_section` chunks,
//! code cells become `cell` chunks. Line numbers index into the
//! concatenated cell sources, since the raw .ipynb JSON framing is not
//! useful retrieval content.

use super::split_lines_by_budget;
use crate::languages::SizeProfile;
use crate::tokenizer::Tokenizer;
use crate::types::{ChunkType, RawChunk};
use serde::Deserialize;

#[derive(Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    #[serde(default)]
    cell_type: String,
    #[serde(default)]
    source: Source,
}

/// Cell source is either a string or a list of line strings
#[derive(Deserialize)]
#[serde(untagged)]
enum Source {
    Lines(Vec<String>),
    Text(String),
}

impl Default for Source {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Source {
    fn text(&self) -> String {
        match self {
            Self::Lines(lines) => lines.concat(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Returns None when the notebook JSON does not parse; the caller then
/// falls back to size-only splitting of the raw text.
pub(super) fn chunk(
    tokenizer: &Tokenizer,
    content: &str,
    profile: SizeProfile,
) -> Option<Vec<RawChunk>> {
    let notebook: Notebook = serde_json::from_str(content).ok()?;

    let mut chunks = Vec::new();
    let mut line = 1u32;

    for (index, cell) in notebook.cells.iter().enumerate() {
        let source = cell.source.text();
        if source.trim().is_empty() {
            continue;
        }

        let line_count = source.lines().count().max(1) as u32;
        let kind = match cell.cell_type.as_str() {
            "markdown" => ChunkType::MarkdownSection,
            _ => ChunkType::Cell,
        };

        if tokenizer.count(&source) > profile.max_tokens {
            let mut parts =
                split_lines_by_budget(tokenizer, &source, profile.max_tokens, line, kind);
            for part in &mut parts {
                part.symbol_name = Some(format!("cell {}", index + 1));
            }
            chunks.extend(parts);
        } else {
            let mut chunk = RawChunk::new(source, line, line + line_count - 1);
            chunk.chunk_type = kind;
            chunk.symbol_name = Some(format!("cell {}", index + 1));
            chunks.push(chunk);
        }

        line += line_count;
    }

    Some(chunks)
}
