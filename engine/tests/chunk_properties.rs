//! Property-based checks over chunk identity and the chunking engine

use codeloom_engine::chunker::{normalize_line_endings, SemanticChunker};
use codeloom_engine::metadata::{chunk_id, content_sha};
use codeloom_engine::Tokenizer;
use proptest::prelude::*;
use std::sync::Arc;

/// Lines that look vaguely like source code or prose
fn line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("def handler(event):".to_owned()),
        Just("    return compute(event)".to_owned()),
        Just("class Pipeline:".to_owned()),
        Just("import os".to_owned()),
        Just("# a comment".to_owned()),
        "[a-z ]{0,60}",
        "    [a-z_]{1,20} = [a-z_]{1,20}\\([0-9]{1,4}\\)",
    ]
}

fn file_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(line_strategy(), 1..120).prop_map(|lines| {
        let mut text = lines.join("\n");
        text.push('\n');
        text
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Identity is a pure function of its inputs
    #[test]
    fn chunk_id_is_deterministic(
        repo in "[a-z]{1,12}/[a-z]{1,12}",
        commit in "[0-9a-f]{40}",
        path in "[a-z]{1,8}\\.py",
        start in 1u32..5_000,
        len in 0u32..500,
        content in ".{0,200}",
    ) {
        let sha = content_sha(&content);
        let a = chunk_id(&repo, &commit, &path, start, start + len, &sha);
        let b = chunk_id(&repo, &commit, &path, start, start + len, &sha);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), 40);
    }

    /// The content hash does not depend on the line-ending flavor
    #[test]
    fn content_sha_ignores_line_ending_flavor(lines in proptest::collection::vec("[a-z ]{0,40}", 0..40)) {
        let lf = lines.join("\n");
        let crlf = lines.join("\r\n");
        let cr = lines.join("\r");
        let base = content_sha(&normalize_line_endings(&lf));
        prop_assert_eq!(content_sha(&normalize_line_endings(&crlf)), base.clone());
        prop_assert_eq!(content_sha(&normalize_line_endings(&cr)), base);
    }

    /// Concatenating chunk contents in order reproduces the normalized
    /// file exactly (overlap disabled)
    #[test]
    fn chunks_cover_the_file(content in file_strategy()) {
        let chunker = SemanticChunker::new(Arc::new(Tokenizer::new()));
        for path in ["src/sample.py", "notes/sample.md", "misc/sample.unknown"] {
            let chunks = chunker.chunk_file(path, content.as_bytes());
            if content.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
                prop_assert_eq!(&rebuilt, &content, "coverage broken for {}", path);
            }
        }
    }

    /// Every chunk not flagged oversize respects the hard token ceiling
    #[test]
    fn token_bound_holds(content in file_strategy()) {
        let tokenizer = Arc::new(Tokenizer::new());
        let chunker = SemanticChunker::new(Arc::clone(&tokenizer));
        for chunk in chunker.chunk_file("src/sample.py", content.as_bytes()) {
            if !chunk.oversize {
                prop_assert!(tokenizer.count(&chunk.content) <= 2_048);
            }
            prop_assert!(chunk.end_line >= chunk.start_line);
        }
    }
}
