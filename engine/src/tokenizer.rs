//! Token counting and content complexity estimation
//!
//! Token counts use the cl100k_base BPE, the encoding of the embedding
//! provider's tokenizer. The encoding identity is pinned in configuration
//! and asserted at startup; everything downstream (chunk budgets, batch
//! sizing) assumes this one tokenizer.

use crate::types::FileType;
use moka::sync::Cache;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Name of the pinned BPE encoding
pub const ENCODING_NAME: &str = "cl100k_base";

/// Entries kept in the token-count cache
const COUNT_CACHE_CAPACITY: u64 = 8_192;

static BPE: OnceLock<CoreBPE> = OnceLock::new();

fn bpe() -> &'static CoreBPE {
    BPE.get_or_init(|| cl100k_base().expect("Failed to initialize cl100k_base tokenizer"))
}

static DECL_RE: OnceLock<Regex> = OnceLock::new();
static CONTROL_RE: OnceLock<Regex> = OnceLock::new();
static IMPORT_RE: OnceLock<Regex> = OnceLock::new();

fn decl_re() -> &'static Regex {
    DECL_RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:def |class |function |fn |func |(?:public|private|protected)\s+\w)")
            .expect("valid regex")
    })
}

fn control_re() -> &'static Regex {
    CONTROL_RE.get_or_init(|| {
        Regex::new(r"\b(?:if|else|elif|for|while|switch|match|case|try|catch|except|finally)\b")
            .expect("valid regex")
    })
}

fn import_re() -> &'static Regex {
    IMPORT_RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:import\s|from\s+\S+\s+import|use\s+\w|#include\s|require\s*\()")
            .expect("valid regex")
    })
}

/// Token counter with a bounded cache keyed by content hash
pub struct Tokenizer {
    counts: Cache<[u8; 32], u32>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self { counts: Cache::new(COUNT_CACHE_CAPACITY) }
    }

    /// Count tokens under the pinned encoding
    pub fn count(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let key: [u8; 32] = Sha256::digest(text.as_bytes()).into();
        if let Some(cached) = self.counts.get(&key) {
            return cached;
        }

        let count = bpe().encode_ordinary(text).len() as u32;
        self.counts.insert(key, count);
        count
    }

    /// Estimate content complexity in [0.0, 2.0].
    ///
    /// The score only drives chunk-size bounds; it is never surfaced to
    /// users. Weighted counts: declarations x0.1, control-flow keywords
    /// x0.05, imports x0.03, indentation depth x0.01 (capped at 0.2).
    /// Structured data contributes structural depth instead, capped at 0.3.
    pub fn estimate_complexity(&self, text: &str, file_type: FileType) -> f32 {
        if text.trim().is_empty() {
            return 0.0;
        }

        let mut complexity = 0.0f32;

        if matches!(file_type, FileType::Config | FileType::Data) {
            complexity += (structural_depth(text) as f32 * 0.05).min(0.3);
        } else {
            complexity += decl_re().find_iter(text).count() as f32 * 0.1;
            complexity += control_re().find_iter(text).count() as f32 * 0.05;
            complexity += import_re().find_iter(text).count() as f32 * 0.03;
            complexity += (max_indent_depth(text) as f32 * 0.01).min(0.2);
        }

        complexity.clamp(0.0, 2.0)
    }
}

/// Maximum indentation depth in 4-space units
fn max_indent_depth(text: &str) -> u32 {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            let spaces = l.chars().take_while(|c| *c == ' ' || *c == '\t').map(|c| {
                if c == '\t' { 4 } else { 1 }
            });
            spaces.sum::<u32>() / 4
        })
        .max()
        .unwrap_or(0)
}

/// Maximum bracket nesting depth for structured data
fn structural_depth(text: &str) -> u32 {
    let mut depth = 0i32;
    let mut max_depth = 0i32;
    for c in text.chars() {
        match c {
            '{' | '[' | '(' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '}' | ']' | ')' => depth -= 1,
            _ => {}
        }
    }
    max_depth.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_exact() {
        let tokenizer = Tokenizer::new();
        let count = tokenizer.count("def hello():\n    print('Hello, World!')\n");
        assert!(count > 5);
        assert!(count < 30);
    }

    #[test]
    fn test_count_empty() {
        let tokenizer = Tokenizer::new();
        assert_eq!(tokenizer.count(""), 0);
    }

    #[test]
    fn test_count_cached_is_stable() {
        let tokenizer = Tokenizer::new();
        let text = "fn main() { println!(\"hi\"); }";
        assert_eq!(tokenizer.count(text), tokenizer.count(text));
    }

    #[test]
    fn test_complexity_code() {
        let tokenizer = Tokenizer::new();
        let code = "import os\n\ndef a():\n    if True:\n        for x in y:\n            pass\n";
        let score = tokenizer.estimate_complexity(code, FileType::Code);
        assert!(score > 0.0);
        assert!(score <= 2.0);
    }

    #[test]
    fn test_complexity_bounded() {
        let tokenizer = Tokenizer::new();
        let dense: String = "def f():\n    if x:\n        try:\n            pass\n".repeat(100);
        assert!(tokenizer.estimate_complexity(&dense, FileType::Code) <= 2.0);
    }

    #[test]
    fn test_complexity_structured_data() {
        let tokenizer = Tokenizer::new();
        let json = r#"{"a": {"b": {"c": [1, 2, {"d": 3}]}}}"#;
        let score = tokenizer.estimate_complexity(json, FileType::Data);
        assert!(score > 0.0);
        assert!(score <= 0.3 + f32::EPSILON);
    }

    #[test]
    fn test_complexity_empty() {
        let tokenizer = Tokenizer::new();
        assert_eq!(tokenizer.estimate_complexity("   \n", FileType::Code), 0.0);
    }
}
