//! Answer composition
//!
//! Builds the LLM context from fused matches and renders the final
//! answer. The system prompt constrains the model to the retrieved
//! context; when retrieval comes back empty the composer answers
//! directly without an LLM round-trip.

use crate::query::executor::RankedMatch;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fixed delimiter between context blocks
const BLOCK_DELIMITER: &str = "\n\n---\n\n";

/// The exact escape phrase the model must use on insufficient context
pub const NOT_AVAILABLE: &str = "The answer is not available in the indexed codebase.";

const SYSTEM_PROMPT: &str = "\
You are a helpful, professional AI assistant supporting developers in \
exploring a large, multi-repository codebase.

You will receive a developer's question and a set of content snippets \
retrieved from indexed files (code or documentation). Each snippet names \
its source file and repository.

Rules:
- Ground your response strictly in the provided context.
- Do not assume or fabricate implementation details that are not present.
- If the context includes partial logic, say what is provided and what is not.
- Reference file paths to help locate sources.
- Format the response with clear paragraphs or bullet points.
- If the answer is not available in the context, reply exactly: \
\"The answer is not available in the indexed codebase.\"";

/// Composition errors
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// The opaque answer-synthesis model
pub trait LlmClient: Send + Sync {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ComposeError>;
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// REST client speaking the common chat-completions wire shape
pub struct HttpLlmClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpLlmClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ComposeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ComposeError::Request(e.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), api_key: api_key.into(), model: model.into() })
    }
}

impl LlmClient for HttpLlmClient {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ComposeError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": prompt },
                ],
            }))
            .send()
            .map_err(|e| ComposeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(ComposeError::Rejected { status: status.as_u16(), message });
        }

        let parsed: ChatResponse =
            response.json().map_err(|e| ComposeError::Request(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ComposeError::Request("LLM returned no choices".to_owned()))
    }
}

/// Builds context and renders the final answer
pub struct AnswerComposer {
    llm: Arc<dyn LlmClient>,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Compose an answer from fused matches. The footer lists the
    /// repositories searched and the number of results used.
    pub fn compose(
        &self,
        query: &str,
        matches: &[RankedMatch],
        repositories_searched: &[String],
    ) -> Result<String, ComposeError> {
        if matches.is_empty() {
            return Ok(format!(
                "{NOT_AVAILABLE}{}",
                footer(repositories_searched, 0)
            ));
        }

        let context = build_context(matches);
        let prompt = format!("**Question:**\n{query}\n\n**Context:**\n{context}");

        let answer = self.llm.complete(SYSTEM_PROMPT, &prompt)?;
        Ok(format!("{answer}{}", footer(repositories_searched, matches.len())))
    }
}

/// One block per match, separated by the fixed delimiter
fn build_context(matches: &[RankedMatch]) -> String {
    matches
        .iter()
        .map(|m| {
            format!(
                "File: {}\nRepository: {}\n\n{}",
                m.hit.metadata.file_path, m.hit.metadata.repository, m.hit.metadata.content
            )
        })
        .collect::<Vec<_>>()
        .join(BLOCK_DELIMITER)
}

fn footer(repositories: &[String], results_used: usize) -> String {
    format!(
        "\n\n---\nSearched {} repositor{}: {} | {} result{} used",
        repositories.len(),
        if repositories.len() == 1 { "y" } else { "ies" },
        if repositories.is_empty() { "none".to_owned() } else { repositories.join(", ") },
        results_used,
        if results_used == 1 { "" } else { "s" },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::executor::RankedMatch;
    use crate::query::StrategyKind;
    use crate::types::{ChunkRecord, ChunkSignals, ChunkType, FileType, QueryMatch};

    struct EchoLlm;

    impl LlmClient for EchoLlm {
        fn complete(&self, _system: &str, prompt: &str) -> Result<String, ComposeError> {
            Ok(format!("ANSWER<<{}>>", prompt.len()))
        }
    }

    fn ranked(path: &str, repo: &str, content: &str) -> RankedMatch {
        RankedMatch {
            hit: QueryMatch {
                id: path.to_owned(),
                score: 0.9,
                metadata: ChunkRecord {
                    chunk_id: path.to_owned(),
                    content_sha: String::new(),
                    repository: repo.to_owned(),
                    commit_sha: "c".to_owned(),
                    file_path: path.to_owned(),
                    line_start: 1,
                    line_end: 2,
                    content: content.to_owned(),
                    language: "python".to_owned(),
                    file_extension: "py".to_owned(),
                    file_type: FileType::Code,
                    chunk_type: ChunkType::Function,
                    symbol_name: None,
                    parents: Vec::new(),
                    imports: Vec::new(),
                    signals: ChunkSignals::default(),
                    live: true,
                    timestamp_last_modified: chrono::Utc::now(),
                    summary: String::new(),
                    tags: Vec::new(),
                    violations: Vec::new(),
                },
            },
            strategy: StrategyKind::SemanticRepository,
            confidence: 0.7,
            score: 0.63,
        }
    }

    #[test]
    fn test_context_blocks() {
        let matches =
            vec![ranked("a.py", "o/alpha", "def a(): pass"), ranked("b.py", "o/beta", "def b(): pass")];
        let context = build_context(&matches);
        assert!(context.starts_with("File: a.py\nRepository: o/alpha\n\ndef a(): pass"));
        assert!(context.contains(BLOCK_DELIMITER));
        assert!(context.contains("File: b.py"));
    }

    #[test]
    fn test_compose_with_footer() {
        let composer = AnswerComposer::new(Arc::new(EchoLlm));
        let matches = vec![ranked("a.py", "o/alpha", "code")];
        let answer =
            composer.compose("what is a?", &matches, &["o/alpha".to_owned()]).unwrap();
        assert!(answer.starts_with("ANSWER<<"));
        assert!(answer.contains("Searched 1 repository: o/alpha"));
        assert!(answer.contains("1 result used"));
    }

    #[test]
    fn test_empty_matches_short_circuit() {
        let composer = AnswerComposer::new(Arc::new(EchoLlm));
        let answer = composer
            .compose("anything?", &[], &["o/alpha".to_owned(), "o/beta".to_owned()])
            .unwrap();
        assert!(answer.starts_with(NOT_AVAILABLE));
        assert!(answer.contains("Searched 2 repositories"));
        assert!(answer.contains("0 results used"));
    }
}
