//! Retrieval execution
//!
//! Runs planned strategies in parallel across namespaces, deduplicates
//! matches, and reranks them as
//! `base_similarity x strategy_confidence x boost`. A failing strategy
//! is logged and skipped; if everything fails a last-resort basic
//! vector search runs.

use crate::cancel::CancelToken;
use crate::embedding::{Embedder, EmbeddingError};
use crate::query::{QueryAnalysis, QueryType, Strategy, StrategyKind};
use crate::store::{Filter, StoreError, VectorStore};
use crate::types::QueryMatch;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Retrieval errors
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Executor knobs, bounded to protect the store
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub per_namespace_k: usize,
    pub min_score: Option<f32>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self { top_k: 10, per_namespace_k: 5, min_score: None }
    }
}

impl RetrievalOptions {
    /// Clamp user-supplied values into the allowed ranges
    pub fn clamped(top_k: Option<usize>, per_namespace_k: Option<usize>, min_score: Option<f32>) -> Self {
        let defaults = Self::default();
        Self {
            top_k: top_k.unwrap_or(defaults.top_k).clamp(1, 50),
            per_namespace_k: per_namespace_k.unwrap_or(defaults.per_namespace_k).clamp(1, 20),
            min_score: min_score.filter(|s| (0.0..=1.0).contains(s)),
        }
    }
}

/// A fused, reranked match
#[derive(Debug, Clone)]
pub struct RankedMatch {
    pub hit: QueryMatch,
    pub strategy: StrategyKind,
    pub confidence: f32,
    /// Final rank score after confidence and boosts, capped at 1.0
    pub score: f32,
}

/// Executes strategies and fuses their results
pub struct RetrievalExecutor {
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStore>,
}

impl RetrievalExecutor {
    pub fn new(embedder: Arc<Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Run all strategies, dedupe by (file_path, line_start), rerank,
    /// and return the fused top-K.
    pub fn execute(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        strategies: &[Strategy],
        options: RetrievalOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<RankedMatch>, RetrievalError> {
        let results: Vec<Vec<RankedMatch>> = strategies
            .par_iter()
            .map(|strategy| match self.run_strategy(query, strategy, options, cancel) {
                Ok(matches) => matches,
                Err(err) => {
                    log::warn!(
                        "strategy {} failed for namespace {}: {err}",
                        strategy.kind.name(),
                        strategy.namespace
                    );
                    Vec::new()
                }
            })
            .collect();

        let mut collected: Vec<RankedMatch> = results.into_iter().flatten().collect();

        // Last resort: plain vector search over every target namespace
        if collected.is_empty() && !strategies.is_empty() {
            log::warn!("all strategies failed or returned nothing; trying basic vector search");
            let vector = self.embedder.embed(query, cancel)?;
            let mut namespaces: Vec<&str> =
                strategies.iter().map(|s| s.namespace.as_str()).collect();
            namespaces.sort_unstable();
            namespaces.dedup();
            for namespace in namespaces {
                let matches = self.store.query(
                    namespace,
                    &vector,
                    options.per_namespace_k,
                    self.live_filter(namespace)?.as_ref(),
                    cancel,
                )?;
                collected.extend(matches.into_iter().map(|hit| RankedMatch {
                    score: hit.score.clamp(0.0, 1.0),
                    strategy: StrategyKind::SemanticRepository,
                    confidence: 0.5,
                    hit,
                }));
            }
        }

        if let Some(min_score) = options.min_score {
            collected.retain(|m| m.hit.score >= min_score);
        }

        let mut fused = dedupe(collected);
        for ranked in &mut fused {
            ranked.score = rank_score(ranked, analysis);
        }
        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        fused.truncate(options.top_k);
        Ok(fused)
    }

    fn run_strategy(
        &self,
        query: &str,
        strategy: &Strategy,
        options: RetrievalOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<RankedMatch>, RetrievalError> {
        let expanded = if strategy.query_expansion.is_empty() {
            query.to_owned()
        } else {
            format!("{query} {}", strategy.query_expansion.join(" "))
        };
        let vector = self.embedder.embed(&expanded, cancel)?;

        let live = self.live_filter(&strategy.namespace)?;
        let mut filters: Vec<Filter> = live.clone().into_iter().collect();

        // Push the strategy filter down when the store supports it;
        // otherwise widen the candidate set and filter client-side
        let mut client_side: Option<&Filter> = None;
        let mut fetch_k = options.per_namespace_k;
        if let Some(filter) = &strategy.filter {
            if filter.uses_contains() && !self.store.supports_contains() {
                client_side = Some(filter);
                fetch_k = options.per_namespace_k * 4;
            } else {
                filters.push(filter.clone());
            }
        }

        let pushed = match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::And(filters)),
        };

        let mut matches =
            self.store.query(&strategy.namespace, &vector, fetch_k, pushed.as_ref(), cancel)?;

        if let Some(filter) = client_side {
            matches.retain(|m| filter.matches(&m.metadata));
            matches.truncate(options.per_namespace_k);
        }

        Ok(matches
            .into_iter()
            .map(|hit| RankedMatch {
                score: hit.score,
                strategy: strategy.kind,
                confidence: strategy.confidence,
                hit,
            })
            .collect())
    }

    /// Retrieval only sees the active commit: filter on the namespace's
    /// active ref when the pointer exists, else on the live flag.
    fn live_filter(&self, namespace: &str) -> Result<Option<Filter>, RetrievalError> {
        match self.store.active_ref(namespace)? {
            Some(active) => Ok(Some(Filter::eq("ref", active))),
            None => Ok(Some(Filter::eq("live", "true"))),
        }
    }
}

/// Deduplicate by (file_path, line_start), keeping the higher base score
fn dedupe(matches: Vec<RankedMatch>) -> Vec<RankedMatch> {
    let mut best: HashMap<(String, u32), RankedMatch> = HashMap::new();
    for m in matches {
        let key = (m.hit.metadata.file_path.clone(), m.hit.metadata.line_start);
        match best.get(&key) {
            Some(existing) if existing.hit.score >= m.hit.score => {}
            _ => {
                best.insert(key, m);
            }
        }
    }
    best.into_values().collect()
}

/// base_similarity x strategy_confidence x boost, capped at 1.0
fn rank_score(ranked: &RankedMatch, analysis: &QueryAnalysis) -> f32 {
    let mut boost = 1.0f32;

    if ranked.strategy == StrategyKind::DirectEntity {
        boost *= 1.5;
    }
    if ranked.strategy == StrategyKind::FileStructure && analysis.query_type == QueryType::FileSearch
    {
        boost *= 1.4;
    }

    let path = ranked.hit.metadata.file_path.to_lowercase();
    if path.contains("readme") || path.starts_with("docs/") || path.contains("/docs/") {
        boost *= 1.3;
    }
    if ranked.hit.metadata.signals.has_docstring {
        boost *= 1.1;
    }

    (ranked.hit.score.max(0.0) * ranked.confidence * boost).min(1.0)
}
