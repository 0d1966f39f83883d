//! Codeloom Engine - code-aware RAG backend for multi-repository source
//!
//! This crate provides the ingestion and retrieval pipeline:
//!
//! - Language-aware semantic chunking (table-driven, one engine)
//! - BPE token counting and content complexity estimation
//! - Batched, cached, retrying embedding client
//! - Namespaced vector store adapter with commit activation
//! - Repository ingestion with bounded worker pools
//! - Incremental git sync with submodule expansion
//! - Webhook -> queue -> worker control plane
//! - Query planning, parallel retrieval, and answer composition
//!
//! # Example
//!
//! ```rust,ignore
//! use codeloom_engine::{CancelToken, Config, RetrievalOptions, Service};
//!
//! let service = Service::from_config(Config::load()?)?;
//! let cancel = CancelToken::new();
//! service.ingester().ingest_repository(
//!     "https://github.com/owner/repo.git", "owner/repo", None, "repo", &cancel)?;
//! let answer = service.answer("where is the chunker?", None,
//!     RetrievalOptions::default(), &cancel)?;
//! ```

// Core pipeline modules
pub mod chunker;
pub mod languages;
pub mod metadata;
pub mod tokenizer;
pub mod types;

// External-service adapters
pub mod archive;
pub mod embedding;
pub mod store;

// Ingestion and sync
pub mod git;
pub mod ingest;
pub mod journal;
pub mod sync;

// Control plane
pub mod queue;
pub mod webhook;
pub mod worker;

// Retrieval
pub mod query;

// Shared infrastructure
pub mod backoff;
pub mod cancel;
pub mod config;
pub mod service;

// Re-exports of the primary surface
pub use cancel::CancelToken;
pub use chunker::{ChunkerConfig, SemanticChunker};
pub use config::{Config, ConfigError};
pub use embedding::{Embedder, EmbeddingError, EmbeddingProvider, HttpEmbeddingProvider};
pub use ingest::{IngestError, IngestOptions, IngestReport, Ingester};
pub use journal::ErrorJournal;
pub use metadata::{chunk_id, content_sha, MetadataAssembler};
pub use query::composer::{AnswerComposer, LlmClient};
pub use query::executor::{RetrievalExecutor, RetrievalOptions};
pub use query::{QueryAnalysis, QueryPlanner, QueryType, Strategy, StrategyKind};
pub use queue::{IdempotencyStore, JobQueue, MemoryIdempotencyStore, MemoryQueue};
pub use service::{Service, ServiceError};
pub use store::{Filter, MemoryVectorStore, RestVectorStore, StoreError, VectorStore};
pub use sync::{SyncDriver, SyncReport};
pub use tokenizer::Tokenizer;
pub use types::*;
pub use webhook::{WebhookError, WebhookHeaders, WebhookOutcome, WebhookReceiver};
pub use worker::Worker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
