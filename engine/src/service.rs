//! Service wiring
//!
//! Builds the pipeline from configuration with constructor-injected
//! clients and exposes the operations the CLI and the HTTP surface
//! share: ingest, sync, query answering, and repository listing.
//! An empty store URL selects the in-memory store (local development
//! mode); otherwise the REST adapters are used.

use crate::archive::{FsObjectStore, ObjectStore};
use crate::cancel::CancelToken;
use crate::config::{Config, ConfigError};
use crate::embedding::{Embedder, HttpEmbeddingProvider, HybridWeights};
use crate::ingest::{IngestError, IngestOptions, Ingester};
use crate::journal::ErrorJournal;
use crate::query::composer::{AnswerComposer, ComposeError, HttpLlmClient, LlmClient};
use crate::query::executor::{RetrievalError, RetrievalExecutor, RetrievalOptions};
use crate::query::QueryPlanner;
use crate::queue::{IdempotencyStore, JobQueue, MemoryIdempotencyStore, MemoryQueue};
use crate::store::{MemoryVectorStore, RestVectorStore, StoreError, VectorStore};
use crate::tokenizer::Tokenizer;
use crate::types::RepoContext;
use crate::webhook::WebhookReceiver;
use crate::worker::Worker;
use std::sync::Arc;
use thiserror::Error;

/// Service construction and operation errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("compose error: {0}")]
    Compose(#[from] ComposeError),

    #[error("embedding client error: {0}")]
    Embedding(String),

    #[error("LLM is not configured (set llm.api_url or LLM_API_KEY)")]
    LlmUnconfigured,
}

/// The wired pipeline
pub struct Service {
    config: Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<Embedder>,
    ingester: Arc<Ingester>,
    planner: QueryPlanner,
    executor: RetrievalExecutor,
    llm: Option<Arc<dyn LlmClient>>,
    queue: Arc<MemoryQueue>,
    dedupe: Arc<MemoryIdempotencyStore>,
}

impl Service {
    /// Wire the pipeline from configuration
    pub fn from_config(config: Config) -> Result<Self, ServiceError> {
        config.validate()?;

        let store: Arc<dyn VectorStore> = if config.store.api_url.is_empty() {
            log::info!("no vector store URL configured; using the in-memory store");
            Arc::new(MemoryVectorStore::new())
        } else {
            Arc::new(
                RestVectorStore::new(
                    config.store.api_url.clone(),
                    config.store.api_key.clone(),
                    config.embedding.dimension,
                    config.store.timeout(),
                )
                .map_err(ServiceError::Store)?,
            )
        };

        Self::with_store(config, store)
    }

    /// Wire the pipeline around an existing store (tests, embedding of
    /// the service into other processes)
    pub fn with_store(config: Config, store: Arc<dyn VectorStore>) -> Result<Self, ServiceError> {
        let tokenizer = Arc::new(Tokenizer::new());

        let provider = HttpEmbeddingProvider::new(
            config.embedding.api_url.clone(),
            config.embedding.api_key.clone(),
            config.embedding.model.clone(),
            config.embedding.dimension,
            config.embedding.timeout(),
        )
        .map_err(|e| ServiceError::Embedding(e.to_string()))?;
        let embedder =
            Arc::new(Embedder::new(Arc::new(provider)).with_batch_size(config.embedding.batch_size));

        Self::assemble(config, store, tokenizer, embedder)
    }

    /// Full dependency injection (test seam)
    pub fn assemble(
        config: Config,
        store: Arc<dyn VectorStore>,
        tokenizer: Arc<Tokenizer>,
        embedder: Arc<Embedder>,
    ) -> Result<Self, ServiceError> {
        let archive: Option<Arc<dyn ObjectStore>> = if config.archive.root.is_empty() {
            None
        } else {
            Some(Arc::new(FsObjectStore::new(config.archive.root.clone())))
        };

        let journal = ErrorJournal::new(config.ingest.errors_path.clone());
        let options = IngestOptions {
            max_workers: config.ingest.max_workers,
            overlap_tokens: config.ingest.overlap_tokens,
            clone_timeout: config.ingest.clone_timeout(),
            hybrid: config.embedding.hybrid.then(HybridWeights::default),
        };

        let ingester = Arc::new(Ingester::new(
            Arc::clone(&tokenizer),
            Arc::clone(&embedder),
            Arc::clone(&store),
            archive,
            journal,
            options,
        )?);

        let executor = RetrievalExecutor::new(Arc::clone(&embedder), Arc::clone(&store));

        let llm: Option<Arc<dyn LlmClient>> = if config.llm.api_url.is_empty() {
            None
        } else {
            Some(Arc::new(
                HttpLlmClient::new(
                    config.llm.api_url.clone(),
                    config.llm.api_key.clone(),
                    config.llm.model.clone(),
                    std::time::Duration::from_secs(config.llm.timeout_secs),
                )
                .map_err(ServiceError::Compose)?,
            ))
        };

        Ok(Self {
            config,
            store,
            embedder,
            ingester,
            planner: QueryPlanner::new(),
            executor,
            llm,
            queue: Arc::new(MemoryQueue::new(5)),
            dedupe: Arc::new(MemoryIdempotencyStore::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    pub fn ingester(&self) -> &Arc<Ingester> {
        &self.ingester
    }

    /// Webhook receiver bound to the in-process queue and dedupe table
    pub fn webhook_receiver(&self) -> WebhookReceiver {
        WebhookReceiver::new(
            self.config.webhook.secret.clone(),
            self.config.webhook.branch.clone(),
            Arc::clone(&self.dedupe) as Arc<dyn IdempotencyStore>,
            Arc::clone(&self.queue) as Arc<dyn JobQueue>,
        )
    }

    /// Worker consuming the in-process queue
    pub fn worker(&self) -> Worker {
        Worker::new(
            Arc::clone(&self.queue) as Arc<dyn JobQueue>,
            Arc::clone(&self.ingester),
            self.config.ingest.clone_timeout(),
        )
    }

    /// Known repository identifiers (one namespace per repository)
    pub fn repositories(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.store.describe()?.into_iter().map(|ns| ns.name).collect())
    }

    /// Answer a natural-language query over the indexed repositories
    pub fn answer(
        &self,
        query: &str,
        repositories: Option<&[String]>,
        options: RetrievalOptions,
        cancel: &CancelToken,
    ) -> Result<String, ServiceError> {
        let namespaces: Vec<String> = match repositories {
            Some(repos) if !repos.is_empty() => {
                repos.iter().map(|r| RepoContext::namespace_for(r)).collect()
            }
            _ => self.repositories()?,
        };

        let analysis = self.planner.analyze(query);
        let strategies = self.planner.plan(&analysis, &namespaces);
        let matches = self.executor.execute(query, &analysis, &strategies, options, cancel)?;

        let Some(llm) = &self.llm else {
            return Err(ServiceError::LlmUnconfigured);
        };
        let composer = AnswerComposer::new(Arc::clone(llm));
        Ok(composer.compose(query, &matches, &namespaces)?)
    }
}
