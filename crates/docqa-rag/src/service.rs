//! Document service: the upload and ask operations
//!
//! Upload stores the raw document, parses and chunks it, embeds the chunks
//! through the retrying embedder, then publishes the new chunks through the
//! [`IndexRegistry`]. Index snapshots are persisted in the background.

use chrono::{DateTime, Utc};
use docqa_core::{Answer, AppConfig, DocQaError, IngestMode, LlmClient, Result};
use docqa_parser::{Chunker, ParserRegistry};
use docqa_vector::{
    create_embedding_client, EmbeddingClient, IndexStore, RetryPolicy, RetryingEmbedder,
    VectorIndex,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::answerer::RetrievalAnswerer;
use crate::cache::CacheStatsReport;
use crate::llm::create_llm_client;
use crate::registry::IndexRegistry;

/// Result of a successful upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub upload_id: Uuid,
    /// Sanitized document name the upload is stored under
    pub document: String,
    /// Key of the per-upload index snapshot
    pub index_id: String,
    pub page_count: usize,
    pub chunk_count: usize,
    /// Number of vectors in the live index after the upload
    pub index_size: usize,
    pub mode: IngestMode,
    pub uploaded_at: DateTime<Utc>,
}

/// What happened when loading the persisted live index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { size: usize },
    Missing,
    Failed { reason: String },
}

/// Statistics about the live index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub size: usize,
    pub dimension: usize,
    pub sources: Vec<String>,
    pub ingest_mode: IngestMode,
    pub query_cache: Option<CacheStatsReport>,
}

/// Upload and ask operations over one live index
pub struct DocumentService {
    parsers: Arc<ParserRegistry>,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingClient>,
    answerer: RetrievalAnswerer,
    registry: Arc<IndexRegistry>,
    store: IndexStore,
    ingest_mode: IngestMode,
    live_index_name: String,
    persist_lock: Arc<tokio::sync::Mutex<()>>,
    pending: Mutex<JoinSet<()>>,
}

impl DocumentService {
    /// Assemble a service from explicit collaborators.
    ///
    /// `embedder` is wrapped in a [`RetryingEmbedder`] configured from
    /// `config.retry`.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        store: IndexStore,
        config: &AppConfig,
    ) -> Result<Self> {
        let chunker = Chunker::from_config(&config.rag)?;
        let dimension = embedder.dimension();
        if dimension == 0 {
            return Err(DocQaError::Validation(format!(
                "embedder {} reports dimension 0",
                embedder.name()
            )));
        }

        let embedder: Arc<dyn EmbeddingClient> = Arc::new(
            RetryingEmbedder::new(embedder, RetryPolicy::from_config(&config.retry))
                .with_batch_size(config.embedding.batch_size),
        );
        let answerer = RetrievalAnswerer::from_config(embedder.clone(), llm, config);

        Ok(Self {
            parsers: Arc::new(ParserRegistry::with_defaults()),
            chunker,
            embedder,
            answerer,
            registry: Arc::new(IndexRegistry::new(dimension)),
            store,
            ingest_mode: config.rag.ingest_mode,
            live_index_name: config.storage.index_name.clone(),
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
            pending: Mutex::new(JoinSet::new()),
        })
    }

    /// Create from config with the configured providers and storage backend
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingClient> =
            Arc::from(create_embedding_client(&config.embedding, &config.llm)?);
        let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);
        let store = IndexStore::from_config(&config.storage);

        tracing::info!(
            embedder = embedder.name(),
            dimension = embedder.dimension(),
            llm = llm.name(),
            storage = store.backend().name(),
            bucket = store.bucket(),
            "Document service configured"
        );

        Self::new(embedder, llm, store, config)
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    pub fn ingest_mode(&self) -> IngestMode {
        self.ingest_mode
    }

    /// Ingest a document and publish its chunks to the live index
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadReceipt> {
        let name = sanitize_filename(filename)?;
        tracing::info!(document = %name, bytes = bytes.len(), "Upload started");

        // PDF and DOCX extraction is CPU-bound
        let parsers = self.parsers.clone();
        let parse_name = name.clone();
        let (doc, bytes) = tokio::task::spawn_blocking(move || {
            let doc = parsers
                .parse(&parse_name, &bytes)
                .map_err(|e| e.into_document_error(&parse_name));
            (doc, bytes)
        })
        .await
        .map_err(|e| DocQaError::Other(anyhow::anyhow!("parser task failed: {e}")))?;
        let doc = doc?;
        self.store.put_document(&name, bytes).await?;

        let chunks = self.chunker.split(&doc)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        // No registry lock is held while waiting on the provider
        let vectors = self.embedder.embed_batch(&texts).await?;

        let mut upload_index = VectorIndex::new(self.registry.dimension());
        upload_index.insert(chunks, vectors)?;
        let chunk_count = upload_index.len();

        let live = self.registry.apply(&upload_index, self.ingest_mode)?;

        let index_id = format!("{name}.index");
        self.persist_in_background(index_id.clone(), upload_index);

        let receipt = UploadReceipt {
            upload_id: Uuid::new_v4(),
            document: name,
            index_id,
            page_count: doc.pages.len(),
            chunk_count,
            index_size: live.len(),
            mode: self.ingest_mode,
            uploaded_at: Utc::now(),
        };

        tracing::info!(
            document = %receipt.document,
            index_id = %receipt.index_id,
            chunks = receipt.chunk_count,
            index_size = receipt.index_size,
            "Upload complete"
        );
        Ok(receipt)
    }

    /// Answer a question from the live index
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let index = self.registry.current();
        self.answerer.answer(&index, query).await
    }

    /// Load the persisted live index. Failures leave the registry empty.
    pub async fn restore(&self) -> RestoreOutcome {
        match self
            .store
            .load(&self.live_index_name, self.registry.dimension())
            .await
        {
            Ok(Some(index)) => match self.registry.replace(index) {
                Ok(live) => {
                    tracing::info!(
                        index = %self.live_index_name,
                        size = live.len(),
                        "Restored live index"
                    );
                    RestoreOutcome::Restored { size: live.len() }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Persisted index rejected, starting empty");
                    RestoreOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            },
            Ok(None) => {
                tracing::info!(
                    index = %self.live_index_name,
                    "No persisted index found. Upload a document first."
                );
                RestoreOutcome::Missing
            }
            Err(e) => {
                tracing::warn!(
                    index = %self.live_index_name,
                    error = %e,
                    "Failed to load persisted index, starting empty"
                );
                RestoreOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Persist the live index now and wait for it
    pub async fn persist(&self) -> Result<usize> {
        self.flush().await;
        let _guard = self.persist_lock.lock().await;
        self.store
            .save(&self.live_index_name, &self.registry.current())
            .await
    }

    /// Wait for all background persistence started so far
    pub async fn flush(&self) {
        let mut pending = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while pending.join_next().await.is_some() {}
    }

    pub fn stats(&self) -> IndexStats {
        let live = self.registry.current();
        IndexStats {
            size: live.len(),
            dimension: live.dimension(),
            sources: live.document_sources(),
            ingest_mode: self.ingest_mode,
            query_cache: self.answerer.cache().map(|c| c.stats()),
        }
    }

    fn persist_in_background(&self, index_id: String, upload_index: VectorIndex) {
        let store = self.store.clone();
        let registry = self.registry.clone();
        let persist_lock = self.persist_lock.clone();
        let live_name = self.live_index_name.clone();

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while pending.try_join_next().is_some() {}

        pending.spawn(async move {
            if let Err(e) = store.save(&index_id, &upload_index).await {
                tracing::error!(index = %index_id, error = %e, "Failed to persist upload index");
            }

            // Serialized so the newest live snapshot is always written last
            let _guard = persist_lock.lock().await;
            if let Err(e) = store.save(&live_name, &registry.current()).await {
                tracing::error!(index = %live_name, error = %e, "Failed to persist live index");
            }
        });
    }
}

/// Reduce a client-supplied file name to its final path component
fn sanitize_filename(filename: &str) -> Result<String> {
    let invalid = || DocQaError::InvalidDocument {
        document: filename.to_string(),
        reason: "invalid file name".to_string(),
    };

    let normalized = filename.trim().replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(invalid)?;

    if name.is_empty() || name == "." || name == ".." {
        return Err(invalid());
    }
    Ok(name.to_string())
}

// ============================================================================
// Tests
// ============================================================================
