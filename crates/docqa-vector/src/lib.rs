//! DocQA Vector - Vector index and embedding abstraction
//!
//! Provides the in-memory flat index used for nearest-neighbor retrieval,
//! the embedding provider clients with their retry adapter, and the
//! object-storage backends that persist index snapshots.

pub mod embedding;
pub mod index;
pub mod retry;
pub mod store;

pub use embedding::{
    create_embedding_client, EmbeddingClient, HashEmbedding, OllamaEmbedding, OpenAiEmbedding,
};
pub use index::{DistanceMetric, VectorIndex, INDEX_FORMAT, INDEX_FORMAT_VERSION};
pub use retry::{RetryPolicy, RetryingEmbedder};
pub use store::{create_object_store, FsObjectStore, IndexStore, MemoryObjectStore};
