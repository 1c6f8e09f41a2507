//! Object storage backends and index persistence
//!
//! Raw documents and serialized index snapshots live in a bucket of an
//! [`ObjectStore`]. Two backends are provided: a directory tree on the local
//! filesystem and an in-process map.

use async_trait::async_trait;
use docqa_core::{DocQaError, ObjectStore, Result, StorageBackend, StorageConfig};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::index::VectorIndex;

/// Reject names that could escape the bucket directory
fn validate_name(bucket: &str, key: &str) -> Result<()> {
    for name in [bucket, key] {
        let bad = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if bad {
            return Err(DocQaError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: format!("invalid object name {name:?}"),
            });
        }
    }
    Ok(())
}

fn map_io_error(err: std::io::Error, operation: &'static str, bucket: &str, key: &str) -> DocQaError {
    match err.kind() {
        ErrorKind::NotFound => DocQaError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        ErrorKind::PermissionDenied => DocQaError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason: err.to_string(),
        },
        _ => DocQaError::Storage {
            operation,
            key: format!("{bucket}/{key}"),
            message: err.to_string(),
        },
    }
}

// ============================================================================
// Filesystem backend
// ============================================================================

/// Stores objects as files under `<root>/<bucket>/<key>`
pub struct FsObjectStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_name(bucket, key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| map_io_error(e, "get", bucket, key))
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        let dir = self.root.join(bucket);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| map_io_error(e, "put", bucket, key))?;

        // Readers never observe a half-written object
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".{key}.{}.{n}.tmp", std::process::id()));

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| map_io_error(e, "put", bucket, key))?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(map_io_error(e, "put", bucket, key));
        }

        tracing::debug!(bucket, key, bytes = bytes.len(), "Stored object");
        Ok(())
    }

    fn name(&self) -> &str {
        "fs"
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Keeps objects in process memory
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored in `bucket`, sorted
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let objects = self.objects.read().await;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        validate_name(bucket, key)?;
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| DocQaError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_name(bucket, key)?;
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Create the configured object store
pub fn create_object_store(config: &StorageConfig) -> Arc<dyn ObjectStore> {
    match config.backend {
        StorageBackend::Fs => Arc::new(FsObjectStore::new(config.root.clone())),
        StorageBackend::Memory => Arc::new(MemoryObjectStore::new()),
    }
}

// ============================================================================
// Index persistence
// ============================================================================

/// Reads and writes documents and index snapshots in one bucket
#[derive(Clone)]
pub struct IndexStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl IndexStore {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(create_object_store(config), config.bucket.clone())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn backend(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Serialize `index` and store it under `name`
    pub async fn save(&self, name: &str, index: &VectorIndex) -> Result<usize> {
        let bytes = index.serialize()?;
        let size = bytes.len();
        self.store.put(&self.bucket, name, bytes).await?;

        tracing::info!(
            bucket = %self.bucket,
            index = name,
            vectors = index.len(),
            bytes = size,
            "Persisted index snapshot"
        );
        Ok(size)
    }

    /// Load the snapshot stored under `name`, if any
    pub async fn load(&self, name: &str, expected_dimension: usize) -> Result<Option<VectorIndex>> {
        match self.store.get_optional(&self.bucket, name).await? {
            Some(bytes) => VectorIndex::deserialize(&bytes, expected_dimension).map(Some),
            None => Ok(None),
        }
    }

    /// Store a raw uploaded document under its file name
    pub async fn put_document(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        self.store.put(&self.bucket, name, bytes).await
    }
}

// ============================================================================
// Tests
// ============================================================================
