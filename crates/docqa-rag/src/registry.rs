//! Holder of the live vector index
//!
//! Readers take a cheap `Arc` snapshot and search it without holding any
//! lock. Writers build the next index off to the side and swap the
//! reference; a writer mutex serializes build-and-swap so concurrent merges
//! never drop each other's chunks. Only CPU work happens under either lock.

use docqa_core::{DocQaError, IngestMode, Result};
use docqa_vector::VectorIndex;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Process-wide owner of the single live [`VectorIndex`]
pub struct IndexRegistry {
    current: RwLock<Arc<VectorIndex>>,
    writer: Mutex<()>,
    dimension: usize,
}

impl IndexRegistry {
    /// Start with an empty index of `dimension`
    pub fn new(dimension: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(VectorIndex::new(dimension))),
            writer: Mutex::new(()),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Snapshot of the live index
    pub fn current(&self) -> Arc<VectorIndex> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of vectors in the live index
    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    fn swap(&self, next: Arc<VectorIndex>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Combine a freshly built upload index with the live one and publish
    /// the result.
    ///
    /// In merge mode, live chunks from any document the upload carries are
    /// dropped first, so a re-uploaded document replaces its earlier version.
    pub fn apply(&self, upload: &VectorIndex, mode: IngestMode) -> Result<Arc<VectorIndex>> {
        self.check_dimension(upload)?;

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let next = Arc::new(match mode {
            IngestMode::Merge => {
                let mut live = self.current();
                for source in upload.document_sources() {
                    live = Arc::new(live.without_source(&source));
                }
                live.merged_with(upload)?
            }
            IngestMode::Replace => upload.clone(),
        });
        self.swap(next.clone());

        tracing::info!(
            mode = ?mode,
            added = upload.len(),
            size = next.len(),
            "Swapped live index"
        );
        Ok(next)
    }

    /// Replace the live index wholesale
    pub fn replace(&self, index: VectorIndex) -> Result<Arc<VectorIndex>> {
        self.check_dimension(&index)?;

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(index);
        self.swap(next.clone());
        Ok(next)
    }

    fn check_dimension(&self, index: &VectorIndex) -> Result<()> {
        if index.dimension() != self.dimension {
            return Err(DocQaError::Validation(format!(
                "index dimension {} does not match registry dimension {}",
                index.dimension(),
                self.dimension
            )));
        }
        Ok(())
    }
}
