//! Flat in-memory vector index
//!
//! Exact brute-force nearest-neighbor search over chunk embeddings, with a
//! self-describing JSON snapshot format for persistence.
//!
//! Vectors are stored contiguously; the internal id of an entry is its
//! insertion position, shared by the vector and its chunk record.

use docqa_core::{Chunk, DocQaError, EmbeddingVector, Result, ScoredChunk};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Format tag written into every snapshot
pub const INDEX_FORMAT: &str = "docqa-flat-index";

/// Current snapshot format version
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Distance metric used for search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean (L2) distance
    #[default]
    Euclidean,
    /// Cosine distance (`1 - cosine similarity`)
    Cosine,
}

impl DistanceMetric {
    fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
        }
    }
}

/// Searchable collection of (chunk, embedding) pairs
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    metric: DistanceMetric,
    chunks: Vec<Chunk>,
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension`
    pub fn new(dimension: usize) -> Self {
        Self::with_metric(dimension, DistanceMetric::default())
    }

    /// Create an empty index with an explicit metric
    pub fn with_metric(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            chunks: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunk records in id order
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Vector for an internal id
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        if id >= self.len() {
            return None;
        }
        let start = id * self.dimension;
        Some(&self.vectors[start..start + self.dimension])
    }

    /// Distinct source names of all stored chunks
    pub fn document_sources(&self) -> Vec<String> {
        self.chunks
            .iter()
            .filter_map(|c| c.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Append chunk/vector pairs.
    ///
    /// All pairs are validated before anything is stored, so a rejected
    /// batch leaves the index unchanged. An index of dimension 0 accepts
    /// nothing.
    pub fn insert(&mut self, chunks: Vec<Chunk>, vectors: Vec<EmbeddingVector>) -> Result<()> {
        if self.dimension == 0 {
            return Err(DocQaError::Validation(
                "index dimension must be positive".to_string(),
            ));
        }
        if chunks.len() != vectors.len() {
            return Err(DocQaError::Validation(format!(
                "insert requires one vector per chunk: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        for (i, vector) in vectors.iter().enumerate() {
            self.check_vector(vector)
                .map_err(|reason| DocQaError::Validation(format!("vector {i}: {reason}")))?;
        }

        self.vectors.reserve(vectors.len() * self.dimension);
        for vector in &vectors {
            self.vectors.extend_from_slice(vector);
        }
        self.chunks.extend(chunks);

        Ok(())
    }

    fn check_vector(&self, vector: &[f32]) -> std::result::Result<(), String> {
        if vector.len() != self.dimension {
            return Err(format!(
                "dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            ));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err("contains non-finite values".to_string());
        }
        Ok(())
    }

    /// Return the `k` nearest chunks in ascending distance order.
    ///
    /// Ties are broken by insertion order. Fails with
    /// [`DocQaError::EmptyIndex`] when the index holds no vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.is_empty() {
            return Err(DocQaError::EmptyIndex {
                operation: "search",
            });
        }
        if query.len() != self.dimension {
            return Err(DocQaError::Validation(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(id, v)| (id, self.metric.distance(query, v)))
            .collect();

        let by_distance =
            |a: &(usize, f32), b: &(usize, f32)| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0));

        let k = k.min(scored.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_by(by_distance);

        Ok(scored
            .into_iter()
            .map(|(id, distance)| ScoredChunk {
                chunk: self.chunks[id].clone(),
                distance,
            })
            .collect())
    }

    /// New index holding this index's entries followed by `other`'s
    pub fn merged_with(&self, other: &VectorIndex) -> Result<VectorIndex> {
        if other.dimension != self.dimension {
            return Err(DocQaError::Validation(format!(
                "cannot merge index of dimension {} into dimension {}",
                other.dimension, self.dimension
            )));
        }

        let mut merged = self.clone();
        merged.chunks.extend_from_slice(&other.chunks);
        merged.vectors.extend_from_slice(&other.vectors);
        Ok(merged)
    }

    /// New index without the entries whose chunk came from `source`.
    ///
    /// Remaining entries keep their relative order and are renumbered.
    pub fn without_source(&self, source: &str) -> VectorIndex {
        let mut kept = Self::with_metric(self.dimension, self.metric);
        for (id, chunk) in self.chunks.iter().enumerate() {
            if chunk.source.as_deref() == Some(source) {
                continue;
            }
            if let Some(vector) = self.vector(id) {
                kept.vectors.extend_from_slice(vector);
                kept.chunks.push(chunk.clone());
            }
        }
        kept
    }

    /// Serialize into a self-describing snapshot
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let snapshot = SnapshotRef {
            format: INDEX_FORMAT,
            version: INDEX_FORMAT_VERSION,
            dimension: self.dimension,
            metric: self.metric,
            entries: self
                .chunks
                .iter()
                .enumerate()
                .filter_map(|(id, chunk)| {
                    self.vector(id).map(|vector| EntryRef { id, chunk, vector })
                })
                .collect(),
        };

        serde_json::to_vec(&snapshot).map_err(|e| {
            DocQaError::Other(anyhow::anyhow!("failed to serialize index: {e}"))
        })
    }

    /// Rebuild an index from a snapshot.
    ///
    /// Fails with [`DocQaError::CorruptIndex`] if the blob is malformed or was
    /// built for a dimension other than `expected_dimension`.
    pub fn deserialize(bytes: &[u8], expected_dimension: usize) -> Result<Self> {
        let corrupt = |reason: String| DocQaError::CorruptIndex { reason };

        let snapshot: Snapshot = serde_json::from_slice(bytes)
            .map_err(|e| corrupt(format!("malformed snapshot: {e}")))?;

        if snapshot.format != INDEX_FORMAT {
            return Err(corrupt(format!("unknown format tag {:?}", snapshot.format)));
        }
        if snapshot.version != INDEX_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                snapshot.version
            )));
        }
        if snapshot.dimension == 0 {
            return Err(corrupt("snapshot dimension is 0".to_string()));
        }
        if snapshot.dimension != expected_dimension {
            return Err(corrupt(format!(
                "snapshot dimension {} does not match embedder dimension {}",
                snapshot.dimension, expected_dimension
            )));
        }

        let mut index = Self::with_metric(snapshot.dimension, snapshot.metric);
        index.chunks.reserve(snapshot.entries.len());
        index
            .vectors
            .reserve(snapshot.entries.len() * snapshot.dimension);

        for (position, entry) in snapshot.entries.into_iter().enumerate() {
            if entry.id != position {
                return Err(corrupt(format!(
                    "entry {position} carries id {}",
                    entry.id
                )));
            }
            index
                .check_vector(&entry.vector)
                .map_err(|reason| corrupt(format!("entry {position}: {reason}")))?;

            index.vectors.extend_from_slice(&entry.vector);
            index.chunks.push(entry.chunk);
        }

        Ok(index)
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format: &'static str,
    version: u32,
    dimension: usize,
    metric: DistanceMetric,
    entries: Vec<EntryRef<'a>>,
}

#[derive(Serialize)]
struct EntryRef<'a> {
    id: usize,
    chunk: &'a Chunk,
    vector: &'a [f32],
}

#[derive(Deserialize)]
struct Snapshot {
    format: String,
    version: u32,
    dimension: usize,
    #[serde(default)]
    metric: DistanceMetric,
    entries: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    id: usize,
    chunk: Chunk,
    vector: Vec<f32>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(2);
        index
            .insert(
                vec![
                    Chunk::new("origin", "a.txt"),
                    Chunk::new("east", "a.txt").with_page(1),
                    Chunk::new("north", "b.txt"),
                ],
                vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 3.0]],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_search_on_empty_index_fails() {
        let index = VectorIndex::new(3);
        let err = index.search(&[0.0, 0.0, 0.0], 4).unwrap_err();
        assert!(matches!(err, DocQaError::EmptyIndex { .. }));
    }

    #[test]
    fn test_search_orders_by_euclidean_distance() {
        let index = sample_index();
        let results = index.search(&[0.9, 0.1], 3).unwrap();

        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "origin", "north"]);
        assert!((results[0].distance - (0.01f32 + 0.01).sqrt()).abs() < 1e-6);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_search_returns_min_of_k_and_size() {
        let index = sample_index();
        assert_eq!(index.search(&[0.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(index.search(&[0.0, 0.0], 10).unwrap().len(), 3);
        assert!(index.search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let mut index = VectorIndex::new(1);
        index
            .insert(
                vec![Chunk::new("left", "x"), Chunk::new("right", "x")],
                vec![vec![-1.0], vec![1.0]],
            )
            .unwrap();

        let results = index.search(&[0.0], 1).unwrap();
        assert_eq!(results[0].chunk.text, "left");
    }

    #[test]
    fn test_insert_is_monotonic() {
        let mut index = sample_index();
        let before = index.len();

        index
            .insert(
                vec![Chunk::new("more", "c.txt"), Chunk::new("again", "c.txt")],
                vec![vec![5.0, 5.0], vec![6.0, 6.0]],
            )
            .unwrap();

        assert_eq!(index.len(), before + 2);
        assert_eq!(index.vector(4), Some(&[6.0f32, 6.0][..]));
        assert_eq!(index.chunks()[4].text, "again");
    }

    #[test]
    fn test_insert_rejects_mismatched_batches() {
        let mut index = sample_index();

        let err = index
            .insert(vec![Chunk::new("a", "x")], vec![])
            .unwrap_err();
        assert!(matches!(err, DocQaError::Validation(_)));

        let err = index
            .insert(
                vec![Chunk::new("ok", "x"), Chunk::new("bad", "x")],
                vec![vec![1.0, 1.0], vec![1.0, 1.0, 1.0]],
            )
            .unwrap_err();
        assert!(matches!(err, DocQaError::Validation(_)));
        assert_eq!(index.len(), 3);

        let err = index
            .insert(vec![Chunk::new("nan", "x")], vec![vec![f32::NAN, 0.0]])
            .unwrap_err();
        assert!(matches!(err, DocQaError::Validation(_)));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = sample_index();
        assert!(matches!(
            index.search(&[1.0, 2.0, 3.0], 1),
            Err(DocQaError::Validation(_))
        ));
    }

    #[test]
    fn test_cosine_metric() {
        let mut index = VectorIndex::with_metric(2, DistanceMetric::Cosine);
        index
            .insert(
                vec![Chunk::new("same direction", "x"), Chunk::new("orthogonal", "x")],
                vec![vec![10.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();

        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk.text, "same direction");
        assert!(results[0].distance.abs() < 1e-6);
        assert!((results[1].distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_merged_with_appends_entries() {
        let base = sample_index();
        let mut extra = VectorIndex::new(2);
        extra
            .insert(vec![Chunk::new("far", "d.txt")], vec![vec![9.0, 9.0]])
            .unwrap();

        let merged = base.merged_with(&extra).unwrap();
        assert_eq!(merged.len(), 4);
        assert_eq!(base.len(), 3);
        assert_eq!(merged.document_sources(), vec!["a.txt", "b.txt", "d.txt"]);

        assert!(base.merged_with(&VectorIndex::new(3)).is_err());
    }

    #[test]
    fn test_without_source_drops_only_that_document() {
        let index = sample_index();
        let pruned = index.without_source("a.txt");

        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned.document_sources(), vec!["b.txt"]);
        assert_eq!(pruned.vector(0), Some(&[0.0f32, 3.0][..]));
        assert_eq!(index.len(), 3);

        assert_eq!(index.without_source("missing.txt").len(), 3);
    }

    #[test]
    fn test_zero_dimension_index_stays_empty() {
        let mut index = VectorIndex::new(0);

        let err = index
            .insert(vec![Chunk::new("nothing", "x")], vec![vec![]])
            .unwrap_err();
        assert!(matches!(err, DocQaError::Validation(_)));
        assert!(index.is_empty());

        assert!(matches!(
            index.search(&[], 1),
            Err(DocQaError::EmptyIndex { .. })
        ));

        let bytes = index.serialize().unwrap();
        assert!(matches!(
            VectorIndex::deserialize(&bytes, 0),
            Err(DocQaError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn test_serialize_round_trip() {
        let index = sample_index();
        let bytes = index.serialize().unwrap();
        let restored = VectorIndex::deserialize(&bytes, 2).unwrap();

        assert_eq!(restored.len(), index.len());
        assert_eq!(restored.chunks(), index.chunks());
        assert_eq!(
            restored.search(&[0.4, 2.0], 3).unwrap(),
            index.search(&[0.4, 2.0], 3).unwrap()
        );
    }

    #[test]
    fn test_empty_index_round_trip() {
        let bytes = VectorIndex::new(4).serialize().unwrap();
        let restored = VectorIndex::deserialize(&bytes, 4).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.dimension(), 4);
    }

    #[test]
    fn test_deserialize_rejects_dimension_mismatch() {
        let bytes = sample_index().serialize().unwrap();
        let err = VectorIndex::deserialize(&bytes, 1536).unwrap_err();
        assert!(matches!(err, DocQaError::CorruptIndex { .. }));
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        assert!(matches!(
            VectorIndex::deserialize(b"\x00\x01garbage", 2),
            Err(DocQaError::CorruptIndex { .. })
        ));

        let wrong_tag = serde_json::json!({
            "format": "faiss",
            "version": 1,
            "dimension": 2,
            "entries": []
        });
        assert!(matches!(
            VectorIndex::deserialize(&serde_json::to_vec(&wrong_tag).unwrap(), 2),
            Err(DocQaError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_entries() {
        let short_vector = serde_json::json!({
            "format": INDEX_FORMAT,
            "version": INDEX_FORMAT_VERSION,
            "dimension": 2,
            "entries": [{"id": 0, "chunk": {"text": "a"}, "vector": [1.0]}]
        });
        assert!(matches!(
            VectorIndex::deserialize(&serde_json::to_vec(&short_vector).unwrap(), 2),
            Err(DocQaError::CorruptIndex { .. })
        ));

        let bad_id = serde_json::json!({
            "format": INDEX_FORMAT,
            "version": INDEX_FORMAT_VERSION,
            "dimension": 1,
            "entries": [{"id": 5, "chunk": {"text": "a"}, "vector": [1.0]}]
        });
        assert!(matches!(
            VectorIndex::deserialize(&serde_json::to_vec(&bad_id).unwrap(), 1),
            Err(DocQaError::CorruptIndex { .. })
        ));
    }

    fn index_strategy() -> impl Strategy<Value = (usize, Vec<Vec<f32>>, Vec<f32>)> {
        (1usize..6).prop_flat_map(|dim| {
            (
                Just(dim),
                prop::collection::vec(prop::collection::vec(-100.0f32..100.0, dim), 1..40),
                prop::collection::vec(-100.0f32..100.0, dim),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_round_trip_is_search_equivalent(
            (dim, vectors, query) in index_strategy(),
            k in 1usize..10,
        ) {
            let chunks: Vec<Chunk> = (0..vectors.len())
                .map(|i| Chunk::new(format!("chunk {i}"), "doc.txt").with_index(i as u32))
                .collect();
            let mut index = VectorIndex::new(dim);
            index.insert(chunks, vectors).unwrap();

            let restored = VectorIndex::deserialize(&index.serialize().unwrap(), dim).unwrap();

            prop_assert_eq!(restored.search(&query, k).unwrap(), index.search(&query, k).unwrap());
        }
    }
}
