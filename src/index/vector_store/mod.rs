
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::snapshot;
use super::{DocumentRecord, SearchHit, StoreError};

/// In-memory vector index holding one embedding row per document record.
///
/// Embeddings are kept as a single row-major `[N, D]` matrix whose rows pair
/// positionally with `records`. `D` is fixed by the first insertion and reset
/// by [`VectorStore::clear`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorStore {
    embeddings: Vec<f32>,
    records: Vec<DocumentRecord>,
    dimension: Option<usize>,
}

impl VectorStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from parts read out of a snapshot.
    pub(crate) fn from_parts(
        embeddings: Vec<f32>,
        records: Vec<DocumentRecord>,
        dimension: Option<usize>,
    ) -> Result<Self, StoreError> {
        let expected = records.len() * dimension.unwrap_or(0);
        if embeddings.len() != expected || (dimension.is_none() && !records.is_empty()) {
            return Err(StoreError::LengthMismatch {
                embeddings: embeddings.len(),
                records: records.len(),
            });
        }

        Ok(Self {
            embeddings,
            records,
            dimension,
        })
    }

    /// Append one record with its embedding. The first insertion fixes the
    /// store dimension.
    #[inline]
    pub fn add(&mut self, embedding: &[f32], record: DocumentRecord) -> Result<(), StoreError> {
        let dimension = self.check_dimension(embedding.len())?;

        self.embeddings.extend_from_slice(embedding);
        self.records.push(record);
        self.dimension = Some(dimension);

        debug!(
            "Added document to vector store ({} documents)",
            self.records.len()
        );
        Ok(())
    }

    /// Append several records at once. Nothing is appended unless every row
    /// agrees with the store dimension and with each other.
    #[inline]
    pub fn add_batch(
        &mut self,
        embeddings: &[Vec<f32>],
        records: Vec<DocumentRecord>,
    ) -> Result<(), StoreError> {
        if embeddings.len() != records.len() {
            return Err(StoreError::LengthMismatch {
                embeddings: embeddings.len(),
                records: records.len(),
            });
        }

        let Some(first) = embeddings.first() else {
            return Ok(());
        };

        let dimension = self.check_dimension(first.len())?;
        if let Some(bad) = embeddings.iter().find(|row| row.len() != dimension) {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.embeddings.reserve(embeddings.len() * dimension);
        for row in embeddings {
            self.embeddings.extend_from_slice(row);
        }
        self.records.extend(records);
        self.dimension = Some(dimension);

        debug!(
            "Added batch of {} documents to vector store ({} documents)",
            embeddings.len(),
            self.records.len()
        );
        Ok(())
    }

    fn check_dimension(&self, actual: usize) -> Result<usize, StoreError> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(StoreError::DimensionMismatch { expected, actual })
            }
            Some(expected) => Ok(expected),
            None if actual == 0 => Err(StoreError::DimensionMismatch {
                expected: 1,
                actual: 0,
            }),
            None => Ok(actual),
        }
    }

    /// Brute-force cosine similarity search.
    ///
    /// Hits scoring below `threshold` are dropped before truncating to
    /// `top_k`. Ties keep insertion order.
    #[inline]
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if self.records.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .chunks_exact(dimension)
            .map(|row| cosine_similarity(query, row))
            .enumerate()
            .filter(|(_, score)| threshold.is_none_or(|min| *score >= min))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        debug!(
            "Vector search over {} documents returned {} hits",
            self.records.len(),
            scored.len()
        );

        Ok(scored
            .into_iter()
            .map(|(position, score)| SearchHit {
                record: self.records[position].clone(),
                score,
                position,
            })
            .collect())
    }

    /// Remove every record whose filename equals `filename` exactly.
    /// Returns how many were removed.
    #[inline]
    pub fn remove_by_filename(&mut self, filename: &str) -> usize {
        let before = self.records.len();
        let Some(dimension) = self.dimension else {
            return 0;
        };

        let mut kept_records = Vec::with_capacity(before);
        let mut kept_embeddings = Vec::with_capacity(self.embeddings.len());
        for (record, row) in self
            .records
            .drain(..)
            .zip(self.embeddings.chunks_exact(dimension))
        {
            if record.filename != filename {
                kept_embeddings.extend_from_slice(row);
                kept_records.push(record);
            }
        }

        self.records = kept_records;
        self.embeddings = kept_embeddings;

        let removed = before - self.records.len();
        if removed > 0 {
            info!("Removed {} record(s) for {}", removed, filename);
        }
        removed
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Records in insertion order
    #[inline]
    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    #[inline]
    pub fn all_records(&self) -> Vec<DocumentRecord> {
        self.records.clone()
    }

    /// Embedding row paired with the record at `position`
    #[inline]
    pub fn embedding(&self, position: usize) -> Option<&[f32]> {
        let dimension = self.dimension?;
        let start = position.checked_mul(dimension)?;
        self.embeddings.get(start..start + dimension)
    }

    pub(crate) fn embeddings(&self) -> &[f32] {
        &self.embeddings
    }

    #[inline]
    pub fn clear(&mut self) {
        self.embeddings.clear();
        self.records.clear();
        self.dimension = None;
    }

    /// Drop every record past `len` and restore `dimension`, undoing an append.
    pub(crate) fn rollback(&mut self, len: usize, dimension: Option<usize>) {
        self.records.truncate(len);
        self.embeddings
            .truncate(len * self.dimension.unwrap_or(0));
        self.dimension = dimension;
    }

    /// Persist the whole store as one snapshot file.
    #[inline]
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        snapshot::write(self, path)?;
        info!(
            "Saved vector index with {} documents to {}",
            self.records.len(),
            path.display()
        );
        Ok(())
    }

    /// Replace the store contents with the snapshot at `path`.
    ///
    /// Returns `Ok(false)` when no snapshot exists. On any error the current
    /// contents are left untouched.
    #[inline]
    pub fn load(&mut self, path: &Path) -> Result<bool, StoreError> {
        if !path.exists() {
            debug!("No index snapshot at {}", path.display());
            return Ok(false);
        }

        let loaded = snapshot::read(path)?;
        *self = loaded;

        info!(
            "Loaded vector index with {} documents from {}",
            self.records.len(),
            path.display()
        );
        Ok(true)
    }

    /// Write every record as a pretty-printed JSON array.
    #[inline]
    pub fn export_metadata(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;

        info!(
            "Exported metadata for {} documents to {}",
            self.records.len(),
            path.display()
        );
        Ok(())
    }
}

/// Cosine similarity clamped to `[-1, 1]`. A zero-norm vector scores 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        warn!(
            "Cosine similarity on vectors of different length ({} vs {})",
            a.len(),
            b.len()
        );
        return 0.0;
    }

    // Accumulate in f64 so large components cannot overflow the norms
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(dot, na, nb), (&x, &y)| {
            let (x, y) = (f64::from(x), f64::from(y));
            (x.mul_add(y, dot), x.mul_add(x, na), y.mul_add(y, nb))
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 || !norm_a.is_finite() || !norm_b.is_finite() {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}
