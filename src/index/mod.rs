// Vector index module
// In-memory flat vector store with whole-file Arrow snapshots

pub mod snapshot;
pub mod vector_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use vector_store::VectorStore;

/// Metadata for one indexed file. Its embedding lives in the store matrix at
/// the same position as the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// Hex SHA-256 of the storage path
    pub doc_id: String,
    /// Display name at indexing time, also the removal key
    pub filename: String,
    pub filepath: PathBuf,
    /// Lowercase extension including the leading dot
    pub extension: String,
    pub size_mb: f64,
    /// Bounded prefix of the cleaned text
    pub text_excerpt: String,
    /// Character count of the full cleaned text
    pub text_length: usize,
    pub full_text: String,
    pub indexed_at: DateTime<Utc>,
}

/// Listing view of a record without the full text
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub filename: String,
    pub filepath: PathBuf,
    pub extension: String,
    pub size_mb: f64,
    pub text_excerpt: String,
    pub text_length: usize,
    pub indexed_at: DateTime<Utc>,
}

impl From<&DocumentRecord> for DocumentSummary {
    #[inline]
    fn from(record: &DocumentRecord) -> Self {
        Self {
            doc_id: record.doc_id.clone(),
            filename: record.filename.clone(),
            filepath: record.filepath.clone(),
            extension: record.extension.clone(),
            size_mb: record.size_mb,
            text_excerpt: record.text_excerpt.clone(),
            text_length: record.text_length,
            indexed_at: record.indexed_at,
        }
    }
}

/// One result of a content similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: DocumentRecord,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
    /// Insertion position of the record in the store
    pub position: usize,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Embedding dimension mismatch: store holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Batch length mismatch: {embeddings} embeddings for {records} records")]
    LengthMismatch { embeddings: usize, records: usize },

    #[error("Corrupt index snapshot at {}: {reason}", path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable document id derived from the storage path, not the file content.
#[inline]
pub fn document_id(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    format!("{:x}", digest)
}
