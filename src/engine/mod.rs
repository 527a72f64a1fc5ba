// Search orchestrator
// Owns the vector store and keeps its on-disk snapshot in step with every mutation


use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SearchConfig};
use crate::embeddings::{EmbeddingProvider, ProviderError};
use crate::extract::{self, ExtractError, ExtractedDocument};
use crate::index::{DocumentRecord, DocumentSummary, StoreError, VectorStore, document_id};
use crate::library::DocumentLibrary;
use crate::ranking::{self, RankedDocument, RankingConfig, RankingRequest};
use crate::{Result, SearchError};

/// Files extracted and embedded concurrently during batch work
const PREPARE_CONCURRENCY: usize = 4;
const MAX_TOP_K: usize = 100;

/// Failure to index one document, naming the step that failed
#[derive(Debug, Error)]
pub enum AddDocumentError {
    #[error("Text extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Extracted text too short: {length} characters (minimum {minimum})")]
    TooShort { length: usize, minimum: usize },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("Vector store rejected the document: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to persist the index: {0}")]
    Persist(StoreError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    /// Minimum fused score; `None` disables the cutoff
    pub threshold: Option<f32>,
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub outcome: std::result::Result<DocumentSummary, AddDocumentError>,
}

impl FileOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<FileOutcome>,
}

impl BatchReport {
    fn from_outcomes(results: Vec<FileOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

#[derive(Debug, Default)]
pub struct RebuildReport {
    /// Documents in the index before the rebuild
    pub previous_count: usize,
    pub files: BatchReport,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexStats {
    pub document_count: usize,
    pub dimension: Option<usize>,
    pub index_path: PathBuf,
    pub library_dir: PathBuf,
    pub model: String,
}

struct PreparedDocument {
    record: DocumentRecord,
    embedding: Vec<f32>,
}

pub struct SearchEngine<P> {
    store: RwLock<VectorStore>,
    provider: P,
    library: DocumentLibrary,
    index_path: PathBuf,
    ranking: RankingConfig,
    defaults: SearchConfig,
    excerpt_chars: usize,
    min_text_chars: usize,
}

impl<P: EmbeddingProvider> SearchEngine<P> {
    /// Create the data directories and load the index snapshot.
    ///
    /// A snapshot that cannot be parsed is moved aside and the engine starts
    /// with an empty index.
    #[inline]
    pub fn open(config: &Config, provider: P) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SearchError::Config(e.to_string()))?;

        let library = DocumentLibrary::from_config(config);
        library.ensure_dir()?;
        fs::create_dir_all(config.embeddings_dir())?;

        let index_path = config.index_path();
        let mut store = VectorStore::new();
        match store.load(&index_path) {
            Ok(true) => info!("Index ready with {} documents", store.count()),
            Ok(false) => info!("No existing index at {}, starting empty", index_path.display()),
            Err(StoreError::CorruptSnapshot { reason, .. }) => {
                error!("Index snapshot is corrupt ({}), starting empty", reason);
                quarantine_snapshot(&index_path);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            store: RwLock::new(store),
            provider,
            library,
            index_path,
            ranking: config.ranking.clone(),
            defaults: config.search.clone(),
            excerpt_chars: config.library.excerpt_chars,
            min_text_chars: config.library.min_text_chars,
        })
    }

    #[inline]
    pub fn library(&self) -> &DocumentLibrary {
        &self.library
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[inline]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// A request carrying the configured default `top_k` and threshold
    #[inline]
    pub fn default_request(&self, query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            top_k: self.defaults.default_top_k,
            threshold: self.defaults.default_threshold,
        }
    }

    /// Extract text on a blocking task and enforce the minimum length.
    async fn extract_text(
        &self,
        path: &Path,
    ) -> std::result::Result<ExtractedDocument, AddDocumentError> {
        let owned = path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extract::extract_document(&owned))
            .await
            .map_err(|e| ExtractError::Extraction {
                path: path.to_path_buf(),
                reason: format!("extraction task failed: {}", e),
            })??;

        let length = extracted.text.chars().count();
        if length < self.min_text_chars {
            return Err(AddDocumentError::TooShort {
                length,
                minimum: self.min_text_chars,
            });
        }
        Ok(extracted)
    }

    fn assemble(
        &self,
        path: &Path,
        extracted: ExtractedDocument,
        embedding: Vec<f32>,
    ) -> std::result::Result<PreparedDocument, AddDocumentError> {
        if embedding.is_empty() {
            return Err(ProviderError::EmptyEmbedding.into());
        }

        let length = extracted.text.chars().count();
        debug!(
            "Embedded {} ({} characters, {} dimensions)",
            path.display(),
            length,
            embedding.len()
        );

        let record = DocumentRecord {
            doc_id: document_id(path),
            filename: extracted.info.filename,
            filepath: path.to_path_buf(),
            extension: extracted.info.extension,
            size_mb: extracted.info.size_mb,
            text_excerpt: extract::excerpt(&extracted.text, self.excerpt_chars),
            text_length: length,
            full_text: extracted.text,
            indexed_at: Utc::now(),
        };

        Ok(PreparedDocument { record, embedding })
    }

    /// Extract, embed and build the record for one file. Takes no lock.
    async fn prepare(&self, path: &Path) -> std::result::Result<PreparedDocument, AddDocumentError> {
        let extracted = self.extract_text(path).await?;
        let embedding = self.provider.embed(&extracted.text).await?;
        self.assemble(path, extracted, embedding)
    }

    async fn embed_one(
        &self,
        path: &Path,
        extracted: std::result::Result<ExtractedDocument, AddDocumentError>,
    ) -> std::result::Result<PreparedDocument, AddDocumentError> {
        let doc = extracted?;
        let embedding = self.provider.embed(&doc.text).await?;
        self.assemble(path, doc, embedding)
    }

    /// Prepare several files. Texts are embedded in one provider batch; if
    /// the batch call fails, each file is embedded on its own so the failure
    /// is attributed to the file that caused it.
    async fn prepare_all(
        &self,
        paths: &[PathBuf],
    ) -> Vec<std::result::Result<PreparedDocument, AddDocumentError>> {
        let extracted: Vec<_> = stream::iter(paths)
            .map(|path| self.extract_text(path))
            .buffered(PREPARE_CONCURRENCY)
            .collect()
            .await;

        let texts: Vec<String> = extracted
            .iter()
            .filter_map(|result| result.as_ref().ok().map(|doc| doc.text.clone()))
            .collect();
        let batch = if texts.is_empty() {
            Some(Vec::new())
        } else {
            match self.provider.embed_batch(&texts).await {
                Ok(embeddings) if embeddings.len() == texts.len() => Some(embeddings),
                Ok(embeddings) => {
                    warn!(
                        "Batch embedding returned {} vectors for {} texts, embedding one at a time",
                        embeddings.len(),
                        texts.len()
                    );
                    None
                }
                Err(e) => {
                    warn!("Batch embedding failed ({}), embedding one at a time", e);
                    None
                }
            }
        };

        match batch {
            Some(embeddings) => {
                let mut embeddings = embeddings.into_iter();
                paths
                    .iter()
                    .zip(extracted)
                    .map(|(path, result)| {
                        result.and_then(|doc| {
                            let embedding = embeddings.next().unwrap_or_default();
                            self.assemble(path, doc, embedding)
                        })
                    })
                    .collect()
            }
            None => {
                stream::iter(paths.iter().zip(extracted))
                    .map(|(path, result)| self.embed_one(path, result))
                    .buffered(PREPARE_CONCURRENCY)
                    .collect()
                    .await
            }
        }
    }

    /// Index one file and persist the index.
    #[inline]
    pub async fn add_document(
        &self,
        path: &Path,
    ) -> std::result::Result<DocumentSummary, AddDocumentError> {
        let prepared = self.prepare(path).await?;
        let summary = DocumentSummary::from(&prepared.record);

        let mut store = self.store.write().await;
        let (len, dimension) = (store.count(), store.dimension());
        store.add(&prepared.embedding, prepared.record)?;

        if let Err(e) = store.save(&self.index_path) {
            store.rollback(len, dimension);
            error!("Rolled back {} after failed save: {}", path.display(), e);
            return Err(AddDocumentError::Persist(e));
        }

        info!("Indexed {}", summary.filename);
        Ok(summary)
    }

    /// Index several files with one store mutation and one save.
    ///
    /// Files fail independently; a failed save rolls back the whole batch
    /// and is returned as the error.
    #[inline]
    pub async fn add_documents(
        &self,
        paths: &[PathBuf],
    ) -> std::result::Result<BatchReport, AddDocumentError> {
        info!("Indexing batch of {} files", paths.len());
        let prepared = self.prepare_all(paths).await;

        let mut store = self.store.write().await;
        let (len, dimension) = (store.count(), store.dimension());

        let mut target = dimension;
        let mut outcomes = Vec::with_capacity(paths.len());
        let mut embeddings = Vec::new();
        let mut records = Vec::new();
        for (path, result) in paths.iter().zip(prepared) {
            let outcome = result.and_then(|doc| {
                let expected = *target.get_or_insert(doc.embedding.len());
                if doc.embedding.len() != expected {
                    return Err(AddDocumentError::Store(StoreError::DimensionMismatch {
                        expected,
                        actual: doc.embedding.len(),
                    }));
                }
                let summary = DocumentSummary::from(&doc.record);
                embeddings.push(doc.embedding);
                records.push(doc.record);
                Ok(summary)
            });
            if let Err(e) = &outcome {
                warn!("Skipping {}: {}", path.display(), e);
            }
            outcomes.push(FileOutcome {
                path: path.clone(),
                outcome,
            });
        }

        if !records.is_empty() {
            store.add_batch(&embeddings, records)?;
            if let Err(e) = store.save(&self.index_path) {
                store.rollback(len, dimension);
                error!("Rolled back batch after failed save: {}", e);
                return Err(AddDocumentError::Persist(e));
            }
        }

        let report = BatchReport::from_outcomes(outcomes);
        info!(
            "Batch complete: {} indexed, {} failed",
            report.successful, report.failed
        );
        Ok(report)
    }

    /// Remove every record with this filename. Zero removals is not an error.
    #[inline]
    pub async fn remove_document(&self, filename: &str) -> std::result::Result<usize, StoreError> {
        let mut store = self.store.write().await;

        let mut updated = store.clone();
        let removed = updated.remove_by_filename(filename);
        if removed == 0 {
            debug!("No indexed document named {}", filename);
            return Ok(0);
        }

        updated.save(&self.index_path)?;
        *store = updated;
        Ok(removed)
    }

    /// Re-index every file in the library and replace the index with the
    /// result.
    #[inline]
    pub async fn rebuild_index(&self) -> Result<RebuildReport> {
        let files = self.library.list_files()?;
        info!("Rebuilding index from {} library files", files.len());

        let prepared = self.prepare_all(&files).await;

        let mut fresh = VectorStore::new();
        let mut outcomes = Vec::with_capacity(files.len());
        for (path, result) in files.iter().zip(prepared) {
            let outcome = result.and_then(|doc| {
                let summary = DocumentSummary::from(&doc.record);
                fresh.add(&doc.embedding, doc.record)?;
                Ok(summary)
            });
            if let Err(e) = &outcome {
                warn!("Skipping {} during rebuild: {}", path.display(), e);
            }
            outcomes.push(FileOutcome {
                path: path.clone(),
                outcome,
            });
        }

        let mut store = self.store.write().await;
        let previous_count = store.count();
        fresh.save(&self.index_path)?;
        *store = fresh;

        let report = RebuildReport {
            previous_count,
            files: BatchReport::from_outcomes(outcomes),
        };
        info!(
            "Rebuild complete: {} documents indexed (previously {})",
            report.files.successful, previous_count
        );
        Ok(report)
    }

    /// Rank indexed documents against a natural-language query.
    #[inline]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<RankedDocument>> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery(
                "query cannot be empty".to_string(),
            ));
        }
        if !(1..=MAX_TOP_K).contains(&request.top_k) {
            return Err(SearchError::InvalidQuery(format!(
                "top_k must be between 1 and {}, got {}",
                MAX_TOP_K, request.top_k
            )));
        }
        if let Some(threshold) = request.threshold
            && !(-1.0..=1.0).contains(&threshold)
        {
            return Err(SearchError::InvalidQuery(format!(
                "threshold must be between -1 and 1, got {}",
                threshold
            )));
        }

        let embedding = self.provider.embed(query).await?;
        let filename_embedding = if self.ranking.augment_filename_query {
            match self.provider.embed(&ranking::filename_query(query)).await {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    warn!("Filename query embedding failed, continuing without it: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let store = self.store.read().await;
        let results = ranking::rank(
            &store,
            &RankingRequest {
                query,
                embedding: &embedding,
                filename_embedding: filename_embedding.as_deref(),
                top_k: request.top_k,
                threshold: request.threshold,
            },
            &self.ranking,
        )?;

        debug!("Search {:?} returned {} results", query, results.len());
        Ok(results)
    }

    #[inline]
    pub async fn list_documents(&self) -> Vec<DocumentSummary> {
        let store = self.store.read().await;
        store.records().iter().map(DocumentSummary::from).collect()
    }

    /// First indexed record with this filename, full text included
    #[inline]
    pub async fn get_document(&self, filename: &str) -> Option<DocumentRecord> {
        let store = self.store.read().await;
        store
            .records()
            .iter()
            .find(|record| record.filename == filename)
            .cloned()
    }

    #[inline]
    pub async fn document_count(&self) -> usize {
        self.store.read().await.count()
    }

    #[inline]
    pub async fn stats(&self) -> IndexStats {
        let store = self.store.read().await;
        IndexStats {
            document_count: store.count(),
            dimension: store.dimension(),
            index_path: self.index_path.clone(),
            library_dir: self.library.dir().to_path_buf(),
            model: self.provider.model_name().to_string(),
        }
    }

    /// Replace the in-memory index with the snapshot on disk.
    #[inline]
    pub async fn reload_index(&self) -> std::result::Result<bool, StoreError> {
        let mut store = self.store.write().await;
        store.load(&self.index_path)
    }

    #[inline]
    pub async fn export_metadata(&self, path: &Path) -> std::result::Result<(), StoreError> {
        let store = self.store.read().await;
        store.export_metadata(path)
    }
}

/// Move an unreadable snapshot to `<name>.corrupted_backup`.
fn quarantine_snapshot(path: &Path) {
    let mut backup = path.as_os_str().to_os_string();
    backup.push(".corrupted_backup");
    let backup = PathBuf::from(backup);

    match fs::rename(path, &backup) {
        Ok(()) => info!("Corrupt snapshot backed up to {}", backup.display()),
        Err(e) => error!("Failed to back up corrupt snapshot: {}", e),
    }
}
