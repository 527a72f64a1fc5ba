use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector store error: {0}")]
    Store(#[from] index::StoreError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] embeddings::ProviderError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] extract::ExtractError),

    #[error("Document library error: {0}")]
    Library(#[from] library::LibraryError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] engine::AddDocumentError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod extract;
pub mod index;
pub mod library;
pub mod ranking;
