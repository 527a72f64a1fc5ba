#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;
use crate::ranking::RankingConfig;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 64,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// Defaults applied to search requests that leave values unspecified
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub default_threshold: Option<f32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            default_threshold: Some(0.3),
        }
    }
}

/// Intake rules for the stored document library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LibraryConfig {
    /// Characters of cleaned text kept as the display excerpt
    pub excerpt_chars: usize,
    /// Documents whose cleaned text is shorter than this are rejected
    pub min_text_chars: usize,
    pub max_file_size_mb: u64,
    pub max_files_per_batch: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            excerpt_chars: 500,
            min_text_chars: 10,
            max_file_size_mb: 10,
            max_files_per_batch: 10,
            allowed_extensions: [".pdf", ".docx", ".txt", ".md", ".html", ".htm"]
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid {name}: {value} (must be between {min} and {max})")]
    InvalidRankingParameter {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("Invalid candidate multiplier: {0} (must be between 1 and 20)")]
    InvalidCandidateMultiplier(usize),
    #[error("Invalid default top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid default threshold: {0} (must be between -1 and 1)")]
    InvalidThreshold(f32),
    #[error("Invalid excerpt length: {0} (must be between 1 and 10000)")]
    InvalidExcerptLength(usize),
    #[error("Invalid max file size: {0} MB (must be between 1 and 1024)")]
    InvalidMaxFileSize(u64),
    #[error("Invalid max files per batch: {0} (must be between 1 and 1000)")]
    InvalidMaxFilesPerBatch(usize),
    #[error("Invalid file extension: {0:?} (must start with '.')")]
    InvalidExtension(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default application directory: `~/.docs-search`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".docs-search"))
            .or_else(|| dirs::data_dir().map(|data| data.join("docs-search")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the default application directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let dir = Self::default_dir().context("Failed to determine config directory")?;
        Self::load(dir)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.ranking.validate()?;
        self.validate_search_config()?;
        self.validate_library_config()?;
        Ok(())
    }

    fn validate_search_config(&self) -> Result<(), ConfigError> {
        let config = &self.search;

        if !(1..=100).contains(&config.default_top_k) {
            return Err(ConfigError::InvalidTopK(config.default_top_k));
        }

        if let Some(threshold) = config.default_threshold
            && !(-1.0..=1.0).contains(&threshold)
        {
            return Err(ConfigError::InvalidThreshold(threshold));
        }

        Ok(())
    }

    fn validate_library_config(&self) -> Result<(), ConfigError> {
        let config = &self.library;

        if !(1..=10_000).contains(&config.excerpt_chars) {
            return Err(ConfigError::InvalidExcerptLength(config.excerpt_chars));
        }

        if !(1..=1024).contains(&config.max_file_size_mb) {
            return Err(ConfigError::InvalidMaxFileSize(config.max_file_size_mb));
        }

        if !(1..=1000).contains(&config.max_files_per_batch) {
            return Err(ConfigError::InvalidMaxFilesPerBatch(
                config.max_files_per_batch,
            ));
        }

        if let Some(bad) = config
            .allowed_extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(ConfigError::InvalidExtension(bad.clone()));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Directory holding the stored source documents
    #[inline]
    pub fn documents_dir(&self) -> PathBuf {
        self.get_base_dir().join("uploads")
    }

    /// Directory holding the index snapshot and exports
    #[inline]
    pub fn embeddings_dir(&self) -> PathBuf {
        self.get_base_dir().join("embeddings")
    }

    /// Path of the vector index snapshot
    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.embeddings_dir().join("documents_index.arrow")
    }

    /// Default destination for metadata exports
    #[inline]
    pub fn metadata_export_path(&self) -> PathBuf {
        self.embeddings_dir().join("metadata.json")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidUrl(format!(
                "{}://{}:{}",
                self.protocol, self.host, self.port
            )));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}
