// Stored source documents

#[cfg(test)]
mod tests;

use chrono::Utc;
use itertools::Itertools;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::extract::normalized_extension;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("File type not allowed: {0}")]
    DisallowedExtension(String),

    #[error("File too large: {size_bytes} bytes (limit {limit_bytes} bytes)")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory of stored source files that the index is built from
#[derive(Debug, Clone)]
pub struct DocumentLibrary {
    dir: PathBuf,
    allowed_extensions: Vec<String>,
    max_file_bytes: u64,
}

impl DocumentLibrary {
    #[inline]
    pub fn new(dir: PathBuf, allowed_extensions: &[String], max_file_bytes: u64) -> Self {
        Self {
            dir,
            allowed_extensions: allowed_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            max_file_bytes,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.documents_dir(),
            &config.library.allowed_extensions,
            config.library.max_file_size_mb * 1024 * 1024,
        )
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn is_allowed(&self, path: &Path) -> bool {
        let extension = normalized_extension(path);
        !extension.is_empty() && self.allowed_extensions.contains(&extension)
    }

    #[inline]
    pub fn ensure_dir(&self) -> Result<(), LibraryError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Copy `source` into the library and return the stored path.
    ///
    /// A file already inside the library is used in place. When the name is
    /// taken, the stored name becomes `<stem>_<unix-seconds><ext>`.
    #[inline]
    pub fn import_file(&self, source: &Path) -> Result<PathBuf, LibraryError> {
        if !self.is_allowed(source) {
            return Err(LibraryError::DisallowedExtension(normalized_extension(
                source,
            )));
        }

        let metadata = fs::metadata(source)?;
        if !metadata.is_file() {
            return Err(LibraryError::NotAFile(source.to_path_buf()));
        }
        if metadata.len() > self.max_file_bytes {
            return Err(LibraryError::TooLarge {
                size_bytes: metadata.len(),
                limit_bytes: self.max_file_bytes,
            });
        }

        self.ensure_dir()?;

        if self.contains(source)
            && let Some(name) = source.file_name()
        {
            // Same path form as `list_files`, so document ids stay stable
            debug!("{} is already in the library", source.display());
            return Ok(self.dir.join(name));
        }

        let name = source
            .file_name()
            .map(|name| sanitize_filename(&name.to_string_lossy()))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| LibraryError::InvalidName(source.display().to_string()))?;

        let destination = self.free_destination(&name);
        fs::copy(source, &destination)?;

        info!(
            "Stored {} as {}",
            source.display(),
            destination.display()
        );
        Ok(destination)
    }

    fn contains(&self, path: &Path) -> bool {
        match (path.canonicalize(), self.dir.canonicalize()) {
            (Ok(file), Ok(dir)) => file.parent() == Some(dir.as_path()),
            _ => false,
        }
    }

    fn free_destination(&self, name: &str) -> PathBuf {
        let candidate = self.dir.join(name);
        if !candidate.exists() {
            return candidate;
        }

        let path = Path::new(name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let timestamp = Utc::now().timestamp();

        let candidate = self.dir.join(format!("{}_{}{}", stem, timestamp, extension));
        if !candidate.exists() {
            return candidate;
        }

        // Several imports of the same name within one second
        (1u32..)
            .map(|n| {
                self.dir
                    .join(format!("{}_{}_{}{}", stem, timestamp, n, extension))
            })
            .find(|candidate| !candidate.exists())
            .unwrap_or(candidate)
    }

    /// Delete the stored file called `filename`. Returns whether one existed.
    #[inline]
    pub fn delete_file(&self, filename: &str) -> Result<bool, LibraryError> {
        // Only bare names inside the library directory
        if Path::new(filename).file_name() != Some(OsStr::new(filename)) {
            return Err(LibraryError::InvalidName(filename.to_string()));
        }

        let path = self.dir.join(filename);
        if !path.is_file() {
            return Ok(false);
        }

        fs::remove_file(&path)?;
        info!("Deleted stored file {}", path.display());
        Ok(true)
    }

    /// Stored files with allowed extensions, sorted by path
    #[inline]
    pub fn list_files(&self) -> Result<Vec<PathBuf>, LibraryError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)?.collect::<Result<Vec<_>, _>>()?;
        let files = entries
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.is_allowed(path))
            .sorted()
            .collect();

        Ok(files)
    }
}

/// Reduce a file name to a safe single path component.
#[inline]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    cleaned.trim_start_matches('.').to_string()
}
