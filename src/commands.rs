use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::engine::{BatchReport, SearchEngine};
use crate::index::DocumentSummary;

fn open_engine(config: &Config) -> Result<SearchEngine<OllamaClient>> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    SearchEngine::open(config, client).context("Failed to open search index")
}

fn progress_bar(template: &str, length: u64) -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(length).with_style(
            ProgressStyle::with_template(template).expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    }
}

/// Copy files into the document library and index them
#[inline]
pub async fn add_documents(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let limit = config.library.max_files_per_batch;
    if paths.len() > limit {
        bail!(
            "Maximum {} files allowed per batch, got {}",
            limit,
            paths.len()
        );
    }

    let engine = open_engine(config)?;
    let library = engine.library();

    let bar = progress_bar("{spinner} [{pos}/{len}] Importing {msg}", paths.len() as u64);
    let mut stored = Vec::with_capacity(paths.len());
    let mut rejected = 0usize;
    for path in paths {
        bar.set_message(path.display().to_string());
        match library.import_file(path) {
            Ok(stored_path) => stored.push(stored_path),
            Err(e) => {
                warn!("Rejected {}: {}", path.display(), e);
                bar.println(format!(
                    "{} {}: {}",
                    style("✗").red(),
                    path.display(),
                    e
                ));
                rejected += 1;
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    if stored.is_empty() {
        bail!("No files could be added");
    }

    let spinner = progress_bar("{spinner} {msg}", 0);
    spinner.set_message(format!("Extracting and embedding {} files", stored.len()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let report = engine.add_documents(&stored).await;
    spinner.finish_and_clear();

    let report = report.context("Failed to save the index")?;
    print_batch_report(&report);
    if rejected > 0 {
        println!("   Rejected before indexing: {}", rejected);
    }

    Ok(())
}

fn print_batch_report(report: &BatchReport) {
    for result in &report.results {
        match &result.outcome {
            Ok(summary) => println!(
                "{} {} ({} characters, {:.2} MB)",
                style("✓").green(),
                summary.filename,
                summary.text_length,
                summary.size_mb
            ),
            Err(e) => println!(
                "{} {}: {}",
                style("✗").red(),
                result.path.display(),
                e
            ),
        }
    }

    println!();
    println!(
        "📄 Processed {} files: {} indexed, {} failed",
        report.total, report.successful, report.failed
    );
}

/// Remove a document from the index and delete its stored file
#[inline]
pub async fn remove_document(config: &Config, filename: &str) -> Result<()> {
    let engine = open_engine(config)?;

    let removed = engine
        .remove_document(filename)
        .await
        .context("Failed to remove document from index")?;
    let deleted = engine
        .library()
        .delete_file(filename)
        .context("Failed to delete stored file")?;

    if removed == 0 && !deleted {
        println!("No document named {} was found.", filename);
        return Ok(());
    }

    info!("Removed {} ({} index entries)", filename, removed);
    println!("🗑️  Removed {}", style(filename).bold());
    println!("   Index entries removed: {}", removed);
    if deleted {
        println!("   Stored file deleted");
    }

    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub threshold: Option<f32>,
    /// Disable the score cutoff entirely
    pub no_threshold: bool,
    pub json: bool,
}

/// Search indexed documents and print ranked results
#[inline]
pub async fn search_documents(config: &Config, query: &str, options: &SearchOptions) -> Result<()> {
    let engine = open_engine(config)?;

    let mut request = engine.default_request(query);
    if let Some(top_k) = options.top_k {
        request.top_k = top_k;
    }
    if options.no_threshold {
        request.threshold = None;
    } else if let Some(threshold) = options.threshold {
        request.threshold = Some(threshold);
    }

    let results = engine.search(&request).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No documents matched {:?}.", query);
        return Ok(());
    }

    println!("🔍 {} results for {:?}", results.len(), query);
    println!();
    for (rank, result) in results.iter().enumerate() {
        let marker = if result.filename_match { " 📎" } else { "" };
        println!(
            "{}. {} {}{}",
            rank + 1,
            style(&result.record.filename).bold(),
            style(format!("({:.3})", result.similarity_score)).cyan(),
            marker
        );
        if let Some(content) = result.content_score {
            println!("   Content similarity: {:.3}", content);
        }
        println!("   {}", preview(&result.record.text_excerpt, 200));
        println!();
    }

    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        format!("{}…", flat.chars().take(max_chars).collect::<String>())
    } else {
        flat
    }
}

/// List every indexed document
#[inline]
pub async fn list_documents(config: &Config) -> Result<()> {
    let engine = open_engine(config)?;
    let documents = engine.list_documents().await;

    if documents.is_empty() {
        println!("No documents have been indexed yet.");
        println!("Use 'docs-search add <file>' to add documents.");
        return Ok(());
    }

    println!("Indexed Documents ({} total):", documents.len());
    println!();
    for document in &documents {
        print_summary(document);
    }

    Ok(())
}

fn print_summary(document: &DocumentSummary) {
    println!("📄 {}", style(&document.filename).bold());
    println!(
        "   Type: {}  Size: {:.2} MB  Characters: {}",
        document.extension, document.size_mb, document.text_length
    );
    println!(
        "   Indexed: {}",
        document.indexed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
}

/// Print one document's metadata and full text
#[inline]
pub async fn show_document(config: &Config, filename: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let document = engine
        .get_document(filename)
        .await
        .with_context(|| format!("Document not found: {}", filename))?;

    println!("📄 {}", style(&document.filename).bold());
    println!("   Path: {}", document.filepath.display());
    println!("   ID: {}", document.doc_id);
    println!(
        "   Type: {}  Size: {:.2} MB  Characters: {}",
        document.extension, document.size_mb, document.text_length
    );
    println!();
    println!("{}", document.full_text);

    Ok(())
}

/// Re-index every stored file from scratch
#[inline]
pub async fn rebuild_index(config: &Config) -> Result<()> {
    let engine = open_engine(config)?;

    let spinner = progress_bar("{spinner} {msg}", 0);
    spinner.set_message("Rebuilding index from the document library");
    spinner.enable_steady_tick(Duration::from_millis(100));
    let report = engine.rebuild_index().await;
    spinner.finish_and_clear();

    let report = report.context("Failed to rebuild index")?;
    print_batch_report(&report.files);
    println!(
        "🔄 Index rebuilt: {} documents (previously {})",
        report.files.successful, report.previous_count
    );

    Ok(())
}

/// Show index and embedding service status
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Docs-Search Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let health_client = client.clone();
    let health = tokio::task::spawn_blocking(move || {
        health_client.ping()?;
        Ok::<_, anyhow::Error>(health_client.health_check())
    })
    .await?;
    match health {
        Ok(model) => {
            println!(
                "   ✅ Ollama: Connected ({}:{})",
                config.ollama.host, config.ollama.port
            );
            match model {
                Ok(()) => println!("   📋 Model: {}", config.ollama.model),
                Err(e) => println!("   ⚠️  Model: {:#}", e),
            }
        }
        Err(e) => println!("   ❌ Ollama: Unavailable - {:#}", e),
    }
    println!();

    let engine = SearchEngine::open(config, client).context("Failed to open search index")?;
    let stats = engine.stats().await;
    let library_files = engine.library().list_files()?.len();

    println!("🔍 Index Status:");
    println!("   Documents indexed: {}", stats.document_count);
    match stats.dimension {
        Some(dimension) => println!("   Embedding dimension: {}", dimension),
        None => println!("   Embedding dimension: {}", style("not set").dim()),
    }
    println!("   Index file: {}", stats.index_path.display());
    println!();

    println!("📁 Library Status:");
    println!("   Stored files: {}", library_files);
    println!("   Directory: {}", stats.library_dir.display());
    if library_files != stats.document_count {
        println!(
            "   {} Library and index differ; run 'docs-search rebuild' to resync",
            style("⚠").yellow()
        );
    }

    Ok(())
}

/// Write all document metadata as JSON
#[inline]
pub async fn export_metadata(config: &Config, path: Option<&Path>) -> Result<()> {
    let engine = open_engine(config)?;
    let destination = path.map_or_else(|| config.metadata_export_path(), Path::to_path_buf);

    engine
        .export_metadata(&destination)
        .await
        .context("Failed to export metadata")?;

    println!(
        "📤 Exported metadata for {} documents to {}",
        engine.document_count().await,
        destination.display()
    );
    Ok(())
}
