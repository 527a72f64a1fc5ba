use clap::{Parser, Subcommand};
use docs_search::{Result, SearchError};
use docs_search::commands::{
    SearchOptions, add_documents, export_metadata, list_documents, rebuild_index,
    remove_document, search_documents, show_document, show_status,
};
use docs_search::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-search")]
#[command(about = "Semantic search over a local document library using Ollama embeddings")]
#[command(version)]
struct Cli {
    /// Application directory holding config, documents and the index
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and ranking settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Copy files into the library and index them
    Add {
        /// Files to add (.txt, .md, .html, .pdf, .docx)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Remove a document from the index and the library
    Remove {
        /// Stored filename of the document
        filename: String,
    },
    /// Search indexed documents
    Search {
        /// Natural-language query
        query: String,
        /// Maximum number of results
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
        /// Minimum cosine similarity, between -1 and 1
        #[arg(long, allow_negative_numbers = true, conflicts_with = "no_threshold")]
        threshold: Option<f32>,
        /// Return results regardless of score
        #[arg(long)]
        no_threshold: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all indexed documents
    List,
    /// Show a document's metadata and extracted text
    Show {
        /// Stored filename of the document
        filename: String,
    },
    /// Re-extract and re-embed every file in the library
    Rebuild,
    /// Show index, library and Ollama status
    Status,
    /// Export document metadata as JSON
    Export {
        /// Destination file, defaults to metadata.json in the data directory
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.data_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(|e| SearchError::Config(e.to_string()))?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&Config::load(&base_dir)?);
        } else {
            run_interactive_config(&base_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Add { paths } => {
            add_documents(&config, &paths).await?;
        }
        Commands::Remove { filename } => {
            remove_document(&config, &filename).await?;
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            no_threshold,
            json,
        } => {
            let options = SearchOptions {
                top_k,
                threshold,
                no_threshold,
                json,
            };
            search_documents(&config, &query, &options).await?;
        }
        Commands::List => {
            list_documents(&config).await?;
        }
        Commands::Show { filename } => {
            show_document(&config, &filename).await?;
        }
        Commands::Rebuild => {
            rebuild_index(&config).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Export { path } => {
            export_metadata(&config, path.as_deref()).await?;
        }
    }

    Ok(())
}
