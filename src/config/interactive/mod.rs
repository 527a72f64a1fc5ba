
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, OllamaConfig};
use crate::ranking::RankingConfig;

#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Docs Search Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(base_dir);

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for embedding generation.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Search Ranking").bold().yellow());
    eprintln!("Control how filename matches are blended with content similarity.");
    eprintln!();

    configure_ranking(&mut config.ranking)?;

    config.search.default_top_k = Input::new()
        .with_prompt("Default number of results")
        .default(config.search.default_top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 100")
            }
        })
        .interact_text()?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before adding documents.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Ranking:").bold().yellow());
    eprintln!(
        "  Filename Boost: {}",
        style(config.ranking.filename_boost).cyan()
    );
    eprintln!(
        "  Filename Fallback Score: {}",
        style(config.ranking.filename_fallback_score).cyan()
    );
    eprintln!(
        "  Threshold Relaxation: {}",
        style(config.ranking.threshold_relaxation).cyan()
    );
    eprintln!(
        "  Candidate Multiplier: {}",
        style(config.ranking.candidate_multiplier).cyan()
    );
    eprintln!(
        "  Filename Query Augmentation: {}",
        style(config.ranking.augment_filename_query).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Search Defaults:").bold().yellow());
    eprintln!("  Results: {}", style(config.search.default_top_k).cyan());
    match config.search.default_threshold {
        Some(threshold) => eprintln!("  Threshold: {}", style(threshold).cyan()),
        None => eprintln!("  Threshold: {}", style("none").dim()),
    }

    eprintln!();
    eprintln!("{}", style("Library:").bold().yellow());
    eprintln!(
        "  Allowed Extensions: {}",
        style(config.library.allowed_extensions.join(", ")).cyan()
    );
    eprintln!(
        "  Max File Size: {} MB",
        style(config.library.max_file_size_mb).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!(
        "Documents: {}",
        style(config.documents_dir().display()).dim()
    );
    eprintln!("Index: {}", style(config.index_path().display()).dim());
}

fn load_existing_config(base_dir: &Path) -> Config {
    let config_exists = base_dir.join("config.toml").exists();
    let config = Config::load(base_dir).unwrap_or_else(|e| {
        eprintln!(
            "{}",
            style(format!("Existing configuration is invalid ({:#}). Using defaults.", e)).yellow()
        );
        Config {
            base_dir: base_dir.to_path_buf(),
            ..Config::default()
        }
    });

    if config_exists {
        eprintln!("{}", style("Found existing configuration.").green());
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
    }

    config
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension produced by the model")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_batch_size(batch_size)?;
    ollama.set_embedding_dimension(dimension)?;

    Ok(())
}

fn configure_ranking(ranking: &mut RankingConfig) -> Result<()> {
    let unit_interval = |input: &f32| -> Result<(), &'static str> {
        if (0.0..=1.0).contains(input) {
            Ok(())
        } else {
            Err("Must be between 0 and 1")
        }
    };

    ranking.filename_boost = Input::new()
        .with_prompt("Score boost for results whose filename matches the query")
        .default(ranking.filename_boost)
        .validate_with(unit_interval)
        .interact_text()?;

    ranking.filename_fallback_score = Input::new()
        .with_prompt("Score for filename matches without content similarity")
        .default(ranking.filename_fallback_score)
        .validate_with(unit_interval)
        .interact_text()?;

    ranking.augment_filename_query = Confirm::new()
        .with_prompt("Also embed a filename-oriented variant of each query?")
        .default(ranking.augment_filename_query)
        .interact()?;

    ranking.validate()?;
    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) => (400..500).contains(&code),
        Err(_) => false,
    }
}
