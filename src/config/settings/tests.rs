use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.batch_size, 64);
    assert_eq!(config.search.default_top_k, 5);
    assert_eq!(config.search.default_threshold, Some(0.3));
    assert_eq!(config.library.excerpt_chars, 500);
    assert_eq!(config.library.min_text_chars, 10);
    assert!(config.library.allowed_extensions.contains(&".pdf".to_string()));
    assert!(config.library.allowed_extensions.contains(&".docx".to_string()));
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.search.default_top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.search.default_threshold = Some(1.5);
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidThreshold(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.library.allowed_extensions = vec!["txt".to_string()];
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidExtension(_))
    ));

    let mut invalid_config = config;
    invalid_config.ranking.filename_boost = 2.0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidRankingParameter { .. })
    ));
}

#[test]
fn threshold_can_be_disabled() {
    let mut config = Config::default();
    config.search.default_threshold = None;
    assert!(config.validate().is_ok());
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_tables_fall_back_to_defaults() {
    let partial_toml = r#"
        [ollama]
        host = "custom-host"

        [ranking]
        filename_boost = 0.25
    "#;

    let config: Config = toml::from_str(partial_toml).expect("should parse partial config");
    assert_eq!(config.ollama.host, "custom-host");
    assert_eq!(config.ollama.port, 11434);
    assert!((config.ranking.filename_boost - 0.25).abs() < f32::EPSILON);
    assert!((config.ranking.filename_fallback_score - 0.6).abs() < f32::EPSILON);
    assert_eq!(config.search, SearchConfig::default());
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("new-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());
    assert!(config.set_embedding_dimension(1536).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());
    assert!(config.set_embedding_dimension(8).is_err());
}

#[test]
fn load_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");
    config.ollama.model = "mxbai-embed-large".to_string();
    config.ranking.filename_fallback_score = 0.55;
    config.search.default_threshold = Some(0.45);

    config.save().expect("should save config");
    let loaded = Config::load(temp_dir.path()).expect("should load saved config");

    assert_eq!(config, loaded);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[search]\ndefault_top_k = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn derived_paths_live_under_base_dir() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.documents_dir(), temp_dir.path().join("uploads"));
    assert_eq!(
        config.index_path(),
        temp_dir
            .path()
            .join("embeddings")
            .join("documents_index.arrow")
    );
    assert!(config.metadata_export_path().starts_with(temp_dir.path()));
}
