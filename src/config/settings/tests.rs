use std::path::Path;

use super::*;
use crate::embeddings::chunking::ChunkingConfig;
use tempfile::TempDir;

fn test_config(base_dir: &Path) -> Config {
    Config {
        gemini: GeminiConfig::default(),
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
        retry: RetryConfig::default(),
        ingest: IngestConfig::default(),
        base_dir: base_dir.to_path_buf(),
    }
}

#[test]
fn load_defaults_when_file_missing() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.gemini, GeminiConfig::default());
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.chunk_overlap, 200);
    assert_eq!(config.retrieval.top_k, 3);
    assert!((config.retrieval.similarity_threshold - 0.3).abs() < f32::EPSILON);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.ingest.embedding_failure, EmbeddingFailure::Abort);
    assert_eq!(config.base_dir, temp_dir.path());
}

#[test]
fn save_and_reload_roundtrip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = test_config(temp_dir.path());
    config.gemini.batch_size = 50;
    config.retrieval.top_k = 10;
    config.ingest.embedding_failure = EmbeddingFailure::ZeroFill;

    config.save().expect("should save config");

    let reloaded = Config::load(temp_dir.path()).expect("should reload config");
    assert_eq!(reloaded, config);
}

#[test]
fn artifact_paths_derive_from_base_dir() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path());

    assert_eq!(config.index_path(), temp_dir.path().join("index.bin"));
    assert_eq!(
        config.metadata_path(),
        temp_dir.path().join("index_metadata.json")
    );
}

#[test]
fn rejects_invalid_batch_size() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = test_config(temp_dir.path());
    config.gemini.batch_size = 0;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidBatchSize(0))
    ));
}

#[test]
fn rejects_overlap_larger_than_chunk_size() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = test_config(temp_dir.path());
    config.chunking.chunk_size = 500;
    config.chunking.chunk_overlap = 500;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(500, 500))
    ));
}

#[test]
fn rejects_out_of_range_threshold() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = test_config(temp_dir.path());
    config.retrieval.similarity_threshold = 1.5;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidThreshold(_))
    ));
}

#[test]
fn rejects_invalid_base_url() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = test_config(temp_dir.path());
    config.gemini.base_url = "not a url".to_string();

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));
}

#[test]
fn embedding_failure_parses_kebab_case() {
    let parsed: IngestConfig =
        toml::from_str("embedding_failure = \"zero-fill\"").expect("should parse");
    assert_eq!(parsed.embedding_failure, EmbeddingFailure::ZeroFill);

    let parsed: IngestConfig =
        toml::from_str("embedding_failure = \"abort\"").expect("should parse");
    assert_eq!(parsed.embedding_failure, EmbeddingFailure::Abort);
}
