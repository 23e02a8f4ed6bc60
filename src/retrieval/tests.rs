use std::fs;

use tempfile::TempDir;

use super::*;
use crate::config::Config;
use crate::index::{ChunkMetadata, FlatIndex, MetadataBundle};

/// Embeds every query as a fixed vector.
struct FixedEmbedder {
    vector: Vec<f32>,
}

impl Embedder for FixedEmbedder {
    fn embed(&self, _text: &str, _task: TaskType) -> Result<Vec<f32>> {
        Ok(self.vector.clone())
    }

    fn embed_batch(&self, texts: &[String], _task: TaskType) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str, _task: TaskType) -> Result<Vec<f32>> {
        Err(crate::RagError::Embedding("stubbed outage".to_string()))
    }

    fn embed_batch(&self, _texts: &[String], _task: TaskType) -> Result<Vec<Vec<f32>>> {
        Err(crate::RagError::Embedding("stubbed outage".to_string()))
    }
}

fn metadata(filename: &str, chunk_id: usize) -> ChunkMetadata {
    ChunkMetadata {
        filename: filename.to_string(),
        chunk_id,
        source: format!("corpus/{filename}"),
    }
}

/// Three unit vectors along the axes, so a query along one axis scores 1.0
/// against its row and 0.0 against the others.
fn write_artifacts(config: &Config) {
    let mut index = FlatIndex::new(3).expect("should create index");
    index.add(&[1.0, 0.0, 0.0]).expect("should add");
    index.add(&[0.0, 1.0, 0.0]).expect("should add");
    index.add(&[0.0, 0.0, 1.0]).expect("should add");
    index.write_to(&config.index_path()).expect("should write index");

    let bundle = MetadataBundle::new(
        vec![
            "alpha chunk".to_string(),
            "bravo chunk".to_string(),
            "charlie chunk".to_string(),
        ],
        vec![
            metadata("alpha.md", 0),
            metadata("bravo.md", 0),
            metadata("charlie.md", 0),
        ],
    )
    .expect("should build bundle");
    bundle
        .write_to(&config.metadata_path())
        .expect("should write bundle");
}

fn service_with(config: &Config, embedder: Arc<dyn Embedder>) -> RetrievalService {
    let mut service = RetrievalService::new(config, embedder);
    assert!(service.initialize());
    service
}

fn result(chunk: &str, score: f32, rank: usize) -> SearchResult {
    SearchResult {
        chunk: chunk.to_string(),
        metadata: metadata("doc.md", 0),
        score,
        rank,
    }
}

#[test]
fn initialize_reports_missing_artifacts() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");

    let mut service = RetrievalService::new(
        &config,
        Arc::new(FixedEmbedder { vector: vec![1.0, 0.0, 0.0] }),
    );

    assert!(!service.initialize());
    assert!(!service.is_available());
}

#[test]
fn search_before_initialize_is_empty() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");

    let service = RetrievalService::new(
        &config,
        Arc::new(FixedEmbedder { vector: vec![1.0, 0.0, 0.0] }),
    );

    assert!(service.search("anything", SearchOptions::default()).is_empty());
}

#[test]
fn search_ranks_filtered_results_from_one() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");
    write_artifacts(&config);

    // After normalization the query scores ~0.894 against row 1, ~0.447
    // against row 2, and 0.0 against row 0.
    let query = vec![0.0, 1.0, 0.5];
    let service = service_with(&config, Arc::new(FixedEmbedder { vector: query }));

    let results = service.search("question", SearchOptions::default());

    // Row 0 scores 0.0, below the 0.3 default threshold, so only two
    // results remain and ranks stay contiguous.
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk, "bravo chunk");
    assert_eq!(results[0].rank, 1);
    assert!((results[0].score - 0.894).abs() < 1e-3);
    assert_eq!(results[1].chunk, "charlie chunk");
    assert_eq!(results[1].rank, 2);
    assert_eq!(results[1].metadata.filename, "charlie.md");
}

#[test]
fn search_honors_per_query_overrides() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");
    write_artifacts(&config);

    let query = vec![0.0, 1.0, 0.5];
    let service = service_with(&config, Arc::new(FixedEmbedder { vector: query }));

    let top_one = service.search(
        "question",
        SearchOptions {
            top_k: Some(1),
            similarity_threshold: None,
        },
    );
    assert_eq!(top_one.len(), 1);
    assert_eq!(top_one[0].chunk, "bravo chunk");

    let strict = service.search(
        "question",
        SearchOptions {
            top_k: None,
            similarity_threshold: Some(0.5),
        },
    );
    assert_eq!(strict.len(), 1);
    assert_eq!(strict[0].chunk, "bravo chunk");

    let permissive = service.search(
        "question",
        SearchOptions {
            top_k: Some(3),
            similarity_threshold: Some(-1.0),
        },
    );
    assert_eq!(permissive.len(), 3);
}

#[test]
fn failed_query_embedding_is_fail_soft() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");
    write_artifacts(&config);

    let service = service_with(&config, Arc::new(FailingEmbedder));

    assert!(service.search("question", SearchOptions::default()).is_empty());
}

#[test]
fn extra_index_rows_are_ignored() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");
    write_artifacts(&config);

    // Rewrite the bundle with one fewer entry than the index has rows.
    let bundle = MetadataBundle::new(
        vec!["alpha chunk".to_string(), "bravo chunk".to_string()],
        vec![metadata("alpha.md", 0), metadata("bravo.md", 0)],
    )
    .expect("should build bundle");
    bundle
        .write_to(&config.metadata_path())
        .expect("should write bundle");

    let query = vec![0.0, 0.0, 1.0];
    let service = service_with(&config, Arc::new(FixedEmbedder { vector: query }));

    // Row 2 scores 1.0 but has no metadata, so it is dropped.
    let results = service.search("question", SearchOptions::default());
    assert!(results.is_empty());
}

#[test]
fn corrupt_index_leaves_service_unavailable() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");
    write_artifacts(&config);
    fs::write(config.index_path(), b"garbage").expect("should write file");

    let mut service = RetrievalService::new(
        &config,
        Arc::new(FixedEmbedder { vector: vec![1.0, 0.0, 0.0] }),
    );

    assert!(!service.initialize());
    assert!(service.search("question", SearchOptions::default()).is_empty());
}

#[test]
fn format_context_attributes_sources() {
    let results = vec![
        SearchResult {
            chunk: "  alpha body  ".to_string(),
            metadata: metadata("alpha.md", 0),
            score: 0.9,
            rank: 1,
        },
        SearchResult {
            chunk: "bravo body".to_string(),
            metadata: metadata("bravo.md", 1),
            score: 0.8,
            rank: 2,
        },
    ];

    let context = format_context(&results, 2000);
    assert_eq!(
        context,
        "[Source: alpha.md]\nalpha body\n\n[Source: bravo.md]\nbravo body\n"
    );
}

#[test]
fn format_context_stops_at_length_budget() {
    let results = vec![
        result(&"a".repeat(100), 0.9, 1),
        result(&"b".repeat(100), 0.8, 2),
        result(&"c".repeat(100), 0.7, 3),
    ];

    // Each block is 100 chars of body plus the source line and newlines.
    let one_block = format!("[Source: doc.md]\n{}\n", "a".repeat(100)).len();

    let context = format_context(&results, one_block * 2);
    assert!(context.contains("aaa"));
    assert!(context.contains("bbb"));
    assert!(!context.contains("ccc"));

    let nothing_fits = format_context(&results, one_block - 1);
    assert!(nothing_fits.is_empty());
}

#[test]
fn build_prompt_passes_query_through_without_context() {
    assert_eq!(build_prompt("what is it?", ""), "what is it?");

    let prompt = build_prompt("what is it?", "[Source: a.md]\nbody\n");
    assert!(prompt.contains("Context:\n[Source: a.md]"));
    assert!(prompt.contains("Question: what is it?"));
    assert!(prompt.ends_with("Answer:"));
}
