use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::embeddings::GeminiClient;
use crate::index::MetadataBundle;
use crate::ingest;
use crate::retrieval::{RetrievalService, SearchOptions, build_prompt, format_context};

fn resolve_config_dir(config_dir: Option<PathBuf>) -> Result<PathBuf> {
    match config_dir {
        Some(dir) => Ok(dir),
        None => Ok(get_config_dir()?),
    }
}

fn load_config(config_dir: Option<PathBuf>) -> Result<Config> {
    let dir = resolve_config_dir(config_dir)?;
    Config::load(&dir).with_context(|| format!("Failed to load configuration from {}", dir.display()))
}

/// Build the index from a corpus directory and persist it.
#[inline]
pub fn run_ingest(config_dir: Option<PathBuf>, corpus_dir: PathBuf) -> Result<()> {
    let config = load_config(config_dir)?;
    let client = GeminiClient::new(&config).context("Failed to create embedding client")?;

    info!("Ingesting corpus from {}", corpus_dir.display());

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} Indexing {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(corpus_dir.display().to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(100));

    let stats = ingest::run(&config, &client, &corpus_dir)?;
    bar.finish_and_clear();

    println!("Ingestion complete!");
    println!("  Documents: {}", stats.documents);
    println!("  Chunks indexed: {}", stats.chunks);
    println!("  Embedding batches: {}", stats.batches);
    if stats.zero_filled_batches > 0 {
        println!(
            "  {} Batches zero-filled after retries: {}",
            style("⚠").yellow(),
            stats.zero_filled_batches
        );
    }
    println!("  Vector dimension: {}", stats.dimension);
    println!("  Index: {}", config.index_path().display());
    println!("  Metadata: {}", config.metadata_path().display());

    Ok(())
}

/// Query the index and print the retrieved chunks, optionally as an
/// assembled answering prompt.
#[inline]
pub fn run_search(
    config_dir: Option<PathBuf>,
    query: String,
    top_k: Option<usize>,
    threshold: Option<f32>,
    show_context: bool,
) -> Result<()> {
    let config = load_config(config_dir)?;
    let client = GeminiClient::new(&config).context("Failed to create embedding client")?;

    let mut service = RetrievalService::new(&config, Arc::new(client));
    if !service.initialize() {
        println!("Index not available. Run 'kb-rag ingest <corpus-dir>' first.");
        return Ok(());
    }

    let options = SearchOptions {
        top_k,
        similarity_threshold: threshold,
    };
    let results = service.search(&query, options);

    if results.is_empty() {
        println!("No chunks matched the query above the similarity threshold.");
        return Ok(());
    }

    if show_context {
        let context = format_context(&results, config.retrieval.max_context_length);
        println!("{}", build_prompt(&query, &context));
        return Ok(());
    }

    println!("Found {} matching chunks:", results.len());
    println!();
    for result in &results {
        println!(
            "{} {} (score {:.4}, chunk {})",
            style(format!("#{}", result.rank)).bold(),
            result.metadata.filename,
            result.score,
            result.metadata.chunk_id,
        );
        println!("{}", result.chunk.trim());
        println!();
    }

    Ok(())
}

/// Report artifact presence and index size.
#[inline]
pub fn show_status(config_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_dir)?;
    let index_path = config.index_path();
    let metadata_path = config.metadata_path();

    println!("Knowledge base status:");
    println!("  Data directory: {}", config.base_dir.display());

    if !index_path.exists() || !metadata_path.exists() {
        println!("  Index: {}", style("not built").yellow());
        println!("  Run 'kb-rag ingest <corpus-dir>' to build it.");
        return Ok(());
    }

    match MetadataBundle::read_from(&metadata_path) {
        Ok(bundle) => {
            let documents: std::collections::BTreeSet<&str> = bundle
                .metadata
                .iter()
                .map(|m| m.filename.as_str())
                .collect();
            println!("  Index: {}", style("ready").green());
            println!("  Indexed chunks: {}", bundle.len());
            println!("  Source documents: {}", documents.len());
        }
        Err(e) => {
            println!("  Index: {}", style("corrupt").red());
            println!("  {e}");
        }
    }

    Ok(())
}

/// Write the active configuration to disk so it can be edited, creating
/// the file with defaults when none exists.
#[inline]
pub fn init_config(config_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_dir)?;
    config.save()?;

    println!("Configuration written to {}", config.config_file_path().display());
    println!("Edit it and re-run, or use 'kb-rag config --show' to inspect.");

    Ok(())
}

/// Print the active configuration as TOML.
#[inline]
pub fn show_config(config_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_dir)?;

    println!("# {}", config.config_file_path().display());
    print!("{}", toml::to_string_pretty(&config).context("Failed to render configuration")?);

    Ok(())
}
