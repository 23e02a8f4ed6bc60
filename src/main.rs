use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kb_rag::Result;
use kb_rag::commands::{init_config, run_ingest, run_search, show_config, show_status};

#[derive(Parser)]
#[command(name = "kb-rag")]
#[command(about = "Embed a document corpus and answer queries with retrieved context")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the index artifacts
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed, and index every document in a corpus directory
    Ingest {
        /// Directory of .md, .markdown, and .txt files to index
        corpus_dir: PathBuf,
    },
    /// Retrieve the chunks most similar to a query
    Search {
        /// Query text
        query: String,
        /// Maximum number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum similarity score, between -1.0 and 1.0
        #[arg(long)]
        threshold: Option<f32>,
        /// Print an assembled answering prompt instead of raw chunks
        #[arg(long)]
        context: bool,
    },
    /// Show index artifact status
    Status,
    /// Initialize or inspect the configuration
    Config {
        /// Show the active configuration
        #[arg(long)]
        show: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { corpus_dir } => {
            run_ingest(cli.config_dir, corpus_dir)?;
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            context,
        } => {
            run_search(cli.config_dir, query, top_k, threshold, context)?;
        }
        Commands::Status => {
            show_status(cli.config_dir)?;
        }
        Commands::Config { show } => {
            if show {
                show_config(cli.config_dir)?;
            } else {
                init_config(cli.config_dir)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["kb-rag", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
        }
    }

    #[test]
    fn ingest_command_with_corpus_dir() {
        let cli = Cli::try_parse_from(["kb-rag", "ingest", "./docs"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { corpus_dir } = parsed.command {
                assert_eq!(corpus_dir, PathBuf::from("./docs"));
            }
        }
    }

    #[test]
    fn search_command_with_overrides() {
        let cli = Cli::try_parse_from([
            "kb-rag",
            "search",
            "how do I configure retries?",
            "--top-k",
            "5",
            "--threshold",
            "0.5",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                query,
                top_k,
                threshold,
                context,
            } = parsed.command
            {
                assert_eq!(query, "how do I configure retries?");
                assert_eq!(top_k, Some(5));
                assert_eq!(threshold, Some(0.5));
                assert!(!context);
            }
        }
    }

    #[test]
    fn global_config_dir_flag() {
        let cli = Cli::try_parse_from(["kb-rag", "status", "--config-dir", "/tmp/kb"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/kb")));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["kb-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["kb-rag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["kb-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
