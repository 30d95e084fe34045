use clap::{Parser, Subcommand};
use knowledge_rag::{RagError, Result};
use knowledge_rag::commands::{repl, search, show_chunks};
use knowledge_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "knowledge-rag")]
#[command(about = "Chunk, embed and search a folder of documents by vector similarity")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to $KNOWLEDGE_RAG_HOME or ~/.knowledge-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding backend and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk a documents folder without embedding and report the result
    Chunks {
        /// Documents folder, defaults to the configured one
        folder: Option<PathBuf>,
    },
    /// Index a documents folder and print the fragments closest to a query
    Search {
        /// Text to search for
        query: String,
        /// Documents folder, defaults to the configured one
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Number of fragments to return
        #[arg(long)]
        top_k: Option<usize>,
        /// Abort indexing on the first failed embedding batch
        #[arg(long)]
        strict: bool,
    },
    /// Index a documents folder once, then answer queries read from stdin
    Repl {
        /// Documents folder, defaults to the configured one
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Number of fragments to return per query
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_dir = cli.config_dir.map_or_else(
        || get_config_dir().map_err(|e| RagError::Config(e.to_string())),
        Ok,
    )?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Chunks { folder } => {
            let config = Config::load(&config_dir)?;
            let folder = folder.unwrap_or_else(|| config.retrieval.documents_dir.clone());
            show_chunks(&config, &folder)?;
        }
        Commands::Search {
            query,
            folder,
            top_k,
            strict,
        } => {
            let mut config = Config::load(&config_dir)?;
            config.retrieval.strict |= strict;
            let folder = folder.unwrap_or_else(|| config.retrieval.documents_dir.clone());
            let top_k = top_k.unwrap_or(config.retrieval.top_k);
            search(&config, &folder, &query, top_k).await?;
        }
        Commands::Repl { folder, top_k } => {
            let config = Config::load(&config_dir)?;
            let folder = folder.unwrap_or_else(|| config.retrieval.documents_dir.clone());
            let top_k = top_k.unwrap_or(config.retrieval.top_k);
            repl(&config, &folder, top_k).await?;
        }
    }

    Ok(())
}
