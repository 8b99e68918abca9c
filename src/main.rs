//! # RAG Helper CLI (`rag`)
//!
//! Warms and probes the index outside the agent that normally imports the
//! library.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag index` | Build the index from `data/` if missing, otherwise load it |
//! | `rag query "<text>"` | Print the top-k chunks for a query |
//! | `rag search "<text>"` | Run a web search |
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level), results
//! to stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_helper::config::{self, DEFAULT_CONFIG_PATH};
use rag_helper::embedding::create_provider;
use rag_helper::retriever::open_retriever;
use rag_helper::web_search::WebSearchClient;

#[derive(Parser)]
#[command(
    name = "rag",
    about = "Build, query, and search with the RAG helper",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index if it is missing, otherwise load it.
    Index,

    /// Retrieve the chunks most similar to a query.
    Query {
        query: String,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the web.
    Search {
        query: String,

        /// Number of results to request (defaults to `[search].default_count`).
        #[arg(long)]
        count: Option<u32>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Index => {
            let provider = create_provider(&cfg.embedding)?;
            let retriever = open_retriever(&cfg, provider).await?;
            println!("index {}", cfg.paths.index_dir.display());
            println!("  model: {}", retriever.index().model_name());
            println!("  chunks: {}", retriever.len());
            println!("  created: {}", retriever.index().created_at());
        }
        Commands::Query { query, json } => {
            let provider = create_provider(&cfg.embedding)?;
            let retriever = open_retriever(&cfg, provider).await?;
            let hits = retriever.query_with_scores(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No results.");
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    println!(
                        "{}. [{:.3}] {} #{}",
                        i + 1,
                        hit.score,
                        hit.chunk.source,
                        hit.chunk.chunk_index
                    );
                    let preview: String = hit.chunk.text.chars().take(240).collect();
                    println!("    {}", preview.replace('\n', " "));
                }
            }
        }
        Commands::Search { query, count, json } => {
            let client = WebSearchClient::from_config(&cfg.search)?;
            let results = client
                .search(&query, count.unwrap_or(cfg.search.default_count))
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No results.");
            } else {
                for (i, r) in results.iter().enumerate() {
                    println!("{}. {}", i + 1, r.title);
                    println!("    {}", r.link);
                    if !r.snippet.is_empty() {
                        println!("    {}", r.snippet);
                    }
                }
            }
        }
    }

    Ok(())
}
