//! # RAG Helper
//!
//! Loads documents from a folder, splits them into chunks, embeds them,
//! persists a vector index, and exposes a lazily initialized retriever plus
//! a web-search helper to an in-process agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌──────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedding │──▶│ vectorstore/ │
//! │  data/   │   │1000/200 │   │ provider  │   │ index.sqlite │
//! └──────────┘   └─────────┘   └───────────┘   └──────┬───────┘
//!                                                     ▼
//!                 ┌──────────────┐            ┌──────────────┐
//!                 │  web_search  │            │  Retriever   │
//!                 │ (Brave API)  │            │ (lazy, top k)│
//!                 └──────┬───────┘            └──────┬───────┘
//!                        └────────────┬──────────────┘
//!                                     ▼
//!                                   agent
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> anyhow::Result<()> {
//! // First call builds `vectorstore/` from `data/` (or loads it), later calls reuse it.
//! let chunks = rag_helper::retrieve("How do I rotate the API keys?").await?;
//! for chunk in &chunks {
//!     println!("{}: {}", chunk.source, chunk.text);
//! }
//!
//! let hits = rag_helper::search("rust async runtime", 5).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with defaults |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF, DOCX, HTML, and text extraction |
//! | [`loader`] | Recursive document loading |
//! | [`chunk`] | Recursive character splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persisted similarity index |
//! | [`retriever`] | Build-or-load lazy retriever |
//! | [`web_search`] | Brave web search helper |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod loader;
pub mod models;
pub mod retriever;
pub mod web_search;

use anyhow::Result;
use std::path::Path;

use crate::config::{load_or_default, DEFAULT_CONFIG_PATH};
use crate::models::{Chunk, WebResult};

/// Top-k chunks for `query` from the process-wide retriever.
///
/// The first call initializes the retriever (see [`retriever`]); if that
/// fails the error is returned and the next call tries again.
pub async fn retrieve(query: &str) -> Result<Vec<Chunk>> {
    retriever::global().await?.query(query).await
}

/// Web search with the configured provider settings.
pub async fn search(query: &str, count: u32) -> Result<Vec<WebResult>> {
    let config = load_or_default(Path::new(DEFAULT_CONFIG_PATH))?;
    web_search::WebSearchClient::from_config(&config.search)?
        .search(query, count)
        .await
}
