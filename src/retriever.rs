//! Lazily initialized retriever over the persisted index.
//!
//! The first request runs the build-or-load protocol:
//!
//! 1. If the index directory holds an index, load it.
//! 2. Otherwise take the build lock, re-check, and run
//!    load documents → chunk → embed → save, then load the result.
//! 3. Wrap the index in a [`Retriever`] returning the top `k` chunks.
//!
//! [`LazyRetriever`] memoizes the result in a `tokio::sync::OnceCell`, so
//! later calls reuse it and concurrent first calls wait for a single
//! initializer. A failed initialization leaves the cell empty and the next
//! call starts over.
//!
//! Across processes, builders serialize on an advisory lock file next to the
//! index directory (`vectorstore.lock` for `vectorstore/`).

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::chunk::chunk_records;
use crate::config::{load_or_default, Config, DEFAULT_CONFIG_PATH};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::index::{
    build_index, ensure_target_free, index_exists, remove_stale_temp_dirs, VectorIndex,
};
use crate::loader::load_documents;
use crate::models::{Chunk, ScoredChunk};

/// A loaded index plus the provider used to embed queries.
pub struct Retriever {
    index: VectorIndex,
    provider: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("index", &self.index)
            .field("model", &self.provider.model_name())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl Retriever {
    pub fn new(index: VectorIndex, provider: Arc<dyn EmbeddingProvider>, top_k: usize) -> Self {
        Self {
            index,
            provider,
            top_k,
        }
    }

    /// The `top_k` chunks most similar to `text`, best first.
    pub async fn query(&self, text: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .query_with_scores(text)
            .await?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    /// Like [`query`](Self::query), keeping each chunk's similarity score.
    pub async fn query_with_scores(&self, text: &str) -> Result<Vec<ScoredChunk>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.provider.embed_query(text).await?;
        self.index.search(&query_vec, self.top_k)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

/// Load the index from `config.paths.index_dir`, building it first if absent.
pub async fn open_retriever(
    config: &Config,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<Retriever> {
    let dir = &config.paths.index_dir;

    let index = if index_exists(dir) {
        tracing::info!(path = %dir.display(), "loading existing index");
        VectorIndex::load(dir).await?
    } else {
        build_then_load(config, provider.as_ref()).await?
    };
    index.ensure_compatible(provider.as_ref(), dir)?;

    tracing::info!(chunks = index.len(), top_k = config.retrieval.top_k, "retriever ready");
    Ok(Retriever::new(index, provider, config.retrieval.top_k))
}

async fn build_then_load(config: &Config, provider: &dyn EmbeddingProvider) -> Result<VectorIndex> {
    let dir = &config.paths.index_dir;
    let _lock = BuildLock::acquire(dir).await?;

    // Another process may have finished a build while we waited.
    if index_exists(dir) {
        tracing::info!(path = %dir.display(), "index appeared while waiting, loading");
        return VectorIndex::load(dir).await;
    }

    // Fail before embedding anything if the build could not be saved.
    ensure_target_free(dir)?;

    tracing::info!(path = %dir.display(), "first run detected, building index");
    remove_stale_temp_dirs(dir)?;

    let data_dir = config.paths.data_dir.clone();
    let excludes = config.paths.exclude_globs.clone();
    let records = tokio::task::spawn_blocking(move || load_documents(&data_dir, &excludes))
        .await
        .context("document loading task failed")??;
    let chunks = chunk_records(&records, &config.chunking);
    build_index(chunks, provider, dir, config.embedding.batch_size).await?;

    // With an empty corpus nothing was written and this reports the missing index.
    VectorIndex::load(dir).await
}

/// Exclusive advisory lock on `<index_dir>.lock`, released on drop.
struct BuildLock {
    file: File,
}

impl BuildLock {
    async fn acquire(dir: &Path) -> Result<Self> {
        let path = lock_path(dir);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        let file = tokio::task::spawn_blocking(move || file.lock_exclusive().map(|_| file))
            .await
            .context("lock task failed")?
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        Ok(Self { file })
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path(dir: &Path) -> PathBuf {
    let mut name = dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(".lock");
    dir.with_file_name(name)
}

/// A retriever that initializes itself on first use.
pub struct LazyRetriever {
    config: Config,
    provider: Arc<dyn EmbeddingProvider>,
    cell: OnceCell<Retriever>,
}

impl LazyRetriever {
    pub fn new(config: Config, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config,
            provider,
            cell: OnceCell::new(),
        }
    }

    /// Initialize if needed and return the ready retriever.
    pub async fn get(&self) -> Result<&Retriever> {
        self.cell
            .get_or_try_init(|| async {
                tracing::info!("initializing retriever (first request)");
                open_retriever(&self.config, Arc::clone(&self.provider)).await
            })
            .await
    }

    pub async fn query(&self, text: &str) -> Result<Vec<Chunk>> {
        self.get().await?.query(text).await
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

static GLOBAL: OnceCell<Retriever> = OnceCell::const_new();

/// The process-wide retriever, configured from [`DEFAULT_CONFIG_PATH`].
pub async fn global() -> Result<&'static Retriever> {
    GLOBAL
        .get_or_try_init(|| async {
            tracing::info!("initializing retriever (first request)");
            let config = load_or_default(Path::new(DEFAULT_CONFIG_PATH))?;
            let provider = create_provider(&config.embedding)?;
            open_retriever(&config, provider).await
        })
        .await
}
