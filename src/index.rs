//! Persisted similarity index.
//!
//! An index directory holds a single SQLite database, `index.sqlite`, with
//! two tables:
//!
//! ```text
//! meta(key TEXT PRIMARY KEY, value TEXT)      -- model, dims, chunk_count, created_at
//! chunks(id INTEGER PRIMARY KEY, source TEXT, chunk_index INTEGER, text TEXT, vector BLOB)
//! ```
//!
//! Vectors are stored with [`vec_to_blob`]. Loading reads every row into
//! memory and queries run exact cosine similarity over all vectors.
//!
//! [`VectorIndex::save`] writes into a hidden sibling temp directory and
//! renames it into place once the database is closed, so the index
//! directory either holds a complete index or does not exist.

use anyhow::{bail, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::models::{Chunk, ScoredChunk};

/// Database file inside the index directory.
pub const INDEX_FILE: &str = "index.sqlite";

#[derive(Debug, Error)]
pub enum IndexError {
    /// No complete index exists at the given directory.
    #[error("no index found at {}", path.display())]
    Missing { path: PathBuf },

    /// The index was embedded with a different model than the one configured.
    #[error(
        "index at {} was built with '{index_model}' ({index_dims} dims) but the configured model is '{model}' ({dims} dims)",
        path.display()
    )]
    ModelMismatch {
        path: PathBuf,
        index_model: String,
        index_dims: usize,
        model: String,
        dims: usize,
    },

    /// The index path holds something other than an index or an empty directory.
    #[error("{} exists and is not an index or an empty directory", path.display())]
    Occupied { path: PathBuf },
}

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory view of a persisted index.
pub struct VectorIndex {
    model: String,
    dims: usize,
    created_at: String,
    entries: Vec<IndexEntry>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("model", &self.model)
            .field("dims", &self.dims)
            .field("created_at", &self.created_at)
            .field("len", &self.entries.len())
            .finish()
    }
}

/// True if `dir` holds a complete index.
pub fn index_exists(dir: &Path) -> bool {
    dir.join(INDEX_FILE).is_file()
}

/// Errors with [`IndexError::Occupied`] unless a new index could be saved to
/// `dir`, i.e. the path is absent or an empty directory.
pub fn ensure_target_free(dir: &Path) -> Result<()> {
    let occupied = match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(_) => true,
    };
    if occupied {
        return Err(IndexError::Occupied {
            path: dir.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

impl VectorIndex {
    /// Pair chunks with precomputed vectors. Every vector must have `dims` entries.
    pub fn from_embeddings(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        model: &str,
        dims: usize,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            bail!(
                "embedding has {} dims, expected {} for model '{}'",
                bad.len(),
                dims,
                model
            );
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        Ok(Self {
            model: model.to_string(),
            dims,
            created_at: chrono::Utc::now().to_rfc3339(),
            entries,
        })
    }

    /// Embed every chunk in batches of `batch_size`.
    pub async fn embed_chunks(
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = provider
                .embed(&texts)
                .await
                .with_context(|| format!("embedding with '{}' failed", provider.model_name()))?;
            if embedded.len() != texts.len() {
                bail!(
                    "embedding provider returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                );
            }
            vectors.extend(embedded);
            tracing::debug!(done = vectors.len(), total = chunks.len(), "embedded chunks");
        }
        Self::from_embeddings(chunks, vectors, provider.model_name(), provider.dims())
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// RFC 3339 timestamp of when the index was built.
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Errors with [`IndexError::ModelMismatch`] unless `provider` produces
    /// vectors compatible with this index.
    pub fn ensure_compatible(&self, provider: &dyn EmbeddingProvider, dir: &Path) -> Result<()> {
        if provider.model_name() != self.model || provider.dims() != self.dims {
            return Err(IndexError::ModelMismatch {
                path: dir.to_path_buf(),
                index_model: self.model.clone(),
                index_dims: self.dims,
                model: provider.model_name().to_string(),
                dims: provider.dims(),
            }
            .into());
        }
        Ok(())
    }

    /// Top `k` chunks by descending cosine similarity to `query_vec`.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query_vec.len() != self.dims {
            bail!(
                "query vector has {} dims, index expects {}",
                query_vec.len(),
                self.dims
            );
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query_vec, &e.vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Persist to `dir`, creating parent directories as needed.
    ///
    /// `dir` must not already hold an index; an empty directory at that path
    /// is replaced.
    pub async fn save(&self, dir: &Path) -> Result<()> {
        let parent = parent_or_cwd(dir);
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let tmp = parent.join(format!("{}{}", temp_prefix(dir), Uuid::new_v4()));
        std::fs::create_dir_all(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;

        if let Err(e) = self.write_db(&tmp.join(INDEX_FILE)).await {
            let _ = std::fs::remove_dir_all(&tmp);
            return Err(e);
        }

        if dir.exists() {
            if let Err(e) = std::fs::remove_dir(dir) {
                let _ = std::fs::remove_dir_all(&tmp);
                return Err(e).with_context(|| {
                    format!("{} exists and is not an empty directory", dir.display())
                });
            }
        }

        if let Err(e) = std::fs::rename(&tmp, dir) {
            let _ = std::fs::remove_dir_all(&tmp);
            return Err(e).with_context(|| format!("Failed to move index into {}", dir.display()));
        }
        Ok(())
    }

    async fn write_db(&self, path: &Path) -> Result<()> {
        let pool = connect(path, false).await?;

        sqlx::query("CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&pool)
            .await?;
        sqlx::query(
            r#"
            CREATE TABLE chunks (
                id INTEGER PRIMARY KEY,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let mut tx = pool.begin().await?;
        let meta = [
            ("model", self.model.clone()),
            ("dims", self.dims.to_string()),
            ("chunk_count", self.entries.len().to_string()),
            ("created_at", self.created_at.clone()),
        ];
        for (key, value) in meta {
            sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        for (i, entry) in self.entries.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks (id, source, chunk_index, text, vector) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(i as i64)
            .bind(&entry.chunk.source)
            .bind(entry.chunk.chunk_index)
            .bind(&entry.chunk.text)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        pool.close().await;
        Ok(())
    }

    /// Load the index stored in `dir`.
    ///
    /// Fails with [`IndexError::Missing`] when `dir` holds no index.
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE);
        if !path.is_file() {
            return Err(IndexError::Missing {
                path: dir.to_path_buf(),
            }
            .into());
        }

        let pool = connect(&path, true).await?;

        let meta: HashMap<String, String> = sqlx::query("SELECT key, value FROM meta")
            .fetch_all(&pool)
            .await
            .with_context(|| format!("Failed to read index metadata from {}", path.display()))?
            .into_iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect();

        let model = meta
            .get("model")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("index metadata missing 'model'"))?;
        let dims: usize = meta
            .get("dims")
            .ok_or_else(|| anyhow::anyhow!("index metadata missing 'dims'"))?
            .parse()
            .context("index metadata 'dims' is not a number")?;
        let created_at = meta.get("created_at").cloned().unwrap_or_default();

        let rows = sqlx::query("SELECT source, chunk_index, text, vector FROM chunks ORDER BY id")
            .fetch_all(&pool)
            .await
            .with_context(|| format!("Failed to read chunks from {}", path.display()))?;
        pool.close().await;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let vector = blob_to_vec(&row.get::<Vec<u8>, _>("vector"));
            if vector.len() != dims {
                bail!(
                    "corrupt index at {}: vector has {} dims, expected {}",
                    dir.display(),
                    vector.len(),
                    dims
                );
            }
            entries.push(IndexEntry {
                chunk: Chunk {
                    source: row.get("source"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                },
                vector,
            });
        }

        Ok(Self {
            model,
            dims,
            created_at,
            entries,
        })
    }
}

/// Embed `chunks` and persist the index to `dir`.
///
/// Returns `Ok(false)` without touching the filesystem when `chunks` is empty.
pub async fn build_index(
    chunks: Vec<Chunk>,
    provider: &dyn EmbeddingProvider,
    dir: &Path,
    batch_size: usize,
) -> Result<bool> {
    if chunks.is_empty() {
        tracing::warn!("no chunks to index, skipping build");
        return Ok(false);
    }

    let count = chunks.len();
    let index = VectorIndex::embed_chunks(chunks, provider, batch_size).await?;
    index.save(dir).await?;
    tracing::info!(chunks = count, path = %dir.display(), "index created and saved");
    Ok(true)
}

/// Remove temp directories left behind by interrupted builds of `dir`.
///
/// Only safe while holding the build lock for `dir`.
pub fn remove_stale_temp_dirs(dir: &Path) -> Result<()> {
    let parent = parent_or_cwd(dir);
    if !parent.exists() {
        return Ok(());
    }
    let prefix = temp_prefix(dir);
    for entry in std::fs::read_dir(&parent)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&prefix) && entry.file_type()?.is_dir() {
            tracing::warn!(path = %entry.path().display(), "removing incomplete index build");
            std::fs::remove_dir_all(entry.path())?;
        }
    }
    Ok(())
}

fn parent_or_cwd(dir: &Path) -> PathBuf {
    match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_prefix(dir: &Path) -> String {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    format!(".{}.tmp-", name)
}

async fn connect(path: &Path, read_only: bool) -> Result<SqlitePool> {
    let mut options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(!read_only)
        .read_only(read_only);
    if !read_only {
        // Rollback journal keeps the finished index to a single file.
        options = options.journal_mode(SqliteJournalMode::Delete);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open index database {}", path.display()))?;

    Ok(pool)
}
