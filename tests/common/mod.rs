//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use rag_helper::config::Config;
use rag_helper::embedding::EmbeddingProvider;

pub const TEST_DIMS: usize = 64;

/// Deterministic bag-of-words embedder. Each lowercase word is hashed into
/// one of [`TEST_DIMS`] buckets, so texts sharing words score higher.
pub struct HashEmbedder {
    model: String,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::named("test-hash")
    }

    pub fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts embedded so far.
    pub fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        TEST_DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; TEST_DIMS];
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        // FNV-1a
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % TEST_DIMS as u64) as usize] += 1.0;
    }
    v
}

/// Config rooted in `root`: `root/data` and `root/vectorstore`.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.data_dir = root.join("data");
    config.paths.index_dir = root.join("vectorstore");
    config.embedding.batch_size = 4;
    config
}

/// Temp workspace with a small `data/` corpus.
pub fn corpus() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("notes")).unwrap();
    fs::write(
        data.join("rust.md"),
        "# Rust\n\nCargo builds crates and resolves dependencies for Rust projects.",
    )
    .unwrap();
    fs::write(
        data.join("cooking.txt"),
        "Bake the bread at high heat until the crust turns golden brown.",
    )
    .unwrap();
    fs::write(
        data.join("notes").join("garden.html"),
        "<html><body><h1>Garden</h1><p>Water the tomato plants every morning.</p></body></html>",
    )
    .unwrap();
    let config = test_config(tmp.path());
    (tmp, config)
}

/// Number of chunks the [`corpus`] fixture produces.
pub const CORPUS_CHUNKS: usize = 3;
