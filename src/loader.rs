//! Document loader: walks the data folder and extracts every supported file.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::extract::{extract_file, SUPPORTED_EXTENSIONS};
use crate::models::Record;

/// Loads every supported file under `root` into a [`Record`].
///
/// A missing `root` yields an empty list, not an error. Files whose
/// extracted text is blank are skipped. Records are sorted by relative path.
pub fn load_documents(root: &Path, exclude_globs: &[String]) -> Result<Vec<Record>> {
    if !root.exists() {
        tracing::warn!(
            folder = %root.display(),
            "data folder not found, create it and drop your files there"
        );
        return Ok(Vec::new());
    }

    let exclude_set = build_globset(exclude_globs)?;

    let mut loaded: Vec<(String, Record)> = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_supported(path) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        tracing::debug!(file = %source, "loading");

        let text = extract_file(path);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }

        loaded.push((
            rel_str,
            Record {
                text: trimmed.to_string(),
                source,
            },
        ));
    }

    // Sort for deterministic ordering
    loaded.sort_by(|a, b| a.0.cmp(&b.0));
    let records: Vec<Record> = loaded.into_iter().map(|(_, r)| r).collect();

    tracing::info!(count = records.len(), "loaded documents");
    Ok(records)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
