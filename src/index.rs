//! Per-task vector index.
//!
//! A flat nearest-neighbor structure over chunk embeddings: immutable after
//! build, persisted as one JSON artifact per task under
//! `<index_dir>/<task_id>/index.json`. Rebuilding a task replaces the prior
//! artifact atomically (temp file + rename), so a concurrently loading
//! reader sees either the old or the new index, never a torn one.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// One embedded chunk with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    /// 1-indexed source page.
    pub page: u32,
    pub vector: Vec<f32>,
}

/// Nearest-neighbor store over one task's chunk embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub model: String,
    pub dims: usize,
    pub entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(model: &str, dims: usize) -> Self {
        Self {
            model: model.to_string(),
            dims,
            entries: Vec::new(),
        }
    }

    fn artifact_path(index_dir: &Path, task_id: &str) -> PathBuf {
        index_dir.join(task_id).join("index.json")
    }

    /// Persist the index for `task_id`, replacing any prior artifact.
    pub fn save(&self, index_dir: &Path, task_id: &str) -> Result<(), IndexError> {
        let dir = index_dir.join(task_id);
        fs::create_dir_all(&dir)?;

        let tmp = dir.join("index.json.tmp");
        fs::write(&tmp, serde_json::to_vec(self)?)?;
        fs::rename(&tmp, Self::artifact_path(index_dir, task_id))?;
        Ok(())
    }

    /// Load the index for `task_id`. A missing artifact is `Ok(None)` —
    /// chatting without a document is supported.
    pub fn load(index_dir: &Path, task_id: &str) -> Result<Option<Self>, IndexError> {
        let path = Self::artifact_path(index_dir, task_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Return the `k` entries nearest to `query` by cosine similarity,
    /// most similar first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<&IndexEntry> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, e)| e).collect()
    }
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
