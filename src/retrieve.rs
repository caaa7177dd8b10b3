//! Context retrieval.
//!
//! Embeds the query with the same model used at ingestion, runs cosine
//! top-k over the task's vector index, and returns the matched chunk texts
//! joined with newlines plus the deduplicated 1-indexed page numbers they
//! came from. A task with no index yields empty context and empty sources —
//! that is the supported "chat without a document" path, not an error.
//! Genuine retrieval failures (corrupt artifact, query embedding failure)
//! also degrade to empty context, with a logged warning.

use std::path::Path;

use tracing::warn;

use crate::embedding::Embedder;
use crate::error::RetrievalError;
use crate::index::VectorIndex;

/// Context block plus source pages for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieved {
    pub context: String,
    pub sources: Vec<u32>,
}

/// Best-effort retrieval: never fails the request.
pub fn retrieve(
    index_dir: &Path,
    embedder: &dyn Embedder,
    task_id: &str,
    query: &str,
    top_k: usize,
) -> Retrieved {
    match try_retrieve(index_dir, embedder, task_id, query, top_k) {
        Ok(retrieved) => retrieved,
        Err(e) => {
            warn!(task_id, error = %e, "retrieval failed, continuing without context");
            Retrieved::default()
        }
    }
}

fn try_retrieve(
    index_dir: &Path,
    embedder: &dyn Embedder,
    task_id: &str,
    query: &str,
    top_k: usize,
) -> Result<Retrieved, RetrievalError> {
    let index = match VectorIndex::load(index_dir, task_id)? {
        Some(index) => index,
        None => return Ok(Retrieved::default()),
    };

    let query_vec = embedder.embed_query(query)?;
    let hits = index.search(&query_vec, top_k);

    let context = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let mut sources = Vec::new();
    for hit in &hits {
        if !sources.contains(&hit.page) {
            sources.push(hit.page);
        }
    }

    Ok(Retrieved { context, sources })
}
