//! Typed error taxonomy.
//!
//! Each pipeline stage fails with its own error kind so callers can decide
//! presentation: ingestion failures become an error-shaped JSON summary,
//! retrieval failures degrade to "no context", inference failures become a
//! per-request error answer, and storage failures are surfaced rather than
//! silently dropped. Only startup failures (no usable execution provider,
//! missing model files) are fatal to a serving process.

use std::path::PathBuf;

use thiserror::Error;

/// Chat log / document record storage failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source document could not be turned into page text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unreadable file {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("PDF extraction failed for {path}: {message}")]
    Pdf { path: PathBuf, message: String },
}

/// Embedding model failure (load or inference).
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("embedding session error: {0}")]
    Session(#[from] ort::Error),

    #[error("embedding runtime error: {0}")]
    Runtime(String),
}

/// Vector index persistence failure.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Retrieval-path failure. Never fatal: the caller degrades to empty
/// context. A missing index is expected ("chat without a document") and
/// is not an error at all.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Document ingestion failure. Reported as a structured error summary;
/// the ingest process still exits cleanly.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("document is empty: {0}")]
    EmptyDocument(PathBuf),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Generative engine failure (load or per-request generation).
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("no execution provider could be initialized: {0}")]
    NoProvider(String),

    #[error("generation session error: {0}")]
    Session(#[from] ort::Error),

    #[error("generation failed: {0}")]
    Generation(String),
}
