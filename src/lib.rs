//! Local-first document Q&A engine.
//!
//! Everything runs on the local machine: PDF text extraction, overlapping
//! chunking, ONNX sentence embeddings, a flat per-task vector index, and a
//! quantized causal LM for answer generation. State lives in a SQLite file
//! (document records, chat log) and a directory of JSON index artifacts.
//! The `aura` binary exposes ingestion as a one-shot command and chat as a
//! long-lived stdin/stdout session speaking newline-delimited JSON.

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod session;
pub mod store;
