//! TOML configuration parsing.
//!
//! Every path the engine touches (database file, index directory, model
//! directories) comes from here, passed explicitly at process start. All
//! sections have defaults, so a missing config file yields a fully usable
//! configuration rooted in the working directory.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite file holding document records and the chat log.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Directory tree of per-task vector index artifacts.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            index_dir: default_index_dir(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./aura_store.db")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("./vector_stores")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Trailing overlap between consecutive chunks, in characters.
    /// Must be strictly smaller than `chunk_size`.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest chunks concatenated into the context block.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Trailing chat turns rendered into the prompt (2 user/assistant pairs).
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_history_turns() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Directory holding `model.onnx` and `tokenizer.json` for the
    /// sentence-embedding model (all-MiniLM-L6-v2 by default).
    #[serde(default = "default_embedding_model_dir")]
    pub model_dir: PathBuf,
    /// Embedding vector dimensionality.
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Token truncation limit per chunk.
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: default_embedding_model_dir(),
            dims: default_dims(),
            max_seq_len: default_max_seq_len(),
        }
    }
}

fn default_embedding_model_dir() -> PathBuf {
    PathBuf::from("./models/embedding")
}
fn default_dims() -> usize {
    384
}
fn default_max_seq_len() -> usize {
    512
}

/// Sampling values are a tuning choice, not an invariant; they are exposed
/// here rather than hard-coded in the engine.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Directory holding the quantized causal LM and its `tokenizer.json`.
    #[serde(default = "default_generation_model_dir")]
    pub model_dir: PathBuf,
    /// ONNX file name inside `model_dir`.
    #[serde(default = "default_model_file")]
    pub model_file: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    /// Fixed RNG seed for reproducible sampling (None = entropy-seeded).
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_dir: default_generation_model_dir(),
            model_file: default_model_file(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
            seed: None,
        }
    }
}

fn default_generation_model_dir() -> PathBuf {
    PathBuf::from("./models/onnx")
}
fn default_model_file() -> String {
    "model-int8.onnx".to_string()
}
fn default_max_new_tokens() -> usize {
    150
}
fn default_temperature() -> f32 {
    0.3
}
fn default_top_p() -> f32 {
    0.85
}
fn default_repetition_penalty() -> f32 {
    1.2
}

/// Load configuration from a TOML file, falling back to defaults when the
/// file does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be at least 1");
    }
    Ok(())
}
