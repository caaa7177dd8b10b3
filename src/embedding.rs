//! Sentence-embedding backend.
//!
//! The [`Embedder`] trait seats the embedding model so the pipeline and its
//! tests never depend on model files being present. The production backend
//! is [`OnnxEmbedder`]: an all-MiniLM-L6-v2 SentenceTransformers export run
//! through ONNX Runtime with mean pooling and L2 normalization, producing
//! 384-dimensional vectors. The same model embeds chunks at ingestion time
//! and queries at retrieval time.

use std::sync::Mutex;

use ndarray::Array1;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

/// Text-to-vector interface shared by ingestion and retrieval.
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in the index artifact.
    fn model_name(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single query text.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Runtime("empty embedding response".to_string()))
    }
}

/// ONNX Runtime embedding engine.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model_name: String,
    dims: usize,
    max_seq_len: usize,
}

impl OnnxEmbedder {
    /// Load the embedding model from `model_dir`.
    ///
    /// Expects:
    /// - `model_dir/model.onnx` — the SentenceTransformers ONNX export
    /// - `model_dir/tokenizer.json` — the HuggingFace tokenizer
    pub fn load(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let model_path = config.model_dir.join("model.onnx");
        let tokenizer_path = config.model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(EmbeddingError::ModelNotFound(model_path));
        }
        if !tokenizer_path.exists() {
            return Err(EmbeddingError::ModelNotFound(tokenizer_path));
        }

        // With load-dynamic, ORT_DYLIB_PATH must point to libonnxruntime.
        ort::init().commit();

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(&model_path)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        info!(
            dims = config.dims,
            model = %model_path.display(),
            "embedding model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model_name: "all-MiniLM-L6-v2".to_string(),
            dims: config.dims,
            max_seq_len: config.max_seq_len,
        })
    }

    fn infer(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let input_ids = encoding.get_ids();
        let attention_mask = encoding.get_attention_mask();

        let seq_len = input_ids.len().min(self.max_seq_len);
        let input_ids = &input_ids[..seq_len];
        let attention_mask = &attention_mask[..seq_len];

        let ids_data: Vec<i64> = input_ids.iter().map(|&id| id as i64).collect();
        let mask_data: Vec<i64> = attention_mask.iter().map(|&m| m as i64).collect();
        let type_ids_data: Vec<i64> = vec![0i64; seq_len];

        let ids_tensor = Tensor::from_array(([1usize, seq_len], ids_data))?;
        let mask_tensor = Tensor::from_array(([1usize, seq_len], mask_data))?;
        let type_ids_tensor = Tensor::from_array(([1usize, seq_len], type_ids_data))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::Runtime("embedding session poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![ids_tensor, mask_tensor, type_ids_tensor])?;

        // SentenceTransformers exports output either [1, seq_len, dim]
        // (token embeddings, needs mean pooling) or [1, dim] (pre-pooled).
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let shape_dims: Vec<i64> = shape.iter().copied().collect();

        let pooled: Array1<f32> = if shape_dims.len() == 3 {
            let dim = shape_dims[2] as usize;
            let mask_f32: Vec<f32> = attention_mask.iter().map(|&m| m as f32).collect();
            let mask_sum: f32 = mask_f32.iter().sum();
            if mask_sum < 1e-9 {
                return Err(EmbeddingError::Runtime("empty attention mask".to_string()));
            }
            let mut pooled = Array1::zeros(dim);
            for (i, &m) in mask_f32.iter().enumerate() {
                if m > 0.0 {
                    let offset = i * dim;
                    for d in 0..dim {
                        pooled[d] += data[offset + d] * m;
                    }
                }
            }
            pooled / mask_sum
        } else if shape_dims.len() == 2 {
            let dim = shape_dims[1] as usize;
            Array1::from_vec(data[..dim].to_vec())
        } else {
            return Err(EmbeddingError::Runtime(format!(
                "unexpected output shape: {:?}",
                shape_dims
            )));
        };

        Ok(l2_normalize(pooled.to_vec()))
    }
}

impl Embedder for OnnxEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.infer(t)).collect()
    }
}

/// Scale a vector to unit length. Zero vectors pass through unchanged.
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
