//! Generative inference engine.
//!
//! Wraps a quantized causal-LM ONNX export and its tokenizer behind the
//! [`Generator`] trait. The engine is loaded once at process start and
//! passed around as an exclusively-owned handle, never ambient state, so
//! the session loop can be driven by a stub in tests.
//!
//! Hardware selection is an ordered fallback over execution providers:
//! CUDA, then DirectML, then CPU. The first provider whose session build
//! succeeds wins; CPU is the mandatory last resort. The chosen provider is
//! an observable value on the handle and is logged at load time.
//!
//! Decoding is bounded sampling (temperature / top-p / repetition penalty,
//! all configurable) with deterministic truncation at the first stop
//! marker, so the model cannot hallucinate additional conversation turns.
//! The returned text never includes the prompt's own tokens.

use std::collections::HashSet;
use std::path::Path;

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, DirectMLExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::Session;
use ort::value::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::error::InferenceError;

/// Role-prefix strings that mark the start of a hallucinated turn.
/// Generation is cut at the first occurrence of any of these.
pub const STOP_MARKERS: [&str; 5] = [
    "User:",
    "Question:",
    "System:",
    "Document Context:",
    "Chat History:",
];

/// Common end-of-sequence token spellings, probed against the tokenizer
/// vocabulary at load time.
const EOS_CANDIDATES: [&str; 4] = ["</s>", "<|endoftext|>", "<|end|>", "<|im_end|>"];

/// Prompt-to-answer interface for the session loop.
pub trait Generator: Send {
    fn generate(&mut self, prompt: &str) -> Result<String, InferenceError>;
}

/// Cut `text` at the earliest occurrence of any marker.
pub fn truncate_at_stop<'a>(text: &'a str, markers: &[&str]) -> &'a str {
    let mut cut = text.len();
    for marker in markers {
        if let Some(pos) = text.find(marker) {
            cut = cut.min(pos);
        }
    }
    &text[..cut]
}

/// Hardware execution backend candidates, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Cuda,
    DirectMl,
    Cpu,
}

impl Provider {
    pub const CANDIDATES: [Provider; 3] = [Provider::Cuda, Provider::DirectMl, Provider::Cpu];

    pub fn name(self) -> &'static str {
        match self {
            Provider::Cuda => "CUDAExecutionProvider",
            Provider::DirectMl => "DmlExecutionProvider",
            Provider::Cpu => "CPUExecutionProvider",
        }
    }

    fn dispatch(self) -> ExecutionProviderDispatch {
        match self {
            // error_on_failure makes an unavailable backend fail the session
            // build instead of silently registering nothing.
            Provider::Cuda => CUDAExecutionProvider::default().build().error_on_failure(),
            Provider::DirectMl => DirectMLExecutionProvider::default()
                .build()
                .error_on_failure(),
            Provider::Cpu => CPUExecutionProvider::default().build(),
        }
    }
}

/// Sampling knobs, copied from `[generation]` config.
#[derive(Debug, Clone)]
pub struct SamplerParams {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

/// Pick the next token from a logit row. Applies repetition penalty over
/// already-seen tokens, then temperature-scaled nucleus sampling; a
/// non-positive temperature degenerates to argmax.
pub fn sample_token(
    logits: &mut [f32],
    seen: &HashSet<u32>,
    params: &SamplerParams,
    rng: &mut StdRng,
) -> u32 {
    for &token in seen {
        if let Some(logit) = logits.get_mut(token as usize) {
            if *logit > 0.0 {
                *logit /= params.repetition_penalty;
            } else {
                *logit *= params.repetition_penalty;
            }
        }
    }

    if params.temperature <= 0.0 {
        return argmax(logits);
    }

    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let inv_t = 1.0 / params.temperature;
    let mut probs: Vec<(u32, f32)> = logits
        .iter()
        .enumerate()
        .map(|(i, &l)| (i as u32, ((l - max) * inv_t).exp()))
        .collect();
    let sum: f32 = probs.iter().map(|p| p.1).sum();
    for p in &mut probs {
        p.1 /= sum;
    }

    // Nucleus: keep the smallest prefix of the sorted distribution whose
    // cumulative mass reaches top_p (always at least one token).
    probs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut cumulative = 0.0;
    let mut cutoff = probs.len();
    for (i, p) in probs.iter().enumerate() {
        cumulative += p.1;
        if cumulative >= params.top_p {
            cutoff = i + 1;
            break;
        }
    }
    probs.truncate(cutoff);

    let total: f32 = probs.iter().map(|p| p.1).sum();
    let mut draw = rng.gen::<f32>() * total;
    for (token, p) in &probs {
        if draw <= *p {
            return *token;
        }
        draw -= p;
    }
    probs.last().map(|p| p.0).unwrap_or(0)
}

fn argmax(logits: &[f32]) -> u32 {
    let mut best = 0usize;
    for (i, &l) in logits.iter().enumerate() {
        if l > logits[best] {
            best = i;
        }
    }
    best as u32
}

/// ONNX Runtime causal-LM engine.
pub struct OnnxGenerator {
    session: Session,
    tokenizer: Tokenizer,
    provider: Provider,
    params: SamplerParams,
    max_new_tokens: usize,
    eos_id: Option<u32>,
    rng: StdRng,
}

impl OnnxGenerator {
    /// Load the model once, probing execution providers in preference
    /// order. Fails only when the model files are missing or no provider
    /// at all can build a session.
    pub fn load(config: &GenerationConfig) -> Result<Self, InferenceError> {
        let model_path = config.model_dir.join(&config.model_file);
        let tokenizer_path = config.model_dir.join("tokenizer.json");

        if !model_path.exists() {
            return Err(InferenceError::ModelNotFound(model_path));
        }
        if !tokenizer_path.exists() {
            return Err(InferenceError::ModelNotFound(tokenizer_path));
        }

        ort::init().commit();

        let mut selected = None;
        let mut last_error = String::new();
        for provider in Provider::CANDIDATES {
            match build_session(&model_path, provider) {
                Ok(session) => {
                    selected = Some((session, provider));
                    break;
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "execution provider unavailable, falling back"
                    );
                    last_error = e.to_string();
                }
            }
        }
        let (session, provider) = selected.ok_or(InferenceError::NoProvider(last_error))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;
        let eos_id = EOS_CANDIDATES
            .iter()
            .find_map(|t| tokenizer.token_to_id(t));

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            provider = provider.name(),
            model = %model_path.display(),
            "generation engine ready"
        );

        Ok(Self {
            session,
            tokenizer,
            provider,
            params: SamplerParams {
                temperature: config.temperature,
                top_p: config.top_p,
                repetition_penalty: config.repetition_penalty,
            },
            max_new_tokens: config.max_new_tokens,
            eos_id,
            rng,
        })
    }

    /// The execution provider the engine actually loaded on.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// One forward pass over the full sequence; sample from the last
    /// position's logit row.
    fn next_token(&mut self, tokens: &[i64], seen: &HashSet<u32>) -> Result<u32, InferenceError> {
        let len = tokens.len();
        let ids = Tensor::from_array(([1usize, len], tokens.to_vec()))?;
        let mask = Tensor::from_array(([1usize, len], vec![1i64; len]))?;

        let outputs = self
            .session
            .run(ort::inputs!["input_ids" => ids, "attention_mask" => mask])?;

        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        if dims.len() != 3 {
            return Err(InferenceError::Generation(format!(
                "unexpected logits shape: {:?}",
                dims
            )));
        }
        let vocab = dims[2] as usize;
        let offset = (dims[1] as usize - 1) * vocab;
        let mut logits = data[offset..offset + vocab].to_vec();

        Ok(sample_token(&mut logits, seen, &self.params, &mut self.rng))
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, InferenceError> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))
    }
}

impl Generator for OnnxGenerator {
    fn generate(&mut self, prompt: &str) -> Result<String, InferenceError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        let mut tokens: Vec<i64> = encoding.get_ids().iter().map(|&t| t as i64).collect();
        if tokens.is_empty() {
            return Err(InferenceError::Generation("empty prompt encoding".to_string()));
        }

        let mut seen: HashSet<u32> = encoding.get_ids().iter().copied().collect();
        let mut generated: Vec<u32> = Vec::new();

        for _ in 0..self.max_new_tokens {
            let next = self.next_token(&tokens, &seen)?;
            if Some(next) == self.eos_id {
                break;
            }
            tokens.push(next as i64);
            seen.insert(next);
            generated.push(next);

            // Decode the whole continuation each step so markers that span
            // token boundaries are still caught.
            let text = self.decode(&generated)?;
            if STOP_MARKERS.iter().any(|m| text.contains(m)) {
                return Ok(truncate_at_stop(&text, &STOP_MARKERS).trim().to_string());
            }
        }

        let text = self.decode(&generated)?;
        Ok(truncate_at_stop(&text, &STOP_MARKERS).trim().to_string())
    }
}

fn build_session(model_path: &Path, provider: Provider) -> Result<Session, ort::Error> {
    Session::builder()?
        .with_execution_providers([provider.dispatch()])?
        .commit_from_file(model_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_before_hallucinated_user_turn() {
        let text = "The capital is Paris.\nUser: foo";
        assert_eq!(
            truncate_at_stop(text, &STOP_MARKERS),
            "The capital is Paris.\n"
        );
    }

    #[test]
    fn earliest_marker_wins() {
        let text = "answer Question: a User: b";
        assert_eq!(truncate_at_stop(text, &STOP_MARKERS), "answer ");
    }

    #[test]
    fn text_without_markers_is_unchanged() {
        let text = "plain answer text";
        assert_eq!(truncate_at_stop(text, &STOP_MARKERS), text);
    }

    #[test]
    fn zero_temperature_is_greedy() {
        let params = SamplerParams {
            temperature: 0.0,
            top_p: 0.85,
            repetition_penalty: 1.0,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let mut logits = vec![0.1, 2.0, 0.5];
        assert_eq!(sample_token(&mut logits, &HashSet::new(), &params, &mut rng), 1);
    }

    #[test]
    fn repetition_penalty_demotes_seen_tokens() {
        let params = SamplerParams {
            temperature: 0.0,
            top_p: 1.0,
            repetition_penalty: 10.0,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let seen: HashSet<u32> = [1u32].into_iter().collect();
        // Token 1 leads, but it was already emitted and the penalty drops
        // it below token 2.
        let mut logits = vec![0.1, 2.0, 1.5];
        assert_eq!(sample_token(&mut logits, &seen, &params, &mut rng), 2);
    }

    #[test]
    fn tight_nucleus_concentrates_on_top_token() {
        let params = SamplerParams {
            temperature: 0.5,
            top_p: 0.01,
            repetition_penalty: 1.0,
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let mut logits = vec![0.0, 8.0, 0.0, 0.0];
            assert_eq!(sample_token(&mut logits, &HashSet::new(), &params, &mut rng), 1);
        }
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let params = SamplerParams {
            temperature: 0.8,
            top_p: 0.9,
            repetition_penalty: 1.0,
        };
        let draw = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut out = Vec::new();
            for _ in 0..8 {
                let mut logits = vec![1.0, 1.1, 0.9, 1.05];
                out.push(sample_token(&mut logits, &HashSet::new(), &params, &mut rng));
            }
            out
        };
        assert_eq!(draw(3), draw(3));
    }

    #[test]
    fn cpu_is_the_last_candidate() {
        assert_eq!(Provider::CANDIDATES[2], Provider::Cpu);
    }

    #[test]
    fn load_without_model_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GenerationConfig {
            model_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(
            OnnxGenerator::load(&cfg),
            Err(InferenceError::ModelNotFound(_))
        ));
    }
}
