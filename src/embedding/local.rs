//! Local ONNX Runtime embedding provider.
//!
//! Runs all-MiniLM-L6-v2 via `ort`: tokenize, infer, attention-masked mean
//! pooling, L2 normalization. The session is not thread-safe for `run`, so
//! it sits behind a mutex; throughput-sensitive callers batch instead.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

/// Local ONNX-based embedding provider using all-MiniLM-L6-v2.
pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex.
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        Self::from_files(cache_dir.join("model.onnx"), cache_dir.join("tokenizer.json"))
    }

    /// Build from explicit model and tokenizer file paths.
    pub fn from_files(model_path: PathBuf, tokenizer_path: PathBuf) -> Result<Self> {
        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `reverie model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "Tokenizer not found at {}. Run `reverie model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow::anyhow!("failed to set optimization level: {e}"))?
            .with_intra_threads(4)
            .map_err(|e| anyhow::anyhow!("failed to set intra threads: {e}"))?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;
        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tracing::info!(tokenizer = %tokenizer_path.display(), "tokenizer loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Tokenize a batch into flat i64 id/mask buffers plus the padded length.
    fn tokenize(&self, texts: &[&str]) -> Result<(Vec<i64>, Vec<i64>, usize)> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let seq_len = encodings[0].get_ids().len();
        let mut input_ids = Vec::with_capacity(encodings.len() * seq_len);
        let mut attention_mask = Vec::with_capacity(encodings.len() * seq_len);
        for encoding in &encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }
        Ok((input_ids, attention_mask, seq_len))
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text])?;
        Ok(results.into_iter().next().expect("batch had one input"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = texts.len();
        let (input_ids, attention_mask, seq_len) = self.tokenize(texts)?;

        let shape = vec![batch_size as i64, seq_len as i64];
        let input_ids_tensor =
            Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))?;
        let attention_tensor = Tensor::from_array((
            shape.clone(),
            attention_mask.clone().into_boxed_slice(),
        ))?;
        // Single-sentence input: segment ids are all zero
        let token_type_tensor =
            Tensor::from_array((shape, vec![0i64; batch_size * seq_len].into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_tensor,
            "token_type_ids" => token_type_tensor,
        })?;

        // Token embeddings, shape [batch, seq, 384]. The output name varies
        // by ONNX export; try the common ones, fall back to index 0.
        let token_embeddings = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (out_shape, data) = token_embeddings
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings tensor")?;
        let dims: &[i64] = &out_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected token embeddings shape: {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );
        let actual_seq_len = dims[1] as usize;

        let pooled = (0..batch_size)
            .map(|b| {
                let mask = &attention_mask[b * seq_len..(b + 1) * seq_len];
                let tokens = &data[b * actual_seq_len * EMBEDDING_DIM
                    ..(b + 1) * actual_seq_len * EMBEDDING_DIM];
                l2_normalize(mean_pool(tokens, mask, actual_seq_len))
            })
            .collect();

        Ok(pooled)
    }
}

/// Attention-masked mean over the token axis.
fn mean_pool(tokens: &[f32], mask: &[i64], seq_len: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; EMBEDDING_DIM];
    let mut count = 0.0f32;
    for s in 0..seq_len.min(mask.len()) {
        if mask[s] == 0 {
            continue;
        }
        let token = &tokens[s * EMBEDDING_DIM..(s + 1) * EMBEDDING_DIM];
        for (acc, x) in sum.iter_mut().zip(token) {
            *acc += x;
        }
        count += 1.0;
    }
    if count > 0.0 {
        sum.iter_mut().for_each(|x| *x /= count);
    }
    sum
}

/// L2-normalize a vector in place. A zero vector stays zero.
fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
        let norm: f32 = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(vec![0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mean_pool_respects_mask() {
        // Two tokens, only the first masked in
        let mut tokens = vec![0.0f32; 2 * EMBEDDING_DIM];
        tokens[0] = 2.0; // token 0, dim 0
        tokens[EMBEDDING_DIM] = 100.0; // token 1, dim 0 — masked out
        let pooled = mean_pool(&tokens, &[1, 0], 2);
        assert!((pooled[0] - 2.0).abs() < 1e-6);
    }

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir: dirs::home_dir()
                .expect("home dir")
                .join(".reverie/models")
                .to_string_lossy()
                .into_owned(),
        }
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (norm_a * norm_b)
    }

    #[test]
    #[ignore] // Requires model files — run with: cargo test -- --ignored
    fn test_embed_produces_384_dims() {
        let provider = LocalEmbeddingProvider::new(&test_config()).unwrap();
        let embedding = provider.embed("Hello world").unwrap();
        assert_eq!(embedding.len(), EMBEDDING_DIM);
    }

    #[test]
    #[ignore]
    fn test_embed_is_l2_normalized() {
        let provider = LocalEmbeddingProvider::new(&test_config()).unwrap();
        let embedding = provider.embed("Test sentence for normalization").unwrap();
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "L2 norm should be ~1.0, got {norm}");
    }

    #[test]
    #[ignore]
    fn test_embed_is_deterministic() {
        let provider = LocalEmbeddingProvider::new(&test_config()).unwrap();
        let emb1 = provider.embed("Rust is a systems programming language").unwrap();
        let emb2 = provider.embed("Rust is a systems programming language").unwrap();
        assert_eq!(emb1, emb2, "same input must produce identical output");
    }

    #[test]
    #[ignore]
    fn test_embed_batch() {
        let provider = LocalEmbeddingProvider::new(&test_config()).unwrap();
        let embeddings = provider
            .embed_batch(&["First sentence", "Second sentence", "Third sentence"])
            .unwrap();
        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), EMBEDDING_DIM);
            let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    #[ignore]
    fn test_similar_texts_have_high_cosine_similarity() {
        let provider = LocalEmbeddingProvider::new(&test_config()).unwrap();
        let emb1 = provider.embed("The cat sat on the mat").unwrap();
        let emb2 = provider.embed("A cat was sitting on a mat").unwrap();
        let emb3 = provider.embed("Quantum computing uses qubits").unwrap();

        let sim_similar = cosine_similarity(&emb1, &emb2);
        let sim_different = cosine_similarity(&emb1, &emb3);

        assert!(sim_similar > 0.7, "similar texts, got {sim_similar}");
        assert!(sim_different < sim_similar);
    }

    #[test]
    #[ignore]
    fn test_empty_batch() {
        let provider = LocalEmbeddingProvider::new(&test_config()).unwrap();
        assert!(provider.embed_batch(&[]).unwrap().is_empty());
    }
}
