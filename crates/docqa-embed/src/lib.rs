use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{Device, Tensor, DType};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{XLMRobertaModel, Config as XLMRobertaConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use docqa_core::traits::Embedder;

pub mod cross_encoder;
pub mod device;
pub mod pool;
pub mod provider;
pub mod tokenize;

pub use cross_encoder::{CrossEncoder, CrossEncoderLoader};
pub use pool::masked_mean_l2;
pub use provider::BlockingEmbeddingProvider;

const MAX_LEN: usize = 256;
const XLM_PAD_ID: u32 = 1;

/// Load `model.safetensors` when present, else `pytorch_model.bin`.
pub(crate) fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() { return Ok(candle_core::safetensors::load(&safetensors, device)?); }
    let weights_path = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&weights_path)?;
    weights.into_iter().map(|(k, t)| -> Result<(String, Tensor)> { Ok((k, t.to_device(device)?)) }).collect()
}

pub(crate) fn hidden_size(raw_config: &str) -> Result<usize> {
    let v: serde_json::Value = serde_json::from_str(raw_config)?;
    v.get("hidden_size").and_then(|h| h.as_u64()).map(|h| h as usize).ok_or_else(|| anyhow!("config.json has no hidden_size"))
}

/// BGE-M3 (XLM-RoBERTa) sentence embedder: masked mean pooling + L2.
pub struct EmbeddingModel { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize }

impl EmbeddingModel {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading embedding model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let dim = hidden_size(&raw_config)?;
        let vb = VarBuilder::from_tensors(load_weights(model_dir, &device)?, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim, "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim })
    }
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { MAX_LEN }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(vec![]); }
        let start = Instant::now();
        let batch = tokenize::tokenize_batch(&self.tokenizer, texts, MAX_LEN, XLM_PAD_ID, &self.device)?;
        let token_type_ids = Tensor::zeros(batch.input_ids.dims(), DType::I64, &self.device)?;
        let hidden = self.model.forward(&batch.input_ids, &batch.attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        let ms = start.elapsed().as_millis();
        if ms > 100 * texts.len() as u128 { warn!(ms, n = texts.len(), "slow embedding batch"); } else { debug!(ms, n = texts.len(), "embedded batch"); }
        Ok(out)
    }
}

/// Deterministic hashed bag-of-tokens embedder for tests and development.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder { pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } } }

impl FakeEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace().map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0); token.hash(&mut hasher); let h = hasher.finish();
            let idx = (h as usize) % self.dim; let val = 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; } v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { MAX_LEN }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|t| self.embed_one(t)).collect()) }
}

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(model_dir: Option<&Path>) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() { info!("using FakeEmbedder"); return Ok(Box::new(FakeEmbedder::new(1024))); }
    let dir = resolve_model_dir(model_dir, "bge-m3")?;
    Ok(Box::new(EmbeddingModel::new(&dir)?))
}

/// `explicit`, then `APP_MODEL_DIR`, then `../models/<name>` and `models/<name>`.
pub fn resolve_model_dir(explicit: Option<&Path>, name: &str) -> Result<PathBuf> {
    if let Some(p) = explicit { if p.exists() { return Ok(p.to_path_buf()); } warn!(dir = %p.display(), "configured model dir does not exist"); }
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") { let p = PathBuf::from(&dir).join(name); if p.exists() { debug!(dir = %p.display(), "using APP_MODEL_DIR"); return Ok(p); } }
    let root = Path::new("../models").join(name); if root.exists() { return Ok(root); }
    let local = Path::new("models").join(name); if local.exists() { return Ok(local); }
    Err(anyhow!("Could not locate model directory '{}'", name))
}
