//! Cross-encoder relevance model (BERT sequence classifier, e.g.
//! `ms-marco-MiniLM-L-6-v2`). Scores a query and a passage jointly and maps
//! the single logit through a sigmoid.
use anyhow::{Result as AnyResult, anyhow};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::info;

use docqa_core::traits::{PairScorer, PairScorerLoader};
use docqa_core::{Error, Result};

use crate::{device, hidden_size, load_weights, resolve_model_dir, tokenize};

const MAX_LEN: usize = 512;
const BERT_PAD_ID: u32 = 0;
pub const DEFAULT_MODEL_NAME: &str = "ms-marco-MiniLM-L-6-v2";

struct Model {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
}

impl Model {
    fn score(&self, query: &str, texts: &[String]) -> AnyResult<Vec<f32>> {
        if texts.is_empty() { return Ok(vec![]); }
        let batch = tokenize::tokenize_pairs(&self.tokenizer, query, texts, MAX_LEN, BERT_PAD_ID, &self.device)?;
        let hidden = self.bert.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?.squeeze(1)?;
        let probs = candle_nn::ops::sigmoid(&logits)?;
        let out: Vec<f32> = probs.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec1()?;
        if out.len() != texts.len() { return Err(anyhow!("expected {} scores, got {}", texts.len(), out.len())); }
        Ok(out)
    }
}

#[derive(Clone)]
pub struct CrossEncoder { inner: Arc<Model> }

impl CrossEncoder {
    pub fn new(model_dir: &Path) -> AnyResult<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading cross-encoder");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let raw_config = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&raw_config)?;
        let hidden = hidden_size(&raw_config)?;
        let vb = VarBuilder::from_tensors(load_weights(model_dir, &device)?, DType::F32, &device);
        let bert = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = candle_nn::linear(hidden, hidden, vb.pp("bert.pooler.dense"))?;
        let classifier = candle_nn::linear(hidden, 1, vb.pp("classifier"))?;
        Ok(Self { inner: Arc::new(Model { bert, pooler, classifier, tokenizer, device }) })
    }

    /// Blocking scoring; one probability per text.
    pub fn score_batch(&self, query: &str, texts: &[String]) -> AnyResult<Vec<f32>> { self.inner.score(query, texts) }
}

#[async_trait]
impl PairScorer for CrossEncoder {
    async fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let model = self.inner.clone();
        let (query, texts) = (query.to_string(), texts.to_vec());
        tokio::task::spawn_blocking(move || model.score(&query, &texts))
            .await
            .map_err(|e| Error::RerankModel(format!("scoring task failed: {e}")))?
            .map_err(|e| Error::RerankModel(e.to_string()))
    }
}

/// Resolves and loads the cross-encoder off the async runtime.
pub struct CrossEncoderLoader { model_dir: Option<PathBuf> }

impl CrossEncoderLoader {
    pub fn new(model_dir: Option<PathBuf>) -> Self { Self { model_dir } }
}

#[async_trait]
impl PairScorerLoader for CrossEncoderLoader {
    async fn load(&self) -> Result<Arc<dyn PairScorer>> {
        let explicit = self.model_dir.clone();
        let loaded = tokio::task::spawn_blocking(move || -> AnyResult<CrossEncoder> {
            let dir = resolve_model_dir(explicit.as_deref(), DEFAULT_MODEL_NAME)?;
            CrossEncoder::new(&dir)
        })
        .await
        .map_err(|e| Error::RerankModel(format!("loader task failed: {e}")))?
        .map_err(|e| Error::RerankModel(e.to_string()))?;
        Ok(Arc::new(loaded))
    }
}
