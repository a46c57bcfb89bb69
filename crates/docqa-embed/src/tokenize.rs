use anyhow::{Result, anyhow};
use candle_core::{Device, Tensor};
use tokenizers::{Encoding, Tokenizer};

/// Token ids, token type ids and attention mask, each `[B, T]`.
pub struct Batch {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

fn stack(encodings: &[Encoding], max_len: usize, pad_to_max: bool, pad_id: u32, device: &Device) -> Result<Batch> {
    let longest = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0);
    let width = if pad_to_max { max_len } else { longest.max(1) };
    let rows = encodings.len();
    let (mut ids, mut types, mut mask) = (Vec::with_capacity(rows * width), Vec::with_capacity(rows * width), Vec::with_capacity(rows * width));
    for enc in encodings {
        let n = enc.get_ids().len().min(width);
        ids.extend_from_slice(&enc.get_ids()[..n]);
        types.extend_from_slice(&enc.get_type_ids()[..n]);
        mask.extend_from_slice(&enc.get_attention_mask()[..n]);
        let pad = width - n;
        ids.extend(std::iter::repeat(pad_id).take(pad)); types.extend(std::iter::repeat(0).take(pad)); mask.extend(std::iter::repeat(0).take(pad));
    }
    let to_tensor = |v: Vec<u32>| -> Result<Tensor> { Ok(Tensor::from_iter(v.into_iter().map(i64::from), device)?.reshape((rows, width))?) };
    Ok(Batch { input_ids: to_tensor(ids)?, token_type_ids: to_tensor(types)?, attention_mask: to_tensor(mask)? })
}

/// Single texts, padded to exactly `max_len`.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, pad_id: u32, device: &Device) -> Result<Batch> {
    let mut encodings = Vec::with_capacity(texts.len());
    for text in texts { encodings.push(tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?); }
    stack(&encodings, max_len, true, pad_id, device)
}

/// `(query, text)` pairs, padded to the longest pair in the batch.
pub fn tokenize_pairs(tokenizer: &Tokenizer, query: &str, texts: &[String], max_len: usize, pad_id: u32, device: &Device) -> Result<Batch> {
    let mut encodings = Vec::with_capacity(texts.len());
    for text in texts { encodings.push(tokenizer.encode((query, text.as_str()), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?); }
    stack(&encodings, max_len, false, pad_id, device)
}
