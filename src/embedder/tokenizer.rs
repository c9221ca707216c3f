/// BERT tokenizer wrapper around HuggingFace `tokenizers` crate.
///
/// Produces padded, row-major batches ready to be fed to the ONNX session.
use std::path::Path;

use anyhow::Result;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Sequence limit used by all-MiniLM-L6-v2 during training.
pub const MAX_SEQ_LEN: usize = 256;

/// Wrapper around the HuggingFace tokenizer for BERT-style models.
pub struct BertTokenizer {
    inner: Tokenizer,
    max_length: usize,
}

/// A batch of encodings padded to a common length, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEncoding {
    pub batch_size: usize,
    pub seq_len: usize,
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl BatchEncoding {
    /// Attention mask row for the `i`-th input.
    #[must_use]
    pub fn mask_row(&self, i: usize) -> &[i64] {
        &self.attention_mask[i * self.seq_len..(i + 1) * self.seq_len]
    }
}

impl BertTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file in the model directory.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;

        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            inner,
            max_length: MAX_SEQ_LEN,
        })
    }

    /// Tokenize a batch of texts, padding every row to the longest one.
    pub fn encode_batch(&self, texts: &[&str]) -> Result<BatchEncoding> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;

        let seq_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let mut batch = BatchEncoding {
            batch_size: encodings.len(),
            seq_len,
            input_ids: Vec::with_capacity(encodings.len() * seq_len),
            attention_mask: Vec::with_capacity(encodings.len() * seq_len),
            token_type_ids: Vec::with_capacity(encodings.len() * seq_len),
        };

        for enc in &encodings {
            let pad = seq_len - enc.len();
            batch
                .input_ids
                .extend(enc.get_ids().iter().map(|&id| i64::from(id)));
            batch
                .attention_mask
                .extend(enc.get_attention_mask().iter().map(|&m| i64::from(m)));
            batch
                .token_type_ids
                .extend(enc.get_type_ids().iter().map(|&t| i64::from(t)));
            batch.input_ids.extend(std::iter::repeat_n(0, pad));
            batch.attention_mask.extend(std::iter::repeat_n(0, pad));
            batch.token_type_ids.extend(std::iter::repeat_n(0, pad));
        }

        Ok(batch)
    }

    /// Get the vocabulary size.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    /// Get the configured maximum sequence length.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Requires the model files; run with `cargo test tokenizer -- --ignored`.
    #[test]
    #[ignore]
    fn test_encode_batch_with_real_model() {
        let model_dir = super::super::download::default_model_dir("all-MiniLM-L6-v2");
        if !model_dir.join("tokenizer.json").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let tokenizer = BertTokenizer::from_model_dir(&model_dir).unwrap();
        let batch = tokenizer
            .encode_batch(&["Hello", "a considerably longer sentence here"])
            .unwrap();

        assert_eq!(batch.batch_size, 2);
        assert_eq!(batch.input_ids.len(), 2 * batch.seq_len);
        // The short row is padded with zeros in the mask.
        assert!(batch.mask_row(0).contains(&0));
        assert!(batch.mask_row(1).iter().all(|&m| m == 1));
    }

    #[test]
    fn test_tokenizer_missing_file() {
        let result = BertTokenizer::from_model_dir(Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }

    #[test]
    fn test_mask_row_slices() {
        let batch = BatchEncoding {
            batch_size: 2,
            seq_len: 3,
            input_ids: vec![1, 2, 3, 4, 5, 0],
            attention_mask: vec![1, 1, 1, 1, 1, 0],
            token_type_ids: vec![0; 6],
        };
        assert_eq!(batch.mask_row(1), &[1, 1, 0]);
    }
}
