/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed into one signed bucket; the
/// bucket counts are L2-normalised. Texts sharing words end up close in
/// cosine distance, which is enough for tests and for offline runs where
/// the ONNX model is unavailable.
use sha1::{Digest, Sha1};

use super::{Embedder, EmbedderError};

pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Create a new `HashEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha1::digest(token.as_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(word);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((h % self.dimensions as u64) as usize, sign)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut embedding = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let (idx, sign) = self.bucket(&token);
            embedding[idx] += sign;
        }

        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq == 0.0 {
            // No tokens: a fixed unit vector keeps cosine distance defined.
            embedding[0] = 1.0;
            return Ok(embedding);
        }

        let inv = 1.0 / norm_sq.sqrt();
        for v in &mut embedding {
            *v *= inv;
        }
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_hash_embed_dimensions() {
        let embedder = HashEmbedder::new(128);
        assert_eq!(embedder.embed("hello world").unwrap().len(), 128);
        assert_eq!(embedder.dimensions(), 128);
    }

    #[test]
    fn test_hash_embed_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("quarterly report").unwrap();
        let b = embedder.embed("quarterly report").unwrap();
        assert_eq!(a, b, "same input should produce same output");
    }

    #[test]
    fn test_hash_embed_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("Budget_2024.xlsx").unwrap();
        let b = embedder.embed("budget 2024 xlsx").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embed_shared_words_are_closer() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed("invoice").unwrap();
        let near = embedder.embed("invoice march supplier").unwrap();
        let far = embedder.embed("holiday photos beach").unwrap();
        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[test]
    fn test_hash_embed_normalized() {
        let embedder = HashEmbedder::default();
        for text in ["test normalization", "", "!!!"] {
            let v = embedder.embed(text).unwrap();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "norm for {text:?} was {norm}");
        }
    }

    #[test]
    fn test_hash_embed_zero_dimensions_clamped() {
        let embedder = HashEmbedder::new(0);
        assert_eq!(embedder.dimensions(), 1);
        assert_eq!(embedder.embed("").unwrap(), vec![1.0]);
        assert_eq!(embedder.embed("anything").unwrap().len(), 1);
    }

    #[test]
    fn test_hash_embed_batch_order() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed_batch(&["a", "b", "c"]).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1], embedder.embed("b").unwrap());
    }
}
