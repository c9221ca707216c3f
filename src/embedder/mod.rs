/// Embedder trait and shared types for text embedding.
///
/// The embedder is constructed once at process start and handed by
/// reference to the indexing pipeline and the query engine.
pub mod download;
pub mod hashing;
pub mod onnx;
pub mod tokenizer;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

use crate::config::{Config, ModelProvider};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("embedder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow sharing behind `Arc`.
/// Implementations are not assumed to be reentrant; callers issue one
/// embedding call at a time.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, one per input, in order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Embed `texts` and check that exactly one vector came back per input.
pub fn embed_checked<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[&str],
) -> Result<Vec<Vec<f32>>, EmbedderError> {
    let vectors = embedder.embed_batch(texts)?;
    if vectors.len() != texts.len() {
        return Err(EmbedderError::CountMismatch {
            expected: texts.len(),
            got: vectors.len(),
        });
    }
    Ok(vectors)
}

/// Resolve the directory holding the ONNX model files.
#[must_use]
pub fn model_dir(config: &Config) -> PathBuf {
    config
        .model
        .dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| download::default_model_dir(&config.model.name))
}

/// Build the configured embedder.
///
/// For the ONNX provider, missing model files are downloaded first.
pub fn load_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.model.provider {
        ModelProvider::Onnx => {
            let dir = model_dir(config);
            download::download_model_files(&dir, &config.model.name)
                .context("failed to fetch embedding model")?;
            let embedder = onnx::OnnxEmbedder::new(&dir, config.model.dimensions)
                .with_context(|| format!("failed to load model from {}", dir.display()))?;
            info!("Loaded ONNX embedder {}", config.model.name);
            Ok(Arc::new(embedder))
        }
        ModelProvider::Hash => {
            info!(
                "Using hashing embedder ({} dimensions)",
                config.model.dimensions
            );
            Ok(Arc::new(hashing::HashEmbedder::new(config.model.dimensions)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShortEmbedder;

    impl Embedder for ShortEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            Ok(vec![0.0; 4])
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            Ok(vec![vec![0.0; 4]; texts.len().saturating_sub(1)])
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    #[test]
    fn test_embed_checked_rejects_short_output() {
        let err = embed_checked(&ShortEmbedder, &["a", "b"]).unwrap_err();
        assert!(matches!(
            err,
            EmbedderError::CountMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_load_hash_embedder() {
        let mut config = Config::default();
        config.model.provider = ModelProvider::Hash;
        config.model.dimensions = 64;
        let embedder = load_embedder(&config).unwrap();
        assert_eq!(embedder.dimensions(), 64);
    }

    #[test]
    fn test_model_dir_override() {
        let mut config = Config::default();
        config.model.dir = Some("/opt/models/minilm".to_string());
        assert_eq!(model_dir(&config), PathBuf::from("/opt/models/minilm"));
    }
}
