/// Configuration module.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Config file looked up when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "guardian.json";

// ── Default value functions ──────────────────────────────────────────

fn default_vector_store_path() -> String {
    "./vector_store".to_string()
}

fn default_fallback_db_path() -> String {
    "./embeddings_fallback.db".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_label_batch_size() -> usize {
    5000
}

fn default_search_top_k() -> usize {
    3
}

fn default_snippet_before() -> usize {
    30
}

fn default_snippet_after() -> usize {
    200
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directory holding the primary vector store.
    #[serde(default = "default_vector_store_path")]
    pub vector_store_path: String,

    /// SQLite file used when the vector store is unavailable.
    #[serde(default = "default_fallback_db_path")]
    pub fallback_db_path: String,

    /// Files embedded per content batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_label_batch_size")]
    pub name_batch_size: usize,

    #[serde(default = "default_label_batch_size")]
    pub folder_batch_size: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    #[serde(default)]
    pub snippet: SnippetConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SnippetConfig {
    /// Characters kept before the matched term.
    #[serde(default = "default_snippet_before")]
    pub before: usize,

    /// Characters kept after the matched term.
    #[serde(default = "default_snippet_after")]
    pub after: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct IndexingConfig {
    /// Extraction workers; 0 means one per CPU core.
    #[serde(default)]
    pub workers: usize,

    /// Honour .gitignore/.ignore files and skip hidden entries.
    #[serde(default)]
    pub respect_ignore_files: bool,

    #[serde(default)]
    pub follow_links: bool,

    /// Glob patterns (matched against the full path) excluded from discovery.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Onnx,
    Hash,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,

    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Local model directory; defaults to the per-user data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            vector_store_path: default_vector_store_path(),
            fallback_db_path: default_fallback_db_path(),
            batch_size: default_batch_size(),
            name_batch_size: default_label_batch_size(),
            folder_batch_size: default_label_batch_size(),
            search_top_k: default_search_top_k(),
            snippet: SnippetConfig::default(),
            indexing: IndexingConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            before: default_snippet_before(),
            after: default_snippet_after(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            name: default_model_name(),
            dimensions: default_dimensions(),
            dir: None,
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_PATH`].
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template next to the working directory.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(self.name_batch_size > 0, "name_batch_size must be positive");
        anyhow::ensure!(
            self.folder_batch_size > 0,
            "folder_batch_size must be positive"
        );
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            !self.vector_store_path.is_empty(),
            "vector_store_path must not be empty"
        );
        anyhow::ensure!(
            !self.fallback_db_path.is_empty(),
            "fallback_db_path must not be empty"
        );
        for pattern in &self.indexing.exclude_patterns {
            globset::Glob::new(pattern)
                .with_context(|| format!("invalid exclude pattern: {pattern}"))?;
        }
        Ok(())
    }

    /// Number of extraction workers to run.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.indexing.workers > 0 {
            return self.indexing.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
