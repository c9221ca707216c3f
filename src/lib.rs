//! # Guardian Search — local semantic file search
//!
//! Indexes a folder tree into three vector collections (file contents, file
//! names, folders) and answers top-k similarity queries with highlighted
//! snippets.
//!
//! ## Architecture
//!
//! - **[`config`]** — JSON configuration loading and validation
//! - **[`db`]** — SQLite + sqlite-vec vector store, relational fallback, backend selection
//! - **[`embedder`]** — Text embedding via ONNX Runtime (all-MiniLM-L6-v2) or feature hashing
//! - **[`id`]** — Content-addressed entry ids
//! - **[`indexer`]** — Discovery, parallel extraction, batched resumable indexing
//! - **[`query`]** — Similarity search and snippet extraction

pub mod config;
pub mod db;
pub mod embedder;
pub mod id;
pub mod indexer;
pub mod query;
