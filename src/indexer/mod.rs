//! Folder indexing: discovery, parallel extraction, batched embedding.
pub mod core;
pub mod discover;
pub mod extract;
pub mod pool;

pub use self::core::{IndexPipeline, IndexReport, PipelineError, PipelineOptions};
pub use discover::{DiscoverOptions, discover};
pub use extract::{ContentExtractor, FileContentExtractor};
pub use pool::{Extraction, ExtractionQueue};
