use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{Collection, IndexEntry, Storage, WriteOutcome};
use crate::embedder::{Embedder, embed_checked};
use crate::id::{make_id, name_key, path_key};
use crate::indexer::discover::{DiscoverOptions, discover};
use crate::indexer::extract::ContentExtractor;
use crate::indexer::pool::ExtractionQueue;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("root folder not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("cannot resolve {}: {source}", path.display())]
    Resolve {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),
}

/// Knobs that stay fixed across runs of one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub name_batch_size: usize,
    pub folder_batch_size: usize,
    pub workers: usize,
    pub discover: DiscoverOptions,
    pub show_progress: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            name_batch_size: 5000,
            folder_batch_size: 5000,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            discover: DiscoverOptions::default(),
            show_progress: false,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        Ok(Self {
            name_batch_size: config.name_batch_size,
            folder_batch_size: config.folder_batch_size,
            workers: config.worker_count(),
            discover: DiscoverOptions::from_config(&config.indexing)?,
            show_progress: true,
        })
    }
}

/// Counters for one `index_folder` run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub discovered: usize,
    /// Skipped because their content id was already committed.
    pub already_indexed: usize,
    pub queued: usize,
    /// Extractions that produced non-empty text.
    pub extracted: usize,
    pub empty: usize,
    pub failed: usize,
    pub content_committed: usize,
    pub content_rescued: usize,
    pub content_dropped: usize,
    pub names_committed: usize,
    pub folders_committed: usize,
    pub labels_dropped: usize,
    pub embed_calls: usize,
}

struct ContentItem {
    path: String,
    text: String,
}

/// A short string (file name or folder path) embedded for its own sake.
struct Label {
    id: String,
    document: String,
    path: String,
}

pub struct IndexPipeline<'a, E: Embedder + ?Sized, X: ContentExtractor + ?Sized + 'static> {
    storage: &'a Storage,
    embedder: &'a E,
    extractor: Arc<X>,
    options: PipelineOptions,
}

impl<'a, E: Embedder + ?Sized, X: ContentExtractor + ?Sized + 'static> IndexPipeline<'a, E, X> {
    pub fn new(
        storage: &'a Storage,
        embedder: &'a E,
        extractor: Arc<X>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            storage,
            embedder,
            extractor,
            options,
        }
    }

    /// Index every file under `root` into the content, name and folder
    /// collections.
    ///
    /// With `resume`, files whose content id is already committed are
    /// skipped. Only a missing root is an error; everything else is
    /// contained and counted in the report.
    pub async fn index_folder(
        &self,
        root: &Path,
        batch_size: usize,
        resume: bool,
    ) -> Result<IndexReport, PipelineError> {
        if !root.is_dir() {
            return Err(PipelineError::RootNotFound(root.to_path_buf()));
        }
        // Resolves `.`, `..` and symlinks so one file always maps to one key.
        let root = root.canonicalize().map_err(|source| PipelineError::Resolve {
            path: root.to_path_buf(),
            source,
        })?;

        let mut report = IndexReport::default();

        info!("Searching for files in {}", root.display());
        let all_files = discover(&root, &self.options.discover);
        report.discovered = all_files.len();
        info!("Found {} files", all_files.len());

        let to_process: Vec<PathBuf> = if resume {
            let existing = self.storage.existing_ids(Collection::FilesContent);
            all_files
                .iter()
                .filter(|p| !existing.contains(&make_id(&path_key(p))))
                .cloned()
                .collect()
        } else {
            all_files.clone()
        };
        report.already_indexed = all_files.len() - to_process.len();
        report.queued = to_process.len();

        if to_process.is_empty() {
            info!("No new files to index");
            return Ok(report);
        }
        info!("{} files to process", to_process.len());

        self.content_pass(to_process, batch_size.max(1), &mut report)
            .await;

        info!("Indexing file and folder names...");
        self.name_pass(&all_files, resume, &mut report);
        self.folder_pass(&all_files, resume, &mut report);

        info!(
            "Indexing finished: {} committed, {} rescued, {} dropped, {} empty, {} failed",
            report.content_committed,
            report.content_rescued,
            report.content_dropped,
            report.empty,
            report.failed
        );
        Ok(report)
    }

    async fn content_pass(&self, paths: Vec<PathBuf>, batch_size: usize, report: &mut IndexReport) {
        let pb = self.progress(paths.len() as u64, "Reading file contents");
        let mut queue = ExtractionQueue::spawn(
            paths,
            Arc::clone(&self.extractor),
            self.options.workers,
            batch_size,
        );
        let mut batch: Vec<ContentItem> = Vec::with_capacity(batch_size);

        while let Some(extraction) = queue.next().await {
            pb.inc(1);
            match extraction.text {
                None => report.failed += 1,
                Some(text) if text.trim().is_empty() => {
                    debug!("No text in {}", extraction.path.display());
                    report.empty += 1;
                }
                Some(text) => {
                    report.extracted += 1;
                    batch.push(ContentItem {
                        path: path_key(&extraction.path),
                        text,
                    });
                    if batch.len() >= batch_size {
                        self.flush_content(std::mem::take(&mut batch), report);
                    }
                }
            }
        }

        if !batch.is_empty() {
            self.flush_content(batch, report);
        }
        pb.finish_and_clear();
    }

    fn flush_content(&self, batch: Vec<ContentItem>, report: &mut IndexReport) {
        let n = batch.len();
        let texts: Vec<&str> = batch.iter().map(|item| item.text.as_str()).collect();

        report.embed_calls += 1;
        let vectors = match embed_checked(self.embedder, &texts) {
            Ok(v) => v,
            Err(e) => {
                warn!("Embedding failed, dropping batch of {n}: {e}");
                report.content_dropped += n;
                return;
            }
        };

        let entries: Vec<IndexEntry> = batch
            .into_iter()
            .zip(vectors)
            .map(|(item, embedding)| {
                IndexEntry::new(make_id(&item.path), item.path, item.text, embedding)
            })
            .collect();

        match self.storage.store(Collection::FilesContent, &entries) {
            WriteOutcome::Committed => report.content_committed += n,
            WriteOutcome::Rescued => report.content_rescued += n,
            WriteOutcome::Dropped => report.content_dropped += n,
        }
    }

    fn name_pass(&self, all_files: &[PathBuf], resume: bool, report: &mut IndexReport) {
        let mut names: BTreeMap<String, String> = BTreeMap::new();
        for path in all_files {
            if let Some(name) = name_key(path) {
                names.entry(name).or_insert_with(|| path_key(path));
            }
        }

        let labels: Vec<Label> = names
            .into_iter()
            .map(|(name, path)| Label {
                id: make_id(&name),
                document: name,
                path,
            })
            .collect();

        let unique = labels.len();
        let committed = self.label_pass(
            Collection::FilesName,
            labels,
            self.options.name_batch_size,
            resume,
            report,
        );
        report.names_committed += committed;
        info!("{committed} of {unique} unique file names indexed");
    }

    fn folder_pass(&self, all_files: &[PathBuf], resume: bool, report: &mut IndexReport) {
        let folders: BTreeSet<String> = all_files
            .iter()
            .filter_map(|p| p.parent())
            .map(path_key)
            .collect();

        let labels: Vec<Label> = folders
            .into_iter()
            .map(|folder| Label {
                id: make_id(&folder),
                document: folder.clone(),
                path: folder,
            })
            .collect();

        let unique = labels.len();
        let committed = self.label_pass(
            Collection::Folders,
            labels,
            self.options.folder_batch_size,
            resume,
            report,
        );
        report.folders_committed += committed;
        info!("{committed} of {unique} unique folders indexed");
    }

    /// Embed and store labels in fixed-size batches. Write failures are
    /// logged and counted; there is no fallback for these collections.
    fn label_pass(
        &self,
        collection: Collection,
        labels: Vec<Label>,
        batch_size: usize,
        resume: bool,
        report: &mut IndexReport,
    ) -> usize {
        if !self.storage.accepts(collection) {
            warn!(
                "{} cannot hold {collection}; skipping {} entries",
                self.storage.kind().label(),
                labels.len()
            );
            return 0;
        }

        let labels: Vec<Label> = if resume {
            let existing: HashSet<String> = self.storage.existing_ids(collection);
            labels
                .into_iter()
                .filter(|l| !existing.contains(&l.id))
                .collect()
        } else {
            labels
        };
        if labels.is_empty() {
            return 0;
        }

        let pb = self.progress(labels.len() as u64, collection.name());
        let mut committed = 0;
        for chunk in labels.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = chunk.iter().map(|l| l.document.as_str()).collect();

            report.embed_calls += 1;
            let vectors = match embed_checked(self.embedder, &texts) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Embedding {collection} batch failed: {e}");
                    report.labels_dropped += chunk.len();
                    pb.inc(chunk.len() as u64);
                    continue;
                }
            };

            let entries: Vec<IndexEntry> = chunk
                .iter()
                .zip(vectors)
                .map(|(label, embedding)| {
                    let entry = IndexEntry::new(
                        label.id.clone(),
                        label.path.clone(),
                        label.document.clone(),
                        embedding,
                    );
                    if collection == Collection::FilesName {
                        entry.with_meta("name", label.document.clone())
                    } else {
                        entry
                    }
                })
                .collect();

            match self.storage.store(collection, &entries) {
                WriteOutcome::Committed => committed += entries.len(),
                WriteOutcome::Rescued | WriteOutcome::Dropped => {
                    report.labels_dropped += entries.len();
                }
            }
            pb.inc(chunk.len() as u64);
        }
        pb.finish_and_clear();
        committed
    }

    fn progress(&self, len: u64, label: &str) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg:>20} {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}]")
                .expect("valid template")
                .progress_chars("█▓░"),
        );
        pb.set_message(label.to_string());
        pb
    }
}
