use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::config::IndexingConfig;

/// Controls which files a walk reports.
#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    /// Honour .gitignore/.ignore files and skip hidden entries.
    pub respect_ignore_files: bool,
    pub follow_links: bool,
    pub exclude: Option<GlobSet>,
}

impl DiscoverOptions {
    pub fn from_config(config: &IndexingConfig) -> Result<Self, globset::Error> {
        let exclude = if config.exclude_patterns.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &config.exclude_patterns {
                builder.add(Glob::new(pattern)?);
            }
            Some(builder.build()?)
        };

        Ok(Self {
            respect_ignore_files: config.respect_ignore_files,
            follow_links: config.follow_links,
            exclude,
        })
    }

    fn excluded(&self, path: &Path) -> bool {
        self.exclude.as_ref().is_some_and(|set| set.is_match(path))
    }
}

/// Recursively list every regular file under `root`, sorted.
///
/// Unreadable entries are logged and skipped.
pub fn discover(root: &Path, options: &DiscoverOptions) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .standard_filters(options.respect_ignore_files)
        .follow_links(options.follow_links)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if options.excluded(entry.path()) {
            debug!("Excluded {}", entry.path().display());
            continue;
        }
        files.push(entry.into_path());
    }

    files.sort();
    files
}
