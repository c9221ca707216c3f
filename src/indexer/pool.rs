//! Bounded extraction worker pool.
//!
//! A driver task hands paths to tokio's blocking pool with at most `limit`
//! extractions in flight and forwards results, in completion order, through
//! a bounded channel. The driver keeps refilling while the consumer is busy
//! (e.g. embedding a batch) until the channel is full. A panicking or lost
//! task only loses its own file, which is still reported.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::task::{Id, JoinHandle, JoinSet};
use tracing::warn;

use super::extract::ContentExtractor;

/// Result of one extraction task. `text` is `None` when the task failed.
#[derive(Debug)]
pub struct Extraction {
    pub path: PathBuf,
    pub text: Option<String>,
}

pub struct ExtractionQueue {
    results: mpsc::Receiver<Extraction>,
    in_flight: Arc<AtomicUsize>,
    driver: JoinHandle<()>,
}

impl ExtractionQueue {
    /// Start extracting `paths`. At most `limit` extractions run at once and
    /// at most `buffer` finished ones wait to be collected.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<X>(paths: Vec<PathBuf>, extractor: Arc<X>, limit: usize, buffer: usize) -> Self
    where
        X: ContentExtractor + ?Sized + 'static,
    {
        let (tx, results) = mpsc::channel(buffer.max(1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let driver = tokio::spawn(drive(
            paths,
            extractor,
            limit.max(1),
            tx,
            Arc::clone(&in_flight),
        ));
        Self {
            results,
            in_flight,
            driver,
        }
    }

    /// Extractions currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Next finished extraction, or `None` once every path is done.
    pub async fn next(&mut self) -> Option<Extraction> {
        self.results.recv().await
    }
}

impl Drop for ExtractionQueue {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn drive<X>(
    paths: Vec<PathBuf>,
    extractor: Arc<X>,
    limit: usize,
    tx: mpsc::Sender<Extraction>,
    in_flight: Arc<AtomicUsize>,
) where
    X: ContentExtractor + ?Sized + 'static,
{
    let mut pending = paths.into_iter();
    let mut running: JoinSet<String> = JoinSet::new();
    let mut owners: HashMap<Id, PathBuf> = HashMap::new();

    loop {
        while running.len() < limit {
            let Some(path) = pending.next() else {
                break;
            };
            let extractor = Arc::clone(&extractor);
            let task_path = path.clone();
            let handle = running.spawn_blocking(move || extractor.extract(&task_path));
            owners.insert(handle.id(), path);
        }
        in_flight.store(running.len(), Ordering::SeqCst);

        let Some(joined) = running.join_next_with_id().await else {
            break;
        };
        in_flight.store(running.len(), Ordering::SeqCst);

        let extraction = match joined {
            Ok((id, text)) => owners.remove(&id).map(|path| Extraction {
                path,
                text: Some(text),
            }),
            Err(e) => owners.remove(&e.id()).map(|path| {
                if e.is_panic() {
                    warn!("Extractor panicked on {}", path.display());
                } else {
                    warn!("Extraction of {} lost: {e}", path.display());
                }
                Extraction { path, text: None }
            }),
        };
        let Some(extraction) = extraction else {
            continue;
        };

        if tx.send(extraction).await.is_err() {
            // Consumer went away.
            running.abort_all();
            break;
        }
    }
}
