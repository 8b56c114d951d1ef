//! Batch downloads of selected catalog entries.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tracing::{info, warn};

use crate::catalog::CatalogEntry;
use crate::client::Client;
use crate::control::CallControl;
use crate::error::DownloadError;

/// One entry scheduled for download and where its archive goes.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub entry: CatalogEntry,
    pub destination: PathBuf,
}

impl DownloadJob {
    pub fn target(&self) -> PathBuf {
        self.destination.join(self.entry.archive_name())
    }
}

/// What happened to a single entry.
#[derive(Debug)]
pub struct ItemOutcome {
    pub identifier: String,
    pub product_id: String,
    pub result: Result<PathBuf, DownloadError>,
}

/// Per-entry outcomes of a batch, in catalog order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &DownloadError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }
}

/// Drives [`Client::download`] over a list of entries.
///
/// A failing entry never stops the batch. With one worker (the default)
/// entries are fetched strictly one after another on the calling thread.
#[derive(Debug)]
pub struct Orchestrator<'a> {
    client: &'a Client,
    output_dir: PathBuf,
    workers: usize,
}

impl<'a> Orchestrator<'a> {
    pub fn new(client: &'a Client, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn jobs(&self, entries: &[CatalogEntry]) -> Vec<DownloadJob> {
        entries
            .iter()
            .map(|entry| DownloadJob {
                entry: entry.clone(),
                destination: self.output_dir.clone(),
            })
            .collect()
    }

    pub fn run(&self, entries: &[CatalogEntry], control: &CallControl) -> Result<BatchReport> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "failed to create output directory {}",
                self.output_dir.display()
            )
        })?;

        let jobs = self.jobs(entries);
        let total = jobs.len();
        if total == 0 {
            info!("No tiles found");
            return Ok(BatchReport::default());
        }

        let workers = self.workers.min(total);
        let outcomes = if workers == 1 {
            jobs.iter()
                .enumerate()
                .map(|(i, job)| self.download_one(i, total, job, control))
                .collect()
        } else {
            self.run_pool(&jobs, workers, control)
        };

        let report = BatchReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "download batch finished"
        );
        Ok(report)
    }

    fn run_pool(
        &self,
        jobs: &[DownloadJob],
        workers: usize,
        control: &CallControl,
    ) -> Vec<ItemOutcome> {
        let counter = AtomicUsize::new(0);
        let next = &counter;
        let total = jobs.len();

        let mut indexed: Vec<(usize, ItemOutcome)> = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let i = next.fetch_add(1, Ordering::SeqCst);
                            if i >= total {
                                break;
                            }
                            done.push((i, self.download_one(i, total, &jobs[i], control)));
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });

        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn download_one(
        &self,
        index: usize,
        total: usize,
        job: &DownloadJob,
        control: &CallControl,
    ) -> ItemOutcome {
        let entry = &job.entry;
        let result = match control.check() {
            Err(reason) => Err(DownloadError::interrupted(&entry.identifier, reason)),
            Ok(()) => {
                info!("Downloading {} of {}: {}", index + 1, total, entry.identifier);
                self.client
                    .download(&entry.id, &entry.identifier, &job.destination, control)
            }
        };

        if let Err(e) = &result {
            warn!(identifier = %entry.identifier, error = %e, "download failed");
        }

        ItemOutcome {
            identifier: entry.identifier.clone(),
            product_id: entry.id.clone(),
            result,
        }
    }
}
