//! Batch coordinator: reconciles many identifiers with bounded concurrency.
//!
//! Admission is gated by a semaphore, so the `(P+1)`th package cannot start
//! until a running one finishes. Each package runs in its own task; a panic
//! inside one is converted to a `FAILED` package and never reaches the others.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinError;

use crate::models::Package;
use crate::reconcile::Reconciler;

/// A spawned reconciliation paired with the identifier it was started for.
type RunningTask = Pin<Box<dyn Future<Output = (String, Result<Package, JoinError>)> + Send>>;

/// Append-only diagnostic log shared by every worker of one batch run.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::debug!("{}", entry);
        self.entries.lock().push(entry);
    }

    /// Snapshot of the entries so far, in append order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

/// Monotonic completed-count, optionally mirrored to a terminal progress bar.
pub struct Progress {
    completed: AtomicUsize,
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn hidden() -> Self {
        Self {
            completed: AtomicUsize::new(0),
            bar: None,
        }
    }

    pub fn with_bar(total: u64) -> Result<Self> {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self {
            completed: AtomicUsize::new(0),
            bar: Some(bar),
        })
    }

    fn complete(&self, package: &Package) {
        debug_assert!(package.status.is_terminal(), "{} left pending", package.display_name());
        self.completed.fetch_add(1, Ordering::SeqCst);
        if let Some(bar) = &self.bar {
            bar.set_message(package.display_name());
            bar.inc(1);
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Cloneable handle that stops a running batch from admitting new work.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    /// One package per admitted identifier, in completion order.
    pub packages: Vec<Package>,
    pub errors: Vec<String>,
    pub cancelled: bool,
    /// Identifiers never admitted because the batch was cancelled.
    pub skipped: Vec<String>,
}

pub struct BatchCoordinator {
    reconciler: Arc<Reconciler>,
    parallel: usize,
}

impl BatchCoordinator {
    /// `parallel` is clamped to at least one.
    pub fn new(reconciler: Arc<Reconciler>, parallel: usize) -> Self {
        Self {
            reconciler,
            parallel: parallel.max(1),
        }
    }

    pub async fn run(&self, ids: Vec<String>, progress: &Progress, cancel: &CancelToken) -> BatchOutcome {
        let log = ErrorLog::new();
        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut queue: VecDeque<String> = ids.into();
        let mut running: FuturesUnordered<RunningTask> = FuturesUnordered::new();
        let mut packages = Vec::with_capacity(queue.len());
        let mut skipped = Vec::new();
        let mut cancelled = false;

        tracing::info!("processing {} packages with {} workers", queue.len(), self.parallel);

        loop {
            let admitting = !cancelled && !queue.is_empty();
            if !admitting && running.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if admitting => {
                    cancelled = true;
                    skipped.extend(queue.drain(..));
                    tracing::warn!(
                        "batch cancelled; waiting for {} running packages, {} not started",
                        running.len(),
                        skipped.len()
                    );
                }

                Some((id, joined)) = running.next(), if !running.is_empty() => {
                    let package = match joined {
                        Ok(package) => package,
                        Err(e) => {
                            log.push(format!("Processing error for {}: {}", id, e));
                            Package::failed(id.as_str(), format!("Processing error: {}", e))
                        }
                    };
                    progress.complete(&package);
                    packages.push(package);
                }

                permit = Arc::clone(&semaphore).acquire_owned(), if admitting => {
                    let Ok(permit) = permit else { break };
                    let Some(id) = queue.pop_front() else { continue };

                    let reconciler = Arc::clone(&self.reconciler);
                    let worker_log = log.clone();
                    let worker_id = id.clone();
                    let handle = tokio::spawn(async move {
                        let _permit = permit;
                        reconciler.reconcile_identifier(&worker_id, &worker_log).await
                    });
                    running.push(Box::pin(async move { (id, handle.await) }));
                }
            }
        }

        if cancel.is_cancelled() {
            cancelled = true;
        }

        BatchOutcome {
            packages,
            errors: log.entries(),
            cancelled,
            skipped,
        }
    }
}
