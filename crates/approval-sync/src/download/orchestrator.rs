use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::broadcast::run_events::{RunEvent, Severity};
use crate::pipeline::progress::ProgressReporter;
use crate::registry::DedupRegistry;
use crate::sanitize::redact_url;
use crate::storage::FileStorage;

use super::error::{DownloadError, DownloadErrorKind};
use super::http::AuthenticatedClient;
use super::item::ScrapedItem;
use super::placement::{place, Companion, Placement};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub run_date: NaiveDate,
    pub success_delay: Duration,
    pub failure_delay: Duration,
}

/// Counters for one batch, updated once per completed item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchCounters {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub duplicates: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<DownloadErrorKind, usize>,
    /// Ids newly written to the registry during the batch.
    pub registered: usize,
    pub total_amount: f64,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Every scheduled item with its result, in input order.
    pub items: Vec<ScrapedItem>,
    pub counters: BatchCounters,
    /// Items dropped because an earlier one had the same URL.
    pub deduplicated: usize,
}

struct BatchState {
    registry: DedupRegistry,
    counters: BatchCounters,
    // URLs already counted in this batch
    finished: HashSet<String>,
}

struct Inner {
    client: AuthenticatedClient,
    storage: Arc<FileStorage>,
    companion: Option<Companion>,
    progress: Arc<dyn ProgressReporter>,
    settings: OrchestratorSettings,
    state: Mutex<BatchState>,
}

/// Runs downloads through a bounded pool of tokio tasks.
///
/// The registry lives inside the orchestrator for the duration of a run so
/// that counter updates, registry inserts and the registry file rewrite all
/// happen inside one lock.
pub struct DownloadOrchestrator {
    inner: Arc<Inner>,
}

impl DownloadOrchestrator {
    pub fn new(
        client: AuthenticatedClient,
        storage: Arc<FileStorage>,
        registry: DedupRegistry,
        companion: Option<Companion>,
        progress: Arc<dyn ProgressReporter>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                storage,
                companion,
                progress,
                settings,
                state: Mutex::new(BatchState {
                    registry,
                    counters: BatchCounters::default(),
                    finished: HashSet::new(),
                }),
            }),
        }
    }

    pub fn companion(&self) -> Option<&Companion> {
        self.inner.companion.as_ref()
    }

    pub fn registry_len(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    pub fn registry_snapshot(&self) -> DedupRegistry {
        self.inner.state.lock().registry.clone()
    }

    /// Downloads `items` with at most `limit` transfers open at once.
    ///
    /// Item failures are recorded on the item and never abort the batch.
    /// Cancellation stops items at their next check; they come back marked
    /// `cancelled`.
    pub async fn run(
        &self,
        items: Vec<ScrapedItem>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let (unique, deduplicated) = dedup_by_url(items);
        let total = unique.len();
        let limit = limit.max(1);

        {
            let mut state = self.inner.state.lock();
            state.counters = BatchCounters {
                total,
                ..BatchCounters::default()
            };
            state.finished.clear();
        }

        let span = info_span!("download_batch", total, limit);
        async {
            if deduplicated > 0 {
                info!("Dropped {} items with a repeated URL", deduplicated);
            }
            self.inner.progress.report(RunEvent::Progress {
                completed: 0,
                total,
            });

            let semaphore = Arc::new(Semaphore::new(limit));
            let mut handles = Vec::with_capacity(total);

            for item in unique {
                let inner = Arc::clone(&self.inner);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();

                // Kept so a panicked task still shows up as a failed item.
                let fallback = item.clone();
                let handle = tokio::spawn(async move {
                    inner.download_one(item, &semaphore, &cancel).await
                });
                handles.push((handle, fallback));
            }

            let mut results: Vec<ScrapedItem> = Vec::with_capacity(total);
            for (handle, mut fallback) in handles {
                match handle.await {
                    Ok(item) => results.push(item),
                    Err(e) => {
                        error!("Download task panicked: {}", e);
                        fallback.reset_result();
                        fallback.record_failure(&DownloadError::Unknown(format!(
                            "Download task failed: {}",
                            e
                        )));
                        self.inner.complete(&fallback);
                        results.push(fallback);
                    }
                }
            }

            let counters = self.inner.state.lock().counters.clone();
            info!(
                succeeded = counters.succeeded,
                duplicates = counters.duplicates,
                failed = counters.failed,
                cancelled = counters.cancelled,
                "Download batch finished"
            );

            BatchOutcome {
                items: results,
                counters,
                deduplicated,
            }
        }
        .instrument(span)
        .await
    }
}

impl Inner {
    async fn download_one(
        &self,
        mut item: ScrapedItem,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> ScrapedItem {
        let span = info_span!("download", item_id = %item.item_id);
        async {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
            };

            let Some(_permit) = permit else {
                item.record_failure(&DownloadError::Cancelled);
                self.complete(&item);
                return item;
            };

            debug!("Fetching {}", redact_url(&item.resolved_url));
            if let Err(e) = self.transfer(&mut item, cancel).await {
                if !matches!(e, DownloadError::Cancelled) {
                    warn!("Download failed: {}", e);
                }
                item.record_failure(&e);
            }

            self.complete(&item);

            if !item.cancelled {
                let delay = if item.is_success() {
                    self.settings.success_delay
                } else {
                    self.settings.failure_delay
                };
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            item
        }
        .instrument(span)
        .await
    }

    async fn transfer(
        &self,
        item: &mut ScrapedItem,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let fetched = self
            .client
            .fetch(&item.resolved_url, &item.item_id, cancel)
            .await?;

        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let folder = self.storage.item_folder(
            self.settings.run_date,
            &item.creator_name,
            &item.period_label,
        );
        let size = fetched.bytes.len() as u64;
        let storage = Arc::clone(&self.storage);
        let companion = self.companion.clone();

        let placement: Placement = tokio::task::spawn_blocking(move || {
            place(
                &storage,
                &folder,
                &fetched.file_name,
                &fetched.bytes,
                companion.as_ref(),
            )
        })
        .await
        .map_err(|e| DownloadError::Unknown(format!("Storage task failed: {}", e)))??;

        item.downloaded_file_path = placement.stored;
        item.extracted_files = placement.extracted;
        item.duplicate_of = placement.duplicate_of;
        item.companion_paths = placement.companions;
        item.extracted_amount = placement.amount;
        item.download_size_bytes = size;
        item.downloaded_at = Some(Utc::now());
        item.error_message = None;
        item.error_kind = None;

        Ok(())
    }

    /// Single critical section per completion: counters, registry insert and
    /// the registry file rewrite. Each URL is counted once per batch.
    fn complete(&self, item: &ScrapedItem) {
        let (completed, total, succeeded, amount_so_far) = {
            let mut state = self.state.lock();
            let BatchState {
                registry,
                counters,
                finished,
            } = &mut *state;
            if !finished.insert(item.resolved_url.clone()) {
                return;
            }

            counters.completed += 1;
            if item.cancelled {
                counters.cancelled += 1;
            } else if item.is_success() {
                counters.succeeded += 1;
                counters.total_amount += item.extracted_amount;
                if item.duplicate_of.is_some() {
                    counters.duplicates += 1;
                }
                if !item.item_id.is_empty() && registry.insert(&item.item_id, &item.period_label)
                {
                    counters.registered += 1;
                    if let Err(e) = registry.save() {
                        warn!("Registry not persisted: {}", e);
                    }
                }
            } else {
                counters.failed += 1;
                if let Some(kind) = item.error_kind {
                    *counters.failures_by_kind.entry(kind).or_insert(0) += 1;
                }
            }

            (
                counters.completed,
                counters.total,
                counters.succeeded,
                counters.total_amount,
            )
        };

        let progress = &self.progress;
        progress.report(RunEvent::Progress { completed, total });
        if item.is_success() {
            progress.report(RunEvent::Downloaded { count: succeeded });
            progress.report(RunEvent::TotalAmount {
                amount: amount_so_far,
            });
        } else if item.is_failed() {
            let message = item.error_message.as_deref().unwrap_or("download failed");
            progress.status("Download", message, Severity::Error);
        }
    }
}

/// Keeps the first item per resolved URL.
pub fn dedup_by_url(items: Vec<ScrapedItem>) -> (Vec<ScrapedItem>, usize) {
    let before = items.len();
    let mut seen = HashSet::new();
    let unique: Vec<ScrapedItem> = items
        .into_iter()
        .filter(|item| seen.insert(item.resolved_url.clone()))
        .collect();
    let dropped = before - unique.len();
    (unique, dropped)
}

/// Paths an item is expected to have produced on disk.
pub fn expected_files(item: &ScrapedItem, companion: Option<&Companion>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if let Some(dup) = &item.duplicate_of {
        files.push(dup.clone());
        return files;
    }
    files.extend(item.extracted_files.iter().cloned());
    if item.extracted_files.is_empty() {
        files.extend(item.downloaded_file_path.iter().cloned());
    }
    if let Some(companion) = companion {
        for sheet in item.spreadsheet_paths() {
            files.push(companion.output_for(&sheet));
        }
    }
    files
}
