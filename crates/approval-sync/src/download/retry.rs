use std::collections::HashMap;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use super::item::ScrapedItem;
use super::orchestrator::{expected_files, BatchCounters, DownloadOrchestrator};
use super::placement::Companion;

/// Result of the single retry pass.
#[derive(Debug, Clone, Default)]
pub struct RetryOutcome {
    /// The full item list with retried items replaced.
    pub items: Vec<ScrapedItem>,
    /// How many items were resubmitted.
    pub retried: usize,
    pub counters: Option<BatchCounters>,
}

/// Whether an item should go through the retry pass: it failed, or it claims
/// success but its files are not all present and non-empty on disk.
/// Cancelled items are never retried.
pub fn needs_retry(item: &ScrapedItem, companion: Option<&Companion>) -> bool {
    if item.cancelled {
        return false;
    }
    if item.error_message.is_some() {
        return true;
    }
    let files = expected_files(item, companion);
    files.is_empty() || files.iter().any(|p| !is_nonempty_file(p))
}

fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Resubmits failed or unverifiable items once through `orchestrator` with
/// `limit` workers. Results replace the originals by URL.
pub async fn retry_pass(
    orchestrator: &DownloadOrchestrator,
    items: Vec<ScrapedItem>,
    limit: usize,
    cancel: &CancellationToken,
) -> RetryOutcome {
    let companion = orchestrator.companion();
    let retry: Vec<ScrapedItem> = items
        .iter()
        .filter(|item| needs_retry(item, companion))
        .cloned()
        .map(|mut item| {
            item.reset_result();
            item
        })
        .collect();

    if retry.is_empty() || cancel.is_cancelled() {
        return RetryOutcome {
            items,
            retried: 0,
            counters: None,
        };
    }

    let retried = retry.len();
    let span = info_span!("retry_pass", retried, limit);
    let outcome = async {
        info!("Retrying {} items", retried);
        orchestrator.run(retry, limit, cancel).await
    }
    .instrument(span)
    .await;

    let mut replacements: HashMap<String, ScrapedItem> = outcome
        .items
        .into_iter()
        .map(|item| (item.resolved_url.clone(), item))
        .collect();

    let items = items
        .into_iter()
        .map(|item| match replacements.remove(&item.resolved_url) {
            Some(mut retried) => {
                retried.reclaim_from(&item);
                retried
            }
            None => item,
        })
        .collect();

    RetryOutcome {
        items,
        retried,
        counters: Some(outcome.counters),
    }
}
