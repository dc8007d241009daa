use std::collections::{BTreeMap, BTreeSet};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::browser::{BrowserDriver, Element};
use crate::config::Config;
use crate::download::item::{resolve_url, ScrapedItem};
use crate::registry::DedupRegistry;

use super::status::{ItemStatus, StatusClassifier};
use super::DiscoveryError;

/// 0-based cell positions of the row metadata.
const CREATOR_CELL: usize = 6;
const PERIOD_CELL: usize = 2;
const AMOUNT_CELL: usize = 4;

/// A matching row that could not be turned into an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowParseError {
    pub row_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    /// Items to download, in page order.
    pub items: Vec<ScrapedItem>,
    /// Rows carrying the target status, known ones included.
    pub matched: usize,
    /// Matching rows dropped because the registry already has their id.
    pub skipped_known: usize,
    pub parse_errors: Vec<RowParseError>,
    pub status_counts: BTreeMap<ItemStatus, usize>,
}

impl DiscoveryReport {
    pub fn count(&self, status: ItemStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }

    /// Distinct creator names among the discovered items, for selection.
    pub fn creators(&self) -> BTreeSet<String> {
        self.items.iter().map(|i| i.creator_name.clone()).collect()
    }
}

/// Narrows discovered items to a subset of creators before download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CreatorSelection {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl CreatorSelection {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CreatorSelection::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn includes(&self, creator: &str) -> bool {
        match self {
            CreatorSelection::All => true,
            CreatorSelection::Only(names) => names.contains(creator),
        }
    }

    pub fn apply(&self, items: Vec<ScrapedItem>) -> Vec<ScrapedItem> {
        match self {
            CreatorSelection::All => items,
            CreatorSelection::Only(_) => items
                .into_iter()
                .filter(|i| self.includes(&i.creator_name))
                .collect(),
        }
    }
}

/// Turns table rows into download candidates.
pub struct ItemScanner {
    row_selector: String,
    target: ItemStatus,
    link_marker: String,
    classifier: StatusClassifier,
}

impl ItemScanner {
    pub fn new(
        row_selector: &str,
        target: ItemStatus,
        link_marker: &str,
        classifier: StatusClassifier,
    ) -> Self {
        Self {
            row_selector: row_selector.to_string(),
            target,
            link_marker: link_marker.to_ascii_lowercase(),
            classifier,
        }
    }

    /// Unknown target names fall back to `approved`; the config loader
    /// rejects them earlier.
    pub fn from_config(config: &Config) -> Self {
        let target =
            ItemStatus::from_name(&config.download.target_status).unwrap_or(ItemStatus::Approved);
        Self::new(
            &config.selectors.rows,
            target,
            &config.site.download_link_marker,
            StatusClassifier::new(&config.status),
        )
    }

    pub fn target(&self) -> ItemStatus {
        self.target
    }

    /// Reads the rows from the current page and scans them.
    pub async fn discover(
        &self,
        driver: &dyn BrowserDriver,
        registry: &DedupRegistry,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let span = info_span!("discovery", target = %self.target);
        async {
            if cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }

            let page_url = driver.current_url().await?;
            let rows = driver.query_selector_all(&self.row_selector).await?;

            if cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }

            let report = self.scan_rows(&rows, &page_url, registry);
            info!(
                rows = rows.len(),
                matched = report.matched,
                skipped_known = report.skipped_known,
                parse_errors = report.parse_errors.len(),
                "Discovery finished with {} new items",
                report.items.len()
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Classifies row snapshots. Pure: the same rows and registry always give
    /// the same report.
    pub fn scan_rows(
        &self,
        rows: &[Element],
        page_url: &str,
        registry: &DedupRegistry,
    ) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for (row_index, row) in rows.iter().enumerate() {
            let cells: Vec<String> = row
                .descendants_by_tag("td")
                .iter()
                .map(|c| c.inner_text())
                .collect();
            if cells.is_empty() {
                continue;
            }

            let status = self.classifier.classify(&cells);
            *report.status_counts.entry(status).or_insert(0) += 1;
            if status != self.target {
                continue;
            }
            report.matched += 1;

            let Some(href) = self.download_link(row) else {
                warn!(row_index, "Matching row has no download link");
                report.parse_errors.push(RowParseError {
                    row_index,
                    reason: "no download link".to_string(),
                });
                continue;
            };

            let Some(resolved) = resolve_url(page_url, href) else {
                warn!(row_index, "Matching row has an unresolvable link");
                report.parse_errors.push(RowParseError {
                    row_index,
                    reason: format!("unresolvable link '{}'", href),
                });
                continue;
            };

            let mut item = ScrapedItem::new(href, &resolved, status);
            item.creator_name = cell(&cells, CREATOR_CELL);
            item.period_label = cell(&cells, PERIOD_CELL);
            item.amount_text = cell(&cells, AMOUNT_CELL);

            if !item.item_id.is_empty() && registry.contains(&item.item_id) {
                debug!(item_id = %item.item_id, "Skipping previously downloaded item");
                report.skipped_known += 1;
                continue;
            }

            report.items.push(item);
        }

        report
    }

    /// The first `a[href]` in the row that looks like a download link.
    fn download_link<'a>(&self, row: &'a Element) -> Option<&'a str> {
        row.descendants_by_tag("a")
            .into_iter()
            .filter_map(|a| a.attr("href"))
            .find(|href| href.to_ascii_lowercase().contains(&self.link_marker))
    }
}

fn cell(cells: &[String], index: usize) -> String {
    cells.get(index).cloned().unwrap_or_default()
}
