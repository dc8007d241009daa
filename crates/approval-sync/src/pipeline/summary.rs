//! End-of-run summary and its JSON file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::download::{ItemSummary, ScrapedItem};
use crate::error::StorageError;
use crate::storage::run_date_folder;

use super::context::RunContext;

pub const SUMMARY_FILE_NAME: &str = "run-summary.json";

/// Totals shown to the user at the end of a run. Computed from the final
/// item list, so retried items count once with their last result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items selected for download.
    pub found: usize,
    /// Items with a stored file, duplicates included.
    pub downloaded: usize,
    /// Rows skipped because the registry already had their id.
    pub skipped_known: usize,
    /// Downloads that matched an existing file by folder and total.
    pub duplicates: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_amount: f64,
    pub retried: usize,
}

impl RunSummary {
    pub fn from_items(items: &[ScrapedItem], skipped_known: usize, retried: usize) -> Self {
        let mut summary = RunSummary {
            found: items.len(),
            skipped_known,
            retried,
            ..RunSummary::default()
        };
        for item in items {
            if item.cancelled {
                summary.cancelled += 1;
            } else if item.is_success() {
                summary.downloaded += 1;
                summary.total_amount += item.extracted_amount;
                if item.duplicate_of.is_some() {
                    summary.duplicates += 1;
                }
            } else {
                summary.failed += 1;
            }
        }
        summary
    }

    pub fn from_context(ctx: &RunContext) -> Self {
        Self::from_items(&ctx.items, ctx.skipped_known(), ctx.retried)
    }
}

/// Contents of `run-summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub items: Vec<ItemSummary>,
}

impl RunRecord {
    pub fn from_context(ctx: &RunContext, summary: &RunSummary) -> Self {
        Self {
            run_id: ctx.run_id,
            started_at: ctx.started_at,
            finished_at: Utc::now(),
            summary: summary.clone(),
            items: ctx.items.iter().map(ScrapedItem::summary).collect(),
        }
    }
}

/// Writes the record to `{output_root}/{ddMMyyyy}/run-summary.json`,
/// replacing any earlier record of the same day.
pub fn write_run_record(
    output_root: &Path,
    ctx: &RunContext,
    record: &RunRecord,
) -> Result<PathBuf, StorageError> {
    let dir = output_root.join(run_date_folder(ctx.run_date));
    std::fs::create_dir_all(&dir).map_err(|e| StorageError::CreateDirectory {
        path: dir.clone(),
        source: e,
    })?;

    let path = dir.join(SUMMARY_FILE_NAME);
    let json = serde_json::to_vec_pretty(record).map_err(|e| StorageError::WriteFile {
        path: path.clone(),
        source: std::io::Error::other(e),
    })?;
    std::fs::write(&path, json).map_err(|e| StorageError::WriteFile {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}
