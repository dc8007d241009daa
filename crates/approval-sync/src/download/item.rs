use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::discovery::ItemStatus;
use crate::processor::archive::is_spreadsheet_name;

use super::error::{DownloadError, DownloadErrorKind};

static UUID_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("valid uuid segment regex")
});

/// Query parameters that carry a document id on links without one in the path.
const ID_QUERY_KEYS: &[&str] = &["id", "fileid", "documentid"];

/// One row-derived document, before and after its download attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedItem {
    pub original_link: String,
    pub resolved_url: String,
    pub status: ItemStatus,
    pub item_id: String,
    pub creator_name: String,
    pub period_label: String,
    pub amount_text: String,

    pub downloaded_file_path: Option<PathBuf>,
    pub download_size_bytes: u64,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_kind: Option<DownloadErrorKind>,
    /// Spreadsheets pulled out of an archive download.
    pub extracted_files: Vec<PathBuf>,
    /// Companion documents rendered from the stored spreadsheets.
    pub companion_paths: Vec<PathBuf>,
    pub cancelled: bool,
    /// Existing file with the same folder and total.
    pub duplicate_of: Option<PathBuf>,
    /// Monetary total read from the spreadsheets this item stored.
    pub extracted_amount: f64,
}

impl ScrapedItem {
    pub fn new(original_link: &str, resolved: &Url, status: ItemStatus) -> Self {
        Self {
            original_link: original_link.to_string(),
            resolved_url: resolved.to_string(),
            status,
            item_id: extract_item_id(resolved),
            creator_name: String::new(),
            period_label: String::new(),
            amount_text: String::new(),
            downloaded_file_path: None,
            download_size_bytes: 0,
            downloaded_at: None,
            error_message: None,
            error_kind: None,
            extracted_files: Vec::new(),
            companion_paths: Vec::new(),
            cancelled: false,
            duplicate_of: None,
            extracted_amount: 0.0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_none()
            && (self.downloaded_file_path.is_some()
                || self.duplicate_of.is_some()
                || !self.extracted_files.is_empty())
    }

    pub fn is_failed(&self) -> bool {
        self.error_message.is_some() && !self.cancelled
    }

    /// Stored spreadsheets this item produced: the extracted files for an
    /// archive, otherwise the download itself when it is a spreadsheet.
    pub fn spreadsheet_paths(&self) -> Vec<PathBuf> {
        if !self.extracted_files.is_empty() {
            return self.extracted_files.clone();
        }
        self.downloaded_file_path
            .iter()
            .filter(|p| p.to_str().map(is_spreadsheet_name).unwrap_or(false))
            .cloned()
            .collect()
    }

    pub fn record_failure(&mut self, error: &DownloadError) {
        self.cancelled = matches!(error, DownloadError::Cancelled);
        self.error_kind = error.kind();
        self.error_message = Some(error.to_string());
    }

    /// Clears every field set by a download attempt.
    pub fn reset_result(&mut self) {
        self.downloaded_file_path = None;
        self.download_size_bytes = 0;
        self.downloaded_at = None;
        self.error_message = None;
        self.error_kind = None;
        self.extracted_files.clear();
        self.companion_paths.clear();
        self.cancelled = false;
        self.duplicate_of = None;
        self.extracted_amount = 0.0;
    }

    /// Takes back the placement of `previous` when a retry stored nothing new
    /// because the content `previous` had already stored was found in place.
    pub fn reclaim_from(&mut self, previous: &ScrapedItem) {
        if !self.is_success() {
            return;
        }
        if previous.downloaded_file_path.is_some()
            && self.duplicate_of == previous.downloaded_file_path
        {
            self.downloaded_file_path = self.duplicate_of.take();
            self.extracted_amount = previous.extracted_amount;
        } else if !previous.extracted_files.is_empty()
            && self.extracted_files == previous.extracted_files
            && self.extracted_amount == 0.0
        {
            self.extracted_amount = previous.extracted_amount;
        }
    }

    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            item_id: self.item_id.clone(),
            status: self.status,
            creator_name: self.creator_name.clone(),
            period_label: self.period_label.clone(),
            amount_text: self.amount_text.clone(),
            url: crate::sanitize::redact_url(&self.resolved_url),
            downloaded_file_path: self.downloaded_file_path.clone(),
            extracted_files: self.extracted_files.clone(),
            download_size_bytes: self.download_size_bytes,
            downloaded_at: self.downloaded_at,
            duplicate_of: self.duplicate_of.clone(),
            extracted_amount: self.extracted_amount,
            error_message: self.error_message.clone(),
            error_kind: self.error_kind,
            cancelled: self.cancelled,
        }
    }
}

/// Persisted projection of an item, written once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item_id: String,
    pub status: ItemStatus,
    pub creator_name: String,
    pub period_label: String,
    pub amount_text: String,
    pub url: String,
    pub downloaded_file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted_files: Vec<PathBuf>,
    pub download_size_bytes: u64,
    pub downloaded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<PathBuf>,
    #[serde(default)]
    pub extracted_amount: f64,
    pub error_message: Option<String>,
    pub error_kind: Option<DownloadErrorKind>,
    #[serde(default)]
    pub cancelled: bool,
}

/// Joins `href` against the page it was found on. `None` when either side
/// does not parse.
pub fn resolve_url(page_url: &str, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(url) => Some(url),
        Err(_) => Url::parse(page_url).ok()?.join(href).ok(),
    }
}

/// Item id carried by a download URL.
///
/// The first UUID-shaped path segment wins, lowercased. Links without one
/// fall back to an `id`-like query parameter, then to the last path segment
/// when it contains a digit. Empty when nothing fits.
pub fn extract_item_id(url: &Url) -> String {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if let Some(uuid) = segments.iter().find(|seg| UUID_SEGMENT_RE.is_match(seg)) {
        return uuid.to_ascii_lowercase();
    }

    for (key, value) in url.query_pairs() {
        if ID_QUERY_KEYS.contains(&key.to_ascii_lowercase().as_str()) && !value.is_empty() {
            return value.into_owned();
        }
    }

    if let Some(last) = segments.last() {
        let stem = Path::new(last)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(last);
        if stem.chars().any(|c| c.is_ascii_digit()) {
            return stem.to_string();
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_extract_uuid_segment() {
        let u = url("https://p.example.com/download/3F2504E0-4F89-11D3-9A0C-0305E82C3301/file");
        assert_eq!(extract_item_id(&u), "3f2504e0-4f89-11d3-9a0c-0305e82c3301");
    }

    #[test]
    fn test_extract_query_id() {
        let u = url("https://p.example.com/download?id=778&x=1");
        assert_eq!(extract_item_id(&u), "778");
    }

    #[test]
    fn test_extract_last_segment_with_digits() {
        let u = url("https://p.example.com/download/abc123");
        assert_eq!(extract_item_id(&u), "abc123");
        let u = url("https://p.example.com/files/report-42.xlsx");
        assert_eq!(extract_item_id(&u), "report-42");
    }

    #[test]
    fn test_extract_unparsable_is_empty() {
        let u = url("https://p.example.com/download/latest");
        assert_eq!(extract_item_id(&u), "");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let page = "https://p.example.com/approvals/list?page=2";
        assert_eq!(
            resolve_url(page, "/download/abc123").unwrap().as_str(),
            "https://p.example.com/download/abc123"
        );
        assert_eq!(
            resolve_url(page, "export/1").unwrap().as_str(),
            "https://p.example.com/approvals/export/1"
        );
        assert_eq!(
            resolve_url(page, "https://cdn.example.com/x/9").unwrap().as_str(),
            "https://cdn.example.com/x/9"
        );
    }

    #[test]
    fn test_resolve_bad_page_url() {
        assert!(resolve_url("not a url", "/download/1").is_none());
        assert!(resolve_url("https://p.example.com/", "  ").is_none());
    }

    #[test]
    fn test_success_and_reset() {
        let mut item = ScrapedItem::new(
            "/download/abc123",
            &url("https://p.example.com/download/abc123"),
            ItemStatus::Approved,
        );
        assert!(!item.is_success());

        item.downloaded_file_path = Some(PathBuf::from("/out/a.xlsx"));
        item.download_size_bytes = 10;
        assert!(item.is_success());
        assert_eq!(item.spreadsheet_paths(), vec![PathBuf::from("/out/a.xlsx")]);

        item.record_failure(&DownloadError::Timeout("slow".into()));
        assert!(item.is_failed());
        assert_eq!(item.error_kind, Some(DownloadErrorKind::Timeout));

        item.reset_result();
        assert_eq!(item.error_message, None);
        assert_eq!(item.downloaded_file_path, None);
    }

    #[test]
    fn test_cancelled_is_not_failed() {
        let mut item = ScrapedItem::new(
            "/download/abc123",
            &url("https://p.example.com/download/abc123"),
            ItemStatus::Approved,
        );
        item.record_failure(&DownloadError::Cancelled);
        assert!(item.cancelled);
        assert!(!item.is_failed());
        assert!(!item.is_success());
    }

    #[test]
    fn test_summary_redacts_url() {
        let item = ScrapedItem::new(
            "/download/abc123?sig=x",
            &url("https://p.example.com/download/abc123?sig=x"),
            ItemStatus::Approved,
        );
        let summary = item.summary();
        assert_eq!(summary.url, "https://p.example.com/download/abc123");
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "approved");
    }

    #[test]
    fn test_reclaim_own_file_after_retry() {
        let mut previous = ScrapedItem::new(
            "/download/abc123",
            &url("https://p.example.com/download/abc123"),
            ItemStatus::Approved,
        );
        previous.downloaded_file_path = Some(PathBuf::from("/out/a.xlsx"));
        previous.extracted_amount = 99.0;

        let mut retried = previous.clone();
        retried.reset_result();
        retried.duplicate_of = Some(PathBuf::from("/out/a.xlsx"));
        retried.reclaim_from(&previous);
        assert_eq!(retried.downloaded_file_path, Some(PathBuf::from("/out/a.xlsx")));
        assert_eq!(retried.duplicate_of, None);
        assert_eq!(retried.extracted_amount, 99.0);

        // Someone else's file stays a duplicate.
        let mut other = previous.clone();
        other.reset_result();
        other.duplicate_of = Some(PathBuf::from("/out/b.xlsx"));
        other.reclaim_from(&previous);
        assert_eq!(other.duplicate_of, Some(PathBuf::from("/out/b.xlsx")));
        assert_eq!(other.extracted_amount, 0.0);
    }
}
