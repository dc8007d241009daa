use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::discovery::DiscoveryReport;
use crate::download::ScrapedItem;

/// Non-fatal problems collected during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunWarning {
    /// Login could not be confirmed; discovery went ahead anyway.
    AuthenticationIndeterminate,
    /// The registry file could not be read; known items were recovered from
    /// the output tree instead.
    RegistryUnreadable { error: String },
    SummaryNotWritten { error: String },
}

/// Per-run state, threaded through the stages in order.
pub struct RunContext {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,

    // Set after discovery
    pub discovery: Option<DiscoveryReport>,

    // Items selected for download; replaced by their results after each pass
    pub items: Vec<ScrapedItem>,

    // Items dropped by creator selection
    pub deselected: usize,

    pub retried: usize,

    pub warnings: Vec<RunWarning>,
}

impl RunContext {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            run_date,
            started_at: Utc::now(),
            discovery: None,
            items: Vec::new(),
            deselected: 0,
            retried: 0,
            warnings: Vec::new(),
        }
    }

    pub fn skipped_known(&self) -> usize {
        self.discovery.as_ref().map(|d| d.skipped_known).unwrap_or(0)
    }
}
