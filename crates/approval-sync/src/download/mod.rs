//! Bounded-concurrency download of discovered items into the output tree.

pub mod error;
pub mod http;
pub mod item;
pub mod orchestrator;
pub mod placement;
pub mod retry;

pub use error::{DownloadError, DownloadErrorKind};
pub use http::{AuthenticatedClient, FetchedFile};
pub use item::{extract_item_id, resolve_url, ItemSummary, ScrapedItem};
pub use orchestrator::{BatchCounters, BatchOutcome, DownloadOrchestrator, OrchestratorSettings};
pub use placement::{Companion, Placement};
pub use retry::{needs_retry, retry_pass, RetryOutcome};
