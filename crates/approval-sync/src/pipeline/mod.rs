pub mod context;
pub mod progress;
pub mod runner;
pub mod summary;

pub use context::{RunContext, RunWarning};
pub use progress::{NoopProgress, ProgressReporter, RecordingProgress};
pub use runner::{RunOptions, RunOutcome, SyncRunner};
pub use summary::{write_run_record, RunRecord, RunSummary, SUMMARY_FILE_NAME};
