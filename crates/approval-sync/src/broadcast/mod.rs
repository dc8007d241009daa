//! Event broadcasting for run progress.

pub mod run_events;

pub use run_events::{RunEvent, RunEventBroadcaster, Severity};
