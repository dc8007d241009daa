use std::sync::Mutex;

use crate::broadcast::run_events::{RunEvent, RunEventBroadcaster, Severity};

/// Receives advisory run events. Orchestration never depends on what a
/// reporter does with them.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: RunEvent);

    fn status(&self, label: &str, message: &str, severity: Severity) {
        self.report(RunEvent::status(label, message, severity));
    }

    fn log(&self, level: &str, message: &str) {
        self.report(RunEvent::log(level, message));
    }
}

/// No-op reporter for callers that do not listen.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: RunEvent) {}
}

impl ProgressReporter for RunEventBroadcaster {
    fn report(&self, event: RunEvent) {
        self.send(event);
    }
}

/// Keeps every event in memory. Handy for tests and for post-run inspection.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: RunEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
