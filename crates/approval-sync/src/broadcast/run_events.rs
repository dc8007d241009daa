//! Run event broadcaster for streaming progress to any number of listeners.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// How prominently a status message should be shown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Advisory notifications emitted while a run progresses.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Progress {
        completed: usize,
        total: usize,
    },
    Status {
        label: String,
        message: String,
        severity: Severity,
    },
    Log {
        timestamp: DateTime<Utc>,
        level: String,
        message: String,
    },
    Found {
        count: usize,
    },
    Downloaded {
        count: usize,
    },
    TotalAmount {
        amount: f64,
    },
    /// A human has to finish logging in; listeners typically play a sound.
    ManualLoginRequested {
        wait_secs: u64,
    },
}

impl RunEvent {
    pub fn status(label: &str, message: &str, severity: Severity) -> Self {
        RunEvent::Status {
            label: label.to_string(),
            message: message.to_string(),
            severity,
        }
    }

    pub fn log(level: &str, message: &str) -> Self {
        RunEvent::Log {
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.to_string(),
        }
    }
}

/// Fans run events out over a tokio broadcast channel.
#[derive(Clone)]
pub struct RunEventBroadcaster {
    sender: Arc<broadcast::Sender<RunEvent>>,
}

impl RunEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: RunEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RunEventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}
