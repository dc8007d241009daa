use serde::{Deserialize, Serialize};

use crate::config::StatusKeywords;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Approved,
    Pending,
    Rejected,
    InProgress,
    Other,
}

impl ItemStatus {
    /// Parses a configured target status name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "approved" => Some(ItemStatus::Approved),
            "pending" => Some(ItemStatus::Pending),
            "rejected" => Some(ItemStatus::Rejected),
            "in_progress" => Some(ItemStatus::InProgress),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Approved => "approved",
            ItemStatus::Pending => "pending",
            ItemStatus::Rejected => "rejected",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Other => "other",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased keyword table in checking order.
pub struct StatusClassifier {
    table: Vec<(ItemStatus, Vec<String>)>,
}

impl StatusClassifier {
    pub fn new(keywords: &StatusKeywords) -> Self {
        let lower = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            table: vec![
                (ItemStatus::Approved, lower(&keywords.approved)),
                (ItemStatus::Pending, lower(&keywords.pending)),
                (ItemStatus::Rejected, lower(&keywords.rejected)),
                (ItemStatus::InProgress, lower(&keywords.in_progress)),
            ],
        }
    }

    /// Status of a row given its cell texts: the first cell containing any
    /// keyword decides, matched case-insensitively as a substring.
    pub fn classify<S: AsRef<str>>(&self, cells: &[S]) -> ItemStatus {
        for cell in cells {
            let text = cell.as_ref().to_lowercase();
            if text.is_empty() {
                continue;
            }
            for (status, words) in &self.table {
                if words.iter().any(|w| text.contains(w.as_str())) {
                    return *status;
                }
            }
        }
        ItemStatus::Other
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(&StatusKeywords::default())
    }
}
