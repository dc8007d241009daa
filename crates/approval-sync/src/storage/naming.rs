//! Deterministic folder and file names for the output tree.

use chrono::NaiveDate;

use crate::processor::archive::{is_spreadsheet_name, SPREADSHEET_EXTENSION};

/// Upper bound on a single sanitized path segment, in characters.
pub const MAX_SEGMENT_LEN: usize = 80;

/// Filesystem-invalid characters plus punctuation that trips up shells and
/// office tools.
const REPLACED: &[char] = &[
    '<', '>', ':', '"', '/', '\\', '|', '?', '*', ',', ';', '#', '%', '&', '{', '}', '$', '!',
    '\'', '@', '+', '=',
];

/// `ddMMyyyy`, the top-level folder of a run.
pub fn run_date_folder(date: NaiveDate) -> String {
    date.format("%d%m%Y").to_string()
}

/// Cleans one folder segment: replaced characters become `_`, runs of `_`
/// collapse, leading/trailing `_`, spaces and dots are trimmed, and the
/// result is cut to [`MAX_SEGMENT_LEN`]. Empty input yields `unknown`.
pub fn sanitize_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        let c = if c.is_control() || REPLACED.contains(&c) {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let truncated: String = out.chars().take(MAX_SEGMENT_LEN).collect();
    let trimmed = truncated.trim_matches(|c| c == '_' || c == ' ' || c == '.');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Cleans a file name while keeping its extension intact. Spreadsheet
/// extensions are normalized to `.xlsx`.
pub fn sanitize_file_name(raw: &str) -> String {
    let raw = raw.trim();
    let (stem, ext) = match raw.rfind('.') {
        Some(pos) if pos > 0 && pos < raw.len() - 1 => (&raw[..pos], Some(&raw[pos + 1..])),
        _ => (raw, None),
    };

    let stem = sanitize_segment(stem);
    let ext = if is_spreadsheet_name(raw) {
        Some(SPREADSHEET_EXTENSION.to_string())
    } else {
        ext.map(|e| {
            e.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|e| !e.is_empty())
    };

    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}
