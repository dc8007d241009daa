//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Traces are safe to share for debugging. These functions ensure no
//! session tokens or full local paths leak into spans.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips the query string, fragment and any userinfo from a URL.
///
/// - `https://user:pw@host/a/b?token=x` → `https://****@host/a/b`
/// - `https://host/file?sig=abc#frag` → `https://host/file`
pub fn redact_url(url: &str) -> String {
    let without_query = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url);

    if let Some(scheme_end) = without_query.find("://") {
        let after_scheme = &without_query[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].find('@') {
            let scheme = &without_query[..scheme_end + 3];
            let after_at = &after_scheme[at_pos + 1..];
            return format!("{}****@{}", scheme, after_at);
        }
    }

    without_query.to_string()
}

/// Returns a short deterministic hash of a string for correlation without
/// exposing the value itself.
pub fn hash_value(value: &str) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
