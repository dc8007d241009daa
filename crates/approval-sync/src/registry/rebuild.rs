use std::path::Path;

use log::{debug, warn};
use walkdir::WalkDir;

use crate::processor::archive::{find_uuid, is_spreadsheet_name};
use crate::processor::Workbook;

/// Scans every spreadsheet below `output_root` for an embedded item id.
///
/// Each hit yields `(id, parent folder name)`. Files that cannot be opened
/// are skipped. Results are in walk order; callers keep the first id seen.
pub fn rebuild_from_output(output_root: &Path) -> Vec<(String, String)> {
    if !output_root.is_dir() {
        return Vec::new();
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(output_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if !path.to_str().map(is_spreadsheet_name).unwrap_or(false) {
            continue;
        }

        let workbook = match Workbook::from_path(path) {
            Ok(workbook) => workbook,
            Err(e) => {
                warn!("Skipping unreadable spreadsheet during rebuild: {}", e);
                continue;
            }
        };

        let Some(id) = workbook.texts().find_map(find_uuid) else {
            continue;
        };

        let label = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        debug!("Recovered id {} from {}", id, crate::sanitize::redact_path(path));
        found.push((id, label));
    }

    found
}
