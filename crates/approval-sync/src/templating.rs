//! Seam for the document generator that renders a companion file next to
//! each stored spreadsheet.

use std::path::{Path, PathBuf};

pub trait CompanionTemplater: Send + Sync {
    /// Renders `template` filled from `spreadsheet` into `output`.
    fn render(&self, spreadsheet: &Path, template: &Path, output: &Path) -> Result<(), String>;
}

/// Renders nothing. Used when no generator is wired in.
pub struct NoopTemplater;

impl CompanionTemplater for NoopTemplater {
    fn render(&self, _spreadsheet: &Path, _template: &Path, _output: &Path) -> Result<(), String> {
        Ok(())
    }
}

/// Where the companion of `spreadsheet` lives: same folder and stem, with the
/// template's extension (`docx` when it has none).
pub fn companion_path(spreadsheet: &Path, template: &Path) -> PathBuf {
    let ext = template
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("docx");
    spreadsheet.with_extension(ext)
}
