//! Writes a received body into the output tree. Blocking; the orchestrator
//! runs it on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::ProcessError;
use crate::processor::archive::is_spreadsheet_name;
use crate::processor::{classify, spreadsheet_entries, ArchiveEntry, PayloadKind, Workbook};
use crate::sanitize::redact_path;
use crate::storage::{sanitize_file_name, sanitize_segment, FileStorage, StoreOutcome};
use crate::templating::{companion_path, CompanionTemplater};

use super::error::DownloadError;

/// Companion generator plus the template it fills.
#[derive(Clone)]
pub struct Companion {
    pub templater: Arc<dyn CompanionTemplater>,
    pub template: PathBuf,
}

impl Companion {
    pub fn new(templater: Arc<dyn CompanionTemplater>, template: PathBuf) -> Self {
        Self {
            templater,
            template,
        }
    }

    pub fn output_for(&self, spreadsheet: &Path) -> PathBuf {
        companion_path(spreadsheet, &self.template)
    }
}

/// Where a body ended up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    pub stored: Option<PathBuf>,
    pub extracted: Vec<PathBuf>,
    pub duplicate_of: Option<PathBuf>,
    pub companions: Vec<PathBuf>,
    /// Archive entries that matched a spreadsheet already in place.
    pub reused: Vec<PathBuf>,
    /// Sum of the totals of newly stored spreadsheets.
    pub amount: f64,
}

/// Stores `bytes` under `folder`.
///
/// Spreadsheets are checked against existing totals in the folder first.
/// Archives are written as a temporary `.zip`, their spreadsheet entries are
/// extracted into one subfolder per entry identity, and the archive is
/// removed once every entry is stored.
pub fn place(
    storage: &FileStorage,
    folder: &Path,
    file_name: &str,
    bytes: &[u8],
    companion: Option<&Companion>,
) -> Result<Placement, DownloadError> {
    let mut placement = Placement::default();

    match classify(bytes, file_name) {
        PayloadKind::Spreadsheet => {
            let name = sanitize_file_name(file_name);
            match storage.store_spreadsheet(bytes, folder, &name)? {
                StoreOutcome::Stored(path) => {
                    placement.amount = total_of(bytes);
                    placement.stored = Some(path);
                }
                StoreOutcome::Duplicate(existing) => {
                    info!(
                        "Skipped duplicate of {} (same folder and total)",
                        redact_path(&existing)
                    );
                    placement.duplicate_of = Some(existing);
                }
            }
        }
        PayloadKind::Archive => {
            extract_archive(storage, folder, file_name, bytes, &mut placement)?;
        }
        PayloadKind::Other => {
            let path = storage.store(bytes, folder, &sanitize_file_name(file_name))?;
            placement.stored = Some(path);
        }
    }

    if let Some(companion) = companion {
        render_companions(companion, &mut placement);
    }

    Ok(placement)
}

fn extract_archive(
    storage: &FileStorage,
    folder: &Path,
    file_name: &str,
    bytes: &[u8],
    placement: &mut Placement,
) -> Result<(), DownloadError> {
    let entries = spreadsheet_entries(bytes).map_err(DownloadError::ArchiveExtraction)?;
    if entries.is_empty() {
        return Err(DownloadError::ArchiveExtraction(ProcessError::Archive(format!(
            "'{}' contains no spreadsheets",
            file_name
        ))));
    }

    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive");
    let archive_path = storage.store(bytes, folder, &format!("{}.zip", sanitize_segment(stem)))?;

    if let Err(e) = store_entries(storage, folder, &entries, placement) {
        if let Err(cleanup) = storage.remove(&archive_path) {
            warn!("Temporary archive left behind: {}", cleanup);
        }
        return Err(e);
    }

    storage.remove(&archive_path)?;
    placement.stored = placement.extracted.first().cloned();
    info!(
        "Extracted {} spreadsheets from {}",
        placement.extracted.len(),
        redact_path(&archive_path)
    );
    Ok(())
}

fn store_entries(
    storage: &FileStorage,
    folder: &Path,
    entries: &[ArchiveEntry],
    placement: &mut Placement,
) -> Result<(), DownloadError> {
    for entry in entries {
        let subfolder = folder.join(sanitize_segment(&entry.folder));
        let name = sanitize_file_name(&entry.file_name);
        match storage.store_spreadsheet(&entry.content, &subfolder, &name)? {
            StoreOutcome::Stored(path) => {
                placement.amount += total_of(&entry.content);
                placement.extracted.push(path);
            }
            StoreOutcome::Duplicate(existing) => {
                debug!("Archive entry duplicates {}", redact_path(&existing));
                placement.reused.push(existing.clone());
                placement.extracted.push(existing);
            }
        }
    }
    Ok(())
}

/// Renders a companion for every newly stored spreadsheet. Spreadsheets that
/// were already in place only get one when theirs is missing.
fn render_companions(companion: &Companion, placement: &mut Placement) {
    let mut spreadsheets: Vec<PathBuf> = if placement.extracted.is_empty() {
        placement
            .stored
            .iter()
            .filter(|p| p.to_str().map(is_spreadsheet_name).unwrap_or(false))
            .cloned()
            .collect()
    } else {
        placement.extracted.clone()
    };
    spreadsheets.extend(placement.duplicate_of.iter().cloned());

    for spreadsheet in spreadsheets {
        let output = companion.output_for(&spreadsheet);
        let reused = placement.duplicate_of.as_ref() == Some(&spreadsheet)
            || placement.reused.contains(&spreadsheet);
        if reused && output.is_file() {
            placement.companions.push(output);
            continue;
        }
        match companion
            .templater
            .render(&spreadsheet, &companion.template, &output)
        {
            Ok(()) => placement.companions.push(output),
            Err(e) => warn!(
                "Companion for {} failed: {}",
                redact_path(&spreadsheet),
                e
            ),
        }
    }
}

fn total_of(bytes: &[u8]) -> f64 {
    Workbook::from_bytes(bytes)
        .ok()
        .and_then(|w| w.total())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::spreadsheet::fixtures;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in files {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[derive(Default)]
    struct CountingTemplater {
        calls: Mutex<Vec<PathBuf>>,
    }

    impl CompanionTemplater for CountingTemplater {
        fn render(&self, spreadsheet: &Path, _t: &Path, output: &Path) -> Result<(), String> {
            self.calls.lock().unwrap().push(spreadsheet.to_path_buf());
            std::fs::write(output, b"companion").map_err(|e| e.to_string())
        }
    }

    #[test]
    fn test_place_spreadsheet() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let folder = dir.path().join("p");
        let bytes = fixtures::workbook(&[&["Total", "250"]]);

        let placement = place(&storage, &folder, "r.XLS", &bytes, None).unwrap();
        assert_eq!(placement.stored, Some(folder.join("r.xlsx")));
        assert_eq!(placement.amount, 250.0);
        assert!(placement.duplicate_of.is_none());
    }

    #[test]
    fn test_place_duplicate_spreadsheet_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let folder = dir.path().join("p");
        let bytes = fixtures::workbook(&[&["Total", "250"]]);

        place(&storage, &folder, "a.xlsx", &bytes, None).unwrap();
        let placement = place(&storage, &folder, "b.xlsx", &bytes, None).unwrap();
        assert_eq!(placement.duplicate_of, Some(folder.join("a.xlsx")));
        assert_eq!(placement.stored, None);
        assert_eq!(placement.amount, 0.0);
        assert!(!folder.join("b.xlsx").exists());
    }

    #[test]
    fn test_place_archive_extracts_each_entry() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let folder = dir.path().join("p");
        let a = fixtures::workbook(&[&["Total", "100"]]);
        let b = fixtures::workbook(&[&["Total", "200"]]);
        let bundle = zip_of(&[
            ("3f2504e0-4f89-11d3-9a0c-0305e82c3301.xlsx", a.as_slice()),
            ("9b2f1c3e-1a2b-4c5d-8e9f-00112233aabb.xls", b.as_slice()),
        ]);

        let placement = place(&storage, &folder, "bundle", &bundle, None).unwrap();

        assert_eq!(placement.extracted.len(), 2);
        assert!(folder
            .join("3f2504e0-4f89-11d3-9a0c-0305e82c3301/3f2504e0-4f89-11d3-9a0c-0305e82c3301.xlsx")
            .exists());
        assert!(folder
            .join("9b2f1c3e-1a2b-4c5d-8e9f-00112233aabb/9b2f1c3e-1a2b-4c5d-8e9f-00112233aabb.xlsx")
            .exists());
        assert!(!folder.join("bundle.zip").exists());
        assert_eq!(placement.amount, 300.0);
    }

    #[test]
    fn test_place_archive_without_spreadsheets_fails() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let folder = dir.path().join("p");
        let bundle = zip_of(&[("readme.txt", b"hi")]);

        let err = place(&storage, &folder, "bundle.zip", &bundle, None).unwrap_err();
        assert!(matches!(err, DownloadError::ArchiveExtraction(_)));
        assert!(!folder.join("bundle.zip").exists());

        // A retry of the same body leaves nothing behind either.
        place(&storage, &folder, "bundle.zip", &bundle, None).unwrap_err();
        assert!(!folder.exists() || std::fs::read_dir(&folder).unwrap().next().is_none());
    }

    #[test]
    fn test_place_other_file() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let folder = dir.path().join("p");

        let placement = place(&storage, &folder, "slip.pdf", b"%PDF-1.7", None).unwrap();
        assert_eq!(placement.stored, Some(folder.join("slip.pdf")));
    }

    #[test]
    fn test_companion_rendered_per_spreadsheet() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let folder = dir.path().join("p");
        let templater = Arc::new(CountingTemplater::default());
        let companion = Companion::new(templater.clone(), PathBuf::from("/t/form.docx"));

        let a = fixtures::workbook(&[&["Total", "1"]]);
        let b = fixtures::workbook(&[&["Total", "2"]]);
        let bundle = zip_of(&[("1001.xlsx", a.as_slice()), ("1002.xlsx", b.as_slice())]);
        let placement = place(&storage, &folder, "x.zip", &bundle, Some(&companion)).unwrap();

        assert_eq!(templater.calls.lock().unwrap().len(), 2);
        assert_eq!(placement.companions.len(), 2);
        assert!(folder.join("1001/1001.docx").exists());

        let pdf = place(&storage, &folder, "slip.pdf", b"%PDF", Some(&companion)).unwrap();
        assert!(pdf.companions.is_empty());
    }

    #[test]
    fn test_duplicate_gets_missing_companion_only() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let folder = dir.path().join("p");
        let templater = Arc::new(CountingTemplater::default());
        let companion = Companion::new(templater.clone(), PathBuf::from("/t/form.docx"));
        let bytes = fixtures::workbook(&[&["Total", "250"]]);

        place(&storage, &folder, "a.xlsx", &bytes, None).unwrap();
        let placement = place(&storage, &folder, "a.xlsx", &bytes, Some(&companion)).unwrap();
        assert_eq!(placement.duplicate_of, Some(folder.join("a.xlsx")));
        assert_eq!(placement.companions, vec![folder.join("a.docx")]);
        assert_eq!(templater.calls.lock().unwrap().len(), 1);

        let again = place(&storage, &folder, "a.xlsx", &bytes, Some(&companion)).unwrap();
        assert_eq!(again.companions, vec![folder.join("a.docx")]);
        assert_eq!(templater.calls.lock().unwrap().len(), 1);
    }
}
