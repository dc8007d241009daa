//! Detection and extraction of zip bundles delivered instead of a single file.

use std::io::{Cursor, Read};
use std::path::Path;

use regex::Regex;
use std::sync::LazyLock;

use crate::error::ProcessError;

/// Local file header signature shared by zip archives and OOXML documents.
pub const ZIP_MAGIC: &[u8; 2] = b"PK";

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls"];

/// Canonical extension every stored spreadsheet ends up with.
pub const SPREADSHEET_EXTENSION: &str = "xlsx";

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("valid uuid regex")
});

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4,}").expect("valid identity code regex"));

/// What a downloaded body turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A zip bundle of other files.
    Archive,
    /// A workbook (OOXML zip or legacy binary), judged by magic bytes or name.
    Spreadsheet,
    Other,
}

/// A spreadsheet pulled out of an archive, with the subfolder it belongs in.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub folder: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

pub fn has_zip_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

pub fn is_spreadsheet_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SPREADSHEET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Classifies a body. An `.xlsx` is itself a zip, so a `PK` body only counts
/// as an archive when it is not an OOXML package.
pub fn classify(bytes: &[u8], file_name: &str) -> PayloadKind {
    if has_zip_magic(bytes) {
        if is_ooxml_package(bytes) {
            return PayloadKind::Spreadsheet;
        }
        return PayloadKind::Archive;
    }
    if is_spreadsheet_name(file_name) {
        PayloadKind::Spreadsheet
    } else {
        PayloadKind::Other
    }
}

fn is_ooxml_package(bytes: &[u8]) -> bool {
    match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive
            .file_names()
            .any(|n| n == "[Content_Types].xml" || n.starts_with("xl/")),
        Err(_) => false,
    }
}

/// First UUID-shaped substring of `text`, lowercased.
pub fn find_uuid(text: &str) -> Option<String> {
    UUID_RE.find(text).map(|m| m.as_str().to_ascii_lowercase())
}

/// Identity an entry belongs to: a UUID in its name, else a numeric code of
/// four or more digits, else the file stem.
pub fn entry_identity(entry_name: &str) -> String {
    let file_name = entry_name.rsplit(['/', '\\']).next().unwrap_or(entry_name);
    if let Some(uuid) = find_uuid(file_name) {
        return uuid;
    }
    if let Some(m) = CODE_RE.find(file_name) {
        return m.as_str().to_string();
    }
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("entry")
        .to_string()
}

/// Reads every spreadsheet entry out of a zip body. Directories and other
/// file types are skipped.
pub fn spreadsheet_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, ProcessError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ProcessError::Archive(format!("Failed to open archive: {}", e)))?;

    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| ProcessError::Archive(format!("Failed to read entry {}: {}", index, e)))?;

        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        if !is_spreadsheet_name(&name) {
            continue;
        }

        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)
            .map_err(|e| ProcessError::Archive(format!("Failed to read '{}': {}", name, e)))?;

        let file_name = name.rsplit(['/', '\\']).next().unwrap_or(&name).to_string();
        entries.push(ArchiveEntry {
            folder: entry_identity(&name),
            file_name,
            content,
        });
    }

    Ok(entries)
}
