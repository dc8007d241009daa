use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

use crate::error::StorageError;
use crate::processor::archive::is_spreadsheet_name;
use crate::processor::Workbook;

use super::naming::{run_date_folder, sanitize_segment};

/// Two totals closer than this are the same amount.
const TOTAL_EPSILON: f64 = 0.005;

/// What happened when content was handed to [`FileStorage`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// Written to a new file.
    Stored(PathBuf),
    /// An equivalent spreadsheet already exists; nothing was written.
    Duplicate(PathBuf),
}

impl StoreOutcome {
    pub fn path(&self) -> &Path {
        match self {
            StoreOutcome::Stored(p) | StoreOutcome::Duplicate(p) => p,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreOutcome::Duplicate(_))
    }
}

pub struct FileStorage {
    output_root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(output_root: P) -> Self {
        Self {
            output_root: output_root.as_ref().to_path_buf(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `{root}/{ddMMyyyy}/{creator}/{period}` with each segment sanitized.
    pub fn item_folder(&self, run_date: NaiveDate, creator: &str, period: &str) -> PathBuf {
        self.output_root
            .join(run_date_folder(run_date))
            .join(sanitize_segment(creator))
            .join(sanitize_segment(period))
    }

    /// Writes `content` as `directory/filename`, appending `_2`, `_3`, ... when
    /// the name is taken.
    pub fn store(
        &self,
        content: &[u8],
        directory: &Path,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        self.ensure_directory(directory)?;
        self.store_with_atomic_creation(directory, filename, content)
    }

    /// Like [`store`](Self::store), but first compares the workbook's total
    /// with every spreadsheet already in `directory`. An equal total means
    /// the same document was fetched before under another link.
    pub fn store_spreadsheet(
        &self,
        content: &[u8],
        directory: &Path,
        filename: &str,
    ) -> Result<StoreOutcome, StorageError> {
        let total = Workbook::from_bytes(content).ok().and_then(|w| w.total());

        if let Some(total) = total {
            if let Some(existing) = self.find_equivalent(directory, total) {
                debug!(
                    "Spreadsheet with total {} already stored as {}",
                    total,
                    existing.display()
                );
                return Ok(StoreOutcome::Duplicate(existing));
            }
        }

        self.store(content, directory, filename)
            .map(StoreOutcome::Stored)
    }

    /// First spreadsheet in `directory` whose extracted total equals `total`.
    pub fn find_equivalent(&self, directory: &Path, total: f64) -> Option<PathBuf> {
        let entries = std::fs::read_dir(directory).ok()?;
        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| p.to_str().map(is_spreadsheet_name).unwrap_or(false))
            .collect();
        candidates.sort();

        candidates.into_iter().find(|path| {
            Workbook::from_path(path)
                .ok()
                .and_then(|w| w.total())
                .is_some_and(|existing| (existing - total).abs() < TOTAL_EPSILON)
        })
    }

    pub fn remove(&self, path: &Path) -> Result<(), StorageError> {
        std::fs::remove_file(path).map_err(|e| StorageError::RemoveFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Stores content using atomic file creation to avoid race conditions
    /// between workers writing into the same folder.
    fn store_with_atomic_creation(
        &self,
        dir_path: &Path,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        use std::io::Write;

        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            _ => (filename, None),
        };

        for counter in 1..=1000 {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let try_path = dir_path.join(&try_filename);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .map_err(|e| StorageError::WriteFile {
                            path: try_path.clone(),
                            source: e,
                        })?;
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(dir_path.join(filename)))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}
