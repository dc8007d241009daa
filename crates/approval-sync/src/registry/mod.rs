//! Persisted record of completed downloads.
//!
//! The backing file is UTF-8 with one `id|label` pair per line. Lines
//! starting with `#` and blank lines are ignored. When an id appears more
//! than once the first occurrence wins. Bytes that are not valid UTF-8 are
//! replaced rather than rejected.

pub mod rebuild;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info, warn};

use crate::error::RegistryError;

pub use rebuild::rebuild_from_output;

pub const REGISTRY_HEADER: &str = "# approval-sync download registry";

#[derive(Debug, Clone, Default)]
pub struct DedupRegistry {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl DedupRegistry {
    /// Empty registry that will be saved to `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: BTreeMap::new(),
        }
    }

    /// Reads the registry file. A missing file yields an empty registry.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let mut registry = Self::new(path);

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(registry),
            Err(e) => {
                return Err(RegistryError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let content = String::from_utf8_lossy(&bytes);
        if matches!(content, Cow::Owned(_)) {
            warn!(
                "Registry {} is not valid UTF-8, damaged characters replaced",
                path.display()
            );
        }
        registry.merge_lines(&content);
        debug!("Loaded {} registry entries", registry.len());
        Ok(registry)
    }

    /// Loads the registry file, or reconstructs it from spreadsheets already
    /// present under `output_root` when the file does not exist.
    pub fn load_or_rebuild<P: AsRef<Path>>(
        path: P,
        output_root: &Path,
    ) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        Ok(Self::rebuild(path, output_root))
    }

    /// Seeds a registry for `path` from spreadsheets under `output_root` and
    /// saves it when anything was recovered. Save failures are logged.
    pub fn rebuild<P: AsRef<Path>>(path: P, output_root: &Path) -> Self {
        let mut registry = Self::new(path);
        let recovered = rebuild_from_output(output_root);
        if recovered.is_empty() {
            return registry;
        }

        for (id, label) in recovered {
            registry.insert(&id, &label);
        }
        info!(
            "Rebuilt download registry with {} entries from existing files",
            registry.len()
        );
        if let Err(e) = registry.save() {
            warn!("Could not persist rebuilt registry: {}", e);
        }
        registry
    }

    fn merge_lines(&mut self, content: &str) {
        for line in content.lines() {
            if let Some((id, label)) = parse_line(line) {
                self.entries
                    .entry(id.to_string())
                    .or_insert_with(|| label.to_string());
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    /// Records `id`. Returns `false` when it was already known; the existing
    /// label is kept in that case.
    pub fn insert(&mut self, id: &str, label: &str) -> bool {
        let id = id.trim();
        if id.is_empty() || self.entries.contains_key(id) {
            return false;
        }
        self.entries.insert(id.to_string(), sanitize_label(label));
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Rewrites the whole file: header block, then entries sorted by id.
    pub fn save(&self) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| RegistryError::Write {
                    path: self.path.clone(),
                    source: e,
                })?;
            }
        }

        std::fs::write(&self.path, self.render()).map_err(|e| RegistryError::Write {
            path: self.path.clone(),
            source: e,
        })
    }

    fn render(&self) -> String {
        let mut out = String::with_capacity(64 + self.entries.len() * 48);
        out.push_str(REGISTRY_HEADER);
        out.push('\n');
        out.push_str(&format!("# Updated: {}\n", Utc::now().to_rfc3339()));
        out.push_str(&format!("# Entries: {}\n", self.entries.len()));
        for (id, label) in &self.entries {
            out.push_str(id);
            out.push('|');
            out.push_str(label);
            out.push('\n');
        }
        out
    }
}

fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (id, label) = line.split_once('|').unwrap_or((line, ""));
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    Some((id, label.trim()))
}

// Labels end up on a single line of the file.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c == '\n' || c == '\r' || c == '|' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}
