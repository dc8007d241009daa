use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ProcessError;

/// Row labels that mark the monetary total of a sheet.
const TOTAL_LABELS: &[&str] = &["total", "tổng cộng", "tong cong", "summe"];

/// One worksheet cell with its display text and numeric value, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub text: String,
    pub number: Option<f64>,
}

/// The parts of an `.xlsx` workbook this crate cares about: every sheet's
/// cell grid with shared strings already resolved.
#[derive(Debug, Default)]
pub struct Workbook {
    pub sheets: Vec<Vec<Vec<Cell>>>,
}

impl Workbook {
    pub fn from_path(path: &Path) -> Result<Self, ProcessError> {
        let file = std::fs::File::open(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_reader(file)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProcessError> {
        Self::from_reader(std::io::Cursor::new(bytes))
    }

    fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, ProcessError> {
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| ProcessError::Spreadsheet(format!("Failed to open workbook: {}", e)))?;

        let shared = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        let mut sheet_names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
            .map(str::to_string)
            .collect();
        sheet_names.sort_by_key(|n| sheet_number(n));

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for name in sheet_names {
            if let Some(xml) = read_entry(&mut archive, &name)? {
                sheets.push(parse_sheet(&xml, &shared)?);
            }
        }

        Ok(Self { sheets })
    }

    /// Every non-empty cell text across all sheets.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.sheets
            .iter()
            .flatten()
            .flatten()
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    /// The monetary total of the first sheet that has a total row.
    pub fn total(&self) -> Option<f64> {
        self.sheets.iter().find_map(|rows| extract_total(rows))
    }
}

fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ProcessError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(ProcessError::Spreadsheet(format!(
                "Failed to open '{}': {}",
                name, e
            )))
        }
    };

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ProcessError::Spreadsheet(format!("Failed to read '{}': {}", name, e)))?;
    Ok(Some(xml))
}

fn sheet_number(name: &str) -> u32 {
    name.trim_start_matches("xl/worksheets/sheet")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(u32::MAX)
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, ProcessError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    current.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProcessError::Spreadsheet(format!(
                    "sharedStrings parse error: {}",
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(strings)
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Vec<Vec<Cell>>, ProcessError> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut row: Vec<Cell> = Vec::new();
    let mut cell_type: Option<String> = None;
    let mut value = String::new();
    let mut in_cell = false;
    let mut capture = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell_type = attribute(e, b"t");
                    value.clear();
                    in_cell = true;
                }
                b"v" | b"t" if in_cell => capture = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"c" {
                    row.push(Cell::default());
                }
            }
            Ok(Event::Text(e)) => {
                if capture {
                    value.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    row.push(resolve_cell(cell_type.as_deref(), &value, shared));
                    in_cell = false;
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProcessError::Spreadsheet(format!(
                    "worksheet parse error: {}",
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(rows)
}

fn resolve_cell(cell_type: Option<&str>, raw: &str, shared: &[String]) -> Cell {
    match cell_type {
        Some("s") => {
            let text = raw
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i))
                .cloned()
                .unwrap_or_default();
            Cell { text, number: None }
        }
        Some("inlineStr") | Some("str") | Some("b") | Some("e") => Cell {
            text: raw.to_string(),
            number: None,
        },
        _ => Cell {
            text: raw.to_string(),
            number: raw.trim().parse::<f64>().ok(),
        },
    }
}

/// Finds the row labelled as the total and returns its last numeric value.
pub fn extract_total(rows: &[Vec<Cell>]) -> Option<f64> {
    rows.iter().find_map(|row| {
        let labelled = row.iter().any(|c| {
            let lower = c.text.to_lowercase();
            TOTAL_LABELS.iter().any(|label| lower.contains(label))
        });
        if !labelled {
            return None;
        }
        row.iter()
            .rev()
            .find_map(|c| c.number.or_else(|| parse_amount(&c.text)))
    })
}

/// Parses a human-formatted amount such as `1.234.500`, `1,234.50` or
/// `2 500,75 €`. Returns `None` when the text carries no digits.
pub fn parse_amount(text: &str) -> Option<f64> {
    let negative = text.trim_start().starts_with('-') || text.contains('(');
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) => single_separator_decimal(&cleaned, '.'),
        (None, Some(_)) => single_separator_decimal(&cleaned, ','),
        (None, None) => None,
    };

    let mut normalized = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        match c {
            '.' | ',' if Some(c) == decimal => normalized.push('.'),
            '.' | ',' => {}
            digit => normalized.push(digit),
        }
    }

    let value: f64 = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// A lone separator is a decimal point unless it is repeated or followed by
/// exactly three digits.
fn single_separator_decimal(cleaned: &str, sep: char) -> Option<char> {
    if cleaned.matches(sep).count() > 1 {
        return None;
    }
    let after = cleaned.rsplit(sep).next().unwrap_or("");
    if after.len() == 3 {
        None
    } else {
        Some(sep)
    }
}
