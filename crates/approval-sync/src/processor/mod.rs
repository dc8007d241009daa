//! Readers for the file formats the portal hands out.

pub mod archive;
pub mod spreadsheet;

pub use archive::{classify, spreadsheet_entries, ArchiveEntry, PayloadKind};
pub use spreadsheet::{extract_total, parse_amount, Cell, Workbook};
