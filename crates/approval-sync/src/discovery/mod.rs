//! Finds the rows worth downloading on the authenticated list page.

pub mod scanner;
pub mod status;

use thiserror::Error;

use crate::browser::DriverError;

pub use scanner::{CreatorSelection, DiscoveryReport, ItemScanner, RowParseError};
pub use status::{ItemStatus, StatusClassifier};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Browser driver failed during discovery: {0}")]
    Driver(#[from] DriverError),

    #[error("Discovery cancelled")]
    Cancelled,
}
