pub mod auth;
pub mod broadcast;
pub mod browser;
pub mod config;
pub mod discovery;
pub mod download;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod sanitize;
pub mod secrets;
pub mod session;
pub mod storage;
pub mod templating;

pub use auth::{resolve_credentials, PortalCredentials, TotpGenerator};
pub use broadcast::{RunEvent, RunEventBroadcaster, Severity};
pub use browser::{BrowserDriver, Cookie, DriverError, Element};
pub use config::{load_config, Config};
pub use discovery::{CreatorSelection, DiscoveryReport, ItemScanner, ItemStatus};
pub use download::{DownloadError, DownloadErrorKind, DownloadOrchestrator, ScrapedItem};
pub use error::{ConfigError, ProcessError, RegistryError, Result, StorageError, SyncError};
pub use logging::{init_logging, LogFormat};
pub use pipeline::{ProgressReporter, RunOptions, RunOutcome, RunSummary, SyncRunner};
pub use registry::DedupRegistry;
pub use secrets::{SecretError, SecretKind, SecretSource};
pub use session::{LoginVerdict, SessionController, SessionState};
pub use templating::CompanionTemplater;
