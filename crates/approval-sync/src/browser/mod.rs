//! The browser capability the engine scripts. Implementations live outside
//! this crate (a CDP client, a WebDriver session, a test fake).

pub mod element;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use element::Element;

/// A cookie as exposed by the browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Renders cookies as a single `Cookie` request header value.
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Navigation to '{url}' failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("No element matches selector '{0}'")]
    NoSuchElement(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Browser session closed")]
    Closed,

    #[error("Browser driver error: {0}")]
    Other(String),
}

/// Scriptable browser session. Element queries return owned snapshots so the
/// engine can classify rows without holding live handles.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn query_selector(&self, css: &str) -> Result<Option<Element>, DriverError>;

    async fn query_selector_all(&self, css: &str) -> Result<Vec<Element>, DriverError>;

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    async fn evaluate_script(&self, script: &str) -> Result<serde_json::Value, DriverError>;

    async fn cookies(&self) -> Result<Vec<Cookie>, DriverError>;

    /// Resolves to `Ok(None)` when the timeout elapses without a match.
    async fn wait_for_selector(
        &self,
        css: &str,
        timeout: Duration,
    ) -> Result<Option<Element>, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// Serialized page content (HTML).
    async fn content(&self) -> Result<String, DriverError>;
}
