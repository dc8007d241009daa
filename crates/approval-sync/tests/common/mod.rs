//! Shared test utilities for approval-sync integration tests.
//!
//! This module provides:
//! - `FakePortal`, an in-memory `BrowserDriver` that plays the login and list pages
//! - `TestServer`, a local HTTP server that serves download bodies and tracks concurrency
//! - `TestHarness` for isolated output directories and orchestrator setup
//! - Builders for configs, table rows, workbooks and archives

pub mod builders;
pub mod harness;
pub mod portal;
pub mod server;

pub use builders::*;
pub use harness::TestHarness;
pub use portal::{FakePortal, PortalBehaviour};
pub use server::{Route, TestServer};
