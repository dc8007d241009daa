//! Credentials and the time-based second factor used to log into the portal.

pub mod credentials;
pub mod totp;

pub use credentials::{resolve_credentials, PortalCredentials};
pub use totp::{TotpError, TotpGenerator};
