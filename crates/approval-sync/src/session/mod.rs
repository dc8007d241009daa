//! Login state machine over a [`BrowserDriver`](crate::browser::BrowserDriver).

pub mod controller;
pub mod state;
pub mod verify;

use thiserror::Error;

use crate::auth::TotpError;
use crate::browser::DriverError;
use crate::secrets::SecretError;

pub use controller::{SessionController, SessionSettings};
pub use state::SessionState;
pub use verify::{verify_login, LoginSignal, LoginSnapshot, LoginVerdict, VerifyRules};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Browser driver failed during login: {0}")]
    Driver(#[from] DriverError),

    #[error("Login cancelled")]
    Cancelled,

    #[error("Credentials unavailable: {0}")]
    Secret(#[from] SecretError),

    #[error("No credentials configured for automated login")]
    MissingCredentials,

    #[error("One-time code generation failed: {0}")]
    Totp(#[from] TotpError),
}
