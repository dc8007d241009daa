//! Resolution of the configured portal credentials into usable secrets.

use secrecy::SecretString;
use tracing::debug;

use crate::config::CredentialsConfig;
use crate::sanitize::hash_value;
use crate::secrets::{SecretError, SecretSource};

/// Credentials ready for the login form. Secrets stay wrapped until the
/// moment they are typed into the page.
pub struct PortalCredentials {
    pub username: String,
    pub company_code: String,
    pub password: SecretString,
    pub totp_secret: Option<SecretString>,
}

impl std::fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("username", &self.username)
            .field("company_code", &self.company_code)
            .field("password", &"****")
            .field("totp_secret", &self.totp_secret.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Resolves the password (required) and the TOTP seed (optional).
pub fn resolve_credentials(config: &CredentialsConfig) -> Result<PortalCredentials, SecretError> {
    let password = SecretSource::password(config).resolve()?;
    let totp_secret = SecretSource::totp_seed(config).resolve_optional()?;

    debug!(
        user = %hash_value(&config.username),
        has_totp = totp_secret.is_some(),
        "Resolved portal credentials"
    );

    Ok(PortalCredentials {
        username: config.username.clone(),
        company_code: config.company_code.clone(),
        password,
        totp_secret,
    })
}
