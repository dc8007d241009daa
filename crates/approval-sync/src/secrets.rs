//! Where the portal password and TOTP seed come from.
//!
//! Each secret may be configured inline, as a file, or as the name of an
//! environment variable. The first non-empty source wins, in that order.
//! Resolved values are trimmed and wrapped in [`SecretString`].

use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::config::CredentialsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Password,
    TotpSeed,
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretKind::Password => write!(f, "password"),
            SecretKind::TotpSeed => write!(f, "TOTP seed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No {kind} configured")]
    Missing { kind: SecretKind },

    #[error("Could not read {kind} from '{path}': {source}")]
    File {
        kind: SecretKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The {kind} file '{path}' is empty")]
    EmptyFile { kind: SecretKind, path: PathBuf },

    #[error("Environment variable '{name}' for the {kind} is not set")]
    EnvVarNotSet { kind: SecretKind, name: String },

    #[error("Environment variable '{name}' for the {kind} is not valid UTF-8")]
    EnvVarNotUnicode { kind: SecretKind, name: String },
}

/// The configured sources of one portal secret.
#[derive(Debug, Clone, Copy)]
pub struct SecretSource<'a> {
    pub kind: SecretKind,
    pub inline: Option<&'a str>,
    pub file: Option<&'a str>,
    pub env_var: Option<&'a str>,
}

impl<'a> SecretSource<'a> {
    pub fn password(config: &'a CredentialsConfig) -> Self {
        Self {
            kind: SecretKind::Password,
            inline: config.password_insecure.as_deref(),
            file: config.password_file.as_deref(),
            env_var: config.password_env_var.as_deref(),
        }
    }

    pub fn totp_seed(config: &'a CredentialsConfig) -> Self {
        Self {
            kind: SecretKind::TotpSeed,
            inline: config.totp_secret_insecure.as_deref(),
            file: config.totp_secret_file.as_deref(),
            env_var: config.totp_secret_env_var.as_deref(),
        }
    }

    /// Whether any source is set. Says nothing about whether it resolves.
    pub fn is_configured(&self) -> bool {
        non_empty(self.inline).is_some()
            || non_empty(self.file).is_some()
            || non_empty(self.env_var).is_some()
    }

    pub fn resolve(&self) -> Result<SecretString, SecretError> {
        self.resolve_optional()?
            .ok_or(SecretError::Missing { kind: self.kind })
    }

    /// Like [`resolve`](Self::resolve), but `None` when nothing is configured.
    /// A configured source that fails is still an error.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>, SecretError> {
        if let Some(value) = non_empty(self.inline) {
            return Ok(Some(SecretString::from(value)));
        }
        if let Some(path) = non_empty(self.file) {
            return self.read_file(&expand_home(path)).map(Some);
        }
        if let Some(name) = non_empty(self.env_var) {
            return self.read_env(name).map(Some);
        }
        Ok(None)
    }

    fn read_file(&self, path: &Path) -> Result<SecretString, SecretError> {
        let content = std::fs::read_to_string(path).map_err(|source| SecretError::File {
            kind: self.kind,
            path: path.to_path_buf(),
            source,
        })?;
        let value = content.trim();
        if value.is_empty() {
            return Err(SecretError::EmptyFile {
                kind: self.kind,
                path: path.to_path_buf(),
            });
        }
        Ok(SecretString::from(value))
    }

    fn read_env(&self, name: &str) -> Result<SecretString, SecretError> {
        match std::env::var(name) {
            Ok(value) if !value.trim().is_empty() => Ok(SecretString::from(value.trim())),
            Ok(_) | Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                kind: self.kind,
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                kind: self.kind,
                name: name.to_string(),
            }),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// Only `~` and `~/...`; `~user` is left alone.
fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => rest,
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
    }
}
