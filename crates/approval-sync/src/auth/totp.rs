//! RFC 6238 one-time codes (30 second step, HMAC-SHA1, six digits).

use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Length of one time step in seconds.
pub const TIME_STEP_SECS: i64 = 30;

/// Number of digits in a generated code.
pub const CODE_DIGITS: u32 = 6;

#[derive(Error, Debug)]
pub enum TotpError {
    #[error("TOTP secret is not valid base32: {0}")]
    InvalidSecret(String),

    #[error("TOTP secret is empty")]
    EmptySecret,

    #[error("Timestamp {0} is before the Unix epoch")]
    NegativeTime(i64),
}

/// Produces one-time codes for a shared base32 secret.
pub struct TotpGenerator {
    key: Vec<u8>,
}

impl TotpGenerator {
    /// Decodes a base32 shared secret as shown by authenticator enrolment
    /// screens. Spaces, dashes, lowercase letters and `=` padding are accepted.
    pub fn from_base32(secret: &SecretString) -> Result<Self, TotpError> {
        let normalized: String = secret
            .expose_secret()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.is_empty() {
            return Err(TotpError::EmptySecret);
        }

        let key = BASE32_NOPAD
            .decode(normalized.as_bytes())
            .map_err(|e| TotpError::InvalidSecret(e.to_string()))?;

        Ok(Self { key })
    }

    /// Code for the current wall-clock time.
    pub fn current_code(&self) -> Result<String, TotpError> {
        self.code_at(Utc::now())
    }

    /// Code for an arbitrary instant.
    pub fn code_at(&self, at: DateTime<Utc>) -> Result<String, TotpError> {
        let unix = at.timestamp();
        if unix < 0 {
            return Err(TotpError::NegativeTime(unix));
        }
        Ok(self.code_for_counter((unix / TIME_STEP_SECS) as u64))
    }

    /// Seconds until the current code rolls over.
    pub fn seconds_remaining(at: DateTime<Utc>) -> i64 {
        TIME_STEP_SECS - at.timestamp().rem_euclid(TIME_STEP_SECS)
    }

    fn code_for_counter(&self, counter: u64) -> String {
        // HMAC accepts keys of any length, so construction cannot fail here.
        let mut mac = match HmacSha1::new_from_slice(&self.key) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(&counter.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let binary = u32::from_be_bytes([
            digest[offset] & 0x7f,
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]);

        let code = binary % 10u32.pow(CODE_DIGITS);
        format!("{:0width$}", code, width = CODE_DIGITS as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // RFC 6238 appendix B seed "12345678901234567890" in base32.
    const RFC_SEED: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    fn generator() -> TotpGenerator {
        TotpGenerator::from_base32(&SecretString::from(RFC_SEED)).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_rfc6238_vectors_truncated_to_six_digits() {
        let totp = generator();
        assert_eq!(totp.code_at(at(59)).unwrap(), "287082");
        assert_eq!(totp.code_at(at(1_111_111_109)).unwrap(), "081804");
        assert_eq!(totp.code_at(at(1_111_111_111)).unwrap(), "050471");
        assert_eq!(totp.code_at(at(1_234_567_890)).unwrap(), "005924");
        assert_eq!(totp.code_at(at(2_000_000_000)).unwrap(), "279037");
    }

    #[test]
    fn test_same_step_yields_same_code() {
        let totp = generator();
        assert_eq!(
            totp.code_at(at(1_111_111_110)).unwrap(),
            totp.code_at(at(1_111_111_119)).unwrap()
        );
    }

    #[test]
    fn test_secret_normalization() {
        let spaced = TotpGenerator::from_base32(&SecretString::from(
            "gezd gnbv gy3t qojq gezd gnbv gy3t qojq",
        ))
        .unwrap();
        assert_eq!(spaced.code_at(at(59)).unwrap(), "287082");
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let result = TotpGenerator::from_base32(&SecretString::from("not base32 !!"));
        assert!(matches!(result, Err(TotpError::InvalidSecret(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = TotpGenerator::from_base32(&SecretString::from("  "));
        assert!(matches!(result, Err(TotpError::EmptySecret)));
    }

    #[test]
    fn test_current_code_is_six_digits() {
        let code = generator().current_code().unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_seconds_remaining() {
        assert_eq!(TotpGenerator::seconds_remaining(at(60)), 30);
        assert_eq!(TotpGenerator::seconds_remaining(at(89)), 1);
    }
}
