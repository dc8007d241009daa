use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE};
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::browser::{cookie_header, Cookie};
use crate::storage::sanitize_file_name;

use super::error::DownloadError;

/// Cancellation is observed at least this often while reading a body.
pub const CANCEL_CHECK_BYTES: usize = 256 * 1024;

/// Upper bound on the up-front buffer reservation from `Content-Length`.
const MAX_PREALLOCATE: u64 = 16 * 1024 * 1024;

/// A fully received response body and the name it should be stored under.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// HTTP client that carries the browser session's cookies.
#[derive(Clone)]
pub struct AuthenticatedClient {
    client: reqwest::Client,
}

impl AuthenticatedClient {
    pub fn new(
        cookies: &[Cookie],
        user_agent: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, DownloadError> {
        let mut headers = HeaderMap::new();
        if !cookies.is_empty() {
            let value = HeaderValue::from_str(&cookie_header(cookies))
                .map_err(|e| DownloadError::Unknown(format!("Invalid session cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| DownloadError::Unknown(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Streams `url` into memory. Nothing touches disk here, so a cancelled
    /// or failed transfer leaves no partial file behind.
    pub async fn fetch(
        &self,
        url: &str,
        fallback_stem: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedFile, DownloadError> {
        let parsed = Url::parse(url)
            .map_err(|e| DownloadError::Unknown(format!("Invalid download URL: {}", e)))?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = self.client.get(parsed.clone()).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::from_status(status));
        }

        let disposition = header_str(response.headers(), CONTENT_DISPOSITION);
        let content_type = header_str(response.headers(), CONTENT_TYPE);
        let file_name = derive_file_name(
            disposition.as_deref(),
            &parsed,
            content_type.as_deref(),
            fallback_stem,
        );

        let capacity = response.content_length().unwrap_or(0).min(MAX_PREALLOCATE) as usize;
        let mut bytes = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            for piece in chunk.chunks(CANCEL_CHECK_BYTES) {
                if cancel.is_cancelled() {
                    return Err(DownloadError::Cancelled);
                }
                bytes.extend_from_slice(piece);
            }
        }

        debug!("Received {} bytes as '{}'", bytes.len(), file_name);
        Ok(FetchedFile {
            file_name,
            content_type,
            bytes,
        })
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Picks the stored file name: the attachment name from `Content-Disposition`,
/// else the last URL path segment, else `{fallback_stem}.bin`. A name without
/// an extension gets one guessed from the content type.
pub fn derive_file_name(
    content_disposition: Option<&str>,
    url: &Url,
    content_type: Option<&str>,
    fallback_stem: &str,
) -> String {
    let candidate = content_disposition
        .and_then(disposition_file_name)
        .or_else(|| last_segment(url))
        .filter(|n| !n.trim().is_empty());

    let name = match candidate {
        Some(name) => name,
        None => {
            let stem = if fallback_stem.is_empty() {
                "download"
            } else {
                fallback_stem
            };
            return sanitize_file_name(&format!("{}.{}", stem, guess_extension(content_type)));
        }
    };

    let has_extension = Path::new(&name)
        .extension()
        .map(|e| !e.is_empty())
        .unwrap_or(false);
    if has_extension {
        sanitize_file_name(&name)
    } else {
        sanitize_file_name(&format!("{}.{}", name, guess_extension(content_type)))
    }
}

fn guess_extension(content_type: Option<&str>) -> &'static str {
    content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
        .and_then(mime_guess::get_mime_extensions_str)
        .and_then(|exts| exts.first().copied())
        .unwrap_or("bin")
}

/// `filename*=` (RFC 5987) is preferred over `filename=`.
pub fn disposition_file_name(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let value = value.trim().trim_matches('"');
                let encoded = match value.split_once("''") {
                    Some((_charset, rest)) => rest,
                    None => value,
                };
                if let Some(decoded) = percent_decode(encoded) {
                    return Some(decoded);
                }
            }
            "filename" => {
                plain = Some(value.trim().trim_matches('"').to_string());
            }
            _ => {}
        }
    }
    plain
}

fn last_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .and_then(percent_decode)
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
