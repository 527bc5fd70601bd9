use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Longest slice of a response body quoted back in an error message
const MAX_BODY_IN_ERROR: usize = 512;

/// Classification of a failed network round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Dns,
    Tls,
    Connection,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransportErrorKind::Timeout => "Connection timeout - server did not respond in time",
            TransportErrorKind::Dns => "DNS resolution failed - unable to resolve hostname",
            TransportErrorKind::Tls => {
                "TLS/SSL error - certificate validation failed. Try using -k to skip certificate verification"
            }
            TransportErrorKind::Connection => "Connection error",
            TransportErrorKind::Other => "Transport error",
        };
        f.write_str(text)
    }
}

/// Errors raised while pulling an image
#[derive(Error, Debug)]
pub enum PullError {
    /// The image reference could not be split into registry and repository
    #[error("Invalid image reference '{reference}': {reason}")]
    ReferenceFormat { reference: String, reason: String },

    /// The registry answered in a shape this client does not understand
    #[error("Registry protocol error: {0}")]
    Protocol(String),

    /// Any status other than 200 (or a handled 401/redirect)
    #[error("HTTP error: {status} {} from {url}: {body}", http_status_description(.status))]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// A fresh token was obtained and the registry still answered 401
    #[error("Registry returned 401 Unauthorized for {url} after re-authentication")]
    Unauthorized { url: String },

    /// Token endpoint failure
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{kind} ({message})")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("Too many redirects (more than {limit}) while fetching {url}")]
    TooManyRedirects { url: String, limit: usize },

    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Downloaded content does not hash to its declared digest
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Invalid JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PullError>;

/// Human-readable description for an HTTP status code
fn http_status_description(code: &u16) -> &'static str {
    match code {
        400 => "Bad Request",
        401 => "Unauthorized - authentication required",
        403 => "Forbidden - access denied",
        404 => "Not Found - the requested manifest or blob does not exist",
        405 => "Method Not Allowed",
        429 => "Too Many Requests - rate limited",
        500 => "Internal Server Error - server error",
        502 => "Bad Gateway - proxy/gateway error",
        503 => "Service Unavailable - server temporarily unavailable",
        504 => "Gateway Timeout",
        _ => "Unexpected status",
    }
}

impl PullError {
    /// Build a `Status` error, quoting at most `MAX_BODY_IN_ERROR` bytes of the body
    pub fn status(url: &str, status: u16, body: &[u8]) -> Self {
        let truncated = body.len() > MAX_BODY_IN_ERROR;
        let mut text = String::from_utf8_lossy(&body[..body.len().min(MAX_BODY_IN_ERROR)]).into_owned();
        if truncated {
            text.push_str("...");
        }
        PullError::Status {
            url: url.to_string(),
            status,
            body: text,
        }
    }

    pub fn fs(path: &Path, source: std::io::Error) -> Self {
        PullError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        PullError::Json {
            context: context.into(),
            source,
        }
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let message = error.to_string();

        if error.is_timeout() {
            return PullError::Transport {
                kind: TransportErrorKind::Timeout,
                message,
            };
        }

        if error.is_connect() {
            // Walk the source chain; TLS failures are often wrapped in a
            // generic connect error and only named by an inner source.
            let mut current: Option<&dyn std::error::Error> = Some(&error);
            while let Some(err) = current {
                let text = err.to_string().to_lowercase();
                if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
                    return PullError::Transport {
                        kind: TransportErrorKind::Tls,
                        message,
                    };
                }
                if text.contains("dns") || text.contains("failed to lookup address") {
                    return PullError::Transport {
                        kind: TransportErrorKind::Dns,
                        message,
                    };
                }
                current = err.source();
            }
            return PullError::Transport {
                kind: TransportErrorKind::Connection,
                message,
            };
        }

        PullError::Transport {
            kind: TransportErrorKind::Other,
            message,
        }
    }
}
