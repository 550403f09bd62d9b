//! REST error types.

use std::fmt;
use std::io;

/// Transport-level failure classes.
///
/// All but [`NetworkErrorKind::Other`] are transient: the same request may
/// succeed over another path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    TimedOut,
    CannotFindHost,
    CannotConnectToHost,
    ConnectionLost,
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TimedOut => "timed out",
            Self::CannotFindHost => "cannot find host",
            Self::CannotConnectToHost => "cannot connect to host",
            Self::ConnectionLost => "connection lost",
            Self::Other => "network failure",
        };
        f.write_str(s)
    }
}

/// Errors from the REST clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base path undefined")]
    BasePathUndefined,

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// Returns `true` for the fixed set of transient network failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { kind, .. } if *kind != NetworkErrorKind::Other)
    }

    /// HTTP status of an application-level error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match classify(&e) {
            Some(kind) => Self::Network {
                kind,
                message: e.to_string(),
            },
            None => Self::Http(e),
        }
    }
}

fn classify(e: &reqwest::Error) -> Option<NetworkErrorKind> {
    if e.is_timeout() {
        return Some(NetworkErrorKind::TimedOut);
    }
    let io_kind = io_error_kind(e);
    if e.is_connect() {
        if io_kind == Some(io::ErrorKind::ConnectionRefused) {
            return Some(NetworkErrorKind::CannotConnectToHost);
        }
        if looks_like_dns_failure(e) {
            return Some(NetworkErrorKind::CannotFindHost);
        }
        return Some(NetworkErrorKind::CannotConnectToHost);
    }
    match io_kind {
        Some(
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof,
        ) => Some(NetworkErrorKind::ConnectionLost),
        Some(io::ErrorKind::TimedOut) => Some(NetworkErrorKind::TimedOut),
        _ => None,
    }
}

/// Walks the source chain looking for an underlying I/O error.
fn io_error_kind(err: &(dyn std::error::Error + 'static)) -> Option<io::ErrorKind> {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            return Some(io.kind());
        }
        source = e.source();
    }
    None
}

fn looks_like_dns_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(e) = source {
        let text = e.to_string().to_lowercase();
        if text.contains("dns") || text.contains("lookup address") || text.contains("resolve") {
            return true;
        }
        source = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        for kind in [
            NetworkErrorKind::TimedOut,
            NetworkErrorKind::CannotFindHost,
            NetworkErrorKind::CannotConnectToHost,
            NetworkErrorKind::ConnectionLost,
        ] {
            let err = ApiError::Network {
                kind,
                message: "x".into(),
            };
            assert!(err.is_transient(), "{kind} should be transient");
        }
        let other = ApiError::Network {
            kind: NetworkErrorKind::Other,
            message: "x".into(),
        };
        assert!(!other.is_transient());
    }

    #[test]
    fn application_errors_are_not_transient() {
        let err = ApiError::Api {
            status: 404,
            body: "not found".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(404));
        assert!(!ApiError::BasePathUndefined.is_transient());
    }

    #[test]
    fn error_display() {
        let err = ApiError::Network {
            kind: NetworkErrorKind::ConnectionLost,
            message: "reset by peer".into(),
        };
        assert_eq!(
            err.to_string(),
            "network error (connection lost): reset by peer"
        );
        assert_eq!(
            ApiError::InvalidBaseUrl("::".into()).to_string(),
            "invalid base URL: ::"
        );
    }

    #[test]
    fn io_kind_found_in_source_chain() {
        #[derive(Debug)]
        struct Wrapper(io::Error);
        impl fmt::Display for Wrapper {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("wrapped")
            }
        }
        impl std::error::Error for Wrapper {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let err = Wrapper(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(io_error_kind(&err), Some(io::ErrorKind::ConnectionReset));
    }
}
