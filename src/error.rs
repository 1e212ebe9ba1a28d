//! Error kinds shared by every pipeline stage.
//!
//! Adapters (IMAP, HTTP, SQLite) speak `anyhow`; the orchestrators turn those
//! errors into a [`ProcessingError`] tagged with an [`ErrorKind`] so callers can
//! decide between retry and terminal reporting without string matching.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Classification of a failure, in the order the scheduler cares about them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport-level failure: connect, timeout, socket closed
    Network,
    /// Remote service reachable but rejected or errored the request
    Api,
    /// Caller-supplied input invalid (blank message, duplicate name, no todo)
    Validation,
    /// Local store operation failed
    Database,
    /// No signed-in session or missing credentials
    Authentication,
    /// Malformed configuration
    Parsing,
    /// Catch-all for anything unexpected
    Unknown,
}

impl ErrorKind {
    /// Whether running the same operation again may succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Api | ErrorKind::Database | ErrorKind::Unknown
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Api => "api",
            ErrorKind::Validation => "validation",
            ErrorKind::Database => "database",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Parsing => "parsing",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by gateway adapters that carry their own classification.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not signed in: {0}")]
    NotAuthenticated(String),

    #[error("remote service rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid input: {0}")]
    Invalid(String),
}

/// Shared handle to the underlying error so outcomes can be cloned.
#[derive(Debug, Clone)]
pub struct Cause(Arc<anyhow::Error>);

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Cause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProcessingError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<Cause>,
}

impl ProcessingError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(kind: ErrorKind, message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: Some(Cause(Arc::new(cause))),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parsing, message)
    }

    /// Re-tag a failed call to a remote service as `Api`. Authentication and
    /// validation failures keep their kind since retrying cannot fix them.
    pub fn into_remote(mut self) -> Self {
        if !matches!(self.kind, ErrorKind::Authentication | ErrorKind::Validation) {
            self.kind = ErrorKind::Api;
        }
        self
    }

    /// Wrap an adapter error, prefixing `context` to the message.
    ///
    /// The kind is inferred from the error chain; `fallback` is used when no
    /// link in the chain is recognized.
    pub fn classify(context: &str, err: anyhow::Error, fallback: ErrorKind) -> Self {
        let kind = classify_kind(&err).unwrap_or(fallback);
        let message = format!("{}: {}", context, err);
        Self::with_cause(kind, message, err)
    }
}

fn classify_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    for cause in err.chain() {
        if let Some(gateway) = cause.downcast_ref::<GatewayError>() {
            return Some(match gateway {
                GatewayError::NotAuthenticated(_) => ErrorKind::Authentication,
                GatewayError::Rejected { .. } => ErrorKind::Api,
                GatewayError::Invalid(_) => ErrorKind::Validation,
            });
        }
        if let Some(http) = cause.downcast_ref::<reqwest::Error>() {
            return Some(if http.is_connect() || http.is_timeout() || http.is_request() {
                ErrorKind::Network
            } else {
                ErrorKind::Api
            });
        }
        if cause.downcast_ref::<sqlx::Error>().is_some() {
            return Some(ErrorKind::Database);
        }
        if let Some(imap) = cause.downcast_ref::<async_imap::error::Error>() {
            return Some(match imap {
                async_imap::error::Error::No(_) | async_imap::error::Error::Bad(_) => {
                    ErrorKind::Api
                }
                _ => ErrorKind::Network,
            });
        }
        if cause.downcast_ref::<toml::de::Error>().is_some() {
            return Some(ErrorKind::Parsing);
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return Some(ErrorKind::Network);
        }
    }
    None
}
