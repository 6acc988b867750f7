//! Crate-wide error type.
//!
//! Every component raises a member of the closed taxonomy described by
//! [`ErrorKind`]. The dispatcher is the only place that converts these into
//! protocol responses; everywhere else either handles an error locally
//! (per the policy documented on the relevant module) or re-raises it with
//! added context via [`RetrievalError::with_message`].

use std::fmt;
use std::time::Duration;

/// Boxed source error, used so [`RetrievalError`] doesn't need a type
/// parameter for every possible underlying cause (HTTP client, sqlite driver,
/// qdrant client, io, ...).
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias used throughout the crate.
pub type Result<T, E = RetrievalError> = std::result::Result<T, E>;

/// The closed error taxonomy from the external interface. Names are
/// contracts: the tool dispatcher serializes these to the `error.code`
/// field verbatim (see [`ErrorKind::as_code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad credentials, bad URL, dimension mismatch with an existing
    /// collection - anything that requires a human to fix configuration.
    Config,
    /// Connection refused, DNS failure, broken pipe.
    Connection,
    /// An outbound call exceeded its deadline.
    Timeout,
    /// Authentication or authorization failed outright (as opposed to a
    /// config error discovered before any call was made).
    Auth,
    /// The requested entity (collection, document, chunk) does not exist.
    NotFound,
    /// The caller supplied invalid input: empty query, `k <= 0`, unknown
    /// filter field, schema violation.
    InvalidInput,
    /// The upstream service rejected the request due to rate limiting.
    RateLimited,
    /// An unexpected internal failure with no clearer classification.
    Internal,
    /// A single-document or single-element ingestion failure.
    Ingestion,
}

impl ErrorKind {
    /// The wire-level error code string, as used by the tool dispatcher's
    /// error envelope (spec §6).
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Config => "config_error",
            Self::Connection => "connection_error",
            Self::Timeout => "timeout_error",
            Self::Auth => "auth_error",
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::RateLimited => "rate_limited",
            Self::Internal => "internal_error",
            Self::Ingestion => "ingestion_error",
        }
    }

    /// Whether a caller may usefully retry the operation that produced an
    /// error of this kind. Matches the closed table in spec §6: `true` for
    /// `connection_error`, `timeout_error`, `rate_limited`; `false`
    /// otherwise.
    pub fn recoverable(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout | Self::RateLimited)
    }

    /// Whether the embedder's retry policy should retry an error of this
    /// kind (§7: "retry on connection_error, timeout_error, rate_limited").
    pub fn is_retryable(self) -> bool {
        self.recoverable()
    }

    /// Suggested backoff before retrying, or `None` if this kind isn't
    /// retried at all.
    pub fn retry_delay(self) -> Option<Duration> {
        match self {
            Self::RateLimited => Some(Duration::from_secs(30)),
            Self::Connection => Some(Duration::from_secs(2)),
            Self::Timeout => Some(Duration::from_millis(500)),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Config => "configuration error",
            Self::Connection => "connection error",
            Self::Timeout => "operation timed out",
            Self::Auth => "authentication failed",
            Self::NotFound => "not found",
            Self::InvalidInput => "invalid input",
            Self::RateLimited => "rate limit exceeded",
            Self::Internal => "internal error",
            Self::Ingestion => "ingestion error",
        };
        f.write_str(text)
    }
}

/// The crate-wide error type. Carries a classified [`ErrorKind`], an
/// optional human-readable message, and an optional underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("{}", .message.as_deref().map(|m| format!("{}: {m}", .kind)).unwrap_or_else(|| .kind.to_string()))]
pub struct RetrievalError {
    pub kind: ErrorKind,
    pub message: Option<String>,
    #[source]
    pub source: Option<BoxedError>,
}

impl RetrievalError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxedError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn recoverable(&self) -> bool {
        self.kind.recoverable()
    }

    /// A short, action-oriented hint for the caller, never containing
    /// credentials, full URLs with query strings, or stack traces (§7).
    pub fn suggestion(&self) -> String {
        match self.kind {
            ErrorKind::Config => {
                "check the backend endpoint and credentials in configuration".to_string()
            }
            ErrorKind::Connection => "verify the backend is reachable and retry".to_string(),
            ErrorKind::Timeout => "retry with a longer deadline or smaller request".to_string(),
            ErrorKind::Auth => "verify API keys and permissions".to_string(),
            ErrorKind::NotFound => "verify the identifier and that it has been ingested".to_string(),
            ErrorKind::InvalidInput => "check the request against the tool's input schema".to_string(),
            ErrorKind::RateLimited => "slow down requests and retry after a delay".to_string(),
            ErrorKind::Internal => "retry; if it persists, check server logs".to_string(),
            ErrorKind::Ingestion => "check the source document for parser-unsupported content".to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config).with_message(message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection).with_message(message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout).with_message(message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth).with_message(message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound).with_message(message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput).with_message(message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited).with_message(message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(message)
    }

    pub fn ingestion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ingestion).with_message(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds_match_table() {
        assert!(ErrorKind::Connection.recoverable());
        assert!(ErrorKind::Timeout.recoverable());
        assert!(ErrorKind::RateLimited.recoverable());
        assert!(!ErrorKind::Config.recoverable());
        assert!(!ErrorKind::Auth.recoverable());
        assert!(!ErrorKind::NotFound.recoverable());
        assert!(!ErrorKind::InvalidInput.recoverable());
        assert!(!ErrorKind::Internal.recoverable());
        assert!(!ErrorKind::Ingestion.recoverable());
    }

    #[test]
    fn codes_match_taxonomy_names() {
        assert_eq!(ErrorKind::Config.as_code(), "config_error");
        assert_eq!(ErrorKind::Connection.as_code(), "connection_error");
        assert_eq!(ErrorKind::Timeout.as_code(), "timeout_error");
        assert_eq!(ErrorKind::Auth.as_code(), "auth_error");
        assert_eq!(ErrorKind::NotFound.as_code(), "not_found");
        assert_eq!(ErrorKind::InvalidInput.as_code(), "invalid_input");
        assert_eq!(ErrorKind::RateLimited.as_code(), "rate_limited");
        assert_eq!(ErrorKind::Internal.as_code(), "internal_error");
        assert_eq!(ErrorKind::Ingestion.as_code(), "ingestion_error");
    }

    #[test]
    fn suggestion_never_echoes_message() {
        let err = RetrievalError::auth("token rejected by upstream");
        assert!(!err.suggestion().contains("token"));
    }
}
