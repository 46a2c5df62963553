//! Error types for request dispatch.
//!
//! # Design
//! A `UsageError` means the call was malformed before any exchange was
//! attempted. It is always returned to the caller and never handed to an
//! error continuation. A `TransportError` means the exchange was attempted
//! and failed; the facade routes it to the caller's error continuation when
//! one was supplied and returns it otherwise.

use thiserror::Error;

use crate::http::HttpMethod;

/// Message carried by every failure caused by a non-success HTTP status.
pub const STATUS_ERROR_MESSAGE: &str = "HTTP response code said error";

/// Message carried by failures caused by a missing or malformed URL.
pub const INVALID_URL_MESSAGE: &str = "URL using bad/illegal format or missing URL";

/// Message carried by failures caused by the cancel flag.
pub const CANCELLED_MESSAGE: &str = "request cancelled";

/// Message carried by failures caused by the request timeout.
pub const TIMEOUT_MESSAGE: &str = "timeout was reached";

/// Any failure a facade operation can return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RequestError {
    /// Status code of the underlying transport failure, if there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RequestError::Usage(_) => None,
            RequestError::Transport(err) => err.status_code(),
        }
    }
}

/// The call was malformed; nothing was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// The payload variant cannot be sent with this verb.
    #[error("invalid payload type for {method}")]
    InvalidPayload { method: HttpMethod },

    /// A UNIX-socket facade was given a target with no socket path.
    #[error("target has no unix socket path")]
    MissingSocketPath,

    /// A download was requested without a file destination.
    #[error("download requires an output file")]
    MissingOutputFile,

    /// Configuration text could not be understood.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Broad classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The peer answered with a status of 400 or above.
    Status,
    InvalidUrl,
    Connect,
    Timeout,
    Cancelled,
    Io,
    /// The peer's response could not be understood.
    Protocol,
    Other,
}

/// The exchange was attempted and failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    status: Option<u16>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// A failure reported by the peer with `code`, using the standard message.
    pub fn http_status(code: u16) -> Self {
        Self::with_status(code, STATUS_ERROR_MESSAGE)
    }

    /// A failure reported by the peer with `code` and a custom message.
    pub fn with_status(code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Status,
            message: message.into(),
            status: Some(code),
        }
    }

    pub fn invalid_url() -> Self {
        Self::new(TransportErrorKind::InvalidUrl, INVALID_URL_MESSAGE)
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, CANCELLED_MESSAGE)
    }

    pub fn timeout() -> Self {
        Self::new(TransportErrorKind::Timeout, TIMEOUT_MESSAGE)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Classify a local I/O failure.
    pub fn io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::TimedOut => return Self::timeout(),
            ErrorKind::ConnectionRefused | ErrorKind::NotFound | ErrorKind::AddrNotAvailable => {
                TransportErrorKind::Connect
            }
            _ => TransportErrorKind::Io,
        };
        Self::new(kind, err.to_string())
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status code reported by the peer; `None` for local failures.
    pub fn status_code(&self) -> Option<u16> {
        self.status
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == TransportErrorKind::Cancelled
    }
}
