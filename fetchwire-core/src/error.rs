//! Error taxonomy for the request pipeline.
//!
//! Every layer (pool, driver, interceptors, response bodies) reports failures
//! through the single [`Error`] enum. The variants map one-to-one onto the
//! failure classes a caller may want to react to:
//!
//! | Variant | Raised when | Connection |
//! |---------|-------------|------------|
//! | [`Error::Connection`] | connect or TLS handshake failed | never leased |
//! | [`Error::Socket`] | mid-stream I/O failure, premature close | closed |
//! | [`Error::Protocol`] | malformed response, unsupported version | closed |
//! | [`Error::Timeout`] | transfer or inactivity timeout fired | closed |
//! | [`Error::Cancelled`] | caller cancelled, body dropped | closed |
//! | [`Error::InvalidRequest`] | request cannot be serialized | released |
//!
//! The type is `Clone` so that one failure can be reported both through a
//! response body and through the response completion future.

use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Errors produced while executing a request.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// Opening a connection to the origin failed (TCP connect or TLS handshake).
    #[error("connection to {origin} failed: {message}")]
    Connection {
        origin: String,
        message: String,
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// The socket failed or closed while a request was in flight.
    #[error("socket error: {message}")]
    Socket {
        message: String,
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// The peer violated HTTP/1.x framing rules.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A transfer or inactivity timeout fired.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// The request could not be serialized.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Socket,
    Protocol,
    Timeout,
    Cancelled,
    InvalidRequest,
}

impl Error {
    /// Create a connection error for `origin` wrapping a transport failure.
    pub fn connection(origin: impl ToString, source: io::Error) -> Self {
        Error::Connection {
            origin: origin.to_string(),
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a connection error without an underlying I/O error.
    pub fn connection_msg(origin: impl ToString, message: impl Into<String>) -> Self {
        Error::Connection {
            origin: origin.to_string(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a socket error from an I/O failure.
    pub fn socket(source: io::Error) -> Self {
        Error::Socket {
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a socket error with a message only.
    pub fn socket_msg(message: impl Into<String>) -> Self {
        Error::Socket {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::InvalidRequest(message.into())
    }

    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } => ErrorKind::Connection,
            Error::Socket { .. } => ErrorKind::Socket,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Returns whether this error indicates a transient condition that may
    /// be resolved by sending the request again.
    ///
    /// Connection, socket and timeout failures are transient. Protocol
    /// violations, cancellations and invalid requests are not.
    ///
    /// # Example
    ///
    /// ```
    /// use fetchwire_core::Error;
    ///
    /// assert!(Error::socket_msg("connection reset").is_retryable());
    /// assert!(!Error::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::Socket | ErrorKind::Timeout
        )
    }

    /// Returns true for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns true for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
