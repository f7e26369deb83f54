//! Request lifecycle events.
//!
//! An [`EventListener`] observes every step of a request: interceptor entry
//! and exit, connection acquisition, the write of the request head and body,
//! and the read of the response head and body. Every hook has an empty
//! default, so listeners implement only what they need.
//!
//! Hooks run inline on the request's task and must not block.
//!
//! # Example
//!
//! ```ignore
//! use fetchwire_client::{EventListener, Request};
//!
//! struct BytesReceived(AtomicU64);
//!
//! impl EventListener for BytesReceived {
//!     fn response_body_end(&self, _request: &Request, total: u64) {
//!         self.0.fetch_add(total, Ordering::Relaxed);
//!     }
//! }
//!
//! let client = HttpClient::builder().listen(BytesReceived(AtomicU64::new(0))).build()?;
//! ```

use std::sync::Arc;

use fetchwire_core::{Error, Origin, Request, Response};

use crate::connection::StreamInfo;

/// Observer of request lifecycle events.
#[allow(unused_variables)]
pub trait EventListener: Send + Sync + 'static {
    /// A call to `execute` started.
    fn request_start(&self, request: &Request) {}

    /// The pool handed out a stream, on a new or reused connection.
    fn connection_acquired(&self, origin: &Origin, stream: &StreamInfo) {}

    /// Opening a connection failed.
    fn connect_failed(&self, origin: &Origin, error: &Error) {}

    fn request_header_start(&self, request: &Request, stream: &StreamInfo) {}

    fn request_header_end(&self, request: &Request, stream: &StreamInfo) {}

    fn request_body_start(&self, request: &Request) {}

    /// `sent` is the running total of body bytes written.
    fn request_body_progress(&self, request: &Request, sent: u64) {}

    fn request_body_end(&self, request: &Request, total: u64) {}

    fn response_header_start(&self, request: &Request) {}

    fn response_header_end(&self, request: &Request, response: &Response) {}

    fn response_body_start(&self, request: &Request) {}

    /// `received` is the running total of body bytes read.
    fn response_body_progress(&self, request: &Request, received: u64) {}

    fn response_body_end(&self, request: &Request, total: u64) {}

    /// The exchange finished and the connection was released.
    fn request_end(&self, request: &Request) {}

    /// The exchange failed.
    fn request_failed(&self, request: &Request, error: &Error) {}

    fn application_interceptor_start(&self, request: &Request, interceptor: &str) {}

    fn application_interceptor_end(&self, interceptor: &str, result: &Result<Response, Error>) {}

    fn network_interceptor_start(&self, request: &Request, interceptor: &str, stream: &StreamInfo) {}

    fn network_interceptor_end(&self, interceptor: &str, result: &Result<Response, Error>) {}
}

/// Fans events out to the registered listeners, in registration order.
#[derive(Clone)]
pub(crate) struct Events {
    listeners: Arc<[Arc<dyn EventListener>]>,
}

impl Events {
    pub(crate) fn new(listeners: Vec<Arc<dyn EventListener>>) -> Self {
        Self {
            listeners: listeners.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn none() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn emit(&self, event: impl Fn(&dyn EventListener)) {
        for listener in self.listeners.iter() {
            event(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for Events {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Events")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Emits every lifecycle event as a `tracing` event under the
/// `fetchwire::events` target.
///
/// Body progress is logged at `TRACE`, everything else at `DEBUG`, and
/// failures at `WARN`.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingListener;

#[cfg(feature = "tracing")]
impl EventListener for TracingListener {
    fn request_start(&self, request: &Request) {
        tracing::debug!(target: "fetchwire::events", method = %request.method(), uri = %request.uri(), "request start");
    }

    fn connection_acquired(&self, origin: &Origin, stream: &StreamInfo) {
        tracing::debug!(
            target: "fetchwire::events",
            origin = %origin,
            connection = stream.connection_id(),
            reused = stream.is_reused(),
            "connection acquired"
        );
    }

    fn connect_failed(&self, origin: &Origin, error: &Error) {
        tracing::warn!(target: "fetchwire::events", origin = %origin, error = %error, "connect failed");
    }

    fn request_header_end(&self, request: &Request, stream: &StreamInfo) {
        tracing::debug!(
            target: "fetchwire::events",
            uri = %request.uri(),
            connection = stream.connection_id(),
            "request head written"
        );
    }

    fn request_body_progress(&self, request: &Request, sent: u64) {
        tracing::trace!(target: "fetchwire::events", uri = %request.uri(), sent, "request body progress");
    }

    fn request_body_end(&self, request: &Request, total: u64) {
        tracing::debug!(target: "fetchwire::events", uri = %request.uri(), total, "request body written");
    }

    fn response_header_end(&self, request: &Request, response: &Response) {
        tracing::debug!(
            target: "fetchwire::events",
            uri = %request.uri(),
            status = response.status().as_u16(),
            version = ?response.version(),
            "response head received"
        );
    }

    fn response_body_progress(&self, request: &Request, received: u64) {
        tracing::trace!(target: "fetchwire::events", uri = %request.uri(), received, "response body progress");
    }

    fn response_body_end(&self, request: &Request, total: u64) {
        tracing::debug!(target: "fetchwire::events", uri = %request.uri(), total, "response body received");
    }

    fn request_end(&self, request: &Request) {
        tracing::debug!(target: "fetchwire::events", uri = %request.uri(), "request end");
    }

    fn request_failed(&self, request: &Request, error: &Error) {
        tracing::warn!(target: "fetchwire::events", uri = %request.uri(), error = %error, "request failed");
    }

    fn application_interceptor_start(&self, request: &Request, interceptor: &str) {
        tracing::trace!(target: "fetchwire::events", uri = %request.uri(), interceptor, "application interceptor start");
    }

    fn network_interceptor_start(&self, request: &Request, interceptor: &str, stream: &StreamInfo) {
        tracing::trace!(
            target: "fetchwire::events",
            uri = %request.uri(),
            interceptor,
            connection = stream.connection_id(),
            "network interceptor start"
        );
    }
}
