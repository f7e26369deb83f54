//! Byte transports the connection pool opens sockets with.
//!
//! A [`Transport`] turns an [`Origin`] into a connected, ready-to-use
//! [`Socket`]: for `https` origins that includes the TLS handshake. The pool
//! owns every socket it receives and closes it by dropping it.
//!
//! - [`TcpTransport`]: TCP via tokio, TLS via rustls (default)
//! - [`DuplexTransport`]: in-memory pipes, for tests and embedding
//!
//! # Feature Flags
//!
//! TLS support requires a crypto provider and root certificates:
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots` for convenience
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use fetchwire_core::Origin;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::interceptor::BoxFuture;

mod duplex;
mod tcp;
mod tls;

pub use duplex::{DuplexListener, DuplexTransport};
pub use tcp::TcpTransport;
pub use tls::has_tls_support;

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
pub use tls::default_tls_config;

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;

/// Opens sockets to origins.
pub trait Transport: Send + Sync + 'static {
    /// Connect to `origin`, completing the TLS handshake for `https`.
    fn connect<'a>(&'a self, origin: &'a Origin) -> BoxFuture<'a, io::Result<Box<dyn Socket>>>;
}

/// A connected byte stream.
pub trait Socket: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Addresses and TLS details of the socket.
    fn info(&self) -> SocketInfo {
        SocketInfo::default()
    }
}

/// Addresses and TLS details of a connected socket.
#[derive(Clone, Debug, Default)]
pub struct SocketInfo {
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub tls: Option<TlsInfo>,
}

/// Result of a completed TLS handshake.
#[derive(Clone)]
pub struct TlsInfo {
    /// Protocol selected with ALPN, if any.
    pub alpn_protocol: Option<Vec<u8>>,
    /// Negotiated TLS version, e.g. `TLSv1_3`.
    pub protocol_version: Option<String>,
    /// When the handshake finished.
    pub handshake_completed_at: Instant,
}

impl fmt::Debug for TlsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsInfo")
            .field(
                "alpn_protocol",
                &self.alpn_protocol.as_deref().map(String::from_utf8_lossy),
            )
            .field("protocol_version", &self.protocol_version)
            .finish()
    }
}
