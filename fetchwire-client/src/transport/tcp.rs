//! TCP and TLS sockets.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use fetchwire_core::{Origin, Scheme};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::tls::into_connector;
use super::{Socket, SocketInfo, Transport, TlsInfo};
use crate::interceptor::BoxFuture;

/// Connects over TCP, adding TLS for `https` origins.
///
/// # Example
///
/// ```ignore
/// use fetchwire_client::transport::TcpTransport;
///
/// // Feature-selected TLS defaults
/// let transport = TcpTransport::new();
///
/// // Custom rustls configuration
/// let transport = TcpTransport::with_tls_config(my_client_config);
/// ```
#[derive(Clone)]
pub struct TcpTransport {
    tls: Option<TlsConnector>,
}

impl TcpTransport {
    /// Create a transport using the feature-selected TLS configuration.
    ///
    /// Without TLS features, connecting to an `https` origin fails with a
    /// connection error.
    pub fn new() -> Self {
        #[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
        let tls = super::tls::default_tls_config().map(into_connector);

        #[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
        let tls = None;

        Self { tls }
    }

    /// Create a transport using a custom rustls configuration. Its ALPN list
    /// is replaced with `http/1.1`.
    pub fn with_tls_config(config: rustls::ClientConfig) -> Self {
        Self {
            tls: Some(into_connector(config)),
        }
    }

    /// Create a transport that only speaks plain TCP.
    pub fn plaintext() -> Self {
        Self { tls: None }
    }

    async fn open(&self, origin: &Origin) -> io::Result<Box<dyn Socket>> {
        let tcp = TcpStream::connect((origin.hostname(), origin.port())).await?;
        tcp.set_nodelay(true)?;

        if origin.scheme() == Scheme::Http {
            return Ok(Box::new(tcp));
        }

        let connector = self.tls.as_ref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                "no TLS configuration available; enable the `tls` feature or provide a config",
            )
        })?;
        let server_name = ServerName::try_from(origin.hostname().to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let stream = connector.connect(server_name, tcp).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            origin = %origin,
            alpn = ?stream.get_ref().1.alpn_protocol().map(String::from_utf8_lossy),
            "TLS handshake complete"
        );

        Ok(Box::new(TlsSocket {
            stream,
            handshake_completed_at: Instant::now(),
        }))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl Transport for TcpTransport {
    fn connect<'a>(&'a self, origin: &'a Origin) -> BoxFuture<'a, io::Result<Box<dyn Socket>>> {
        Box::pin(self.open(origin))
    }
}

impl Socket for TcpStream {
    fn info(&self) -> SocketInfo {
        SocketInfo {
            remote_addr: self.peer_addr().ok(),
            local_addr: self.local_addr().ok(),
            tls: None,
        }
    }
}

struct TlsSocket {
    stream: TlsStream<TcpStream>,
    handshake_completed_at: Instant,
}

impl Socket for TlsSocket {
    fn info(&self) -> SocketInfo {
        let (tcp, session) = self.stream.get_ref();
        SocketInfo {
            remote_addr: tcp.peer_addr().ok(),
            local_addr: tcp.local_addr().ok(),
            tls: Some(TlsInfo {
                alpn_protocol: session.alpn_protocol().map(<[u8]>::to_vec),
                protocol_version: session.protocol_version().map(|v| format!("{:?}", v)),
                handshake_completed_at: self.handshake_completed_at,
            }),
        }
    }
}

impl AsyncRead for TlsSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
