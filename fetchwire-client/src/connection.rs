//! Pooled connections and the leases handed out on them.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use fetchwire_core::Origin;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant as Clock;

use crate::transport::{Socket, TlsInfo};

/// Lifetime state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// In the pool, available for reuse.
    Idle,
    /// Carrying a request.
    Leased,
    /// Closed; never reused.
    Closed,
}

/// Immutable facts about a connection, shared with every stream leased on it.
#[derive(Debug)]
pub struct ConnectionInfo {
    id: u64,
    origin: Origin,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    tls: Option<TlsInfo>,
    created_at: Instant,
}

impl ConnectionInfo {
    /// Pool-unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn tls(&self) -> Option<&TlsInfo> {
        self.tls.as_ref()
    }

    /// Protocol negotiated with ALPN, if TLS was used and the server chose one.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.tls.as_ref().and_then(|t| t.alpn_protocol.as_deref())
    }

    /// When the transport returned the connected socket.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn tls_handshake_at(&self) -> Option<Instant> {
        self.tls.as_ref().map(|t| t.handshake_completed_at)
    }
}

/// A socket owned by the pool.
pub(crate) struct Connection {
    info: Arc<ConnectionInfo>,
    socket: Box<dyn Socket>,
    state: ConnectionState,
    last_used: Clock,
    requests: u64,
    in_use: usize,
}

impl Connection {
    pub(crate) fn new(id: u64, origin: Origin, socket: Box<dyn Socket>) -> Self {
        let socket_info = socket.info();
        let now = Instant::now();
        Self {
            info: Arc::new(ConnectionInfo {
                id,
                origin,
                remote_addr: socket_info.remote_addr,
                local_addr: socket_info.local_addr,
                tls: socket_info.tls,
                created_at: now,
            }),
            socket,
            state: ConnectionState::Leased,
            last_used: Clock::now(),
            requests: 0,
            in_use: 0,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.info.id
    }

    pub(crate) fn origin(&self) -> &Origin {
        &self.info.origin
    }

    pub(crate) fn info(&self) -> &Arc<ConnectionInfo> {
        &self.info
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn last_used(&self) -> Clock {
        self.last_used
    }

    pub(crate) fn socket(&mut self) -> &mut Box<dyn Socket> {
        &mut self.socket
    }

    /// Mark the connection as carrying one more request. Returns the
    /// request's sequence number on this connection, starting at 1.
    pub(crate) fn lease(&mut self) -> u64 {
        debug_assert_eq!(self.in_use, 0, "HTTP/1.1 carries one request at a time");
        self.state = ConnectionState::Leased;
        self.in_use += 1;
        self.requests += 1;
        self.requests
    }

    pub(crate) fn park(&mut self) {
        self.in_use = self.in_use.saturating_sub(1);
        self.state = ConnectionState::Idle;
        self.last_used = Clock::now();
    }

    pub(crate) fn is_expired(&self, now: Clock, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_used) >= idle_timeout
    }

    /// Check an idle connection without blocking.
    ///
    /// An idle HTTP/1.1 connection has nothing to say: end of stream, an
    /// error, or unsolicited bytes all mean it cannot carry another request.
    pub(crate) fn is_usable(&mut self) -> bool {
        let mut cx = Context::from_waker(Waker::noop());
        let mut probe = [0u8; 1];
        let mut buf = ReadBuf::new(&mut probe);
        match Pin::new(&mut self.socket).poll_read(&mut cx, &mut buf) {
            Poll::Pending => true,
            Poll::Ready(Ok(())) => false,
            Poll::Ready(Err(_)) => false,
        }
    }

    /// Close the connection by dropping its socket.
    pub(crate) fn close(mut self, reason: &'static str) {
        self.state = ConnectionState::Closed;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            connection = self.info.id,
            origin = %self.info.origin,
            requests = self.requests,
            state = ?self.state,
            reason,
            "closing connection"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = reason;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.info.id)
            .field("origin", &self.info.origin)
            .field("state", &self.state)
            .field("requests", &self.requests)
            .field("in_use", &self.in_use)
            .finish()
    }
}

/// What a stream knows about the connection it was leased from.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    connection: Arc<ConnectionInfo>,
    sequence: u64,
}

impl StreamInfo {
    pub(crate) fn new(connection: Arc<ConnectionInfo>, sequence: u64) -> Self {
        Self {
            connection,
            sequence,
        }
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn connection_id(&self) -> u64 {
        self.connection.id
    }

    pub fn origin(&self) -> &Origin {
        &self.connection.origin
    }

    /// Position of this request on its connection, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether the connection carried a request before this one.
    pub fn is_reused(&self) -> bool {
        self.sequence > 1
    }
}

pub(crate) fn socket_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream already released")
}
