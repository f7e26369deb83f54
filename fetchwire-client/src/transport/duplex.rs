//! In-memory transport.
//!
//! Every `connect` creates a [`tokio::io::duplex`] pipe, keeps one end as the
//! client socket and hands the other end to the paired [`DuplexListener`].
//! Tests use it to script servers byte by byte without touching the network.
//!
//! ```ignore
//! let (transport, mut listener) = DuplexTransport::new();
//! tokio::spawn(async move {
//!     while let Some((origin, mut socket)) = listener.accept().await {
//!         // read the request, write a response
//!     }
//! });
//! let client = HttpClient::builder().transport(transport).build()?;
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fetchwire_core::Origin;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use super::{Socket, Transport};
use crate::interceptor::BoxFuture;

const DEFAULT_BUFFER: usize = 64 * 1024;

/// Client side of an in-memory transport.
#[derive(Clone, Debug)]
pub struct DuplexTransport {
    incoming: mpsc::UnboundedSender<(Origin, DuplexStream)>,
    buffer: usize,
    connects: Arc<AtomicUsize>,
}

/// Server side of a [`DuplexTransport`].
#[derive(Debug)]
pub struct DuplexListener {
    incoming: mpsc::UnboundedReceiver<(Origin, DuplexStream)>,
}

impl DuplexTransport {
    pub fn new() -> (Self, DuplexListener) {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// Create a transport whose pipes buffer at most `buffer` bytes in each
    /// direction. Small buffers make writes wait for the peer to read.
    pub fn with_buffer(buffer: usize) -> (Self, DuplexListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                incoming: tx,
                buffer,
                connects: Arc::new(AtomicUsize::new(0)),
            },
            DuplexListener { incoming: rx },
        )
    }

    /// Number of connections opened so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Transport for DuplexTransport {
    fn connect<'a>(&'a self, origin: &'a Origin) -> BoxFuture<'a, io::Result<Box<dyn Socket>>> {
        Box::pin(async move {
            let (client, server) = tokio::io::duplex(self.buffer);
            self.incoming
                .send((origin.clone(), server))
                .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "listener closed"))?;
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(client) as Box<dyn Socket>)
        })
    }
}

impl DuplexListener {
    /// Wait for the next connection. Returns `None` once every transport
    /// handle has been dropped.
    pub async fn accept(&mut self) -> Option<(Origin, DuplexStream)> {
        self.incoming.recv().await
    }
}

impl Socket for DuplexStream {}
