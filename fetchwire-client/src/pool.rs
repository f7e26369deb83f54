//! Connection pool.
//!
//! The pool owns every open connection. [`ConnectionPool::acquire`] leases
//! one for a single request as a [`Stream`]. An idle connection to the same
//! origin is reused when one is available and still healthy. Otherwise a new
//! connection is opened, within a per-origin and a global limit. Callers over
//! the limit wait until a connection is released or their cancellation token
//! fires.
//!
//! All bookkeeping (idle lists, open counts, capacity reservations) happens
//! under one mutex, in one critical section per decision. Sockets are never
//! read, written or connected while the lock is held.
//!
//! ```ignore
//! let pool = ConnectionPool::new(PoolConfig::default(), Arc::new(TcpTransport::new()));
//! let stream = pool.acquire(&origin, &token, &events).await?;
//! // ... one request/response exchange ...
//! stream.release(keep_alive);
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fetchwire_core::{CancellationToken, Error, Origin};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::connection::{Connection, ConnectionState, StreamInfo, socket_closed};
use crate::events::Events;
use crate::transport::{Socket, Transport};

/// A shared pool of connections. Cloning is cheap.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

/// Snapshot of pool occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections, including ones still being established.
    pub open: usize,
    /// Connections waiting in the pool for reuse.
    pub idle: usize,
    /// Connections carrying a request or being established.
    pub leased: usize,
}

struct PoolInner {
    config: PoolConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<PoolState>,
    available: Notify,
    next_id: AtomicU64,
}

#[derive(Default)]
struct PoolState {
    origins: HashMap<Origin, OriginState>,
    total_open: usize,
    closed: bool,
}

#[derive(Default)]
struct OriginState {
    /// Oldest first.
    idle: VecDeque<Connection>,
    /// Idle, leased and connecting.
    open: usize,
}

enum Checkout {
    Reuse(Connection),
    Connect(Reservation),
    Full,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                transport,
                state: Mutex::new(PoolState::default()),
                available: Notify::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Lease a connection to `origin`.
    ///
    /// Fails with [`Error::Connection`] if a new connection cannot be opened
    /// (or the pool has been closed), and with the token's reason if `cancel`
    /// fires while waiting.
    pub(crate) async fn acquire(
        &self,
        origin: &Origin,
        cancel: &CancellationToken,
        events: &Events,
    ) -> Result<Stream, Error> {
        cancel.check()?;

        loop {
            // Register interest before looking at the state so a release
            // between the check and the wait is not missed.
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.inner.checkout(origin)? {
                Checkout::Reuse(conn) => {
                    let stream = self.lease(conn);
                    events.emit(|l| l.connection_acquired(origin, stream.info()));
                    return Ok(stream);
                }
                Checkout::Connect(reservation) => {
                    return match self.connect(origin, cancel).await {
                        Ok(socket) => {
                            reservation.fulfil();
                            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                            let conn = Connection::new(id, origin.clone(), socket);

                            #[cfg(feature = "tracing")]
                            tracing::debug!(connection = id, origin = %origin, "connection opened");

                            let stream = self.lease(conn);
                            events.emit(|l| l.connection_acquired(origin, stream.info()));
                            Ok(stream)
                        }
                        Err(e) => {
                            drop(reservation);
                            events.emit(|l| l.connect_failed(origin, &e));
                            Err(e)
                        }
                    };
                }
                Checkout::Full => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(origin = %origin, "pool at capacity, waiting");

                    tokio::select! {
                        _ = &mut notified => continue,
                        reason = cancel.cancelled() => return Err(reason),
                    }
                }
            }
        }
    }

    async fn connect(
        &self,
        origin: &Origin,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Socket>, Error> {
        let timeout = self.inner.config.connect_timeout;
        let connect = tokio::time::timeout(timeout, self.inner.transport.connect(origin));
        tokio::select! {
            reason = cancel.cancelled() => Err(reason),
            res = connect => match res {
                Ok(Ok(socket)) => Ok(socket),
                Ok(Err(e)) => Err(Error::connection(origin, e)),
                Err(_) => Err(Error::connection_msg(
                    origin,
                    format!("connect timed out after {:?}", timeout),
                )),
            },
        }
    }

    fn lease(&self, mut conn: Connection) -> Stream {
        let sequence = conn.lease();
        let info = StreamInfo::new(conn.info().clone(), sequence);
        Stream {
            connection: Some(conn),
            pool: self.inner.clone(),
            info,
        }
    }

    /// Drop idle connections that exceeded the idle timeout. Returns how
    /// many were closed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let timeout = self.inner.config.idle_timeout;
        let mut expired = Vec::new();
        {
            let mut state = self.inner.lock();
            let PoolState {
                origins,
                total_open,
                ..
            } = &mut *state;
            for entry in origins.values_mut() {
                let before = entry.idle.len();
                let (keep, stale): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut entry.idle)
                    .into_iter()
                    .partition(|c| !c.is_expired(now, timeout));
                entry.idle = keep;
                let removed = before - entry.idle.len();
                entry.open -= removed;
                *total_open -= removed;
                expired.extend(stale);
            }
            origins.retain(|_, entry| entry.open > 0);
        }

        let count = expired.len();
        for conn in expired {
            conn.close("idle timeout");
        }
        if count > 0 {
            self.inner.available.notify_waiters();
        }
        count
    }

    /// Close every idle connection and refuse new acquisitions.
    ///
    /// Leased connections are closed when they are released.
    pub fn close(&self) {
        let idle: Vec<Connection> = {
            let mut state = self.inner.lock();
            state.closed = true;
            let PoolState {
                origins,
                total_open,
                ..
            } = &mut *state;
            let mut idle = Vec::new();
            for entry in origins.values_mut() {
                entry.open -= entry.idle.len();
                *total_open -= entry.idle.len();
                idle.extend(entry.idle.drain(..));
            }
            idle
        };
        for conn in idle {
            conn.close("pool closed");
        }
        self.inner.available.notify_waiters();
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        let idle = state.origins.values().map(|e| e.idle.len()).sum();
        PoolStats {
            open: state.total_open,
            idle,
            leased: state.total_open - idle,
        }
    }

    /// Idle connections to `origin`.
    pub fn idle_count(&self, origin: &Origin) -> usize {
        self.inner
            .lock()
            .origins
            .get(origin)
            .map_or(0, |e| e.idle.len())
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn checkout(self: &Arc<Self>, origin: &Origin) -> Result<Checkout, Error> {
        let now = Instant::now();
        let mut discarded = Vec::new();

        let decision = {
            let mut state = self.lock();
            if state.closed {
                return Err(Error::connection_msg(origin, "connection pool is closed"));
            }
            let PoolState {
                origins,
                total_open,
                ..
            } = &mut *state;

            let entry = origins.entry(origin.clone()).or_default();
            let mut reuse = None;
            // Most recently used first: it is the least likely to have been
            // closed by the server.
            while let Some(mut conn) = entry.idle.pop_back() {
                if conn.is_expired(now, self.config.idle_timeout) || !conn.is_usable() {
                    entry.open -= 1;
                    *total_open -= 1;
                    discarded.push(conn);
                    continue;
                }
                reuse = Some(conn);
                break;
            }

            if let Some(conn) = reuse {
                Checkout::Reuse(conn)
            } else if entry.open >= self.config.max_connections_per_origin {
                Checkout::Full
            } else {
                if *total_open >= self.config.max_connections {
                    if let Some(victim) = evict_oldest_idle(origins, origin) {
                        *total_open -= 1;
                        discarded.push(victim);
                    }
                }
                if *total_open < self.config.max_connections {
                    let entry = origins.entry(origin.clone()).or_default();
                    entry.open += 1;
                    *total_open += 1;
                    Checkout::Connect(Reservation {
                        pool: self.clone(),
                        origin: origin.clone(),
                        armed: true,
                    })
                } else {
                    Checkout::Full
                }
            }
        };

        for conn in discarded {
            conn.close("stale or evicted");
        }
        Ok(decision)
    }

    fn checkin(&self, mut conn: Connection, reusable: bool) {
        let closing = {
            let mut state = self.lock();
            let closed = state.closed;
            let PoolState {
                origins,
                total_open,
                ..
            } = &mut *state;
            let max_idle = self.config.max_idle_per_origin;

            match origins.get_mut(conn.origin()) {
                Some(entry) if reusable && !closed && entry.idle.len() < max_idle => {
                    conn.park();
                    #[cfg(feature = "tracing")]
                    tracing::trace!(connection = conn.id(), origin = %conn.origin(), "connection returned to pool");
                    entry.idle.push_back(conn);
                    None
                }
                Some(entry) => {
                    entry.open -= 1;
                    *total_open -= 1;
                    if entry.open == 0 {
                        origins.remove(conn.origin());
                    }
                    Some(conn)
                }
                None => Some(conn),
            }
        };

        if let Some(conn) = closing {
            conn.close(if reusable { "pool full or closed" } else { "not reusable" });
        }
        self.available.notify_waiters();
    }

    fn release_reservation(&self, origin: &Origin) {
        {
            let mut state = self.lock();
            state.total_open -= 1;
            if let Some(entry) = state.origins.get_mut(origin) {
                entry.open -= 1;
                if entry.open == 0 {
                    state.origins.remove(origin);
                }
            }
        }
        self.available.notify_waiters();
    }
}

fn evict_oldest_idle(
    origins: &mut HashMap<Origin, OriginState>,
    keep: &Origin,
) -> Option<Connection> {
    let (victim_origin, _) = origins
        .iter()
        .filter(|(o, _)| *o != keep)
        .filter_map(|(o, e)| e.idle.front().map(|c| (o, c.last_used())))
        .min_by_key(|(_, last_used)| *last_used)?;
    let victim_origin = victim_origin.clone();

    let entry = origins.get_mut(&victim_origin)?;
    let conn = entry.idle.pop_front()?;
    entry.open -= 1;
    if entry.open == 0 {
        origins.remove(&victim_origin);
    }
    Some(conn)
}

/// Capacity held for a connection that is being opened. Returned to the
/// pool on drop unless the connection was established.
struct Reservation {
    pool: Arc<PoolInner>,
    origin: Origin,
    armed: bool,
}

impl Reservation {
    fn fulfil(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_reservation(&self.origin);
        }
    }
}

/// A lease on a pooled connection for exactly one request/response exchange.
///
/// Release it with [`release`](Stream::release). Releasing more than once
/// has no effect, and dropping an unreleased stream closes its connection.
pub struct Stream {
    connection: Option<Connection>,
    pool: Arc<PoolInner>,
    info: StreamInfo,
}

impl Stream {
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn is_released(&self) -> bool {
        self.connection.is_none()
    }

    /// Give the connection back to the pool. It is kept for reuse when
    /// `reusable` is true and the pool has room, and closed otherwise.
    pub fn release(&mut self, reusable: bool) {
        if let Some(conn) = self.connection.take() {
            debug_assert_eq!(conn.state(), ConnectionState::Leased);
            self.pool.checkin(conn, reusable);
        }
    }

    pub(crate) fn socket(&mut self) -> Result<&mut Box<dyn Socket>, Error> {
        self.connection
            .as_mut()
            .map(Connection::socket)
            .ok_or_else(|| Error::socket(socket_closed()))
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.release(false);
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("connection", &self.info.connection_id())
            .field("origin", self.info.origin())
            .field("sequence", &self.info.sequence())
            .field("released", &self.is_released())
            .finish()
    }
}
