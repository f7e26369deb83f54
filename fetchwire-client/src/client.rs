//! The HTTP client.
//!
//! [`HttpClient`] composes the connection pool, the HTTP/1.x driver and both
//! interceptor chains. It is cheap to clone; clones share the pool.
//!
//! ```ignore
//! use fetchwire_client::{HttpClient, Request};
//!
//! let client = HttpClient::new();
//! let mut response = client.execute(Request::get("http://example.org/")?).await?;
//! println!("{} {}", response.status(), response.text().await?);
//! ```

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use fetchwire_core::{CancellationToken, Error, Request, Response};

use crate::builder::ClientBuilder;
use crate::events::Events;
use crate::h1::Http1Driver;
use crate::interceptor::{ApplicationChain, ApplicationNext, BoxFuture, NetworkChain, NetworkNext};
use crate::pool::ConnectionPool;

/// Sends a request over a leased stream: the innermost step of the
/// application chain.
pub(crate) struct Dispatcher {
    pool: ConnectionPool,
    network: NetworkChain,
    driver: Http1Driver,
    events: Events,
}

impl Dispatcher {
    pub(crate) fn events(&self) -> &Events {
        &self.events
    }

    pub(crate) async fn dispatch(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, Error> {
        let origin = request.origin()?;
        let stream = self.pool.acquire(&origin, cancel, &self.events).await?;
        NetworkNext::new(
            self.network.clone(),
            stream,
            self.driver.clone(),
            cancel.clone(),
            self.events.clone(),
        )
        .run(request)
        .await
    }
}

struct ClientInner {
    application: ApplicationChain,
    dispatcher: Arc<Dispatcher>,
}

/// An asynchronous HTTP/1.x client.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    /// A client with the default configuration.
    pub fn new() -> Self {
        ClientBuilder::new().assemble(Http1Driver::default())
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        pool: ConnectionPool,
        application: ApplicationChain,
        network: NetworkChain,
        driver: Http1Driver,
        events: Events,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                application,
                dispatcher: Arc::new(Dispatcher {
                    pool,
                    network,
                    driver,
                    events,
                }),
            }),
        }
    }

    /// The connection pool shared by all clones of this client.
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.dispatcher.pool
    }

    /// Send `request` and wait for the response head.
    ///
    /// The returned response streams its body; a failure after the head was
    /// received surfaces when the body is read.
    pub async fn execute(&self, request: Request) -> Result<Response, Error> {
        self.execute_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](HttpClient::execute), aborting as soon as `cancel`
    /// fires. Cancelling after the head was received fails the pending body
    /// read and closes the connection.
    pub async fn execute_with_cancellation(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, Error> {
        let events = self.inner.dispatcher.events();
        // Listeners get a copy of the head; the body is consumed on the wire.
        let observed = (!events.is_empty()).then(|| request.head_clone());
        if let Some(request) = &observed {
            events.emit(|l| l.request_start(request));
        }

        let next = ApplicationNext::new(
            self.inner.application.clone(),
            self.inner.dispatcher.clone(),
            cancel.clone(),
        );
        let result = next.run(request).await;

        if let (Some(request), Err(error)) = (&observed, &result) {
            events.emit(|l| l.request_failed(request, error));
        }
        result
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("application_interceptors", &self.inner.application.len())
            .field("network_interceptors", &self.inner.dispatcher.network.len())
            .field("pool", &self.inner.dispatcher.pool)
            .finish()
    }
}

impl tower_service::Service<Request> for HttpClient {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response, Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await })
    }
}
