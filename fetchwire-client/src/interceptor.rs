//! Interceptor chains.
//!
//! Every request passes through two chains:
//!
//! - **Application interceptors** wrap the logical request. They run once per
//!   call to [`HttpClient::execute`](crate::HttpClient::execute) and may call
//!   `next` any number of times (retries, redirects) or not at all (answering
//!   from a cache).
//! - **Network interceptors** wrap one physical attempt on one leased stream.
//!   They see the [`StreamInfo`] of the connection and must call `next`
//!   exactly once on the happy path.
//!
//! Each interceptor receives a continuation (`next`) that runs the rest of
//! the chain. Because every interceptor fully wraps the call to `next`, an
//! interceptor closer to the wire sees the response before the ones wrapping
//! it.
//!
//! # Example
//!
//! ```ignore
//! use fetchwire_client::{ApplicationInterceptor, ApplicationNext, BoxFuture, Request, Response};
//!
//! struct Stamp;
//!
//! impl ApplicationInterceptor for Stamp {
//!     fn intercept<'a>(
//!         &'a self,
//!         mut request: Request,
//!         next: ApplicationNext,
//!     ) -> BoxFuture<'a, Result<Response, Error>> {
//!         Box::pin(async move {
//!             request.set_header("x-stamp", "1")?;
//!             next.run(request).await
//!         })
//!     }
//! }
//!
//! let client = HttpClient::builder().intercept(Stamp).build()?;
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use fetchwire_core::{CancellationToken, Error, Request, Response};

use crate::client::Dispatcher;
use crate::connection::StreamInfo;
use crate::events::Events;
use crate::h1::Http1Driver;
use crate::pool::Stream;

/// Type alias for a boxed future returning a result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Wraps the logical request.
pub trait ApplicationInterceptor: Send + Sync + 'static {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: ApplicationNext,
    ) -> BoxFuture<'a, Result<Response, Error>>;

    /// Name reported to event listeners.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Wraps a single attempt on a leased stream.
pub trait NetworkInterceptor: Send + Sync + 'static {
    fn intercept<'a>(
        &'a self,
        request: Request,
        stream: StreamInfo,
        next: NetworkNext,
    ) -> BoxFuture<'a, Result<Response, Error>>;

    /// Name reported to event listeners.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

pub(crate) type ApplicationChain = Arc<[Arc<dyn ApplicationInterceptor>]>;
pub(crate) type NetworkChain = Arc<[Arc<dyn NetworkInterceptor>]>;

/// The rest of the application chain.
///
/// Cloneable and reusable: calling [`run`](ApplicationNext::run) twice sends
/// the request twice.
#[derive(Clone)]
pub struct ApplicationNext {
    chain: ApplicationChain,
    index: usize,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
}

impl ApplicationNext {
    pub(crate) fn new(chain: ApplicationChain, dispatcher: Arc<Dispatcher>, cancel: CancellationToken) -> Self {
        Self {
            chain,
            index: 0,
            dispatcher,
            cancel,
        }
    }

    /// Run the remaining interceptors and then send the request.
    pub fn run(&self, request: Request) -> BoxFuture<'static, Result<Response, Error>> {
        let this = self.clone();
        Box::pin(async move {
            this.cancel.check()?;
            let Some(interceptor) = this.chain.get(this.index).cloned() else {
                return this.dispatcher.dispatch(request, &this.cancel).await;
            };

            let events = this.dispatcher.events().clone();
            events.emit(|l| l.application_interceptor_start(&request, interceptor.name()));
            let next = ApplicationNext {
                index: this.index + 1,
                ..this
            };
            let result = interceptor.intercept(request, next).await;
            events.emit(|l| l.application_interceptor_end(interceptor.name(), &result));
            result
        })
    }

    /// The token cancelling this call. Interceptors that wait (for example
    /// between retries) should race the wait against it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for ApplicationNext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationNext")
            .field("remaining", &self.chain.len().saturating_sub(self.index))
            .finish()
    }
}

/// The rest of the network chain. Owns the leased stream.
pub struct NetworkNext {
    chain: NetworkChain,
    index: usize,
    stream: Stream,
    driver: Http1Driver,
    cancel: CancellationToken,
    events: Events,
}

impl NetworkNext {
    pub(crate) fn new(
        chain: NetworkChain,
        stream: Stream,
        driver: Http1Driver,
        cancel: CancellationToken,
        events: Events,
    ) -> Self {
        Self {
            chain,
            index: 0,
            stream,
            driver,
            cancel,
            events,
        }
    }

    pub fn stream(&self) -> &StreamInfo {
        self.stream.info()
    }

    /// Run the remaining interceptors and then the exchange itself.
    pub fn run(self, request: Request) -> BoxFuture<'static, Result<Response, Error>> {
        Box::pin(async move {
            let NetworkNext {
                chain,
                index,
                stream,
                driver,
                cancel,
                events,
            } = self;

            let Some(interceptor) = chain.get(index).cloned() else {
                return driver.request(stream, request, &cancel, &events).await;
            };

            let info = stream.info().clone();
            events.emit(|l| l.network_interceptor_start(&request, interceptor.name(), &info));
            let next = NetworkNext {
                chain,
                index: index + 1,
                stream,
                driver,
                cancel,
                events: events.clone(),
            };
            let result = interceptor.intercept(request, info, next).await;
            events.emit(|l| l.network_interceptor_end(interceptor.name(), &result));
            result
        })
    }
}

impl fmt::Debug for NetworkNext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkNext")
            .field("remaining", &self.chain.len().saturating_sub(self.index))
            .field("stream", &self.stream)
            .finish()
    }
}

/// A closure-based application interceptor.
///
/// ```ignore
/// let logging = FnApplicationInterceptor::new(|req: Request, next: ApplicationNext| {
///     Box::pin(async move {
///         println!("calling {}", req.uri());
///         next.run(req).await
///     })
/// });
/// ```
pub struct FnApplicationInterceptor<F> {
    func: F,
    name: &'static str,
}

impl<F> FnApplicationInterceptor<F>
where
    F: Fn(Request, ApplicationNext) -> BoxFuture<'static, Result<Response, Error>> + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func, name: "fn" }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> ApplicationInterceptor for FnApplicationInterceptor<F>
where
    F: Fn(Request, ApplicationNext) -> BoxFuture<'static, Result<Response, Error>> + Send + Sync + 'static,
{
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: ApplicationNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        (self.func)(request, next)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// A closure-based network interceptor.
pub struct FnNetworkInterceptor<F> {
    func: F,
    name: &'static str,
}

impl<F> FnNetworkInterceptor<F>
where
    F: Fn(Request, StreamInfo, NetworkNext) -> BoxFuture<'static, Result<Response, Error>>
        + Send
        + Sync
        + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func, name: "fn" }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> NetworkInterceptor for FnNetworkInterceptor<F>
where
    F: Fn(Request, StreamInfo, NetworkNext) -> BoxFuture<'static, Result<Response, Error>>
        + Send
        + Sync
        + 'static,
{
    fn intercept<'a>(
        &'a self,
        request: Request,
        stream: StreamInfo,
        next: NetworkNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        (self.func)(request, stream, next)
    }

    fn name(&self) -> &str {
        self.name
    }
}
