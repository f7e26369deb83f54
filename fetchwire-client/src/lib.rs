//! Pooled HTTP/1.1 client with interceptor chains.
//!
//! A request passes through two ordered interceptor chains on its way to the
//! wire:
//!
//! - The **application chain** wraps the logical request. Its interceptors see
//!   every retry and redirect and may call `next` any number of times.
//! - The **network chain** wraps exactly one physical attempt on a leased
//!   connection, after the pool has picked it.
//!
//! Responses come back as soon as their headers have been read. The body
//! streams from the connection with backpressure, and the connection goes
//! back to the pool once the body has been read to the end.
//!
//! ## Example
//!
//! ```ignore
//! use fetchwire_client::{HttpClient, Request, RetryPolicy, SetRequestHeader};
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .max_connections_per_origin(8)
//!     .retry(RetryPolicy::aggressive())
//!     .intercept(SetRequestHeader::try_new("authorization", "Bearer token123")?)
//!     .build()?;
//!
//! let request = Request::get("https://example.org/items")?
//!     .with_transfer_timeout(Duration::from_secs(10));
//! let mut response = client.execute(request).await?;
//! println!("{} {}", response.status(), response.text().await?);
//! ```
//!
//! ## Streaming Bodies
//!
//! ```ignore
//! let mut response = client.execute(Request::get("https://example.org/feed")?).await?;
//! while let Some(chunk) = response.body_mut().chunk().await? {
//!     process(&chunk);
//! }
//! // Resolves once the connection is released.
//! response.completion().await?;
//! ```
//!
//! Dropping the body before the end closes the connection instead of
//! returning it to the pool.
//!
//! ## Cancellation and Timeouts
//!
//! Each request carries two optional timeouts:
//!
//! - **transfer timeout**: the whole exchange, including the body
//! - **inactivity timeout**: the longest a single socket read may wait
//!
//! Both end the call with [`Error::Timeout`]. A [`CancellationToken`] passed
//! to [`HttpClient::execute_with_cancellation`] ends it with
//! [`Error::Cancelled`], also while the body is still streaming.
//!
//! ```ignore
//! let cancel = CancellationToken::new();
//! let call = client.execute_with_cancellation(request, &cancel);
//! // elsewhere
//! cancel.cancel();
//! ```
//!
//! ## Interceptor Ordering
//!
//! In the application chain the first registered interceptor is the
//! outermost. The builder places [`FollowRedirects`] and then
//! [`RetryRequests`] outside every user interceptor.
//!
//! In the network chain the most recently registered interceptor is the
//! outermost, so response mutations of earlier registrations run first:
//!
//! ```ignore
//! let client = HttpClient::builder()
//!     .intercept_network(AddResponseHeader::try_new("foo", "bar")?)
//!     .intercept_network(SetResponseHeader::try_new("foo", "baz")?)
//!     .build()?;
//! // Responses carry `foo: baz` only.
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `tls` (default) | `tls-ring` + `tls-native-roots` | `rustls`, `tokio-rustls` |
//! | `tls-aws-lc` | aws-lc-rs crypto provider | `rustls` |
//! | `tls-webpki-roots` | Bundled Mozilla roots | `webpki-roots` |
//! | `tracing` (default) | Debug logs for pool, driver and interceptors | `tracing` |
//!
//! ## Testing
//!
//! [`DuplexTransport`] replaces TCP with in-memory pipes; the other ends are
//! handed out by its [`DuplexListener`]:
//!
//! ```ignore
//! let (transport, mut listener) = DuplexTransport::new();
//! let client = HttpClient::builder().transport(transport).build()?;
//! tokio::spawn(async move {
//!     let (_origin, mut server) = listener.accept().await.unwrap();
//!     // read the request and write a response on `server`
//! });
//! ```

mod builder;
mod client;
pub mod config;
mod connection;
pub mod events;
mod h1;
mod interceptor;
pub mod interceptors;
mod pool;
pub mod transport;

pub use builder::{ClientBuildError, ClientBuilder, DEFAULT_MAX_REDIRECTS};
pub use client::HttpClient;
pub use config::{ExponentialBackoff, PoolConfig, RetryPolicy};
pub use connection::{ConnectionInfo, ConnectionState, StreamInfo};
pub use events::EventListener;
#[cfg(feature = "tracing")]
pub use events::TracingListener;
pub use h1::DEFAULT_USER_AGENT;
pub use interceptor::{
    ApplicationInterceptor, ApplicationNext, BoxFuture, FnApplicationInterceptor,
    FnNetworkInterceptor, NetworkInterceptor, NetworkNext,
};
pub use interceptors::{
    AddRequestHeader, AddResponseHeader, Cookie, CookieHandler, CookieJar, FollowRedirects,
    InMemoryCookieJar, MatchOrigin, ModifyRequest, ModifyResponse, RemoveRequestHeader,
    RemoveResponseHeader, RetryRequests, SetRequestHeader, SetRequestTimeout, SetResponseHeader,
};
pub use pool::{ConnectionPool, PoolStats, Stream};
pub use transport::{
    DuplexListener, DuplexTransport, Socket, SocketInfo, TcpTransport, TlsClientConfig, TlsInfo,
    Transport,
};

// Re-export the core data model
pub use fetchwire_core::{
    BodyFrame, BodySender, CancellationToken, Completion, Error, ErrorKind, HeaderMap, Method,
    Origin, Request, RequestBody, Response, ResponseBody, Scheme, StatusCode, Uri, Version,
    header,
};

// Re-export for streaming request bodies
pub use bytes::Bytes;
