//! Client builder.
//!
//! Provides a fluent API for configuring and building an [`HttpClient`].

use std::sync::Arc;
use std::time::Duration;

use http::header::HeaderValue;

use crate::client::HttpClient;
use crate::config::{PoolConfig, RetryPolicy};
use crate::events::{EventListener, Events};
use crate::h1::{DEFAULT_USER_AGENT, Http1Driver};
use crate::interceptor::{ApplicationInterceptor, NetworkInterceptor};
use crate::interceptors::{FollowRedirects, RetryRequests};
use crate::pool::ConnectionPool;
use crate::transport::{TcpTransport, TlsClientConfig, Transport};

/// Default maximum number of redirects followed per request.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Builder for creating an [`HttpClient`].
///
/// # Example
///
/// ```ignore
/// use fetchwire_client::{HttpClient, RetryPolicy, SetRequestHeader};
///
/// let client = HttpClient::builder()
///     .max_connections_per_origin(4)
///     .retry(RetryPolicy::aggressive())
///     .intercept(SetRequestHeader::try_new("authorization", "Bearer token123")?)
///     .build()?;
/// ```
pub struct ClientBuilder {
    /// Opens connections. Defaults to TCP with TLS when a TLS feature is on.
    transport: Option<Arc<dyn Transport>>,
    tls_config: Option<TlsClientConfig>,
    pool: PoolConfig,
    user_agent: Option<String>,
    retry: Option<RetryPolicy>,
    /// `None` disables redirect handling.
    max_redirects: Option<usize>,
    application: Vec<Arc<dyn ApplicationInterceptor>>,
    network: Vec<Arc<dyn NetworkInterceptor>>,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("transport", &self.transport.is_some())
            .field("tls_config", &self.tls_config.is_some())
            .field("pool", &self.pool)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .field("max_redirects", &self.max_redirects)
            .field("application_interceptors", &self.application.len())
            .field("network_interceptors", &self.network.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            tls_config: None,
            pool: PoolConfig::default(),
            user_agent: None,
            retry: None,
            max_redirects: Some(DEFAULT_MAX_REDIRECTS),
            application: Vec::new(),
            network: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Use a custom transport, such as
    /// [`DuplexTransport`](crate::DuplexTransport) in tests.
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a custom rustls configuration for `https` origins. Ignored when a
    /// custom transport is set.
    pub fn tls_config(mut self, config: TlsClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool = config;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.pool = self.pool.max_connections(max);
        self
    }

    pub fn max_connections_per_origin(mut self, max: usize) -> Self {
        self.pool = self.pool.max_connections_per_origin(max);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool = self.pool.idle_timeout(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.pool = self.pool.connect_timeout(timeout);
        self
    }

    /// Set the `User-Agent` sent when a request does not carry one.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Add an application interceptor. The first one added is the outermost.
    pub fn intercept<I: ApplicationInterceptor>(mut self, interceptor: I) -> Self {
        self.application.push(Arc::new(interceptor));
        self
    }

    /// Add a network interceptor. The last one added is the outermost, so
    /// earlier ones see the response first.
    pub fn intercept_network<I: NetworkInterceptor>(mut self, interceptor: I) -> Self {
        self.network.push(Arc::new(interceptor));
        self
    }

    pub fn listen<L: EventListener>(mut self, listener: L) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Add a listener the caller keeps a handle to.
    pub fn listen_arc(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Retry transient failures with this policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn follow_redirects(mut self, max: usize) -> Self {
        self.max_redirects = Some(max);
        self
    }

    pub fn no_redirects(mut self) -> Self {
        self.max_redirects = None;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<HttpClient, ClientBuildError> {
        self.pool.validate().map_err(ClientBuildError::InvalidPoolConfig)?;
        if let Some(policy) = &self.retry {
            policy.validate().map_err(ClientBuildError::InvalidRetryPolicy)?;
        }
        let driver = match &self.user_agent {
            Some(ua) => Http1Driver::new(
                HeaderValue::try_from(ua.as_str())
                    .map_err(|_| ClientBuildError::InvalidUserAgent(ua.clone()))?,
            ),
            None => Http1Driver::new(HeaderValue::from_static(DEFAULT_USER_AGENT)),
        };
        Ok(self.assemble(driver))
    }

    /// Wire up a client from settings that are already known to be valid.
    pub(crate) fn assemble(self, driver: Http1Driver) -> HttpClient {
        let transport: Arc<dyn Transport> = match (self.transport, self.tls_config) {
            (Some(transport), _) => transport,
            (None, Some(tls)) => Arc::new(TcpTransport::with_tls_config(tls)),
            (None, None) => Arc::new(TcpTransport::new()),
        };

        let mut application: Vec<Arc<dyn ApplicationInterceptor>> = Vec::new();
        if let Some(max) = self.max_redirects {
            application.push(Arc::new(FollowRedirects::new(max)));
        }
        if let Some(policy) = self.retry {
            application.push(Arc::new(RetryRequests::new(policy)));
        }
        application.extend(self.application);

        let mut network = self.network;
        network.reverse();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            application = application.len(),
            network = network.len(),
            listeners = self.listeners.len(),
            "building http client"
        );

        HttpClient::from_parts(
            ConnectionPool::new(self.pool, transport),
            application.into(),
            network.into(),
            driver,
            Events::new(self.listeners),
        )
    }
}

/// Error type for client building failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid pool configuration: {0}")]
    InvalidPoolConfig(&'static str),

    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(&'static str),

    #[error("invalid user agent: {0:?}")]
    InvalidUserAgent(String),
}
