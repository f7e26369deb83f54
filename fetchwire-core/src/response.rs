//! The response returned by the client.
//!
//! A [`Response`] is produced as soon as the header section has been parsed.
//! The body is still streaming from the connection at that point; failures
//! that happen while receiving it are reported through the body and through
//! the response's [`Completion`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{StatusCode, Version};
use tokio::sync::oneshot;

use crate::body::ResponseBody;
use crate::headers::{self, header_name, header_pair};
use crate::{Error, Request};

/// Resolves once the response body has been fully received and the
/// connection released, or with the error that ended the exchange.
///
/// Cloning is cheap; every clone observes the same outcome.
#[derive(Clone)]
pub struct Completion {
    inner: Shared<BoxFuture<'static, Result<(), Error>>>,
}

impl Completion {
    /// A completion that has already resolved.
    pub fn ready(result: Result<(), Error>) -> Self {
        Self {
            inner: futures::future::ready(result).boxed().shared(),
        }
    }

    /// Create a pending completion and the sender that resolves it.
    ///
    /// If the sender is dropped without sending, the completion resolves to
    /// [`Error::Cancelled`].
    pub fn channel() -> (oneshot::Sender<Result<(), Error>>, Self) {
        let (tx, rx) = oneshot::channel();
        let inner = async move { rx.await.unwrap_or(Err(Error::Cancelled)) }
            .boxed()
            .shared();
        (tx, Self { inner })
    }

    /// The outcome, if it is already known.
    pub fn peek(&self) -> Option<&Result<(), Error>> {
        self.inner.peek()
    }
}

impl Future for Completion {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.peek().is_some())
            .finish()
    }
}

/// An HTTP response.
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    version: Version,
    headers: HeaderMap,
    request: Arc<Request>,
    body: ResponseBody,
    completion: Completion,
    previous: Option<Box<Response>>,
}

impl Response {
    /// Create a response to `request` with an empty body.
    pub fn new(request: Arc<Request>, status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            request,
            body: ResponseBody::empty(),
            completion: Completion::ready(Ok(())),
            previous: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a body together with the completion that tracks it.
    pub fn with_body(mut self, body: ResponseBody, completion: Completion) -> Self {
        self.body = body;
        self.completion = completion;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// The reason phrase sent by the server, or the canonical one for the
    /// status code.
    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => self.status.canonical_reason().unwrap_or(""),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        headers::header_values(&self.headers, name)
    }

    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<(), Error>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let (name, value) = header_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn add_header<K, V>(&mut self, name: K, value: V) -> Result<(), Error>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let (name, value) = header_pair(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn remove_header<K>(&mut self, name: K) -> Result<(), Error>
    where
        K: TryInto<HeaderName>,
    {
        let name = header_name(name)?;
        self.headers.remove(name);
        Ok(())
    }

    /// The request that produced this response, as it was sent.
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    /// Take the body, leaving an empty one in its place.
    pub fn take_body(&mut self) -> ResponseBody {
        std::mem::take(&mut self.body)
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Buffer the whole body.
    pub async fn bytes(&mut self) -> Result<bytes::Bytes, Error> {
        self.body.bytes().await
    }

    /// Buffer the whole body as UTF-8 text.
    pub async fn text(&mut self) -> Result<String, Error> {
        self.body.text().await
    }

    /// Trailer fields of a chunked body, once the body has been read.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.body.trailers()
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// The response that led to this one, when a redirect was followed.
    pub fn previous_response(&self) -> Option<&Response> {
        self.previous.as_deref()
    }

    pub fn set_previous_response(&mut self, previous: Response) {
        self.previous = Some(Box::new(previous));
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("uri", self.request.uri())
            .field("body", &self.body)
            .field("has_previous", &self.previous.is_some())
            .finish()
    }
}
