//! The logical request handed to the client.

use std::fmt;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Extensions, Method, Uri, Version};

use crate::body::RequestBody;
use crate::headers::{self, header_name, header_pair};
use crate::{Error, Origin};

/// Default limit on the size of a response header section.
pub const DEFAULT_HEADER_SIZE_LIMIT: usize = 16 * 1024;

/// Default limit on the size of a response body.
pub const DEFAULT_BODY_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

/// An HTTP request.
///
/// A `Request` is mutable until it is dispatched: interceptors receive it by
/// value and may rewrite any part of it before passing it on. Retrying
/// interceptors work on copies made with [`try_clone`](Request::try_clone),
/// so state attached to one attempt does not leak into the next.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use fetchwire_core::Request;
///
/// let request = Request::get("http://example.org/")?
///     .with_header("accept", "application/json")?
///     .with_transfer_timeout(Duration::from_secs(5));
/// ```
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: RequestBody,
    versions: Vec<Version>,
    attributes: Extensions,
    transfer_timeout: Option<Duration>,
    inactivity_timeout: Option<Duration>,
    header_size_limit: usize,
    body_size_limit: u64,
    discard_body: bool,
}

impl Request {
    /// Create a request with an empty body and default settings.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            versions: vec![Version::HTTP_11, Version::HTTP_10],
            attributes: Extensions::new(),
            transfer_timeout: None,
            inactivity_timeout: None,
            header_size_limit: DEFAULT_HEADER_SIZE_LIMIT,
            body_size_limit: DEFAULT_BODY_SIZE_LIMIT,
            discard_body: false,
        }
    }

    /// Create a request, parsing `uri`.
    pub fn builder<U>(method: Method, uri: U) -> Result<Self, Error>
    where
        U: TryInto<Uri>,
    {
        let uri = uri
            .try_into()
            .map_err(|_| Error::invalid_request("invalid URI"))?;
        Ok(Self::new(method, uri))
    }

    /// Create a `GET` request.
    pub fn get<U: TryInto<Uri>>(uri: U) -> Result<Self, Error> {
        Self::builder(Method::GET, uri)
    }

    /// Create a `POST` request with the given body.
    pub fn post<U: TryInto<Uri>>(uri: U, body: impl Into<RequestBody>) -> Result<Self, Error> {
        Ok(Self::builder(Method::POST, uri)?.with_body(body))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: Uri) {
        self.uri = uri;
    }

    /// The origin the request is addressed to.
    pub fn origin(&self) -> Result<Origin, Error> {
        Origin::from_uri(&self.uri)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The first value of `name`, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of `name`, in insertion order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        headers::header_values(&self.headers, name)
    }

    /// Replace all values of `name` with `value`.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<(), Error>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let (name, value) = header_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Append `value` to the values of `name`.
    pub fn add_header<K, V>(&mut self, name: K, value: V) -> Result<(), Error>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let (name, value) = header_pair(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Remove all values of `name`.
    pub fn remove_header<K>(&mut self, name: K) -> Result<(), Error>
    where
        K: TryInto<HeaderName>,
    {
        let name = header_name(name)?;
        self.headers.remove(name);
        Ok(())
    }

    /// Builder form of [`set_header`](Request::set_header).
    pub fn with_header<K, V>(mut self, name: K, value: V) -> Result<Self, Error>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        self.set_header(name, value)?;
        Ok(self)
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut RequestBody {
        &mut self.body
    }

    pub fn set_body(&mut self, body: impl Into<RequestBody>) {
        self.body = body.into();
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Take the body, leaving an empty one in its place.
    pub fn take_body(&mut self) -> RequestBody {
        std::mem::take(&mut self.body)
    }

    /// Acceptable protocol versions, most preferred first.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn set_versions(&mut self, versions: Vec<Version>) {
        self.versions = versions;
    }

    pub fn with_versions(mut self, versions: Vec<Version>) -> Self {
        self.versions = versions;
        self
    }

    /// Typed per-request scratch space for interceptors and listeners.
    pub fn attributes(&self) -> &Extensions {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Extensions {
        &mut self.attributes
    }

    /// Total time allowed from the start of the write until the response
    /// body has been received.
    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout
    }

    pub fn set_transfer_timeout(&mut self, timeout: Option<Duration>) {
        self.transfer_timeout = timeout;
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = Some(timeout);
        self
    }

    /// Maximum time a single socket read may wait for bytes.
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.inactivity_timeout
    }

    pub fn set_inactivity_timeout(&mut self, timeout: Option<Duration>) {
        self.inactivity_timeout = timeout;
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = Some(timeout);
        self
    }

    pub fn header_size_limit(&self) -> usize {
        self.header_size_limit
    }

    pub fn set_header_size_limit(&mut self, limit: usize) {
        self.header_size_limit = limit;
    }

    pub fn body_size_limit(&self) -> u64 {
        self.body_size_limit
    }

    pub fn set_body_size_limit(&mut self, limit: u64) {
        self.body_size_limit = limit;
    }

    /// When set, the response body is read from the socket and dropped, and
    /// the returned response carries an empty body.
    pub fn discard_body(&self) -> bool {
        self.discard_body
    }

    pub fn set_discard_body(&mut self, discard: bool) {
        self.discard_body = discard;
    }

    pub fn with_discard_body(mut self, discard: bool) -> Self {
        self.discard_body = discard;
        self
    }

    /// Copy the request, including its attributes.
    ///
    /// Returns `None` when the body is a stream, which can only be sent once.
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone()?,
            versions: self.versions.clone(),
            attributes: self.attributes.clone(),
            transfer_timeout: self.transfer_timeout,
            inactivity_timeout: self.inactivity_timeout,
            header_size_limit: self.header_size_limit,
            body_size_limit: self.body_size_limit,
            discard_body: self.discard_body,
        })
    }

    /// A copy of everything but the body, used to keep a record of what was
    /// sent while the body itself is consumed by the connection.
    pub fn head_clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone().unwrap_or_default(),
            versions: self.versions.clone(),
            attributes: self.attributes.clone(),
            transfer_timeout: self.transfer_timeout,
            inactivity_timeout: self.inactivity_timeout,
            header_size_limit: self.header_size_limit,
            body_size_limit: self.body_size_limit,
            discard_body: self.discard_body,
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("versions", &self.versions)
            .field("transfer_timeout", &self.transfer_timeout)
            .field("inactivity_timeout", &self.inactivity_timeout)
            .field("discard_body", &self.discard_body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req = Request::get("http://example.org/").unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.versions(), &[Version::HTTP_11, Version::HTTP_10]);
        assert_eq!(req.header_size_limit(), DEFAULT_HEADER_SIZE_LIMIT);
        assert_eq!(req.body_size_limit(), DEFAULT_BODY_SIZE_LIMIT);
        assert!(req.transfer_timeout().is_none());
        assert!(!req.discard_body());
    }

    #[test]
    fn test_request_headers_case_insensitive_and_ordered() {
        let mut req = Request::get("http://example.org/").unwrap();
        req.add_header("X-Trace", "a").unwrap();
        req.add_header("x-trace", "b").unwrap();
        assert_eq!(req.header_values("X-TRACE"), vec!["a", "b"]);

        req.set_header("x-trace", "c").unwrap();
        assert_eq!(req.header_values("x-trace"), vec!["c"]);

        req.remove_header("X-Trace").unwrap();
        assert!(req.header("x-trace").is_none());
    }

    #[test]
    fn test_request_invalid_header_is_error() {
        let mut req = Request::get("http://example.org/").unwrap();
        assert!(matches!(
            req.set_header("bad header", "v"),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_try_clone_copies_attributes() {
        #[derive(Clone, Debug, PartialEq)]
        struct Attempt(u32);

        let mut req = Request::post("http://example.org/", "payload").unwrap();
        req.attributes_mut().insert(Attempt(1));

        let mut clone = req.try_clone().unwrap();
        clone.attributes_mut().insert(Attempt(2));

        assert_eq!(req.attributes().get::<Attempt>(), Some(&Attempt(1)));
        assert_eq!(clone.attributes().get::<Attempt>(), Some(&Attempt(2)));
        assert_eq!(clone.body().length(), Some(7));
    }

    #[test]
    fn test_request_with_streaming_body_is_not_cloneable() {
        let stream = futures::stream::iter(vec![Ok(bytes::Bytes::from("x"))]);
        let req = Request::get("http://example.org/")
            .unwrap()
            .with_body(RequestBody::streaming(stream));
        assert!(req.try_clone().is_none());

        let head = req.head_clone();
        assert_eq!(head.uri(), req.uri());
        assert_eq!(head.body().length(), Some(0));
    }

    #[test]
    fn test_request_rejects_invalid_uri() {
        assert!(matches!(
            Request::get("http://exa mple.org/"),
            Err(Error::InvalidRequest(_))
        ));
    }
}
