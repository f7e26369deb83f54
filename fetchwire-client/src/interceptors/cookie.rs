//! Cookie storage and the interceptor that applies it.
//!
//! Matching follows RFC 6265: §5.1.3 for domains and §5.1.4 for paths.
//! Public-suffix checks are up to the [`CookieJar`] implementation.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use fetchwire_core::{Error, Request, Response, Scheme};
use http::Uri;
use http::header::{COOKIE, HeaderValue, SET_COOKIE};

use crate::interceptor::{ApplicationInterceptor, ApplicationNext, BoxFuture};

/// Upper bound for `Max-Age`, 400 days (RFC 6265bis §5.5).
const MAX_AGE_CAP: u64 = 400 * 24 * 60 * 60;

/// A cookie as stored in a jar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lowercase, without a leading dot.
    pub domain: String,
    /// Set when the cookie had no `Domain` attribute and only matches its
    /// exact origin host.
    pub host_only: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// `None` for session cookies.
    pub expires: Option<SystemTime>,
}

impl Cookie {
    /// Parse a `Set-Cookie` value received in response to `uri`.
    ///
    /// Returns `None` for malformed values and for cookies whose `Domain`
    /// does not cover the request host. The `Expires` attribute is ignored;
    /// use `Max-Age` for persistent cookies.
    pub fn parse(set_cookie: &str, uri: &Uri) -> Option<Self> {
        let host = uri.host()?.to_ascii_lowercase();
        let mut parts = set_cookie.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: host.clone(),
            host_only: true,
            path: default_path(uri.path()),
            secure: false,
            http_only: false,
            expires: None,
        };

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attribute.trim(), ""),
            };
            if key.eq_ignore_ascii_case("domain") {
                let domain = val.trim_start_matches('.').to_ascii_lowercase();
                if domain.is_empty() {
                    continue;
                }
                if !domain_match(&host, &domain) {
                    return None;
                }
                cookie.domain = domain;
                cookie.host_only = false;
            } else if key.eq_ignore_ascii_case("path") {
                if val.starts_with('/') {
                    cookie.path = val.to_string();
                }
            } else if key.eq_ignore_ascii_case("max-age") {
                if let Ok(seconds) = val.parse::<i64>() {
                    cookie.expires = Some(if seconds <= 0 {
                        SystemTime::UNIX_EPOCH
                    } else {
                        SystemTime::now() + Duration::from_secs((seconds as u64).min(MAX_AGE_CAP))
                    });
                }
            } else if key.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if key.eq_ignore_ascii_case("httponly") {
                cookie.http_only = true;
            }
        }

        Some(cookie)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    /// Whether the cookie should be sent to `host`.
    pub fn matches_domain(&self, host: &str) -> bool {
        if self.host_only {
            self.domain.eq_ignore_ascii_case(host)
        } else {
            domain_match(host, &self.domain)
        }
    }

    /// Whether two cookies occupy the same slot in a jar.
    fn same_slot(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// RFC 6265 §5.1.3.
pub(crate) fn domain_match(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    if host == domain {
        return true;
    }
    host.ends_with(&domain)
        && host[..host.len() - domain.len()].ends_with('.')
        && host.parse::<std::net::IpAddr>().is_err()
}

/// RFC 6265 §5.1.4.
pub(crate) fn path_match(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// The default cookie path for a request path (RFC 6265 §5.1.4).
pub(crate) fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => request_path[..i].to_string(),
    }
}

/// Storage for cookies.
///
/// Implementations can add public-suffix rules or persistence; the
/// interceptor only relies on these four operations.
pub trait CookieJar: Send + Sync + 'static {
    /// Unexpired cookies matching `domain` and `path`, optionally filtered by
    /// name.
    fn get(&self, domain: &str, path: &str, name: Option<&str>) -> Vec<Cookie>;

    /// Store a cookie, replacing any with the same name, domain and path.
    fn store(&self, cookie: Cookie);

    fn remove(&self, cookie: &Cookie);

    fn remove_all(&self);
}

/// A process-local [`CookieJar`].
#[derive(Debug, Default)]
pub struct InMemoryCookieJar {
    cookies: Mutex<Vec<Cookie>>,
}

impl InMemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_cookies<T>(&self, f: impl FnOnce(&mut Vec<Cookie>) -> T) -> T {
        let mut cookies = self.cookies.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut cookies)
    }
}

impl CookieJar for InMemoryCookieJar {
    fn get(&self, domain: &str, path: &str, name: Option<&str>) -> Vec<Cookie> {
        let now = SystemTime::now();
        self.with_cookies(|cookies| {
            cookies.retain(|c| !c.is_expired(now));
            cookies
                .iter()
                .filter(|c| c.matches_domain(domain) && path_match(path, &c.path))
                .filter(|c| name.is_none_or(|n| c.name == n))
                .cloned()
                .collect()
        })
    }

    fn store(&self, cookie: Cookie) {
        self.with_cookies(|cookies| {
            cookies.retain(|c| !c.same_slot(&cookie));
            cookies.push(cookie);
        });
    }

    fn remove(&self, cookie: &Cookie) {
        self.with_cookies(|cookies| cookies.retain(|c| !c.same_slot(cookie)));
    }

    fn remove_all(&self) {
        self.with_cookies(|cookies| cookies.clear());
    }
}

/// Send cookies from a jar and store the ones the server sets.
///
/// Cookies set on a request by the caller are kept and the jar's cookies are
/// appended to them. Register it after [`FollowRedirects`] so every hop
/// carries the cookies for its own origin.
///
/// [`FollowRedirects`]: crate::FollowRedirects
///
/// ```ignore
/// let jar = Arc::new(InMemoryCookieJar::new());
/// let client = HttpClient::builder()
///     .intercept(CookieHandler::new(jar.clone()))
///     .build()?;
/// ```
#[derive(Clone)]
pub struct CookieHandler {
    jar: Arc<dyn CookieJar>,
}

impl CookieHandler {
    pub fn new(jar: Arc<dyn CookieJar>) -> Self {
        Self { jar }
    }

    pub fn jar(&self) -> &Arc<dyn CookieJar> {
        &self.jar
    }

    fn attach(&self, request: &mut Request) -> Result<(), Error> {
        let origin = request.origin()?;
        let mut cookies = self.jar.get(origin.hostname(), request.uri().path(), None);
        if origin.scheme() != Scheme::Https {
            cookies.retain(|c| !c.secure);
        }
        if cookies.is_empty() {
            return Ok(());
        }
        // Longer paths first (RFC 6265 §5.4).
        cookies.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        let mut header = request.header("cookie").unwrap_or_default().to_string();
        for cookie in &cookies {
            if !header.is_empty() {
                header.push_str("; ");
            }
            header.push_str(&cookie.to_string());
        }
        let value = HeaderValue::try_from(header)
            .map_err(|_| Error::invalid_request("invalid cookie value in jar"))?;
        request.headers_mut().insert(COOKIE, value);
        Ok(())
    }

    fn collect(&self, response: &Response) {
        let uri = response.request().uri();
        for value in response.headers().get_all(SET_COOKIE) {
            let Some(cookie) = value.to_str().ok().and_then(|v| Cookie::parse(v, uri)) else {
                continue;
            };
            if cookie.is_expired(SystemTime::now()) {
                self.jar.remove(&cookie);
            } else {
                self.jar.store(cookie);
            }
        }
    }
}

impl fmt::Debug for CookieHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieHandler").finish_non_exhaustive()
    }
}

impl ApplicationInterceptor for CookieHandler {
    fn intercept<'a>(
        &'a self,
        mut request: Request,
        next: ApplicationNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            self.attach(&mut request)?;
            let response = next.run(request).await?;
            self.collect(&response);
            Ok(response)
        })
    }

    fn name(&self) -> &str {
        "CookieHandler"
    }
}
