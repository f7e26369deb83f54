//! Following `3xx` redirects.

use fetchwire_core::{Error, Request, RequestBody, Response};
use http::header::{self, HeaderMap};
use http::{Method, StatusCode, Uri};

use crate::interceptor::{ApplicationInterceptor, ApplicationNext, BoxFuture};

/// Follow redirect responses.
///
/// Handles 301, 302, 303, 307 and 308 responses that carry a `Location`:
///
/// - 303, and 301/302 answering anything but GET or HEAD, are followed with a
///   body-less GET. 307 and 308 repeat the method and body.
/// - Credentials (`Authorization`, `Proxy-Authorization`, `Cookie`) are
///   dropped once the request leaves its original origin.
/// - A redirect that would have to resend a streaming body is not followed;
///   the redirect response is returned instead.
/// - Every response after the first links to the one before it through
///   [`Response::previous_response`].
///
/// More than `max` hops is a protocol error.
#[derive(Clone, Copy, Debug)]
pub struct FollowRedirects {
    max: usize,
}

impl FollowRedirects {
    pub fn new(max: usize) -> Self {
        Self { max }
    }

    pub fn max_redirects(&self) -> usize {
        self.max
    }
}

impl Default for FollowRedirects {
    fn default() -> Self {
        Self::new(crate::builder::DEFAULT_MAX_REDIRECTS)
    }
}

/// The `Location` of a followable redirect.
fn location(response: &Response) -> Option<&str> {
    match response.status() {
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::SEE_OTHER
        | StatusCode::TEMPORARY_REDIRECT
        | StatusCode::PERMANENT_REDIRECT => response.header("location").filter(|l| !l.is_empty()),
        _ => None,
    }
}

fn switches_to_get(status: StatusCode, method: &Method) -> bool {
    match status {
        StatusCode::SEE_OTHER => *method != Method::HEAD,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => {
            *method != Method::GET && *method != Method::HEAD
        }
        _ => false,
    }
}

fn strip_body_headers(headers: &mut HeaderMap) {
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::TRANSFER_ENCODING);
}

fn strip_credentials(headers: &mut HeaderMap) {
    headers.remove(header::AUTHORIZATION);
    headers.remove(header::PROXY_AUTHORIZATION);
    headers.remove(header::COOKIE);
}

/// Resolve a `Location` value against the URI that produced it.
pub(crate) fn resolve(base: &Uri, location: &str) -> Result<Uri, Error> {
    let location = location.split('#').next().unwrap_or_default().trim();
    let invalid = |_| Error::protocol(format!("invalid redirect location: {}", location));

    if has_scheme(location) {
        return location.parse::<Uri>().map_err(invalid);
    }

    let scheme = base.scheme_str().unwrap_or("http");
    if location.starts_with("//") {
        return format!("{}:{}", scheme, location).parse().map_err(invalid);
    }

    let authority = base
        .authority()
        .map(|a| a.as_str())
        .ok_or_else(|| Error::invalid_request(format!("URI is not absolute: {}", base)))?;
    let (path, query) = match location.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (location, None),
    };

    let path = if path.is_empty() {
        base.path().to_string()
    } else if path.starts_with('/') {
        remove_dot_segments(path)
    } else {
        let base_path = base.path();
        let dir = match base_path.rfind('/') {
            Some(i) => &base_path[..=i],
            None => "/",
        };
        remove_dot_segments(&format!("{}{}", dir, path))
    };
    let query = match query {
        Some(query) => Some(query),
        None if location.is_empty() => base.query(),
        None => None,
    };

    let mut uri = format!("{}://{}{}", scheme, authority, path);
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(query);
    }
    uri.parse().map_err(invalid)
}

fn has_scheme(location: &str) -> bool {
    match location.find(':') {
        Some(i) if i > 0 => {
            let scheme = &location[..i];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// RFC 3986 §5.2.4.
fn remove_dot_segments(path: &str) -> String {
    let mut output: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => {
                if i == last {
                    output.push("");
                }
            }
            ".." => {
                if output.len() > 1 {
                    output.pop();
                }
                if i == last {
                    output.push("");
                }
            }
            s => output.push(s),
        }
    }
    let joined = output.join("/");
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{}", joined)
    }
}

impl ApplicationInterceptor for FollowRedirects {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: ApplicationNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let (mut template, mut replayable) = match request.try_clone() {
                Some(copy) => (copy, true),
                None => (request.head_clone(), false),
            };
            let mut response = next.run(request).await?;
            let mut hops = 0;

            loop {
                let Some(location) = location(&response) else {
                    return Ok(response);
                };
                let target = resolve(template.uri(), location)?;
                let to_get = switches_to_get(response.status(), template.method());
                if !replayable && !to_get {
                    return Ok(response);
                }
                if hops == self.max {
                    return Err(Error::protocol(format!(
                        "too many redirects (limit {})",
                        self.max
                    )));
                }
                hops += 1;

                if to_get {
                    template.set_method(Method::GET);
                    template.set_body(RequestBody::empty());
                    strip_body_headers(template.headers_mut());
                    replayable = true;
                }
                let previous_origin = template.origin()?;
                template.set_uri(target);
                if template.origin()? != previous_origin {
                    strip_credentials(template.headers_mut());
                }
                template.headers_mut().remove(header::HOST);

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    status = response.status().as_u16(),
                    location = %template.uri(),
                    hop = hops,
                    "following redirect"
                );

                // Reading the old body to the end lets its connection go back
                // to the pool. A failed drain only costs that connection.
                let mut stale = response.take_body();
                while let Ok(Some(_)) = stale.chunk().await {}

                let Some(attempt) = template.try_clone() else {
                    return Ok(response);
                };
                let mut next_response = next.run(attempt).await?;
                next_response.set_previous_response(response);
                response = next_response;
            }
        })
    }

    fn name(&self) -> &str {
        "FollowRedirects"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpClient;
    use crate::interceptor::FnApplicationInterceptor;
    use std::sync::{Arc, Mutex};

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_resolve_location() {
        let base = uri("http://example.org/a/b/c?q=1");
        assert_eq!(resolve(&base, "https://other.org/x").unwrap(), uri("https://other.org/x"));
        assert_eq!(resolve(&base, "//cdn.example.org/y").unwrap(), uri("http://cdn.example.org/y"));
        assert_eq!(resolve(&base, "/root?z=2").unwrap(), uri("http://example.org/root?z=2"));
        assert_eq!(resolve(&base, "d").unwrap(), uri("http://example.org/a/b/d"));
        assert_eq!(resolve(&base, "../d").unwrap(), uri("http://example.org/a/d"));
        assert_eq!(resolve(&base, "./").unwrap(), uri("http://example.org/a/b/"));
        assert_eq!(resolve(&base, "?only=query").unwrap(), uri("http://example.org/a/b/c?only=query"));
        assert_eq!(resolve(&base, "/frag#section").unwrap(), uri("http://example.org/frag"));
        assert_eq!(resolve(&base, "../../../../up").unwrap(), uri("http://example.org/up"));
    }

    #[test]
    fn test_method_switching() {
        assert!(switches_to_get(StatusCode::SEE_OTHER, &Method::POST));
        assert!(switches_to_get(StatusCode::SEE_OTHER, &Method::GET));
        assert!(!switches_to_get(StatusCode::SEE_OTHER, &Method::HEAD));
        assert!(switches_to_get(StatusCode::FOUND, &Method::POST));
        assert!(!switches_to_get(StatusCode::FOUND, &Method::GET));
        assert!(!switches_to_get(StatusCode::TEMPORARY_REDIRECT, &Method::POST));
        assert!(!switches_to_get(StatusCode::PERMANENT_REDIRECT, &Method::PUT));
    }

    /// Answers from a table of `path -> (status, location)` and records what
    /// each hop saw.
    fn redirector(
        routes: Vec<(&'static str, u16, Option<&'static str>)>,
        seen: Arc<Mutex<Vec<Request>>>,
    ) -> FnApplicationInterceptor<
        impl Fn(Request, ApplicationNext) -> BoxFuture<'static, Result<Response, Error>> + Send + Sync + 'static,
    > {
        FnApplicationInterceptor::new(move |req: Request, _next: ApplicationNext| {
            seen.lock().unwrap().push(req.head_clone());
            let route = routes
                .iter()
                .find(|(path, _, _)| *path == req.uri().path())
                .cloned();
            Box::pin(async move {
                let (_, status, location) = route.unwrap_or(("", 404, None));
                let mut response =
                    Response::new(Arc::new(req), StatusCode::from_u16(status).unwrap());
                if let Some(location) = location {
                    response.set_header("location", location)?;
                }
                Ok(response)
            })
        })
    }

    #[tokio::test]
    async fn test_follows_and_links_previous() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = HttpClient::builder()
            .intercept(redirector(
                vec![
                    ("/start", 302, Some("/middle")),
                    ("/middle", 301, Some("http://other.example.org/end")),
                    ("/end", 200, None),
                ],
                seen.clone(),
            ))
            .build()
            .unwrap();

        let request = Request::get("http://example.org/start")
            .unwrap()
            .with_header("authorization", "secret")
            .unwrap();
        let response = client.execute(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.request().uri(), &uri("http://other.example.org/end"));
        let previous = response.previous_response().unwrap();
        assert_eq!(previous.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(previous.previous_response().unwrap().status(), StatusCode::FOUND);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].header("authorization"), Some("secret"));
        assert_eq!(seen[2].header("authorization"), None);
    }

    #[tokio::test]
    async fn test_see_other_switches_to_get() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = HttpClient::builder()
            .intercept(redirector(
                vec![("/form", 303, Some("/done")), ("/done", 200, None)],
                seen.clone(),
            ))
            .build()
            .unwrap();

        let request = Request::post("http://example.org/form", "name=value")
            .unwrap()
            .with_header("content-type", "application/x-www-form-urlencoded")
            .unwrap();
        client.execute(request).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[1].method(), Method::GET);
        assert_eq!(seen[1].body().length(), Some(0));
        assert_eq!(seen[1].header("content-type"), None);
    }

    #[tokio::test]
    async fn test_temporary_redirect_keeps_method_and_body() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = HttpClient::builder()
            .intercept(redirector(
                vec![("/a", 307, Some("/b")), ("/b", 200, None)],
                seen.clone(),
            ))
            .build()
            .unwrap();

        client
            .execute(Request::post("http://example.org/a", "payload").unwrap())
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[1].method(), Method::POST);
        assert_eq!(seen[1].body().length(), Some(7));
    }

    #[tokio::test]
    async fn test_too_many_redirects() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = HttpClient::builder()
            .follow_redirects(2)
            .intercept(redirector(vec![("/loop", 302, Some("/loop"))], seen.clone()))
            .build()
            .unwrap();

        let err = client
            .execute(Request::get("http://example.org/loop").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_streaming_body_is_not_replayed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = HttpClient::builder()
            .intercept(redirector(
                vec![("/upload", 307, Some("/elsewhere")), ("/elsewhere", 200, None)],
                seen.clone(),
            ))
            .build()
            .unwrap();
        let body = RequestBody::streaming(futures::stream::iter(vec![Ok(bytes::Bytes::from("x"))]));

        let response = client
            .execute(Request::builder(Method::PUT, "http://example.org/upload").unwrap().with_body(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_returns_redirect() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = HttpClient::builder()
            .no_redirects()
            .intercept(redirector(vec![("/a", 302, Some("/b"))], seen.clone()))
            .build()
            .unwrap();

        let response = client
            .execute(Request::get("http://example.org/a").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }
}
