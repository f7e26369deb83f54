use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fetchwire_core::{Error, Origin, Request, Response};

use crate::interceptor::{ApplicationInterceptor, ApplicationNext, BoxFuture};

/// Route a request to the interceptor registered for its origin.
///
/// Requests to other origins go to the fallback interceptor if one is set, and
/// straight down the chain otherwise.
///
/// ```ignore
/// let api = Origin::from_uri(&"https://api.example.org".parse()?)?;
/// let routing = MatchOrigin::new()
///     .route(api, SetRequestHeader::try_new("authorization", "Bearer t")?)
///     .fallback(RemoveRequestHeader::try_new("authorization")?);
/// ```
#[derive(Default)]
pub struct MatchOrigin {
    routes: HashMap<Origin, Arc<dyn ApplicationInterceptor>>,
    fallback: Option<Arc<dyn ApplicationInterceptor>>,
}

impl MatchOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<I: ApplicationInterceptor>(mut self, origin: Origin, interceptor: I) -> Self {
        self.routes.insert(origin, Arc::new(interceptor));
        self
    }

    pub fn fallback<I: ApplicationInterceptor>(mut self, interceptor: I) -> Self {
        self.fallback = Some(Arc::new(interceptor));
        self
    }

    fn select(&self, origin: &Origin) -> Option<&Arc<dyn ApplicationInterceptor>> {
        self.routes.get(origin).or(self.fallback.as_ref())
    }
}

impl fmt::Debug for MatchOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchOrigin")
            .field("origins", &self.routes.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ApplicationInterceptor for MatchOrigin {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: ApplicationNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        let origin = match request.origin() {
            Ok(origin) => origin,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        match self.select(&origin) {
            Some(interceptor) => interceptor.intercept(request, next),
            None => next.run(request),
        }
    }

    fn name(&self) -> &str {
        "MatchOrigin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpClient;
    use crate::interceptor::FnApplicationInterceptor;
    use crate::interceptors::SetRequestHeader;
    use fetchwire_core::{Scheme, StatusCode};

    #[tokio::test]
    async fn test_routes_by_origin() {
        let routing = MatchOrigin::new()
            .route(
                Origin::new(Scheme::Https, "api.example.org", 443),
                SetRequestHeader::try_new("x-route", "api").unwrap(),
            )
            .fallback(SetRequestHeader::try_new("x-route", "default").unwrap());
        let echo = FnApplicationInterceptor::new(|req: Request, _next: ApplicationNext| {
            Box::pin(async move {
                let route = req.header("x-route").unwrap_or("none").to_string();
                let mut response = Response::new(Arc::new(req), StatusCode::OK);
                response.set_header("x-route", route)?;
                Ok(response)
            })
        });
        let client = HttpClient::builder()
            .intercept(routing)
            .intercept(echo)
            .build()
            .unwrap();

        let response = client
            .execute(Request::get("https://api.example.org/v1").unwrap())
            .await
            .unwrap();
        assert_eq!(response.header("x-route"), Some("api"));

        let response = client
            .execute(Request::get("http://api.example.org/v1").unwrap())
            .await
            .unwrap();
        assert_eq!(response.header("x-route"), Some("default"));
    }

    #[test]
    fn test_new_starts_without_routes() {
        let routing = MatchOrigin::new();
        assert!(routing.routes.is_empty());
        assert!(routing.fallback.is_none());
        assert_eq!(format!("{routing:?}"), "MatchOrigin { origins: [], fallback: false }");
    }

    #[test]
    fn test_without_fallback_passes_through() {
        let routing = MatchOrigin::new();
        assert!(routing.select(&Origin::new(Scheme::Http, "example.org", 80)).is_none());
    }
}
