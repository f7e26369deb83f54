//! Header mutators.
//!
//! Each one works in either chain. Request mutators act before calling
//! `next`, response mutators after it returns.
//!
//! ```ignore
//! let client = HttpClient::builder()
//!     .intercept(SetRequestHeader::try_new("authorization", "Bearer token123")?)
//!     .intercept_network(RemoveResponseHeader::try_new("server")?)
//!     .build()?;
//! ```

use fetchwire_core::{Error, Request, Response};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

use crate::connection::StreamInfo;
use crate::interceptor::{
    ApplicationInterceptor, ApplicationNext, BoxFuture, NetworkInterceptor, NetworkNext,
};

fn parse_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let name = HeaderName::try_from(name)
        .map_err(|_| Error::invalid_request(format!("invalid header name: {}", name)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|_| Error::invalid_request(format!("invalid header value: {}", value)))?;
    Ok((name, value))
}

fn parse_name(name: &str) -> Result<HeaderName, Error> {
    HeaderName::try_from(name)
        .map_err(|_| Error::invalid_request(format!("invalid header name: {}", name)))
}

/// Implements both chains for a type with `on_request`/`on_response`.
macro_rules! header_interceptor {
    ($ty:ident) => {
        impl ApplicationInterceptor for $ty {
            fn intercept<'a>(
                &'a self,
                mut request: Request,
                next: ApplicationNext,
            ) -> BoxFuture<'a, Result<Response, Error>> {
                Box::pin(async move {
                    self.on_request(request.headers_mut());
                    let mut response = next.run(request).await?;
                    self.on_response(response.headers_mut());
                    Ok(response)
                })
            }

            fn name(&self) -> &str {
                stringify!($ty)
            }
        }

        impl NetworkInterceptor for $ty {
            fn intercept<'a>(
                &'a self,
                mut request: Request,
                _stream: StreamInfo,
                next: NetworkNext,
            ) -> BoxFuture<'a, Result<Response, Error>> {
                Box::pin(async move {
                    self.on_request(request.headers_mut());
                    let mut response = next.run(request).await?;
                    self.on_response(response.headers_mut());
                    Ok(response)
                })
            }

            fn name(&self) -> &str {
                stringify!($ty)
            }
        }
    };
}

/// Replace every value of a request header.
#[derive(Clone, Debug)]
pub struct SetRequestHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl SetRequestHeader {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    pub fn try_new(name: &str, value: &str) -> Result<Self, Error> {
        let (name, value) = parse_pair(name, value)?;
        Ok(Self { name, value })
    }

    fn on_request(&self, headers: &mut HeaderMap) {
        headers.insert(self.name.clone(), self.value.clone());
    }

    fn on_response(&self, _headers: &mut HeaderMap) {}
}

header_interceptor!(SetRequestHeader);

/// Append a value to a request header.
#[derive(Clone, Debug)]
pub struct AddRequestHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl AddRequestHeader {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    pub fn try_new(name: &str, value: &str) -> Result<Self, Error> {
        let (name, value) = parse_pair(name, value)?;
        Ok(Self { name, value })
    }

    fn on_request(&self, headers: &mut HeaderMap) {
        headers.append(self.name.clone(), self.value.clone());
    }

    fn on_response(&self, _headers: &mut HeaderMap) {}
}

header_interceptor!(AddRequestHeader);

#[derive(Clone, Debug)]
pub struct RemoveRequestHeader {
    name: HeaderName,
}

impl RemoveRequestHeader {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }

    pub fn try_new(name: &str) -> Result<Self, Error> {
        Ok(Self {
            name: parse_name(name)?,
        })
    }

    fn on_request(&self, headers: &mut HeaderMap) {
        headers.remove(&self.name);
    }

    fn on_response(&self, _headers: &mut HeaderMap) {}
}

header_interceptor!(RemoveRequestHeader);

/// Replace every value of a response header.
#[derive(Clone, Debug)]
pub struct SetResponseHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl SetResponseHeader {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    pub fn try_new(name: &str, value: &str) -> Result<Self, Error> {
        let (name, value) = parse_pair(name, value)?;
        Ok(Self { name, value })
    }

    fn on_request(&self, _headers: &mut HeaderMap) {}

    fn on_response(&self, headers: &mut HeaderMap) {
        headers.insert(self.name.clone(), self.value.clone());
    }
}

header_interceptor!(SetResponseHeader);

/// Append a value to a response header.
#[derive(Clone, Debug)]
pub struct AddResponseHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl AddResponseHeader {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    pub fn try_new(name: &str, value: &str) -> Result<Self, Error> {
        let (name, value) = parse_pair(name, value)?;
        Ok(Self { name, value })
    }

    fn on_request(&self, _headers: &mut HeaderMap) {}

    fn on_response(&self, headers: &mut HeaderMap) {
        headers.append(self.name.clone(), self.value.clone());
    }
}

header_interceptor!(AddResponseHeader);

#[derive(Clone, Debug)]
pub struct RemoveResponseHeader {
    name: HeaderName,
}

impl RemoveResponseHeader {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }

    pub fn try_new(name: &str) -> Result<Self, Error> {
        Ok(Self {
            name: parse_name(name)?,
        })
    }

    fn on_request(&self, _headers: &mut HeaderMap) {}

    fn on_response(&self, headers: &mut HeaderMap) {
        headers.remove(&self.name);
    }
}

header_interceptor!(RemoveResponseHeader);
