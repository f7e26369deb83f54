//! Connection targets.

use std::fmt;

use http::Uri;

use crate::Error;

/// URI scheme supported by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// The port implied when a URI does not carry one.
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Scheme::Https)
    }
}

/// Scheme, host and port identifying a connection target.
///
/// Two requests share pooled connections if and only if their origins are
/// equal. Hosts are compared case-insensitively (they are stored lowercase).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Origin {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Extract the origin of an absolute `http` or `https` URI.
    pub fn from_uri(uri: &Uri) -> Result<Self, Error> {
        let scheme = match uri.scheme_str() {
            Some(s) if s.eq_ignore_ascii_case("http") => Scheme::Http,
            Some(s) if s.eq_ignore_ascii_case("https") => Scheme::Https,
            Some(other) => {
                return Err(Error::invalid_request(format!(
                    "unsupported URI scheme: {}",
                    other
                )));
            }
            None => {
                return Err(Error::invalid_request(format!(
                    "URI is not absolute: {}",
                    uri
                )));
            }
        };
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::invalid_request(format!("URI has no host: {}", uri)))?;
        let port = uri.port_u16().unwrap_or_else(|| scheme.default_port());
        Ok(Self::new(scheme, host, port))
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The host, lowercase, with IPv6 literals still bracketed.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The host without IPv6 brackets, suitable for DNS and TLS SNI.
    pub fn hostname(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the port equals the scheme's default port.
    pub fn has_default_port(&self) -> bool {
        self.port == self.scheme.default_port()
    }

    /// The value of a `Host` header for this origin: the port is omitted
    /// when it is the scheme default.
    pub fn authority(&self) -> String {
        if self.has_default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}
