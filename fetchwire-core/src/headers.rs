//! Header multimap helpers shared by requests and responses.
//!
//! Both [`Request`](crate::Request) and [`Response`](crate::Response) store
//! headers in an [`http::HeaderMap`]: names are case-insensitive and values
//! for the same name keep their insertion order.

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::Error;

/// Convert a name/value pair, reporting failures as [`Error::InvalidRequest`].
pub(crate) fn header_pair<K, V>(name: K, value: V) -> Result<(HeaderName, HeaderValue), Error>
where
    K: TryInto<HeaderName>,
    V: TryInto<HeaderValue>,
{
    let name = name
        .try_into()
        .map_err(|_| Error::invalid_request("invalid header name"))?;
    let value = value
        .try_into()
        .map_err(|_| Error::invalid_request(format!("invalid value for header {}", name)))?;
    Ok((name, value))
}

pub(crate) fn header_name<K>(name: K) -> Result<HeaderName, Error>
where
    K: TryInto<HeaderName>,
{
    name.try_into()
        .map_err(|_| Error::invalid_request("invalid header name"))
}

/// All values of `name` as strings, in insertion order. Values that are not
/// visible ASCII are skipped.
pub fn header_values<'a>(headers: &'a HeaderMap, name: &str) -> Vec<&'a str> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect()
}

/// Whether a comma-separated header (such as `Connection`) contains `token`,
/// compared case-insensitively.
pub fn has_token(headers: &HeaderMap, name: &str, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}
