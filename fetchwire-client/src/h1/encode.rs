//! Request normalization and serialization.

use bytes::{BufMut, Bytes, BytesMut};
use fetchwire_core::headers::has_token;
use fetchwire_core::{Error, Origin, Request, RequestBody};
use http::header::{self, HeaderValue};
use http::{Method, Version};
use http_body_util::BodyExt;
use tokio::io::AsyncWriteExt;

use crate::transport::Socket;

/// How the request body is delimited on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RequestFraming {
    /// No body bytes are sent.
    Empty,
    /// `Content-Length` framing with the exact byte count.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
}

/// Pick the newest HTTP/1.x version the request accepts.
pub(crate) fn negotiate_version(versions: &[Version]) -> Option<Version> {
    if versions.contains(&Version::HTTP_11) {
        Some(Version::HTTP_11)
    } else if versions.contains(&Version::HTTP_10) {
        Some(Version::HTTP_10)
    } else {
        None
    }
}

fn method_defines_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Fill in the headers the wire format needs and decide the body framing.
pub(crate) fn normalize(
    request: &mut Request,
    origin: &Origin,
    version: Version,
    user_agent: &HeaderValue,
) -> Result<RequestFraming, Error> {
    if request.method() == Method::TRACE {
        // RFC 7231 section 4.3.8: TRACE carries no body and must not echo
        // credentials back.
        drop(request.take_body());
        let headers = request.headers_mut();
        headers.remove(header::TRANSFER_ENCODING);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::AUTHORIZATION);
        headers.remove(header::PROXY_AUTHORIZATION);
        headers.remove(header::COOKIE);
    }

    let declared = declared_length(request)?;
    let framing = match request.body().length().or(declared) {
        Some(0) => RequestFraming::Empty,
        Some(len) => RequestFraming::Length(len),
        None if version == Version::HTTP_10 => {
            return Err(Error::invalid_request(
                "a body of unknown length cannot be sent over HTTP/1.0",
            ));
        }
        None => RequestFraming::Chunked,
    };

    let send_zero_length = method_defines_body(request.method());
    let headers = request.headers_mut();
    match framing {
        RequestFraming::Empty => {
            headers.remove(header::TRANSFER_ENCODING);
            if send_zero_length {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
            } else {
                headers.remove(header::CONTENT_LENGTH);
            }
        }
        RequestFraming::Length(len) => {
            headers.remove(header::TRANSFER_ENCODING);
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        RequestFraming::Chunked => {
            headers.remove(header::CONTENT_LENGTH);
            headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        }
    }

    if !headers.contains_key(header::USER_AGENT) {
        headers.insert(header::USER_AGENT, user_agent.clone());
    }
    if !headers.contains_key(header::ACCEPT) {
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    }

    let host = match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => strip_default_port(host, origin),
        None => origin.authority(),
    };
    let host = HeaderValue::try_from(host)
        .map_err(|_| Error::invalid_request("invalid Host header"))?;
    headers.insert(header::HOST, host);

    Ok(framing)
}

fn declared_length(request: &Request) -> Result<Option<u64>, Error> {
    match request.headers().get(header::CONTENT_LENGTH) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| Error::invalid_request("invalid Content-Length header")),
        None => Ok(None),
    }
}

fn strip_default_port(host: &str, origin: &Origin) -> String {
    let suffix = format!(":{}", origin.scheme().default_port());
    match host.strip_suffix(suffix.as_str()) {
        Some(bare) if !bare.is_empty() && !bare.ends_with(':') => bare.to_string(),
        _ => host.to_string(),
    }
}

/// Serialize the request line and header section. `Host` goes first.
pub(crate) fn encode_head(request: &Request, version: Version) -> BytesMut {
    let target = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .unwrap_or("/");
    let version = if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    };

    let mut buf = BytesMut::with_capacity(256);
    buf.put_slice(request.method().as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(target.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(version.as_bytes());
    buf.put_slice(b"\r\n");

    let headers = request.headers();
    if let Some(host) = headers.get(header::HOST) {
        put_header(&mut buf, "host", host);
    }
    for (name, value) in headers.iter() {
        if name != header::HOST {
            put_header(&mut buf, name.as_str(), value);
        }
    }
    buf.put_slice(b"\r\n");
    buf
}

fn put_header(buf: &mut BytesMut, name: &str, value: &HeaderValue) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}

/// Whether the client asked the server to close the connection. An HTTP/1.0
/// request is non-persistent unless it asks for keep-alive.
pub(crate) fn requested_close(request: &Request, version: Version) -> bool {
    let headers = request.headers();
    if has_token(headers, "connection", "close") {
        return true;
    }
    version == Version::HTTP_10 && !has_token(headers, "connection", "keep-alive")
}

/// Write the body with the chosen framing. `progress` receives the running
/// total after every chunk. Returns the number of body bytes written.
pub(crate) async fn write_body(
    socket: &mut Box<dyn Socket>,
    mut body: RequestBody,
    framing: RequestFraming,
    mut progress: impl FnMut(u64),
) -> Result<u64, Error> {
    let mut sent = 0u64;
    if framing == RequestFraming::Empty {
        // A declared length of zero still requires the body to be empty.
        return match next_chunk(&mut body).await? {
            Some(_) => Err(Error::invalid_request(
                "request body is longer than its declared Content-Length",
            )),
            None => Ok(0),
        };
    }

    while let Some(chunk) = next_chunk(&mut body).await? {
        sent += chunk.len() as u64;
        match framing {
            RequestFraming::Length(len) if sent > len => {
                return Err(Error::invalid_request(
                    "request body is longer than its declared Content-Length",
                ));
            }
            RequestFraming::Chunked => {
                let size = format!("{:x}\r\n", chunk.len());
                socket.write_all(size.as_bytes()).await.map_err(Error::socket)?;
                socket.write_all(&chunk).await.map_err(Error::socket)?;
                socket.write_all(b"\r\n").await.map_err(Error::socket)?;
            }
            _ => socket.write_all(&chunk).await.map_err(Error::socket)?,
        }
        progress(sent);
    }

    match framing {
        RequestFraming::Length(len) if sent != len => {
            return Err(Error::invalid_request(format!(
                "request body is {} bytes but Content-Length declared {}",
                sent, len
            )));
        }
        RequestFraming::Chunked => {
            socket.write_all(b"0\r\n\r\n").await.map_err(Error::socket)?;
        }
        _ => {}
    }
    Ok(sent)
}

async fn next_chunk(body: &mut RequestBody) -> Result<Option<Bytes>, Error> {
    while let Some(frame) = body.frame().await {
        if let Ok(data) = frame?.into_data() {
            if !data.is_empty() {
                return Ok(Some(data));
            }
        }
    }
    Ok(None)
}
