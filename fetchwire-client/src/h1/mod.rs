//! HTTP/1.x exchange over a leased stream.
//!
//! [`Http1Driver::request`] runs one request/response exchange:
//!
//! 1. normalize the request (framing headers, defaults, `Host`, `TRACE`)
//! 2. write the head and body, racing the write against the transfer deadline
//! 3. read until the response head is complete, skipping interim responses
//! 4. return the [`Response`] right away and stream the body from a
//!    background task that releases the stream once the body ends
//!
//! The transfer deadline is a token derived from the caller's token, armed
//! with the request's transfer timeout when the write starts. It stays
//! attached to the body task, so the timeout covers the full exchange.

mod body;
mod encode;
mod parse;

use std::sync::Arc;

use bytes::BytesMut;
use fetchwire_core::{CancellationToken, Completion, Error, Request, Response, ResponseBody};
use http::header::HeaderValue;
use http::StatusCode;
use tokio::io::AsyncWriteExt;

use self::body::{BodyPump, fill};
use self::encode::{RequestFraming, encode_head, negotiate_version, normalize, requested_close, write_body};
use self::parse::{BodyDecoder, BodyFraming, ResponseHead, body_framing, keep_alive, parse_head};
use crate::connection::StreamInfo;
use crate::events::Events;
use crate::pool::Stream;

/// Default `User-Agent` sent when a request does not set one.
pub const DEFAULT_USER_AGENT: &str = concat!("fetchwire/", env!("CARGO_PKG_VERSION"));

/// Serializes requests and parses responses on a single stream.
#[derive(Clone, Debug)]
pub(crate) struct Http1Driver {
    user_agent: HeaderValue,
}

impl Default for Http1Driver {
    fn default() -> Self {
        Self::new(HeaderValue::from_static(DEFAULT_USER_AGENT))
    }
}

impl Http1Driver {
    pub(crate) fn new(user_agent: HeaderValue) -> Self {
        Self { user_agent }
    }

    pub(crate) async fn request(
        &self,
        mut stream: Stream,
        mut request: Request,
        cancel: &CancellationToken,
        events: &Events,
    ) -> Result<Response, Error> {
        let Some(version) = negotiate_version(request.versions()) else {
            stream.release(true);
            return Err(Error::protocol(format!(
                "none of the acceptable versions {:?} is HTTP/1.x",
                request.versions()
            )));
        };
        let info = stream.info().clone();
        let framing = match normalize(&mut request, info.origin(), version, &self.user_agent) {
            Ok(framing) => framing,
            Err(e) => {
                stream.release(true);
                return Err(e);
            }
        };

        let deadline = cancel.derive(request.transfer_timeout());
        let body = request.take_body();
        let request = Arc::new(request);

        {
            let socket = stream.socket()?;
            let write = write_request(socket, &request, body, framing, version, &info, events);
            tokio::select! {
                biased;
                reason = deadline.cancelled() => return Err(reason),
                res = write => res?,
            }
        }

        events.emit(|l| l.response_header_start(&request));
        let mut buf = BytesMut::new();
        let head = loop {
            let limit = request.header_size_limit();
            match parse_head(&mut buf, limit)? {
                Some(head) if head.status == StatusCode::SWITCHING_PROTOCOLS => {
                    return Err(Error::protocol("protocol upgrades are not supported"));
                }
                Some(head) if head.status.is_informational() => continue,
                Some(head) => break head,
                None => {
                    let socket = stream.socket()?;
                    let n = fill(socket, &mut buf, request.inactivity_timeout(), &deadline).await?;
                    if n == 0 {
                        return Err(Error::socket_msg(
                            "connection closed before the response head was received",
                        ));
                    }
                }
            }
        };

        let framing = body_framing(request.method(), &head)?;
        let reuse = keep_alive(requested_close(&request, version), &head, framing);
        let ResponseHead {
            version,
            status,
            reason,
            headers,
        } = head;
        let mut response = Response::new(request.clone(), status)
            .with_version(version)
            .with_headers(headers);
        if let Some(reason) = reason {
            response = response.with_reason(reason);
        }

        if framing == BodyFraming::Empty {
            stream.release(reuse && buf.is_empty());
            let response = response.with_body(ResponseBody::empty(), Completion::ready(Ok(())));
            events.emit(|l| l.response_header_end(&request, &response));
            events.emit(|l| l.request_end(&request));
            return Ok(response);
        }

        let (done, completion) = Completion::channel();
        let (tx, body) = if request.discard_body() {
            (None, ResponseBody::empty())
        } else {
            let (tx, body) = ResponseBody::channel(1);
            (Some(tx), body)
        };
        let response = response.with_body(body, completion);
        events.emit(|l| l.response_header_end(&request, &response));

        let pump = BodyPump {
            stream,
            buf,
            decoder: BodyDecoder::new(framing),
            keep_alive: reuse,
            tx,
            done,
            deadline,
            inactivity: request.inactivity_timeout(),
            limit: request.body_size_limit(),
            request,
            events: events.clone(),
        };
        tokio::spawn(pump.run());

        Ok(response)
    }
}

async fn write_request(
    socket: &mut Box<dyn crate::transport::Socket>,
    request: &Request,
    body: fetchwire_core::RequestBody,
    framing: RequestFraming,
    version: http::Version,
    info: &StreamInfo,
    events: &Events,
) -> Result<(), Error> {
    events.emit(|l| l.request_header_start(request, info));
    let head = encode_head(request, version);
    socket.write_all(&head).await.map_err(Error::socket)?;
    events.emit(|l| l.request_header_end(request, info));

    if framing == RequestFraming::Empty {
        write_body(socket, body, framing, |_| {}).await?;
    } else {
        events.emit(|l| l.request_body_start(request));
        let total = write_body(socket, body, framing, |sent| {
            events.emit(|l| l.request_body_progress(request, sent))
        })
        .await?;
        events.emit(|l| l.request_body_end(request, total));
    }
    socket.flush().await.map_err(Error::socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::ConnectionPool;
    use crate::transport::{DuplexListener, DuplexTransport};
    use fetchwire_core::Origin;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};

    async fn setup() -> (ConnectionPool, Stream, DuplexStream, DuplexListener) {
        let (transport, mut listener) = DuplexTransport::new();
        let pool = ConnectionPool::new(PoolConfig::default(), Arc::new(transport));
        let origin = Origin::from_uri(&"http://example.org/".parse().unwrap()).unwrap();
        let stream = pool
            .acquire(&origin, &CancellationToken::new(), &Events::none())
            .await
            .unwrap();
        let (_, server) = listener.accept().await.unwrap();
        (pool, stream, server, listener)
    }

    async fn read_head(server: &mut DuplexStream) -> String {
        let mut wire = Vec::new();
        let mut byte = [0u8; 1];
        while !wire.ends_with(b"\r\n\r\n") {
            server.read_exact(&mut byte).await.unwrap();
            wire.push(byte[0]);
        }
        String::from_utf8(wire).unwrap()
    }

    #[tokio::test]
    async fn test_driver_returns_before_body_arrives() {
        let (pool, stream, mut server, _listener) = setup().await;
        let driver = Http1Driver::default();
        let cancel = CancellationToken::new();
        let request = Request::get("http://example.org/slow").unwrap();

        let server_task = tokio::spawn(async move {
            let head = read_head(&mut server).await;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhello")
                .await
                .unwrap();
            (head, server)
        });

        let mut response = driver
            .request(stream, request, &cancel, &Events::none())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let (head, mut server) = server_task.await.unwrap();
        assert!(head.starts_with("GET /slow HTTP/1.1\r\nhost: example.org\r\n"));
        assert!(head.contains("user-agent: fetchwire/"));

        server.write_all(b"world").await.unwrap();
        assert_eq!(response.text().await.unwrap(), "helloworld");
        response.completion().await.unwrap();
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_unsupported_version_writes_nothing() {
        let (pool, stream, mut server, _listener) = setup().await;
        let request = Request::get("http://example.org/")
            .unwrap()
            .with_versions(vec![http::Version::HTTP_2]);

        let err = Http1Driver::default()
            .request(stream, request, &CancellationToken::new(), &Events::none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(pool.stats().idle, 1);

        drop(pool);
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_millis(50), server.read(&mut buf)).await;
        assert!(matches!(read, Err(_) | Ok(Ok(0))));
    }

    #[tokio::test]
    async fn test_interim_responses_are_skipped() {
        let (_pool, stream, mut server, _listener) = setup().await;
        tokio::spawn(async move {
            read_head(&mut server).await;
            server
                .write_all(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 103 Early Hints\r\nLink: </a>\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n")
                .await
                .unwrap();
            server
        });

        let response = Http1Driver::default()
            .request(
                stream,
                Request::get("http://example.org/").unwrap(),
                &CancellationToken::new(),
                &Events::none(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.header("link").is_none());
    }

    #[tokio::test]
    async fn test_eof_before_head_is_socket_error() {
        let (pool, stream, mut server, _listener) = setup().await;
        tokio::spawn(async move {
            read_head(&mut server).await;
            server.write_all(b"HTTP/1.1 200").await.unwrap();
        });

        let err = Http1Driver::default()
            .request(
                stream,
                Request::get("http://example.org/").unwrap(),
                &CancellationToken::new(),
                &Events::none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Socket { .. }));
        assert_eq!(pool.stats().open, 0);
    }

    #[tokio::test]
    async fn test_body_limit_fails_body_and_closes() {
        let (pool, stream, mut server, _listener) = setup().await;
        tokio::spawn(async move {
            read_head(&mut server).await;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\n\r\n12345678")
                .await
                .unwrap();
            server
        });
        let mut request = Request::get("http://example.org/").unwrap();
        request.set_body_size_limit(4);

        let mut response = Http1Driver::default()
            .request(stream, request, &CancellationToken::new(), &Events::none())
            .await
            .unwrap();
        let err = response.bytes().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(response.completion().await.is_err());
        assert_eq!(pool.stats().open, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_timeout() {
        let (_pool, stream, mut server, _listener) = setup().await;
        tokio::spawn(async move {
            read_head(&mut server).await;
            tokio::time::sleep(Duration::from_secs(60)).await;
            server
        });
        let request = Request::get("http://example.org/")
            .unwrap()
            .with_inactivity_timeout(Duration::from_secs(1));

        let err = Http1Driver::default()
            .request(stream, request, &CancellationToken::new(), &Events::none())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_discard_body_still_drains() {
        let (pool, stream, mut server, _listener) = setup().await;
        tokio::spawn(async move {
            read_head(&mut server).await;
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nskip")
                .await
                .unwrap();
            server
        });
        let request = Request::get("http://example.org/").unwrap().with_discard_body(true);

        let mut response = Http1Driver::default()
            .request(stream, request, &CancellationToken::new(), &Events::none())
            .await
            .unwrap();
        response.completion().await.unwrap();
        assert!(response.bytes().await.unwrap().is_empty());
        assert_eq!(pool.stats().idle, 1);
    }
}
