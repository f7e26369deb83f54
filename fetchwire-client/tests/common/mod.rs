//! Scripted HTTP/1.1 peers for the integration tests.

#![allow(dead_code)]

use bytes::{Buf, BytesMut};
use fetchwire_client::{DuplexListener, DuplexTransport, HttpClient, Origin};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    /// Minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    pub version: u8,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub chunked: bool,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn header_names(&self) -> Vec<String> {
        self.headers.iter().map(|(n, _)| n.to_ascii_lowercase()).collect()
    }
}

/// The server end of one client connection.
pub struct ServerConn {
    pub origin: Origin,
    socket: DuplexStream,
    buf: BytesMut,
}

impl ServerConn {
    /// Read one complete request. `None` when the client closed the
    /// connection first.
    pub async fn read_request(&mut self) -> Option<RecordedRequest> {
        let (mut request, length) = loop {
            if let Some(parsed) = self.parse_head() {
                break parsed;
            }
            if !self.fill().await {
                return None;
            }
        };

        if request.chunked {
            loop {
                let line_end = loop {
                    if let Some(i) = find_crlf(&self.buf) {
                        break i;
                    }
                    if !self.fill().await {
                        return None;
                    }
                };
                let line = String::from_utf8_lossy(&self.buf[..line_end]).to_string();
                let size = usize::from_str_radix(line.split(';').next()?.trim(), 16).ok()?;
                while self.buf.len() < line_end + 2 + size + 2 {
                    if !self.fill().await {
                        return None;
                    }
                }
                self.buf.advance(line_end + 2);
                request.body.extend_from_slice(&self.buf[..size]);
                self.buf.advance(size + 2);
                if size == 0 {
                    break;
                }
            }
        } else {
            while self.buf.len() < length {
                if !self.fill().await {
                    return None;
                }
            }
            request.body = self.buf.split_to(length).to_vec();
        }
        Some(request)
    }

    fn parse_head(&mut self) -> Option<(RecordedRequest, usize)> {
        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut req = httparse::Request::new(&mut headers);
        let httparse::Status::Complete(len) = req.parse(&self.buf).ok()? else {
            return None;
        };
        let headers: Vec<(String, String)> = req
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).to_string(),
                )
            })
            .collect();
        let recorded = RecordedRequest {
            method: req.method.unwrap_or_default().to_string(),
            target: req.path.unwrap_or_default().to_string(),
            version: req.version.unwrap_or(1),
            chunked: headers.iter().any(|(n, v)| {
                n.eq_ignore_ascii_case("transfer-encoding") && v.eq_ignore_ascii_case("chunked")
            }),
            headers,
            body: Vec::new(),
        };
        let length = recorded
            .header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        self.buf.advance(len);
        Some((recorded, length))
    }

    async fn fill(&mut self) -> bool {
        let mut chunk = [0u8; 4096];
        match self.socket.read(&mut chunk).await {
            Ok(0) | Err(_) => false,
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                true
            }
        }
    }

    pub async fn write(&mut self, bytes: impl AsRef<[u8]>) {
        // The client may already be gone; tests assert on the client side.
        let _ = self.socket.write_all(bytes.as_ref()).await;
        let _ = self.socket.flush().await;
    }

    /// Whether the client closed its end: reads hit EOF.
    pub async fn is_closed_by_client(&mut self) -> bool {
        !self.fill().await
    }

    pub fn into_socket(self) -> DuplexStream {
        self.socket
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

pub struct Server {
    listener: DuplexListener,
}

impl Server {
    pub async fn accept(&mut self) -> ServerConn {
        let (origin, socket) = self.listener.accept().await.expect("client dropped transport");
        ServerConn {
            origin,
            socket,
            buf: BytesMut::new(),
        }
    }
}

/// An in-memory transport and the server side of its connections.
pub fn pair() -> (DuplexTransport, Server) {
    let (transport, listener) = DuplexTransport::new();
    (transport, Server { listener })
}

/// A client over an in-memory transport, without retries or redirects.
pub fn client() -> (HttpClient, DuplexTransport, Server) {
    let (transport, server) = pair();
    let client = HttpClient::builder()
        .transport(transport.clone())
        .no_redirects()
        .build()
        .unwrap();
    (client, transport, server)
}

/// A response with a `Content-Length` body.
pub fn ok(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}
