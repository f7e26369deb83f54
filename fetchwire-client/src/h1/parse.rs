//! Response head parsing and body framing.
//!
//! The head parser works on whatever bytes have arrived so far and reports
//! `None` until the blank line ending the header section is buffered. The
//! body decoder is incremental in the same way: each call hands out as much
//! data as the buffer holds, so a body is never assembled in memory.

use bytes::{Buf, Bytes, BytesMut};
use fetchwire_core::headers::has_token;
use fetchwire_core::Error;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Version};

const MAX_HEADERS: usize = 128;
const MAX_CHUNK_LINE: usize = 1024;

/// Status line and header section of a response.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) reason: Option<String>,
    pub(crate) headers: HeaderMap,
}

/// Parse a response head from the front of `buf`, consuming it.
///
/// Returns `Ok(None)` when more bytes are needed.
pub(crate) fn parse_head(buf: &mut BytesMut, limit: usize) -> Result<Option<ResponseHead>, Error> {
    let (head, consumed) = {
        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut slots);
        let consumed = match raw.parse(&buf[..]) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => {
                if buf.len() > limit {
                    return Err(too_large(limit));
                }
                return Ok(None);
            }
            Err(httparse::Error::TooManyHeaders) => {
                return Err(Error::protocol("too many response header fields"));
            }
            Err(httparse::Error::Version) => {
                return Err(Error::protocol("unsupported response protocol version"));
            }
            Err(e) => return Err(Error::protocol(format!("malformed response head: {}", e))),
        };
        if consumed > limit {
            return Err(too_large(limit));
        }

        let version = match raw.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };
        let status = raw
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| Error::protocol("invalid response status code"))?;
        let reason = raw
            .reason
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let headers = header_map(raw.headers)?;

        (
            ResponseHead {
                version,
                status,
                reason,
                headers,
            },
            consumed,
        )
    };
    buf.advance(consumed);
    Ok(Some(head))
}

fn too_large(limit: usize) -> Error {
    Error::protocol(format!("response header section exceeds {} bytes", limit))
}

fn header_map(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for h in raw {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| Error::protocol(format!("invalid header name {:?}", h.name)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| Error::protocol(format!("invalid value for header {}", h.name)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// How the response body is delimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    Empty,
    Length(u64),
    Chunked,
    /// Identity body terminated by the peer closing the connection.
    UntilEof,
}

/// Decide the framing of a response body (RFC 7230 section 3.3.3).
pub(crate) fn body_framing(method: &Method, head: &ResponseHead) -> Result<BodyFraming, Error> {
    if *method == Method::HEAD
        || head.status == StatusCode::NO_CONTENT
        || head.status == StatusCode::NOT_MODIFIED
        || head.status.is_informational()
    {
        return Ok(BodyFraming::Empty);
    }

    if head.headers.contains_key(header::TRANSFER_ENCODING) {
        let chunked_last = head
            .headers
            .get_all(header::TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .last()
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
        return Ok(if chunked_last {
            BodyFraming::Chunked
        } else {
            BodyFraming::UntilEof
        });
    }

    let mut length: Option<u64> = None;
    for value in head.headers.get_all(header::CONTENT_LENGTH) {
        let text = value
            .to_str()
            .map_err(|_| Error::protocol("invalid Content-Length header"))?;
        for part in text.split(',') {
            let parsed = part
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::protocol("invalid Content-Length header"))?;
            match length {
                Some(existing) if existing != parsed => {
                    return Err(Error::protocol("conflicting Content-Length headers"));
                }
                _ => length = Some(parsed),
            }
        }
    }

    Ok(match length {
        Some(0) => BodyFraming::Empty,
        Some(n) => BodyFraming::Length(n),
        None => BodyFraming::UntilEof,
    })
}

/// Whether the connection may carry another request after this exchange.
pub(crate) fn keep_alive(request_close: bool, head: &ResponseHead, framing: BodyFraming) -> bool {
    if request_close || framing == BodyFraming::UntilEof {
        return false;
    }
    if has_token(&head.headers, "connection", "close") {
        return false;
    }
    if head.version == Version::HTTP_10 {
        return has_token(&head.headers, "connection", "keep-alive");
    }
    true
}

/// One step of body decoding.
#[derive(Debug, PartialEq)]
pub(crate) enum Decoded {
    Data(Bytes),
    Trailers(HeaderMap),
    /// The buffer is exhausted; read more from the socket.
    NeedMore,
    Done,
}

#[derive(Debug)]
enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailers,
}

#[derive(Debug)]
enum Kind {
    Length { remaining: u64 },
    Chunked(ChunkState),
    UntilEof,
    Done,
}

/// Incremental body decoder.
#[derive(Debug)]
pub(crate) struct BodyDecoder {
    kind: Kind,
}

impl BodyDecoder {
    pub(crate) fn new(framing: BodyFraming) -> Self {
        let kind = match framing {
            BodyFraming::Empty | BodyFraming::Length(0) => Kind::Done,
            BodyFraming::Length(n) => Kind::Length { remaining: n },
            BodyFraming::Chunked => Kind::Chunked(ChunkState::Size),
            BodyFraming::UntilEof => Kind::UntilEof,
        };
        Self { kind }
    }

    #[cfg(test)]
    pub(crate) fn is_done(&self) -> bool {
        matches!(self.kind, Kind::Done)
    }

    pub(crate) fn decode(&mut self, buf: &mut BytesMut) -> Result<Decoded, Error> {
        loop {
            match &mut self.kind {
                Kind::Done => return Ok(Decoded::Done),
                Kind::UntilEof => {
                    if buf.is_empty() {
                        return Ok(Decoded::NeedMore);
                    }
                    return Ok(Decoded::Data(buf.split().freeze()));
                }
                Kind::Length { remaining } => {
                    if buf.is_empty() {
                        return Ok(Decoded::NeedMore);
                    }
                    let take = (*remaining).min(buf.len() as u64) as usize;
                    *remaining -= take as u64;
                    let data = buf.split_to(take).freeze();
                    if *remaining == 0 {
                        self.kind = Kind::Done;
                    }
                    return Ok(Decoded::Data(data));
                }
                Kind::Chunked(state) => match state {
                    ChunkState::Size => {
                        let Some(size) = chunk_size(buf)? else {
                            return Ok(Decoded::NeedMore);
                        };
                        *state = if size == 0 {
                            ChunkState::Trailers
                        } else {
                            ChunkState::Data { remaining: size }
                        };
                    }
                    ChunkState::Data { remaining } => {
                        if buf.is_empty() {
                            return Ok(Decoded::NeedMore);
                        }
                        let take = (*remaining).min(buf.len() as u64) as usize;
                        *remaining -= take as u64;
                        if *remaining == 0 {
                            *state = ChunkState::DataEnd;
                        }
                        return Ok(Decoded::Data(buf.split_to(take).freeze()));
                    }
                    ChunkState::DataEnd => {
                        if buf.len() < 2 {
                            return Ok(Decoded::NeedMore);
                        }
                        if &buf[..2] != b"\r\n" {
                            return Err(Error::protocol("missing CRLF after chunk data"));
                        }
                        buf.advance(2);
                        *state = ChunkState::Size;
                    }
                    ChunkState::Trailers => {
                        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
                        let (consumed, trailers) = match httparse::parse_headers(&buf[..], &mut slots) {
                            Ok(httparse::Status::Complete((n, raw))) => (n, header_map(raw)?),
                            Ok(httparse::Status::Partial) => {
                                if buf.len() > MAX_CHUNK_LINE * 8 {
                                    return Err(Error::protocol("chunked trailer section too large"));
                                }
                                return Ok(Decoded::NeedMore);
                            }
                            Err(e) => {
                                return Err(Error::protocol(format!("malformed chunked trailers: {}", e)));
                            }
                        };
                        buf.advance(consumed);
                        self.kind = Kind::Done;
                        if !trailers.is_empty() {
                            return Ok(Decoded::Trailers(trailers));
                        }
                    }
                },
            }
        }
    }

    /// The peer closed the connection. Only an until-EOF body may end here.
    pub(crate) fn on_eof(&mut self) -> Result<(), Error> {
        match self.kind {
            Kind::Done => Ok(()),
            Kind::UntilEof => {
                self.kind = Kind::Done;
                Ok(())
            }
            _ => Err(Error::socket_msg(
                "connection closed before the response body was complete",
            )),
        }
    }
}

/// Parse a `size[;ext]\r\n` line, consuming it.
fn chunk_size(buf: &mut BytesMut) -> Result<Option<u64>, Error> {
    let Some(end) = buf.windows(2).position(|w| w == b"\r\n") else {
        if buf.len() > MAX_CHUNK_LINE {
            return Err(Error::protocol("chunk size line too long"));
        }
        return Ok(None);
    };
    let size = std::str::from_utf8(&buf[..end])
        .ok()
        .and_then(|line| line.split(';').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| u64::from_str_radix(s, 16).ok())
        .ok_or_else(|| Error::protocol("invalid chunk size"))?;
    buf.advance(end + 2);
    Ok(Some(size))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 16 * 1024;

    fn head(raw: &str) -> ResponseHead {
        let mut buf = BytesMut::from(raw);
        parse_head(&mut buf, LIMIT).unwrap().unwrap()
    }

    fn drain(decoder: &mut BodyDecoder, buf: &mut BytesMut) -> (Vec<u8>, Option<HeaderMap>, bool) {
        let mut data = Vec::new();
        let mut trailers = None;
        loop {
            match decoder.decode(buf).unwrap() {
                Decoded::Data(d) => data.extend_from_slice(&d),
                Decoded::Trailers(t) => trailers = Some(t),
                Decoded::NeedMore => return (data, trailers, false),
                Decoded::Done => return (data, trailers, true),
            }
        }
    }

    #[test]
    fn test_parse_head_split_across_reads() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nX-A: 1\r\n\r\nabc";
        let mut buf = BytesMut::new();
        let mut parsed = None;
        for byte in wire.iter() {
            buf.extend_from_slice(&[*byte]);
            if let Some(head) = parse_head(&mut buf, LIMIT).unwrap() {
                parsed = Some(head);
                break;
            }
        }
        let head = parsed.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.reason.as_deref(), Some("OK"));
        assert_eq!(head.headers.get("x-a").unwrap(), "1");
        assert!(buf.is_empty(), "body bytes must not be consumed with the head");
    }

    #[test]
    fn test_parse_head_leaves_body_in_buffer() {
        let mut buf = BytesMut::from("HTTP/1.0 404 Not Found\r\n\r\nmissing");
        let head = parse_head(&mut buf, LIMIT).unwrap().unwrap();
        assert_eq!(head.version, Version::HTTP_10);
        assert_eq!(head.status, StatusCode::NOT_FOUND);
        assert_eq!(&buf[..], b"missing");
    }

    #[test]
    fn test_parse_head_enforces_limit() {
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nX-Big: ");
        buf.extend_from_slice(&vec![b'a'; 64]);
        assert!(matches!(parse_head(&mut buf, 32), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_parse_head_rejects_garbage() {
        let mut buf = BytesMut::from("SSH-2.0-OpenSSH\r\n\r\n");
        assert!(matches!(parse_head(&mut buf, LIMIT), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_framing_rules() {
        let h = head("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n");
        assert_eq!(body_framing(&Method::GET, &h).unwrap(), BodyFraming::Length(10));
        assert_eq!(body_framing(&Method::HEAD, &h).unwrap(), BodyFraming::Empty);

        let h = head("HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\nContent-Length: 10\r\n\r\n");
        assert_eq!(body_framing(&Method::GET, &h).unwrap(), BodyFraming::Chunked);

        let h = head("HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n");
        assert_eq!(body_framing(&Method::GET, &h).unwrap(), BodyFraming::UntilEof);

        let h = head("HTTP/1.1 204 No Content\r\nContent-Length: 10\r\n\r\n");
        assert_eq!(body_framing(&Method::GET, &h).unwrap(), BodyFraming::Empty);

        let h = head("HTTP/1.0 200 OK\r\n\r\n");
        assert_eq!(body_framing(&Method::GET, &h).unwrap(), BodyFraming::UntilEof);

        let h = head("HTTP/1.1 200 OK\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\n");
        assert!(body_framing(&Method::GET, &h).is_err());
    }

    #[test]
    fn test_keep_alive_rules() {
        let h = head("HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\n");
        assert!(keep_alive(false, &h, BodyFraming::Length(1)));
        assert!(!keep_alive(true, &h, BodyFraming::Length(1)));
        assert!(!keep_alive(false, &h, BodyFraming::UntilEof));

        let h = head("HTTP/1.1 200 OK\r\nConnection: Close\r\n\r\n");
        assert!(!keep_alive(false, &h, BodyFraming::Empty));

        let h = head("HTTP/1.0 200 OK\r\nContent-Length: 1\r\n\r\n");
        assert!(!keep_alive(false, &h, BodyFraming::Length(1)));

        let h = head("HTTP/1.0 200 OK\r\nConnection: keep-alive\r\nContent-Length: 1\r\n\r\n");
        assert!(keep_alive(false, &h, BodyFraming::Length(1)));
    }

    #[test]
    fn test_chunked_with_trailers() {
        let mut decoder = BodyDecoder::new(BodyFraming::Chunked);
        let mut buf = BytesMut::from("4;ext=1\r\nWiki\r\n5\r\npedia\r\n0\r\nExpires: never\r\n\r\n");
        let (data, trailers, done) = drain(&mut decoder, &mut buf);
        assert!(done);
        assert_eq!(data, b"Wikipedia");
        assert_eq!(trailers.unwrap().get("expires").unwrap(), "never");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_chunked_incremental() {
        let wire = b"a\r\n0123456789\r\n0\r\n\r\n";
        let mut decoder = BodyDecoder::new(BodyFraming::Chunked);
        let mut buf = BytesMut::new();
        let mut data = Vec::new();
        let mut done = false;
        for byte in wire.iter() {
            buf.extend_from_slice(&[*byte]);
            let (chunk, _, finished) = drain(&mut decoder, &mut buf);
            data.extend(chunk);
            done = finished;
        }
        assert!(done);
        assert_eq!(data, b"0123456789");
    }

    #[test]
    fn test_chunked_bad_crlf() {
        let mut decoder = BodyDecoder::new(BodyFraming::Chunked);
        let mut buf = BytesMut::from("3\r\nabcXX");
        assert!(matches!(decoder.decode(&mut buf), Ok(Decoded::Data(_))));
        assert!(matches!(decoder.decode(&mut buf), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_length_leaves_trailing_bytes() {
        let mut decoder = BodyDecoder::new(BodyFraming::Length(3));
        let mut buf = BytesMut::from("abcHTTP/1.1");
        let (data, _, done) = drain(&mut decoder, &mut buf);
        assert!(done);
        assert_eq!(data, b"abc");
        assert_eq!(&buf[..], b"HTTP/1.1");
    }

    #[test]
    fn test_eof_handling() {
        let mut decoder = BodyDecoder::new(BodyFraming::UntilEof);
        let mut buf = BytesMut::from("tail");
        assert_eq!(decoder.decode(&mut buf).unwrap(), Decoded::Data(Bytes::from("tail")));
        assert_eq!(decoder.decode(&mut buf).unwrap(), Decoded::NeedMore);
        decoder.on_eof().unwrap();
        assert!(decoder.is_done());

        let mut decoder = BodyDecoder::new(BodyFraming::Length(10));
        assert!(matches!(decoder.on_eof(), Err(Error::Socket { .. })));
    }
}
