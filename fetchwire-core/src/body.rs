//! Request and response body types.
//!
//! [`RequestBody`] is what the caller hands to the client: empty, a complete
//! buffer, or a stream of chunks with an optional declared length. Its
//! [`size_hint`](http_body::Body::size_hint) is exact whenever the length is
//! known, which is what decides between `Content-Length` and chunked framing.
//!
//! [`ResponseBody`] is fed by the connection's read loop through a bounded
//! channel of capacity one. The read loop only issues the next socket read
//! once the previous chunk has been taken by the consumer, so a slow reader
//! throttles the socket instead of growing a buffer.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use tokio::sync::mpsc;

use crate::Error;

/// Item type of the channel feeding a [`ResponseBody`].
pub type BodyFrame = Result<Frame<Bytes>, Error>;

/// Producer half of a [`ResponseBody`].
pub type BodySender = mpsc::Sender<BodyFrame>;

type BoxByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send + Sync>>;

pin_project! {
    /// A request body.
    #[project = RequestBodyProj]
    pub enum RequestBody {
        /// No body.
        Empty,
        /// A body whose bytes are all available up front.
        Full {
            data: Option<Bytes>,
        },
        /// A body produced incrementally. `length` is the declared total size,
        /// if known.
        Streaming {
            #[pin]
            stream: BoxByteStream,
            length: Option<u64>,
        },
    }
}

impl RequestBody {
    /// Create an empty body.
    pub fn empty() -> Self {
        RequestBody::Empty
    }

    /// Create a body from a complete buffer.
    pub fn full(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if data.is_empty() {
            RequestBody::Empty
        } else {
            RequestBody::Full { data: Some(data) }
        }
    }

    /// Create a streaming body of unknown length. It will be sent with
    /// `Transfer-Encoding: chunked`.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + Sync + 'static,
    {
        RequestBody::Streaming {
            stream: Box::pin(stream),
            length: None,
        }
    }

    /// Create a streaming body that will produce exactly `length` bytes.
    pub fn streaming_with_length<S>(stream: S, length: u64) -> Self
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + Sync + 'static,
    {
        RequestBody::Streaming {
            stream: Box::pin(stream),
            length: Some(length),
        }
    }

    /// The exact body length, if it is known without consuming the body.
    pub fn length(&self) -> Option<u64> {
        match self {
            RequestBody::Empty => Some(0),
            RequestBody::Full { data } => Some(data.as_ref().map_or(0, |d| d.len() as u64)),
            RequestBody::Streaming { length, .. } => *length,
        }
    }

    /// Clone the body if it is fully buffered. Streaming bodies can only be
    /// sent once and return `None`.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            RequestBody::Empty => Some(RequestBody::Empty),
            RequestBody::Full { data } => Some(RequestBody::Full { data: data.clone() }),
            RequestBody::Streaming { .. } => None,
        }
    }
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            RequestBodyProj::Empty => Poll::Ready(None),
            RequestBodyProj::Full { data } => Poll::Ready(data.take().map(|d| Ok(Frame::data(d)))),
            RequestBodyProj::Streaming { stream, .. } => match stream.poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => Poll::Ready(Some(Ok(Frame::data(data)))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Full { data } => data.is_none(),
            RequestBody::Streaming { length, .. } => *length == Some(0),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self.length() {
            Some(len) => SizeHint::with_exact(len),
            None => SizeHint::default(),
        }
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        RequestBody::Empty
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => write!(f, "RequestBody::Empty"),
            RequestBody::Full { data } => f
                .debug_struct("RequestBody::Full")
                .field("data_len", &data.as_ref().map(|d| d.len()))
                .finish(),
            RequestBody::Streaming { length, .. } => f
                .debug_struct("RequestBody::Streaming")
                .field("length", length)
                .finish(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(data: Bytes) -> Self {
        RequestBody::full(data)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        RequestBody::full(data)
    }
}

impl From<String> for RequestBody {
    fn from(data: String) -> Self {
        RequestBody::full(data)
    }
}

impl From<&'static str> for RequestBody {
    fn from(data: &'static str) -> Self {
        RequestBody::full(Bytes::from_static(data.as_bytes()))
    }
}

enum Inner {
    Empty,
    Full(Option<Bytes>),
    Channel(mpsc::Receiver<BodyFrame>),
}

/// A response body, streamed from the connection.
///
/// Bytes are never buffered beyond the chunk currently in flight unless the
/// caller asks for it with [`bytes`](ResponseBody::bytes) or
/// [`text`](ResponseBody::text). If the connection fails after the headers
/// were received, the failure surfaces here as an `Err` frame.
pub struct ResponseBody {
    inner: Inner,
    trailers: Option<HeaderMap>,
}

impl ResponseBody {
    /// A body with no bytes.
    pub fn empty() -> Self {
        Self {
            inner: Inner::Empty,
            trailers: None,
        }
    }

    /// A body backed by an in-memory buffer. Useful for interceptors that
    /// answer a request without touching the network.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            inner: Inner::Full(Some(data.into())),
            trailers: None,
        }
    }

    /// Create a body fed by a channel, returning the producer half.
    ///
    /// With a capacity of one the producer can only run a single chunk
    /// ahead of the consumer.
    pub fn channel(capacity: usize) -> (BodySender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                inner: Inner::Channel(rx),
                trailers: None,
            },
        )
    }

    /// Receive the next chunk of data, or `None` once the body is complete.
    ///
    /// Trailer frames are not returned; they are kept and exposed through
    /// [`trailers`](ResponseBody::trailers).
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, Error> {
        loop {
            match self.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => return Ok(Some(data)),
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            self.trailers = Some(trailers);
                        }
                    }
                },
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }
    }

    /// Buffer the entire body in memory.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Buffer the entire body and decode it as UTF-8.
    pub async fn text(&mut self) -> Result<String, Error> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::protocol("response body is not valid UTF-8"))
    }

    /// Trailer fields, available once the body has been read to the end.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Empty => Poll::Ready(None),
            Inner::Full(data) => Poll::Ready(data.take().map(|d| Ok(Frame::data(d)))),
            Inner::Channel(rx) => rx.poll_recv(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Inner::Empty => true,
            Inner::Full(data) => data.is_none(),
            Inner::Channel(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Inner::Empty => SizeHint::with_exact(0),
            Inner::Full(data) => SizeHint::with_exact(data.as_ref().map_or(0, |d| d.len() as u64)),
            Inner::Channel(_) => SizeHint::default(),
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            Inner::Empty => "empty",
            Inner::Full(_) => "full",
            Inner::Channel(_) => "streaming",
        };
        f.debug_struct("ResponseBody").field("kind", &kind).finish()
    }
}
