//! The response body read loop.
//!
//! Once the head is parsed the driver hands the stream to a [`BodyPump`]
//! running on its own task. The pump feeds decoded frames into a channel of
//! capacity one and waits for the consumer to make room before every socket
//! read, so a slow reader throttles the connection instead of growing a
//! buffer.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use fetchwire_core::{BodySender, CancellationToken, Error, LinkedToken, Request};
use http_body::Frame;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;

use super::parse::{BodyDecoder, Decoded};
use crate::events::Events;
use crate::pool::Stream;
use crate::transport::Socket;

const READ_CHUNK: usize = 8 * 1024;

/// Read more bytes into `buf`, racing the read against `deadline` and the
/// optional inactivity timeout. Returns the number of bytes read; zero means
/// the peer closed the connection.
pub(crate) async fn fill(
    socket: &mut Box<dyn Socket>,
    buf: &mut BytesMut,
    inactivity: Option<Duration>,
    deadline: &CancellationToken,
) -> Result<usize, Error> {
    buf.reserve(READ_CHUNK);
    let read = async {
        match inactivity {
            Some(limit) => match tokio::time::timeout(limit, socket.read_buf(buf)).await {
                Ok(res) => res.map_err(Error::socket),
                Err(_) => Err(Error::Timeout(limit)),
            },
            None => socket.read_buf(buf).await.map_err(Error::socket),
        }
    };
    tokio::select! {
        biased;
        reason = deadline.cancelled() => Err(reason),
        res = read => res,
    }
}

pub(crate) struct BodyPump {
    pub(crate) stream: Stream,
    pub(crate) buf: BytesMut,
    pub(crate) decoder: BodyDecoder,
    pub(crate) keep_alive: bool,
    /// `None` when the body is being discarded.
    pub(crate) tx: Option<BodySender>,
    pub(crate) done: oneshot::Sender<Result<(), Error>>,
    pub(crate) deadline: LinkedToken,
    pub(crate) inactivity: Option<Duration>,
    pub(crate) limit: u64,
    pub(crate) request: Arc<Request>,
    pub(crate) events: Events,
}

impl BodyPump {
    pub(crate) async fn run(mut self) {
        self.events.emit(|l| l.response_body_start(&self.request));

        match self.drain().await {
            Ok(total) => {
                let reusable = self.keep_alive && self.buf.is_empty();
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    connection = self.stream.info().connection_id(),
                    total,
                    reusable,
                    "response body complete"
                );
                self.stream.release(reusable);
                self.events.emit(|l| l.response_body_end(&self.request, total));
                self.events.emit(|l| l.request_end(&self.request));
                let _ = self.done.send(Ok(()));
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    connection = self.stream.info().connection_id(),
                    error = %error,
                    "response body failed"
                );
                self.stream.release(false);
                self.events.emit(|l| l.request_failed(&self.request, &error));
                let _ = self.done.send(Err(error.clone()));
                if let Some(tx) = self.tx.take() {
                    let _ = tx.send(Err(error)).await;
                }
            }
        }
    }

    async fn drain(&mut self) -> Result<u64, Error> {
        let mut total = 0u64;
        loop {
            match self.decoder.decode(&mut self.buf)? {
                Decoded::Data(data) => {
                    total += data.len() as u64;
                    if total > self.limit {
                        return Err(Error::protocol(format!(
                            "response body exceeds the {} byte limit",
                            self.limit
                        )));
                    }
                    self.events
                        .emit(|l| l.response_body_progress(&self.request, total));
                    deliver(self.tx.as_ref(), &self.deadline, Frame::data(data)).await?;
                }
                Decoded::Trailers(trailers) => {
                    deliver(self.tx.as_ref(), &self.deadline, Frame::trailers(trailers)).await?
                }
                Decoded::Done => return Ok(total),
                Decoded::NeedMore => {
                    ready(self.tx.as_ref(), &self.deadline).await?;
                    let socket = self.stream.socket()?;
                    let n = fill(socket, &mut self.buf, self.inactivity, &self.deadline).await?;
                    if n == 0 {
                        self.decoder.on_eof()?;
                    }
                }
            }
        }
    }
}

async fn deliver(
    tx: Option<&BodySender>,
    deadline: &CancellationToken,
    frame: Frame<Bytes>,
) -> Result<(), Error> {
    let Some(tx) = tx else {
        return Ok(());
    };
    tokio::select! {
        biased;
        reason = deadline.cancelled() => Err(reason),
        res = tx.send(Ok(frame)) => res.map_err(|_| Error::Cancelled),
    }
}

/// Wait until the consumer has room for another frame.
async fn ready(tx: Option<&BodySender>, deadline: &CancellationToken) -> Result<(), Error> {
    let Some(tx) = tx else {
        return deadline.check();
    };
    tokio::select! {
        biased;
        reason = deadline.cancelled() => Err(reason),
        permit = tx.reserve() => permit.map(drop).map_err(|_| Error::Cancelled),
    }
}
