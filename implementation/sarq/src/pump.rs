//! Implements the futures moving frames between the raw channel and the
//! driver.

use bytes::BytesMut;
use futures::{prelude::*, sync::mpsc, try_ready};
use log::{debug, trace, warn};
use std::io::{self, ErrorKind};
use tokio::{
    codec::{Encoder, FramedRead},
    io::{AsyncRead, AsyncWrite},
};

use crate::{
    codec::FrameCodec,
    frame::{Frame, FrameError},
};

/// Decodes frames off the raw channel and forwards them to the driver.
///
/// Corrupted frames and noise are discarded, decoding simply resumes on the
/// following bytes. Interrupted reads are retried. A failing channel is reported to the driver once, after
/// which the pump stops. The pump also stops when the channel reaches its
/// end or the driver has gone away.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct ReceivePump<R> {
    /// The channel of successfully decoded frames.
    driver: mpsc::Sender<io::Result<Frame>>,

    /// The item waiting for room in the channel to the driver.
    forward: Option<io::Result<Frame>>,

    frames: FramedRead<R, FrameCodec>,

    /// Set once a hard I/O error was read.
    failed: bool,
}

/// Serializes frames handed over by the driver onto the raw channel.
///
/// Failed writes are logged and the affected frame is dropped. Resending is
/// up to the driver.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct TransmitPump<W> {
    /// Encoded bytes not yet accepted by the raw channel.
    buf: BytesMut,

    codec: FrameCodec,
    frames: mpsc::Receiver<Frame>,
    writer: W,
}

impl<R: AsyncRead> ReceivePump<R> {
    pub fn new(reader: R, driver: mpsc::Sender<io::Result<Frame>>) -> Self {
        ReceivePump {
            driver,
            forward: None,
            frames: FramedRead::new(reader, FrameCodec),
            failed: false,
        }
    }

    /// Pushes the buffered item to the driver.
    ///
    /// Resolves to `false` if the driver has gone away.
    fn poll_forward(&mut self) -> Poll<bool, ()> {
        let item = match self.forward.take() {
            Some(item) => item,
            None => return Ok(Async::Ready(true)),
        };

        match self.driver.start_send(item) {
            Ok(AsyncSink::Ready) => Ok(Async::Ready(true)),
            Ok(AsyncSink::NotReady(item)) => {
                self.forward = Some(item);
                Ok(Async::NotReady)
            }
            Err(_) => Ok(Async::Ready(false)),
        }
    }
}

impl<R: AsyncRead> Future for ReceivePump<R> {
    type Item = ();
    type Error = ();

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        loop {
            if !try_ready!(self.poll_forward()) {
                debug!("driver has gone away, stopping receive pump");
                return Ok(Async::Ready(()));
            }
            if self.failed {
                return Ok(Async::Ready(()));
            }

            match self.frames.poll() {
                Ok(Async::Ready(Some(frame))) => self.forward = Some(Ok(frame)),
                Ok(Async::Ready(None)) => {
                    debug!("raw channel reached its end, stopping receive pump");
                    return Ok(Async::Ready(()));
                }
                Ok(Async::NotReady) => return Ok(Async::NotReady),
                Err(ref e) if e.is_corruption() => trace!("discarding frame: {}", e),
                Err(FrameError::Io(ref e)) if e.kind() == ErrorKind::Interrupted => {
                    trace!("read from raw channel interrupted, retrying");
                }
                Err(e) => {
                    warn!("raw channel failed: {}", e);

                    self.forward = Some(Err(e.into()));
                    self.failed = true;
                }
            }
        }
    }
}

impl<W: AsyncWrite> TransmitPump<W> {
    pub fn new(writer: W, frames: mpsc::Receiver<Frame>) -> Self {
        TransmitPump {
            buf: BytesMut::new(),
            codec: FrameCodec,
            frames,
            writer,
        }
    }

    /// Writes all encoded bytes to the raw channel.
    ///
    /// Write errors discard whatever is left of the current frame.
    fn poll_drain(&mut self) -> Poll<(), ()> {
        while !self.buf.is_empty() {
            match self.writer.poll_write(&self.buf) {
                Ok(Async::Ready(0)) => {
                    warn!("raw channel accepted no data, dropping {} bytes", self.buf.len());
                    self.buf.clear();
                }
                Ok(Async::Ready(n)) => self.buf.advance(n),
                Ok(Async::NotReady) => return Ok(Async::NotReady),
                Err(e) => {
                    warn!("failed to write frame: {}", e);
                    self.buf.clear();
                }
            }
        }

        match self.writer.poll_flush() {
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Ok(Async::Ready(())) => Ok(Async::Ready(())),
            Err(e) => {
                warn!("failed to flush raw channel: {}", e);
                Ok(Async::Ready(()))
            }
        }
    }
}

impl<W: AsyncWrite> Future for TransmitPump<W> {
    type Item = ();
    type Error = ();

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        loop {
            try_ready!(self.poll_drain());

            match self.frames.poll()? {
                Async::Ready(Some(frame)) => {
                    if let Err(e) = self.codec.encode(frame, &mut self.buf) {
                        warn!("failed to encode frame: {}", e);
                    }
                }
                Async::Ready(None) => {
                    debug!("driver has gone away, stopping transmit pump");
                    return Ok(Async::Ready(()));
                }
                Async::NotReady => return Ok(Async::NotReady),
            }
        }
    }
}
