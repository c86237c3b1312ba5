//! Implements the background processor owning the connection state.

use bytes::Bytes;
use futures::{
    prelude::*,
    sync::{mpsc, oneshot},
};
use log::{debug, trace, warn};
use std::{
    collections::VecDeque,
    io::{self, Error, ErrorKind},
};
use tokio::{
    clock,
    timer::{self, Interval},
};

use crate::{
    config::Config,
    frame::{Frame, FrameKind},
    state::State,
};

/// The size of the channel for frames coming from the receive pump.
pub const INBOUND_QUEUE_SIZE: usize = 8;

/// A request made by a `Connection` handle.
#[derive(Debug)]
pub enum Request {
    /// Takes up to `max` bytes from the inbound buffer.
    ///
    /// The reply is empty if no data is available right now, and `None`
    /// once the raw channel has ended and everything has been read.
    Read {
        max: usize,
        reply: oneshot::Sender<io::Result<Option<Bytes>>>,
    },

    /// Appends data to the outbound buffer.
    Write {
        data: Bytes,
        reply: oneshot::Sender<io::Result<usize>>,
    },

    /// Resolves once all written data has been acknowledged.
    Flush { reply: oneshot::Sender<io::Result<()>> },
}

/// The background worker behind a `Connection`.
///
/// This is the only place where connection state is mutated. It services,
/// one at a time, requests from the connection handles, frames arriving from
/// the receive pump and ticks of the retry timer. Frames that need to go out
/// are handed to the transmit pump.
///
/// It stops working once every handle has been dropped and either all data
/// has been acknowledged or the raw channel is gone.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Driver {
    /// Acknowledgments waiting to be handed to the transmit pump.
    acks: VecDeque<Frame>,

    /// The failure of the raw channel, stored as kind and message since
    /// `io::Error` cannot be cloned.
    failure: Option<(ErrorKind, String)>,

    /// Flush requests waiting for the outstanding data to be acknowledged.
    flushes: Vec<oneshot::Sender<io::Result<()>>>,

    /// Frames from the receive pump.
    ///
    /// `None` once the pump has stopped.
    inbound: Option<mpsc::Receiver<io::Result<Frame>>>,

    /// The data frame currently being handed to the transmit pump.
    ///
    /// The hand-off is abandoned when the retry timer fires first.
    offered: Option<Frame>,

    /// Requests from the connection handles.
    ///
    /// `None` once all handles have been dropped.
    requests: Option<mpsc::UnboundedReceiver<Request>>,

    retry: Interval,
    state: State,
    transmit: mpsc::Sender<Frame>,
}

impl Driver {
    /// Creates a new driver.
    pub fn new(
        config: &Config,
        requests: mpsc::UnboundedReceiver<Request>,
        inbound: mpsc::Receiver<io::Result<Frame>>,
        transmit: mpsc::Sender<Frame>,
    ) -> Self {
        Driver {
            acks: VecDeque::new(),
            failure: None,
            flushes: Vec::new(),
            inbound: Some(inbound),
            offered: None,
            requests: Some(requests),
            retry: Interval::new(clock::now() + config.retry(), config.retry()),
            state: State::new(config.mtu()),
            transmit,
        }
    }

    /// Recreates the stored channel failure.
    fn failure(&self) -> Option<Error> {
        self.failure
            .as_ref()
            .map(|(kind, msg)| Error::new(*kind, msg.clone()))
    }

    /// Queues a frame produced by the state machine for transmission.
    fn dispatch(&mut self, frame: Frame) {
        match frame.kind() {
            FrameKind::Ack => self.acks.push_back(frame),
            FrameKind::Data => self.offered = Some(frame),
        }
    }

    fn handle_request(&mut self, req: Request) {
        match req {
            Request::Read { max, reply } => {
                let result = if self.state.inbound_len() > 0 {
                    Ok(Some(self.state.read(max)))
                } else if let Some(e) = self.failure() {
                    Err(e)
                } else if self.inbound.is_none() {
                    Ok(None)
                } else {
                    Ok(Some(Bytes::new()))
                };

                let _ = reply.send(result);
            }
            Request::Write { data, reply } => {
                let result = match self.failure() {
                    Some(e) => Err(e),
                    None => {
                        if let Some(frame) = self.state.write(&data) {
                            self.dispatch(frame);
                        }
                        trace!(
                            "buffered {} bytes, {} waiting to be framed",
                            data.len(),
                            self.state.outbound_len(),
                        );
                        Ok(data.len())
                    }
                };

                let _ = reply.send(result);
            }
            Request::Flush { reply } => self.flushes.push(reply),
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        if let Some(out) = self.state.receive(frame) {
            self.dispatch(out);
        }

        // Don't hand off a frame that has been acknowledged in the meantime.
        let stale = match (&self.offered, self.state.pending()) {
            (Some(offered), Some(pending)) => offered.id() != pending.id(),
            (Some(_), None) => true,
            _ => false,
        };
        if stale {
            self.offered = None;
        }
    }

    fn handle_retry(&mut self) {
        trace!("retry timer fired while {:?}", self.state.phase());

        // Abandon a hand-off that didn't complete within the interval.
        self.offered = None;

        if let Some(frame) = self.state.advance() {
            self.dispatch(frame);
            return;
        }

        let frame = match self.state.pending() {
            Some(frame) => frame.clone(),
            None => return,
        };
        let id = frame.id();

        match self.transmit.try_send(frame) {
            Ok(()) => trace!("retransmitted frame {}", id),
            Err(ref e) if e.is_full() => trace!("transmit pump busy, skipping retransmission"),
            Err(_) => {}
        }
    }

    /// Polls the connection handles for a request.
    fn poll_requests(&mut self) -> bool {
        let polled = match self.requests.as_mut() {
            Some(requests) => requests.poll(),
            None => return false,
        };

        match polled {
            Ok(Async::Ready(Some(req))) => self.handle_request(req),
            Ok(Async::Ready(None)) | Err(_) => {
                debug!("all connection handles have been dropped");
                self.requests = None;
            }
            Ok(Async::NotReady) => return false,
        }

        true
    }

    /// Polls the receive pump for a frame.
    fn poll_inbound(&mut self) -> bool {
        let polled = match self.inbound.as_mut() {
            Some(inbound) => inbound.poll(),
            None => return false,
        };

        match polled {
            Ok(Async::Ready(Some(Ok(frame)))) => self.handle_frame(frame),
            Ok(Async::Ready(Some(Err(e)))) => {
                self.failure = Some((e.kind(), e.to_string()));
            }
            Ok(Async::Ready(None)) | Err(_) => {
                debug!("receive pump has stopped");
                self.inbound = None;
            }
            Ok(Async::NotReady) => return false,
        }

        true
    }

    /// Polls the retry timer.
    fn poll_retry(&mut self) -> Result<bool, timer::Error> {
        match self.retry.poll()? {
            Async::Ready(Some(_)) => {
                self.handle_retry();
                Ok(true)
            }
            Async::Ready(None) | Async::NotReady => Ok(false),
        }
    }

    /// Hands queued frames to the transmit pump, acknowledgments first.
    fn poll_transmit(&mut self) {
        while let Some(ack) = self.acks.pop_front() {
            match self.transmit.start_send(ack) {
                Ok(AsyncSink::Ready) => {}
                Ok(AsyncSink::NotReady(ack)) => {
                    self.acks.push_front(ack);
                    return;
                }
                Err(_) => {
                    self.acks.clear();
                    return;
                }
            }
        }

        if let Some(frame) = self.offered.take() {
            match self.transmit.start_send(frame) {
                Ok(AsyncSink::NotReady(frame)) => self.offered = Some(frame),
                Ok(AsyncSink::Ready) | Err(_) => {}
            }
        }
    }

    /// Completes flush requests that can be answered.
    fn settle_flushes(&mut self) {
        if self.flushes.is_empty() {
            return;
        }

        let outcome = if self.state.is_flushed() {
            Ok(())
        } else if let Some(e) = self.failure() {
            Err(e)
        } else if self.inbound.is_none() {
            Err(Error::new(
                ErrorKind::BrokenPipe,
                "raw channel closed before all data was acknowledged",
            ))
        } else {
            return;
        };

        for reply in self.flushes.drain(..) {
            let result = match outcome {
                Ok(()) => Ok(()),
                Err(ref e) => Err(Error::new(e.kind(), e.to_string())),
            };
            let _ = reply.send(result);
        }
    }

    /// Determines whether the driver can still perform work or should quit.
    fn should_quit(&self) -> bool {
        self.requests.is_none() && (self.state.is_flushed() || self.inbound.is_none())
    }
}

impl Future for Driver {
    type Item = ();
    type Error = ();

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        loop {
            let mut progress = self.poll_requests();
            progress |= self.poll_inbound();
            progress |= match self.poll_retry() {
                Ok(ticked) => ticked,
                Err(e) => {
                    warn!("retry timer failed, shutting down driver: {}", e);
                    return Ok(Async::Ready(()));
                }
            };

            self.poll_transmit();
            self.settle_flushes();

            if self.should_quit() {
                debug!("connection driver finished");
                return Ok(Async::Ready(()));
            }
            if !progress {
                return Ok(Async::NotReady);
            }
        }
    }
}
