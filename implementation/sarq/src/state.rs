//! The protocol automaton of a single connection endpoint.
//!
//! This holds all mutable protocol state and performs every transition
//! synchronously. It never touches I/O: frames that need to go onto the wire
//! are handed back to the caller, which is the driver.

use bytes::{Bytes, BytesMut};
use log::trace;
use std::cmp;

use crate::{
    frame::{Frame, FrameKind},
    sequencer::Sequencer,
};

/// Phases of the stop-and-wait automaton.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// No data frame is outstanding.
    Idle,

    /// One data frame has been sent and is waiting for its acknowledgment.
    AwaitingAck,
}

/// The state of one connection endpoint.
#[derive(Debug)]
pub struct State {
    /// Payload accepted from the peer that has not been read yet.
    inbound: BytesMut,

    /// The id of the most recently accepted data frame.
    ///
    /// A data frame carrying this id again is a retransmission.
    last_accepted: Option<u8>,

    mtu: usize,

    /// Written payload that has not been framed yet.
    outbound: BytesMut,

    /// The single outstanding, unacknowledged data frame.
    pending: Option<Frame>,

    sequencer: Sequencer,
}

impl State {
    /// Creates the state of a fresh connection.
    pub fn new(mtu: u8) -> Self {
        State {
            inbound: BytesMut::new(),
            last_accepted: None,
            mtu: mtu as usize,
            outbound: BytesMut::new(),
            pending: None,
            sequencer: Sequencer::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.pending {
            Some(_) => Phase::AwaitingAck,
            None => Phase::Idle,
        }
    }

    /// The frame awaiting acknowledgment, if any.
    pub fn pending(&self) -> Option<&Frame> {
        self.pending.as_ref()
    }

    /// Whether everything ever written has been acknowledged by the peer.
    pub fn is_flushed(&self) -> bool {
        self.pending.is_none() && self.outbound.is_empty()
    }

    /// The amount of bytes that can be read right away.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// The amount of written bytes that have not been framed yet.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Takes up to `max` bytes off the front of the inbound buffer.
    pub fn read(&mut self, max: usize) -> Bytes {
        let len = cmp::min(max, self.inbound.len());
        self.inbound.split_to(len).freeze()
    }

    /// Appends data to the outbound buffer and tries to frame it.
    ///
    /// Returns the newly framed data frame that needs to be transmitted.
    pub fn write(&mut self, data: &[u8]) -> Option<Frame> {
        self.outbound.extend_from_slice(data);
        self.advance()
    }

    /// Frames the next chunk of outbound data if no frame is outstanding.
    ///
    /// Returns the new data frame, which is now the pending one.
    pub fn advance(&mut self) -> Option<Frame> {
        if self.pending.is_some() || self.outbound.is_empty() {
            return None;
        }

        let len = cmp::min(self.mtu, self.outbound.len());
        let payload = self.outbound.split_to(len).freeze();
        let frame = Frame::data(self.sequencer.next_id(), payload);

        trace!("framed {} bytes as frame {}", len, frame.id());

        self.pending = Some(frame.clone());
        Some(frame)
    }

    /// Processes a frame that arrived from the peer.
    ///
    /// For data frames this returns the acknowledgment to send back. For
    /// acknowledgment frames it returns the next data frame, if the
    /// acknowledgment released one.
    pub fn receive(&mut self, frame: Frame) -> Option<Frame> {
        match frame.kind() {
            FrameKind::Ack => {
                let matches = self
                    .pending
                    .as_ref()
                    .map_or(false, |tx| tx.id() == frame.acked());

                if !matches {
                    trace!("ignoring stale ack for frame {}", frame.acked());
                    return None;
                }

                trace!("frame {} acknowledged", frame.acked());
                self.pending = None;
                self.advance()
            }
            FrameKind::Data => {
                if self.last_accepted == Some(frame.id()) {
                    trace!("discarding duplicate of frame {}", frame.id());
                } else {
                    self.inbound.extend_from_slice(frame.payload());
                    self.last_accepted = Some(frame.id());
                }

                Some(Frame::ack(frame.id()))
            }
        }
    }
}
