//! This module implements the wire format of a single frame.
//!
//! ```text
//! offset 0        1    2     3      4..4+size  4+size..8+size
//!        [0xEB]   [id] [ack] [size] [data]     [crc32]
//! ```
//!
//! The CRC-32 (IEEE) covers the header and the payload and is written in
//! network byte order.

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use flate2::{Crc, CrcWriter};
use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{self, Cursor, ErrorKind, Read, Write},
};

/// The marker byte every frame starts with.
pub const START: u8 = 0xEB;

/// The length of `[start][id][ack][size]`.
pub const HEADER_LEN: usize = 4;

/// The length of the CRC-32 trailer.
pub const TRAILER_LEN: usize = 4;

/// The largest payload the one-byte size field can describe.
pub const MAX_PAYLOAD: usize = 255;

/// A single protocol frame.
///
/// An id of zero marks an acknowledgment frame, which names the
/// acknowledged data frame in `ack`. Any other id marks a data frame
/// and is its sequence number.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Frame {
    ack: u8,
    data: Bytes,
    id: u8,
}

/// Whether a frame carries payload or acknowledges one.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum FrameKind {
    Ack,
    Data,
}

/// The error when a frame cannot be read off a byte stream.
#[derive(Debug)]
pub enum FrameError {
    /// The first header byte was not `START`.
    ///
    /// Contains the byte that was found instead.
    InvalidStart(u8),

    /// The CRC-32 trailer does not match the frame contents.
    ChecksumMismatch { actual: u32, expected: u32 },

    /// The underlying stream failed.
    Io(io::Error),
}

impl Frame {
    /// Constructs a frame from its raw fields.
    ///
    /// # Panics
    ///
    /// Panics if the payload is longer than `MAX_PAYLOAD` bytes.
    pub fn new(id: u8, ack: u8, data: Bytes) -> Self {
        assert!(
            data.len() <= MAX_PAYLOAD,
            "frame payload of {} bytes exceeds {}",
            data.len(),
            MAX_PAYLOAD,
        );

        Frame { ack, data, id }
    }

    /// Constructs a data frame with the given sequence number.
    ///
    /// # Panics
    ///
    /// Panics if `id` is zero or the payload is longer than `MAX_PAYLOAD`.
    pub fn data(id: u8, data: Bytes) -> Self {
        assert_ne!(id, 0, "data frames need a nonzero id");

        Self::new(id, 0, data)
    }

    /// Constructs a frame acknowledging the data frame `id`.
    pub fn ack(id: u8) -> Self {
        Self::new(0, id, Bytes::new())
    }

    /// The sequence number, or zero for acknowledgment frames.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The acknowledged sequence number.
    ///
    /// Only meaningful for acknowledgment frames.
    pub fn acked(&self) -> u8 {
        self.ack
    }

    pub fn kind(&self) -> FrameKind {
        if self.id == 0 {
            FrameKind::Ack
        } else {
            FrameKind::Data
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.data
    }

    /// The value of the size field.
    pub fn size(&self) -> u8 {
        self.data.len() as u8
    }

    /// Gets the length of the frame in its serialized form, including
    /// header and checksum.
    pub fn binary_len(&self) -> usize {
        HEADER_LEN + self.data.len() + TRAILER_LEN
    }
}

impl Frame {
    /// Reads a frame from the given reader and verifies its CRC-32 sum.
    ///
    /// Reads are repeated until exactly the amount of bytes the frame needs
    /// has been obtained. An invalid start byte is reported right after the
    /// header has been read, without touching the rest of the stream.
    pub fn read_from(r: &mut impl Read) -> Result<Frame, FrameError> {
        let mut header = [0; HEADER_LEN];
        r.read_exact(&mut header)?;

        if header[0] != START {
            return Err(FrameError::InvalidStart(header[0]));
        }

        let mut data = vec![0; header[3] as usize];
        r.read_exact(&mut data)?;

        let expected = r.read_u32::<NetworkEndian>()?;
        let actual = {
            let mut crc = Crc::new();
            crc.update(&header);
            crc.update(&data);
            crc.sum()
        };

        if actual != expected {
            return Err(FrameError::ChecksumMismatch { actual, expected });
        }

        Ok(Frame {
            ack: header[2],
            data: data.into(),
            id: header[1],
        })
    }

    /// Writes header and payload to the given writer.
    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&[START, self.id, self.ack, self.size()])?;
        w.write_all(&self.data)
    }

    /// Writes the frame including its CRC-32 sum to the given writer.
    pub fn write_to_with_crc32(&self, w: &mut impl Write) -> io::Result<()> {
        let mut crc_writer = CrcWriter::new(w);
        self.write_to(&mut crc_writer)?;

        let crc_sum = crc_writer.crc().sum();
        crc_writer
            .into_inner()
            .write_u32::<NetworkEndian>(crc_sum)?;

        Ok(())
    }

    /// Writes the frame to a new vector of bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::with_capacity(self.binary_len()));
        self.write_to_with_crc32(&mut buf)
            .expect("writing into a vector cannot fail");
        buf.into_inner()
    }
}

impl FrameError {
    /// Whether the stream delivered a complete frame that turned out to be
    /// garbage, as opposed to the stream itself failing.
    pub fn is_corruption(&self) -> bool {
        match self {
            FrameError::Io(_) => false,
            _ => true,
        }
    }
}

impl Display for FrameError {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            FrameError::InvalidStart(b) => {
                write!(fmt, "invalid start byte {:#04X}", b)
            }
            FrameError::ChecksumMismatch { actual, expected } => write!(
                fmt,
                "crc32 sum mismatch: got {:X}, wanted {:X}",
                actual, expected,
            ),
            FrameError::Io(e) => write!(fmt, "{}", e),
        }
    }
}

impl StdError for FrameError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e)
    }
}

impl From<FrameError> for io::Error {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(e) => e,
            e => io::Error::new(ErrorKind::InvalidData, e),
        }
    }
}
