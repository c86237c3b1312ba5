use bytes::{BufMut, BytesMut};
use std::io::{self, Cursor, Error, ErrorKind, Read};
use tokio::codec::{Decoder, Encoder};

use crate::frame::{Frame, FrameError, START};

/// An implementation of a (de)serializer of frames.
///
/// This mostly just wraps `Frame::read_from` and `Frame::write_to_with_crc32`.
///
/// Incomplete input is left in the buffer until more bytes arrive. When a
/// frame is rejected, only its first byte is dropped and decoding resumes at
/// the next `START` marker behind it.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct FrameCodec;

/// A wrapper around an io::Read that counts how many bytes were read.
#[derive(Debug)]
struct CountingReader<R> {
    count: usize,
    reader: R,
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        match src.first() {
            Some(&START) => {}
            Some(&b) => {
                resync(src);
                return Err(FrameError::InvalidStart(b));
            }
            None => return Ok(None),
        }

        let (result, count) = {
            // To properly advance the buffer we need to count how many bytes
            // the parser has looked at.

            let mut counter = CountingReader::new(Cursor::new(src.as_ref()));
            let result = Frame::read_from(&mut counter);

            (result, counter.count())
        };

        match result {
            Ok(frame) => {
                src.advance(count);
                Ok(Some(frame))
            }
            Err(FrameError::Io(ref err)) if err.kind() == ErrorKind::UnexpectedEof =>
                Ok(None),
            Err(e) => {
                resync(src);
                Err(e)
            }
        }
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.decode(buf)? {
                Some(frame) => return Ok(Some(frame)),
                None if buf.is_empty() => return Ok(None),

                // What looked like a frame can never complete, but a real
                // one may still start behind it.
                None => resync(buf),
            }
        }
    }
}

/// Drops the first byte and everything up to the next `START` marker.
fn resync(buf: &mut BytesMut) {
    let skip = buf
        .iter()
        .skip(1)
        .position(|&b| b == START)
        .map_or(buf.len(), |pos| pos + 1);

    buf.advance(skip);
}

impl Encoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn encode(
        &mut self,
        item: Frame,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        dst.reserve(item.binary_len());
        item.write_to_with_crc32(&mut dst.writer())
    }
}

impl<R> CountingReader<R> {
    pub fn new(reader: R) -> Self {
        CountingReader {
            count: 0,
            reader: reader,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.reader.read(buf)?;
        self.count += read;
        Ok(read)
    }
}
