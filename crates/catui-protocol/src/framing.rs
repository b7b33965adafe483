//! Length-prefixed framing for handshake messages.
//!
//! Every message is a 4-byte big-endian length followed by the payload:
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  payload         |
//! +----------------+------------------+
//! ```
//!
//! Zero-length frames are legal; an empty acknowledgement means "accepted".

use std::io::{Read, Write};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Size of the length prefix.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Frames `payload` with its length prefix.
pub fn encode_frame(payload: &[u8]) -> ProtocolResult<Vec<u8>> {
    let len = checked_len(payload.len(), MAX_MESSAGE_SIZE)?;

    let mut buffer = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&len.to_be_bytes());
    buffer.extend_from_slice(payload);
    Ok(buffer)
}

/// Returns the payload of a complete frame.
///
/// The input must hold at least the whole frame; trailing bytes are ignored.
pub fn decode_frame(data: &[u8]) -> ProtocolResult<&[u8]> {
    let Some((header, rest)) = data.split_first_chunk::<FRAME_HEADER_SIZE>() else {
        return Err(ProtocolError::IncompleteMessage {
            expected: FRAME_HEADER_SIZE,
            received: data.len(),
        });
    };

    let len = u32::from_be_bytes(*header) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    if rest.len() < len {
        return Err(ProtocolError::IncompleteMessage {
            expected: FRAME_HEADER_SIZE + len,
            received: data.len(),
        });
    }

    Ok(&rest[..len])
}

/// Parses a length prefix, enforcing `max`.
pub fn frame_len(header: [u8; FRAME_HEADER_SIZE], max: usize) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > max {
        return Err(ProtocolError::MessageTooLarge { size: len, max });
    }
    Ok(len)
}

fn checked_len(len: usize, max: usize) -> ProtocolResult<u32> {
    if len > max {
        return Err(ProtocolError::MessageTooLarge { size: len, max });
    }
    // max is far below u32::MAX
    u32::try_from(len).map_err(|_| ProtocolError::MessageTooLarge { size: len, max })
}

/// Reads framed messages from a byte stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads one frame no larger than `max` bytes.
    ///
    /// Returns `Ok(None)` if the stream ends before any byte of the frame.
    pub fn read_frame(&mut self, max: usize) -> ProtocolResult<Option<Vec<u8>>> {
        let mut len_buf = [0u8; FRAME_HEADER_SIZE];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let len = frame_len(len_buf, max)?;

        let mut payload = vec![0u8; len];
        match self.reader.read_exact(&mut payload) {
            Ok(()) => Ok(Some(payload)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ProtocolError::IncompleteMessage {
                    expected: FRAME_HEADER_SIZE + len,
                    received: FRAME_HEADER_SIZE,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads one frame, treating end of stream as an error.
    pub fn expect_frame(&mut self, max: usize) -> ProtocolResult<Vec<u8>> {
        self.read_frame(max)?.ok_or(ProtocolError::ConnectionClosed)
    }

    /// Unwraps this FrameReader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes framed messages to a byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes `payload` as a single frame and flushes.
    pub fn write_frame(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        let data = encode_frame(payload)?;
        self.writer.write_all(&data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Unwraps this FrameWriter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
