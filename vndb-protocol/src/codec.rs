//! Encoder and decoder for sentinel-terminated messages.

use crate::error::ProtocolError;
use crate::frame::Frame;
use bytes::BytesMut;

/// Encodes outgoing command lines into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a message into a sentinel-terminated frame.
    pub fn encode_message(message: &str) -> Result<BytesMut, ProtocolError> {
        Ok(Frame::from_message(message)?.encode())
    }
}

/// Reassembles frames from arbitrarily chunked transport reads.
///
/// Chunks are appended in delivery order; each call to [`Decoder::decode_frame`]
/// yields at most one frame, so a delivery carrying several frames is drained
/// by calling it until it returns `None`.
pub struct Decoder {
    buffer: BytesMut,
    /// Length of the buffered prefix already searched for a sentinel.
    scanned: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let frame = Frame::decode_from(&mut self.buffer, self.scanned)?;
        self.scanned = match frame {
            Some(_) => 0,
            None => self.buffer.len(),
        };
        Ok(frame)
    }

    /// Attempts to decode the next frame as a text line.
    ///
    /// A frame that is not valid UTF-8 is consumed and reported as
    /// [`ProtocolError::InvalidUtf8`]; the buffer stays aligned on the next frame.
    pub fn decode_line(&mut self) -> Result<Option<String>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => frame.into_text().map(Some),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
