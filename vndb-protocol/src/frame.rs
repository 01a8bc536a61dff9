//! Sentinel framing.
//!
//! Every message, in either direction, is UTF-8 text followed by a single
//! `0x04` byte. There is no length prefix:
//!
//! ```text
//! +---------------------------------+------+
//! | payload (UTF-8, no 0x04 inside)  | 0x04 |
//! +---------------------------------+------+
//! ```

use crate::error::ProtocolError;
use crate::MAX_FRAME_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// End-of-message marker (U+0004).
pub const SENTINEL: u8 = 0x04;

/// A complete message with the sentinel stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Creates a frame from an outgoing message, rejecting embedded sentinels.
    pub fn from_message(message: &str) -> Result<Self, ProtocolError> {
        if let Some(pos) = message.bytes().position(|b| b == SENTINEL) {
            return Err(ProtocolError::SentinelInMessage(pos));
        }
        Ok(Self::new(Bytes::copy_from_slice(message.as_bytes())))
    }

    /// Encodes the frame into bytes (payload followed by the sentinel).
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 1);
        buf.put_slice(&self.payload);
        buf.put_u8(SENTINEL);
        buf
    }

    /// Decodes the first complete frame from `buf`.
    ///
    /// Returns `Ok(Some(frame))` and consumes it (sentinel included) when a
    /// sentinel is buffered, `Ok(None)` if more data is needed.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        Self::decode_from(buf, 0)
    }

    /// Like [`Frame::decode`], but only searches for the sentinel from `offset`.
    ///
    /// The caller guarantees that `buf[..offset]` holds no sentinel.
    pub fn decode_from(buf: &mut BytesMut, offset: usize) -> Result<Option<Self>, ProtocolError> {
        let start = offset.min(buf.len());
        match buf[start..].iter().position(|&b| b == SENTINEL) {
            Some(pos) => {
                let payload = buf.split_to(start + pos).freeze();
                buf.advance(1);
                Ok(Some(Self::new(payload)))
            }
            None if buf.len() > MAX_FRAME_SIZE => Err(ProtocolError::FrameTooLarge {
                size: buf.len(),
                max: MAX_FRAME_SIZE,
            }),
            None => Ok(None),
        }
    }

    /// Returns the payload as text.
    pub fn into_text(self) -> Result<String, ProtocolError> {
        String::from_utf8(self.payload.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::from_message("get vn basic (id = 17)").unwrap();
        let mut buf = frame.encode();
        assert_eq!(buf.last(), Some(&SENTINEL));

        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.into_text().unwrap(), "get vn basic (id = 17)");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_incomplete_frame() {
        let mut buf = BytesMut::from(&b"results {\"num\""[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        // Nothing consumed while waiting for the sentinel.
        assert_eq!(buf.len(), 14);
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let mut buf = BytesMut::from(&b"ok\x04dbstats {}\x04"[..]);

        let first = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"ok");

        let second = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.payload.as_ref(), b"dbstats {}");

        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_from_offset() {
        let mut buf = BytesMut::from(&b"dbstats {\"vn\":1}\x04ok\x04"[..]);
        let frame = Frame::decode_from(&mut buf, 8).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"dbstats {\"vn\":1}");

        // An offset past the end searches nothing.
        let mut buf = BytesMut::from(&b"ok"[..]);
        assert!(Frame::decode_from(&mut buf, 5).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_empty_frame() {
        let mut buf = BytesMut::from(&b"\x04"[..]);
        let frame = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_sentinel_in_message_rejected() {
        let result = Frame::from_message("login {}\u{4}dbstats");
        assert!(matches!(result, Err(ProtocolError::SentinelInMessage(8))));
    }

    #[test]
    fn test_frame_too_large() {
        let mut buf = BytesMut::from(vec![b'a'; MAX_FRAME_SIZE + 1].as_slice());
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_invalid_utf8() {
        let frame = Frame::new(Bytes::from_static(&[0xff, 0xfe]));
        assert!(matches!(frame.into_text(), Err(ProtocolError::InvalidUtf8)));
    }
}
