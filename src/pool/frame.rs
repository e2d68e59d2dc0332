//! Frame codec for the worker-pool transport.
//!
//! Each datagram carries one message: a header byte sequence and a body
//! byte sequence, both length-prefixed (u16 and u32, big-endian). A parse
//! must consume the datagram exactly; anything else is malformed and the
//! datagram is dropped.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Header of every reply the pool fabricates.
pub const REPLY_HEADER: &[u8] = b"rep";
/// Body of every reply the pool fabricates.
pub const REPLY_BODY: &[u8] = b"Hello!";

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Bytes,
    pub body: Bytes,
}

impl Frame {
    pub fn new(header: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self {
            header: header.into(),
            body: body.into(),
        }
    }

    /// The canned reply sent for every well-formed request.
    pub fn reply() -> Self {
        Self::new(REPLY_HEADER, REPLY_BODY)
    }

    /// Parse one datagram. Returns `None` unless the datagram contains
    /// exactly one well-formed frame.
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        let mut buf = datagram;

        if buf.remaining() < 2 {
            return None;
        }
        let header_len = buf.get_u16() as usize;
        if buf.remaining() < header_len {
            return None;
        }
        let header = Bytes::copy_from_slice(&buf[..header_len]);
        buf.advance(header_len);

        if buf.remaining() < 4 {
            return None;
        }
        let body_len = buf.get_u32() as usize;
        if buf.remaining() != body_len {
            // Truncated body or trailing garbage.
            return None;
        }
        let body = Bytes::copy_from_slice(buf);

        Some(Self { header, body })
    }

    /// Encode into a single datagram.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.header.len() + 4 + self.body.len());
        buf.put_u16(self.header.len() as u16);
        buf.put_slice(&self.header);
        buf.put_u32(self.body.len() as u32);
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parse_round_trip() {
        let frame = Frame::new(&b"testreqmsg"[..], &b"payload"[..]);
        let parsed = Frame::parse(&frame.encode()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_reply_frame_shape() {
        let reply = Frame::reply();
        assert_eq!(&reply.header[..], b"rep");
        assert_eq!(&reply.body[..], b"Hello!");
    }

    #[test]
    fn test_empty_header_and_body() {
        let frame = Frame::new(Bytes::new(), Bytes::new());
        let parsed = Frame::parse(&frame.encode()).unwrap();
        assert!(parsed.header.is_empty());
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn test_truncated_datagrams_are_malformed() {
        let encoded = Frame::new(&b"hdr"[..], &b"body"[..]).encode();

        assert!(Frame::parse(&[]).is_none());
        assert!(Frame::parse(&encoded[..1]).is_none());
        for cut in 2..encoded.len() {
            assert!(Frame::parse(&encoded[..cut]).is_none(), "cut at {cut}");
        }
    }

    #[test]
    fn test_trailing_garbage_is_malformed() {
        let mut datagram = Frame::new(&b"hdr"[..], &b"body"[..]).encode().to_vec();
        datagram.push(0);
        assert!(Frame::parse(&datagram).is_none());
    }

    #[test]
    fn test_length_prefix_past_end_is_malformed() {
        // Header length claims 200 bytes but only a few follow.
        let datagram = [0x00, 0xc8, b'a', b'b', b'c'];
        assert!(Frame::parse(&datagram).is_none());
    }
}
