//! Stream framing
//!
//! Datagram transports carry one packet per datagram. Stream transports
//! prefix every packet with its length:
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Bytes 0-3:  Packet length (uint32 big-endian) │
//! ├──────────────────────────────────────────────┤
//! │ Packet (message or bundle)                    │
//! └──────────────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::IoSlice;

use crate::codec::{self, Encode};
use crate::{Error, Packet, Result};

/// Length prefix size
pub const HEADER_SIZE: usize = 4;

/// Default maximum packet size accepted from a stream
pub const DEFAULT_MAX_PACKET_SIZE: usize = 64 * 1024;

/// Prefix an encoded packet with its length
pub fn encode(payload: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge(payload.len()))?;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u32(len);
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

/// Encode a packet and frame it
pub fn encode_packet(packet: &Packet) -> Result<Bytes> {
    encode(&packet.encode()?)
}

/// Split one framed payload off the front of `buf`.
///
/// On error nothing is consumed, so the caller can retry once more bytes
/// have arrived.
pub fn decode(buf: &mut impl Buf) -> Result<Bytes> {
    let have = buf.remaining();
    let len = peek_len(buf)? as usize;
    if have - HEADER_SIZE < len {
        return Err(Error::TruncatedInput {
            needed: HEADER_SIZE + len,
            have,
        });
    }

    buf.advance(HEADER_SIZE);
    Ok(buf.copy_to_bytes(len))
}

/// Read the length prefix without consuming it
fn peek_len(buf: &impl Buf) -> Result<u32> {
    let mut header = [0u8; HEADER_SIZE];
    let mut filled = 0;

    let mut slices = [IoSlice::new(&[]); HEADER_SIZE];
    let count = buf.chunks_vectored(&mut slices);
    for slice in &slices[..count] {
        let n = slice.len().min(HEADER_SIZE - filled);
        header[filled..filled + n].copy_from_slice(&slice[..n]);
        filled += n;
        if filled == HEADER_SIZE {
            return Ok(u32::from_be_bytes(header));
        }
    }

    Err(Error::TruncatedInput {
        needed: HEADER_SIZE,
        have: buf.remaining(),
    })
}

/// Split and decode one framed packet
pub fn decode_packet(buf: &mut impl Buf) -> Result<Packet> {
    codec::decode(&decode(buf)?)
}

/// Total frame size once `buf` holds a complete frame.
///
/// Fails when the declared length exceeds `max_size`.
pub fn check_complete(buf: &[u8], max_size: usize) -> Result<Option<usize>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > max_size {
        return Err(Error::PayloadTooLarge(len));
    }

    let total = HEADER_SIZE + len;
    if buf.len() >= total {
        Ok(Some(total))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    #[test]
    fn test_frame_packet() {
        let msg = Message::new("/foo", vec!["foo".into()]).unwrap();
        let packet = Packet::from(msg.clone());
        let framed = encode_packet(&packet).unwrap();
        let body = msg.encode().unwrap();

        assert_eq!(framed.len(), HEADER_SIZE + body.len());
        assert_eq!(&framed[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&framed[4..], &body[..]);

        let mut slice = &framed[..];
        assert_eq!(decode_packet(&mut slice).unwrap(), packet);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_check_complete() {
        let framed = encode(b"/a\0\0,\0\0\0").unwrap();

        assert_eq!(check_complete(&framed, 1024).unwrap(), Some(framed.len()));
        assert_eq!(check_complete(&framed[..2], 1024).unwrap(), None);
        assert_eq!(check_complete(&framed[..6], 1024).unwrap(), None);
        assert!(matches!(
            check_complete(&framed, 4),
            Err(Error::PayloadTooLarge(8))
        ));
    }

    #[test]
    fn test_truncated_frame() {
        let framed = encode(b"/abc").unwrap();

        for cut in [2, 6] {
            let mut slice = &framed[..cut];
            assert!(matches!(
                decode(&mut slice),
                Err(Error::TruncatedInput { .. })
            ));
            assert_eq!(slice.len(), cut, "input consumed on error");
        }

        let mut slice = &framed[..];
        assert_eq!(decode(&mut slice).unwrap(), Bytes::from_static(b"/abc"));
        assert!(slice.is_empty());
    }

    #[test]
    fn test_frame_resumes_after_more_bytes() {
        let framed = encode(b"/abc").unwrap();
        let mut buf = BytesMut::from(&framed[..5]);

        assert!(decode(&mut buf).is_err());
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&framed[5..]);
        assert_eq!(decode(&mut buf).unwrap(), Bytes::from_static(b"/abc"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_split_across_chunks() {
        let framed = encode(b"/abc").unwrap();
        let mut chained = (&framed[..2]).chain(&framed[2..]);
        assert_eq!(decode(&mut chained).unwrap(), Bytes::from_static(b"/abc"));
        assert!(!chained.has_remaining());
    }
}
