//! OSC binary codec
//!
//! All multi-byte fields are big-endian and every encoded item is padded with
//! zero bytes to a multiple of four.
//!
//! ```text
//! Message = string(address) string(",tags") arg*
//! Bundle  = string("#bundle") timetag (u32(len) packet[len])*
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::types::{Bundle, Message, Packet, Value};
use crate::{Error, Result, TimeTag};

/// Leading string of every encoded bundle
pub const BUNDLE_TAG: &str = "#bundle";

/// Deepest bundle nesting accepted by the decoder
pub const MAX_NESTING_DEPTH: usize = 64;

/// Standard type tag characters
pub mod tag {
    pub const INT: char = 'i';
    pub const FLOAT: char = 'f';
    pub const STRING: char = 's';
    pub const BLOB: char = 'b';
    pub const TIME: char = 't';
}

/// Encode into a self-contained byte buffer
pub trait Encode {
    fn encode(&self) -> Result<Bytes>;
}

/// Decode from a complete byte buffer
pub trait Decode: Sized {
    fn decode(bytes: &[u8]) -> Result<Self>;
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Encode a packet
pub fn encode(packet: &Packet) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(estimate_packet_size(packet));
    encode_packet_to_buf(&mut buf, packet)?;
    Ok(buf.freeze())
}

/// Decode exactly one message or bundle.
///
/// Bundles nested more than [`MAX_NESTING_DEPTH`] deep are rejected with
/// [`Error::MalformedPacket`].
pub fn decode(bytes: &[u8]) -> Result<Packet> {
    decode_nested(bytes, 0)
}

/// `depth` counts the enclosing bundles
fn decode_nested(bytes: &[u8], depth: usize) -> Result<Packet> {
    let mut buf = bytes;
    let head = decode_string(&mut buf)?;

    if head == BUNDLE_TAG {
        decode_bundle_body(&mut buf, depth).map(Packet::Bundle)
    } else if head.starts_with('/') {
        decode_message_body(head, &mut buf).map(Packet::Message)
    } else {
        Err(Error::MalformedPacket(format!(
            "leading string {:?} is neither an address nor {:?}",
            head, BUNDLE_TAG
        )))
    }
}

impl Encode for Packet {
    fn encode(&self) -> Result<Bytes> {
        encode(self)
    }
}

impl Decode for Packet {
    fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

impl Encode for Message {
    fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(estimate_message_size(self));
        encode_message_to_buf(&mut buf, self)?;
        Ok(buf.freeze())
    }
}

impl Decode for Message {
    fn decode(bytes: &[u8]) -> Result<Self> {
        match decode(bytes)? {
            Packet::Message(m) => Ok(m),
            Packet::Bundle(_) => Err(Error::MalformedPacket(
                "expected a message, found a bundle".to_string(),
            )),
        }
    }
}

impl Encode for Bundle {
    fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(estimate_bundle_size(self));
        encode_bundle_to_buf(&mut buf, self)?;
        Ok(buf.freeze())
    }
}

impl Decode for Bundle {
    fn decode(bytes: &[u8]) -> Result<Self> {
        match decode(bytes)? {
            Packet::Bundle(b) => Ok(b),
            Packet::Message(_) => Err(Error::MalformedPacket(
                "expected a bundle, found a message".to_string(),
            )),
        }
    }
}

impl Encode for Value {
    fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(estimate_value_size(self));
        encode_value(&mut buf, self)?;
        Ok(buf.freeze())
    }
}

impl Encode for TimeTag {
    fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(8);
        encode_timetag(&mut buf, *self);
        Ok(buf.freeze())
    }
}

// ============================================================================
// SIZE ESTIMATES
// ============================================================================

/// Length of an item of `len` bytes after zero padding
#[inline]
pub fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

#[inline]
fn string_size(s: &str) -> usize {
    padded_len(s.len() + 1)
}

fn estimate_value_size(value: &Value) -> usize {
    match value {
        Value::Int(_) | Value::Float(_) => 4,
        Value::String(s) => string_size(s),
        Value::Blob(b) => 4 + padded_len(b.len()),
        Value::Time(_) => 8,
    }
}

fn estimate_message_size(msg: &Message) -> usize {
    string_size(msg.address())
        + padded_len(msg.args().len() + 2)
        + msg.args().iter().map(estimate_value_size).sum::<usize>()
}

fn estimate_bundle_size(bundle: &Bundle) -> usize {
    16 + bundle
        .contents
        .iter()
        .map(|p| 4 + estimate_packet_size(p))
        .sum::<usize>()
}

fn estimate_packet_size(packet: &Packet) -> usize {
    match packet {
        Packet::Message(m) => estimate_message_size(m),
        Packet::Bundle(b) => estimate_bundle_size(b),
    }
}

// ============================================================================
// ATOMIC VALUES
// ============================================================================

#[inline]
fn put_padding(buf: &mut BytesMut, len: usize) {
    buf.put_bytes(0, padded_len(len) - len);
}

pub fn encode_int(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

pub fn encode_float(buf: &mut BytesMut, value: f32) {
    buf.put_f32(value);
}

/// Encode a string, truncated at its first embedded null
pub fn encode_string(buf: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    buf.put_slice(&bytes[..end]);
    buf.put_u8(0);
    put_padding(buf, end + 1);
}

pub fn encode_blob(buf: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| Error::PayloadTooLarge(data.len()))?;
    buf.put_u32(len);
    buf.put_slice(data);
    put_padding(buf, data.len());
    Ok(())
}

pub fn encode_timetag(buf: &mut BytesMut, tag: TimeTag) {
    buf.put_u32(tag.seconds());
    buf.put_u32(tag.fraction());
}

pub fn encode_value(buf: &mut BytesMut, value: &Value) -> Result<()> {
    match value {
        Value::Int(i) => encode_int(buf, *i),
        Value::Float(f) => encode_float(buf, *f),
        Value::String(s) => encode_string(buf, s),
        Value::Blob(b) => encode_blob(buf, b)?,
        Value::Time(t) => encode_timetag(buf, *t),
    }
    Ok(())
}

#[inline]
fn ensure(buf: &[u8], needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::TruncatedInput {
            needed,
            have: buf.remaining(),
        });
    }
    Ok(())
}

/// Decode an int, reinterpreting values above `i32::MAX` as negative
pub fn decode_int(buf: &mut &[u8]) -> Result<i32> {
    ensure(buf, 4)?;
    Ok(buf.get_i32())
}

pub fn decode_float(buf: &mut &[u8]) -> Result<f32> {
    ensure(buf, 4)?;
    Ok(buf.get_f32())
}

/// Decode a null-terminated string and skip to the next 4-byte boundary
pub fn decode_string(buf: &mut &[u8]) -> Result<String> {
    let nul = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::TruncatedInput {
            needed: buf.len() + 1,
            have: buf.len(),
        })?;
    let total = padded_len(nul + 1);
    ensure(buf, total)?;

    let s = std::str::from_utf8(&buf[..nul])
        .map_err(|e| Error::MalformedPacket(format!("string is not valid UTF-8: {}", e)))?
        .to_string();
    buf.advance(total);
    Ok(s)
}

pub fn decode_blob(buf: &mut &[u8]) -> Result<Vec<u8>> {
    ensure(buf, 4)?;
    let len = buf.get_u32() as usize;
    ensure(buf, padded_len(len))?;

    let data = buf[..len].to_vec();
    buf.advance(padded_len(len));
    Ok(data)
}

pub fn decode_timetag(buf: &mut &[u8]) -> Result<TimeTag> {
    ensure(buf, 8)?;
    let seconds = buf.get_u32();
    let fraction = buf.get_u32();
    Ok(TimeTag::new(seconds, fraction))
}

/// Decode the argument for one type tag.
///
/// Nonstandard tags are consumed and yield `None`.
pub fn decode_value(buf: &mut &[u8], type_tag: char) -> Result<Option<Value>> {
    let value = match type_tag {
        tag::INT => Value::Int(decode_int(buf)?),
        tag::FLOAT => Value::Float(decode_float(buf)?),
        tag::STRING => Value::String(decode_string(buf)?),
        tag::BLOB => Value::Blob(decode_blob(buf)?),
        tag::TIME => Value::Time(decode_timetag(buf)?),
        // int64, double
        'h' | 'd' => return skip(buf, 8),
        // symbol
        'S' => {
            decode_string(buf)?;
            return Ok(None);
        }
        // char, rgba color, midi
        'c' | 'r' | 'm' => return skip(buf, 4),
        // true, false, nil, infinitum, array delimiters
        'T' | 'F' | 'N' | 'I' | '[' | ']' => return Ok(None),
        other => return Err(Error::UnknownTypeTag(other)),
    };
    Ok(Some(value))
}

fn skip(buf: &mut &[u8], len: usize) -> Result<Option<Value>> {
    ensure(buf, len)?;
    buf.advance(len);
    Ok(None)
}

// ============================================================================
// PACKETS
// ============================================================================

fn encode_packet_to_buf(buf: &mut BytesMut, packet: &Packet) -> Result<()> {
    match packet {
        Packet::Message(m) => encode_message_to_buf(buf, m),
        Packet::Bundle(b) => encode_bundle_to_buf(buf, b),
    }
}

fn encode_message_to_buf(buf: &mut BytesMut, msg: &Message) -> Result<()> {
    encode_string(buf, msg.address());
    encode_string(buf, &msg.type_tags());
    for arg in msg.args() {
        encode_value(buf, arg)?;
    }
    Ok(())
}

fn encode_bundle_to_buf(buf: &mut BytesMut, bundle: &Bundle) -> Result<()> {
    encode_string(buf, BUNDLE_TAG);
    encode_timetag(buf, bundle.timetag);

    for element in &bundle.contents {
        // Length prefix is patched once the element size is known
        let start = buf.len();
        buf.put_u32(0);
        encode_packet_to_buf(buf, element)?;

        let len = buf.len() - start - 4;
        let len = u32::try_from(len).map_err(|_| Error::PayloadTooLarge(len))?;
        buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
    }
    Ok(())
}

fn decode_message_body(address: String, buf: &mut &[u8]) -> Result<Message> {
    // Messages without a type tag string carry no arguments
    if buf.first() != Some(&b',') {
        return Ok(Message::from_wire(address, Vec::new()));
    }

    let tags = decode_string(buf)?;
    let mut args = Vec::with_capacity(tags.len().saturating_sub(1));
    for type_tag in tags.chars().skip(1) {
        if let Some(value) = decode_value(buf, type_tag)? {
            args.push(value);
        }
    }

    Ok(Message::from_wire(address, args))
}

fn decode_bundle_body(buf: &mut &[u8], depth: usize) -> Result<Bundle> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::MalformedPacket(format!(
            "bundles nested deeper than {}",
            MAX_NESTING_DEPTH
        )));
    }

    let timetag = decode_timetag(buf)?;
    let mut contents = Vec::new();

    while buf.has_remaining() {
        ensure(buf, 4)?;
        let len = buf.get_u32() as usize;
        ensure(buf, len)?;

        contents.push(decode_nested(&buf[..len], depth + 1)?);
        buf.advance(len);
    }

    Ok(Bundle::new(timetag, contents))
}
