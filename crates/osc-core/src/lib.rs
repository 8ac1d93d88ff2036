//! OSC Core
//!
//! Wire format, data model and address pattern matching for Open Sound Control.
//!
//! This crate provides:
//! - The OSC data model ([`Value`], [`Message`], [`Bundle`], [`Packet`])
//! - Binary encoding/decoding ([`codec`], [`Encode`], [`Decode`])
//! - Length-prefixed stream framing ([`frame`])
//! - NTP time tags ([`TimeTag`])
//! - Address validation and pattern intersection ([`Address`], [`Pattern`])
//!
//! Everything here is pure and synchronous; no function performs I/O.

pub mod address;
pub mod codec;
pub mod error;
pub mod frame;
pub mod pattern;
pub mod time;
pub mod types;

pub use address::Address;
pub use codec::{decode, encode, Decode, Encode};
pub use error::{Error, Result};
pub use pattern::Pattern;
pub use time::TimeTag;
pub use types::*;

/// Default UDP port used by many OSC applications
pub const DEFAULT_PORT: u16 = 57120;

/// Largest datagram read by the bundled UDP transport
pub const MAX_PACKET_SIZE: usize = 32768;
