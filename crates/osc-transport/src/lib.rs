//! OSC Transport Layer
//!
//! Byte-moving collaborators for the OSC core:
//! - UDP (one packet per datagram)
//! - TCP (4-byte length-prefixed frames)
//! - [`UdpServer`], which feeds every datagram into an
//!   [`osc_dispatch::Dispatcher`]

pub mod error;
pub mod traits;

#[cfg(feature = "udp")]
pub mod server;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "udp")]
pub mod udp;

pub use error::{Result, TransportError};
pub use traits::{TransportEvent, TransportReceiver, TransportSender, TransportServer};

#[cfg(feature = "udp")]
pub use server::{ServerConfig, UdpServer};

#[cfg(feature = "tcp")]
pub use tcp::{TcpConfig, TcpReceiver, TcpSender, TcpServer, TcpTransport};

#[cfg(feature = "udp")]
pub use udp::{UdpConfig, UdpReceiver, UdpSender, UdpTransport};
