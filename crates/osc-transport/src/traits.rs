//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use osc_core::{Encode, Packet};
use std::net::SocketAddr;

use crate::error::Result;

/// Events that can occur on a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A packet arrived and decoded cleanly
    Packet(Packet),
    /// Bytes arrived but did not decode as OSC
    Raw(Bytes),
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Error occurred
    Error(String),
}

impl TransportEvent {
    /// Decode `data`, keeping the raw bytes when decoding fails
    pub fn from_bytes(data: Bytes) -> Self {
        match osc_core::decode(&data) {
            Ok(packet) => TransportEvent::Packet(packet),
            Err(e) => {
                tracing::debug!("Undecodable payload of {} bytes: {}", data.len(), e);
                TransportEvent::Raw(data)
            }
        }
    }

    pub fn into_packet(self) -> Option<Packet> {
        match self {
            TransportEvent::Packet(packet) => Some(packet),
            _ => None,
        }
    }
}

/// Trait for sending data
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send one encoded packet
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Encode and send a packet
    async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let data = packet.encode()?;
        self.send(data).await
    }

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the sender
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving data
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Trait for transport servers (listeners)
#[async_trait]
pub trait TransportServer: Send + Sync {
    /// The sender type for accepted connections
    type Sender: TransportSender;
    /// The receiver type for accepted connections
    type Receiver: TransportReceiver;

    /// Accept a new connection
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)>;

    /// Get the local address
    fn local_addr(&self) -> Result<SocketAddr>;
}
