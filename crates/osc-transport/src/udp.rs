//! UDP transport implementation
//!
//! One OSC packet per datagram, no framing.

use async_trait::async_trait;
use bytes::Bytes;
use osc_core::{Bundle, Encode, Packet, TimeTag};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// UDP configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Largest datagram read or sent
    pub max_packet_size: usize,
    /// Receiver channel capacity
    pub channel_capacity: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_packet_size: osc_core::MAX_PACKET_SIZE,
            channel_capacity: 100,
        }
    }
}

/// UDP transport (connectionless)
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    config: UdpConfig,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, UdpConfig::default()).await
    }

    /// Bind with config
    pub async fn bind_with_config(addr: &str, config: UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", addr, e)))?;

        info!("UDP bound to {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            config,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    /// Create a sender for a specific remote address
    pub fn sender_to(&self, remote: SocketAddr) -> UdpSender {
        UdpSender {
            socket: Arc::clone(&self.socket),
            remote,
            max_size: self.config.max_packet_size,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Send raw bytes to a specific address
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        send_datagram(&self.socket, data, target, self.config.max_packet_size).await
    }

    /// Encode and send a packet
    pub async fn send_packet(&self, packet: &Packet, target: SocketAddr) -> Result<()> {
        let data = packet.encode()?;
        self.send_to(&data, target).await
    }

    /// Send `packet` wrapped in a one-element bundle stamped with `timetag`
    pub async fn send_timestamped(
        &self,
        packet: Packet,
        timetag: TimeTag,
        target: SocketAddr,
    ) -> Result<()> {
        let bundle = Bundle::new(timetag, vec![packet]);
        self.send_packet(&Packet::Bundle(bundle), target).await
    }

    /// Receive one datagram.
    ///
    /// Yields [`TransportEvent::Packet`] when it decodes and
    /// [`TransportEvent::Raw`] otherwise.
    pub async fn recv_from(&self) -> Result<(TransportEvent, SocketAddr)> {
        let (data, from) = self.recv_bytes().await?;
        Ok((TransportEvent::from_bytes(data), from))
    }

    /// Receive one datagram without decoding it
    pub async fn recv_bytes(&self) -> Result<(Bytes, SocketAddr)> {
        let mut buf = vec![0u8; self.config.max_packet_size];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        debug!("UDP received {} bytes from {}", len, from);
        buf.truncate(len);
        Ok((Bytes::from(buf), from))
    }

    /// Start a background task feeding received datagrams into a channel
    pub fn start_receiver(&self) -> UdpReceiver {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let socket = Arc::clone(&self.socket);
        let max_size = self.config.max_packet_size;

        tokio::spawn(async move {
            let mut buf = vec![0u8; max_size];

            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => {
                        debug!("UDP received {} bytes from {}", len, from);
                        let event = TransportEvent::from_bytes(Bytes::copy_from_slice(&buf[..len]));
                        if tx.send((event, from)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("UDP receive error: {}", e);
                        if tx
                            .send((
                                TransportEvent::Error(e.to_string()),
                                SocketAddr::from(([0, 0, 0, 0], 0)),
                            ))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        UdpReceiver { rx }
    }

    /// Enable broadcast
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        self.socket.set_broadcast(enable).map_err(TransportError::Io)
    }
}

async fn send_datagram(
    socket: &UdpSocket,
    data: &[u8],
    target: SocketAddr,
    max_size: usize,
) -> Result<()> {
    if data.len() > max_size {
        return Err(TransportError::PacketTooLarge {
            size: data.len(),
            max: max_size,
        });
    }

    socket
        .send_to(data, target)
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    Ok(())
}

/// UDP sender (to a specific remote)
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    max_size: usize,
    connected: Arc<Mutex<bool>>,
}

impl UdpSender {
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

#[async_trait]
impl TransportSender for UdpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }
        send_datagram(&self.socket, &data, self.remote, self.max_size).await
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        Ok(())
    }
}

/// UDP receiver
pub struct UdpReceiver {
    rx: mpsc::Receiver<(TransportEvent, SocketAddr)>,
}

impl UdpReceiver {
    /// Receive the next event with source address
    pub async fn recv_from(&mut self) -> Option<(TransportEvent, SocketAddr)> {
        self.rx.recv().await
    }
}

#[async_trait]
impl TransportReceiver for UdpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await.map(|(event, _)| event)
    }
}
