//! TCP transport implementation
//!
//! OSC over a stream needs explicit packet boundaries, so every packet is
//! preceded by a 4-byte big-endian length (see [`osc_core::frame`]).

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use osc_core::frame;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender, TransportServer};

/// Default channel buffer size for TCP connections
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// TCP configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Largest accepted frame payload
    pub max_packet_size: usize,
    /// Initial read buffer size
    pub read_buffer_size: usize,
    /// Keep-alive interval in seconds (0 = disabled)
    pub keepalive_secs: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_packet_size: frame::DEFAULT_MAX_PACKET_SIZE,
            read_buffer_size: 8192,
            keepalive_secs: 30,
        }
    }
}

/// TCP client transport
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            config: TcpConfig::default(),
        }
    }

    pub fn with_config(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Connect to a TCP peer
    pub async fn connect(&self, addr: &str) -> Result<(TcpSender, TcpReceiver)> {
        info!("Connecting to TCP: {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (sender, receiver) = spawn_connection(stream, &self.config);
        info!("TCP connected to {}", addr);
        Ok((sender, receiver))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn set_keepalive(stream: &TcpStream, secs: u64) {
    if secs == 0 {
        return;
    }
    let socket = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(secs));
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        debug!("Failed to enable TCP keepalive: {}", e);
    }
}

fn spawn_connection(stream: TcpStream, config: &TcpConfig) -> (TcpSender, TcpReceiver) {
    set_keepalive(&stream, config.keepalive_secs);

    let connected = Arc::new(Mutex::new(true));
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Bytes>(DEFAULT_CHANNEL_BUFFER_SIZE);
    let (incoming_tx, incoming_rx) = mpsc::channel::<TransportEvent>(DEFAULT_CHANNEL_BUFFER_SIZE);

    let sender = TcpSender {
        tx: outgoing_tx,
        connected: Arc::clone(&connected),
    };
    let receiver = TcpReceiver { rx: incoming_rx };

    let io = IoLoop {
        max_size: config.max_packet_size,
        read_buf: BytesMut::with_capacity(config.read_buffer_size),
        connected,
    };

    tokio::spawn(async move {
        let (reader, writer) = stream.into_split();
        io.run(reader, writer, outgoing_rx, incoming_tx).await;
    });

    (sender, receiver)
}

struct IoLoop {
    max_size: usize,
    read_buf: BytesMut,
    connected: Arc<Mutex<bool>>,
}

impl IoLoop {
    async fn run(
        mut self,
        mut reader: OwnedReadHalf,
        mut writer: OwnedWriteHalf,
        mut outgoing_rx: mpsc::Receiver<Bytes>,
        incoming_tx: mpsc::Sender<TransportEvent>,
    ) {
        loop {
            tokio::select! {
                outgoing = outgoing_rx.recv() => {
                    let Some(data) = outgoing else {
                        debug!("TCP sender dropped");
                        break;
                    };
                    let framed = match frame::encode(&data) {
                        Ok(framed) => framed,
                        Err(e) => {
                            error!("TCP frame error: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = writer.write_all(&framed).await {
                        error!("TCP write error: {}", e);
                        break;
                    }
                }

                result = reader.read_buf(&mut self.read_buf) => {
                    match result {
                        Ok(0) => {
                            debug!("TCP connection closed");
                            let _ = incoming_tx.send(TransportEvent::Disconnected { reason: None }).await;
                            break;
                        }
                        Ok(_) => {
                            if let Err(reason) = self.drain_frames(&incoming_tx).await {
                                let _ = incoming_tx
                                    .send(TransportEvent::Disconnected { reason: Some(reason) })
                                    .await;
                                break;
                            }
                        }
                        Err(e) => {
                            error!("TCP read error: {}", e);
                            let _ = incoming_tx.send(TransportEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }
            }
        }

        *self.connected.lock() = false;
    }

    /// Forward every complete frame in the read buffer
    async fn drain_frames(
        &mut self,
        incoming_tx: &mpsc::Sender<TransportEvent>,
    ) -> std::result::Result<(), String> {
        loop {
            match frame::check_complete(&self.read_buf, self.max_size) {
                Ok(Some(total)) => {
                    let mut chunk = self.read_buf.split_to(total);
                    chunk.advance(frame::HEADER_SIZE);
                    let event = TransportEvent::from_bytes(chunk.freeze());
                    if incoming_tx.send(event).await.is_err() {
                        return Err("receiver dropped".into());
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!("TCP frame rejected: {}", e);
                    return Err(e.to_string());
                }
            }
        }
    }
}

/// TCP sender for writing packets
pub struct TcpSender {
    tx: mpsc::Sender<Bytes>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(data)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        Ok(())
    }
}

/// TCP receiver for reading packets
pub struct TcpReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// TCP server for accepting connections
pub struct TcpServer {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpServer {
    /// Bind to an address and create a new TCP server
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, TcpConfig::default()).await
    }

    /// Bind with custom configuration
    pub async fn bind_with_config(addr: &str, config: TcpConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", addr, e)))?;

        info!("TCP server listening on {}", addr);

        Ok(Self { listener, config })
    }
}

#[async_trait]
impl TransportServer for TcpServer {
    type Sender = TcpSender;
    type Receiver = TcpReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;

        info!("TCP connection accepted from {}", peer_addr);

        let (sender, receiver) = spawn_connection(stream, &self.config);
        Ok((sender, receiver, peer_addr))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_core::{Message, Packet};

    #[test]
    fn test_tcp_config_default() {
        let config = TcpConfig::default();
        assert_eq!(config.max_packet_size, 64 * 1024);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.keepalive_secs, 30);
    }

    #[tokio::test]
    async fn test_tcp_echo() {
        let mut server = TcpServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let accept_handle = tokio::spawn(async move {
            let (sender, mut receiver, _peer) = server.accept().await.unwrap();
            if let Some(TransportEvent::Packet(packet)) = receiver.recv().await {
                sender.send_packet(&packet).await.unwrap();
            }
            (sender, receiver)
        });

        let transport = TcpTransport::new();
        let (client_sender, mut client_receiver) =
            transport.connect(&addr.to_string()).await.unwrap();

        let packet = Packet::from(Message::new("/echo", vec!["hi".into()]).unwrap());
        client_sender.send_packet(&packet).await.unwrap();

        match client_receiver.recv().await {
            Some(TransportEvent::Packet(received)) => assert_eq!(received, packet),
            other => panic!("Expected packet, got {:?}", other),
        }

        client_sender.close().await.unwrap();
        let _ = accept_handle.await;
    }
}
