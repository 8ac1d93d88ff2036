//! Dispatching UDP server
//!
//! Binds a [`UdpTransport`], decodes every datagram and hands it to a
//! [`Dispatcher`]. A datagram that fails to decode is logged and dropped;
//! the loop keeps serving.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use osc_core::{Packet, TimeTag};
use osc_dispatch::{Dispatch, DispatchSummary, Dispatcher};

use crate::error::Result;
use crate::udp::{UdpConfig, UdpTransport};

/// UDP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the UDP socket
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Largest datagram accepted
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

fn default_bind_addr() -> String {
    format!("0.0.0.0:{}", osc_core::DEFAULT_PORT)
}

fn default_max_packet_size() -> usize {
    osc_core::MAX_PACKET_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

/// UDP server that dispatches every received packet
pub struct UdpServer {
    transport: UdpTransport,
    dispatcher: Dispatcher,
    running: Arc<RwLock<bool>>,
    stop_signal: Arc<Notify>,
}

impl UdpServer {
    /// Bind the socket. Nothing is received until [`serve`](Self::serve) runs.
    pub async fn bind(config: ServerConfig, dispatcher: Dispatcher) -> Result<Self> {
        let udp_config = UdpConfig {
            max_packet_size: config.max_packet_size,
            ..Default::default()
        };
        let transport = UdpTransport::bind_with_config(&config.bind_addr, udp_config).await?;

        Ok(Self {
            transport,
            dispatcher,
            running: Arc::new(RwLock::new(true)),
            stop_signal: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn transport(&self) -> &UdpTransport {
        &self.transport
    }

    /// Receive and dispatch until [`stop`](Self::stop) is called
    pub async fn serve(&self) -> Result<()> {
        info!("OSC server listening on {}", self.local_addr()?);

        while *self.running.read() {
            tokio::select! {
                _ = self.stop_signal.notified() => break,

                received = self.transport.recv_bytes() => match received {
                    Ok((data, peer)) => match self.dispatcher.dispatch_bytes(&data) {
                        Ok(summary) => debug!(
                            "Packet from {}: {} delivered, {} failed, {} deferred",
                            peer, summary.delivered, summary.failed, summary.deferred
                        ),
                        Err(e) => warn!("Dropped packet from {}: {}", peer, e),
                    },
                    Err(e) => {
                        error!("OSC recv error: {}", e);
                    }
                },
            }
        }

        info!("OSC server stopped");
        Ok(())
    }

    /// Send a packet back to a peer
    pub async fn reply(&self, to: SocketAddr, packet: &Packet) -> Result<()> {
        self.transport.send_packet(packet, to).await
    }

    /// Send a packet to a peer for delivery at `timetag`
    pub async fn reply_at(&self, to: SocketAddr, packet: Packet, timetag: TimeTag) -> Result<()> {
        self.transport.send_timestamped(packet, timetag, to).await
    }

    /// Stop serving and cancel deferred bundles
    pub fn stop(&self) {
        *self.running.write() = false;
        self.stop_signal.notify_one();
        self.dispatcher.shutdown();
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }
}

impl Dispatch for UdpServer {
    fn dispatch(&self, packet: Packet) -> DispatchSummary {
        self.dispatcher.dispatch(packet)
    }

    fn dispatch_bytes(&self, bytes: &[u8]) -> osc_dispatch::Result<DispatchSummary> {
        self.dispatcher.dispatch_bytes(bytes)
    }
}
