use crate::error::{Result, SwarmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::RwLock;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Unreliable datagram transport. Delivery may drop, duplicate or reorder.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends to every reachable peer.
    async fn broadcast(&self, payload: &[u8]) -> Result<()>;

    async fn send_to(&self, addr: SocketAddr, payload: &[u8]) -> Result<()>;

    /// Next datagram and its source address.
    async fn recv(&self) -> Result<(Vec<u8>, SocketAddr)>;

    fn local_addr(&self) -> SocketAddr;

    /// Called for every source address heard from. Transports that cannot
    /// broadcast natively use it to learn where peers are.
    fn note_peer(&self, _addr: SocketAddr) {}
}

/// How a peer reaches the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Discovery {
    /// IPv4 multicast group; every peer binds the group port.
    Multicast { group: Ipv4Addr, port: u16 },
    /// Subnet broadcast address.
    Broadcast { addr: SocketAddr },
    /// Explicit seed list, extended with every peer heard from.
    Peers { seeds: Vec<SocketAddr> },
}

impl Default for Discovery {
    fn default() -> Self {
        Discovery::Multicast {
            group: Ipv4Addr::new(224, 0, 0, 251),
            port: 50001,
        }
    }
}

impl std::fmt::Display for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Discovery::Multicast { group, port } => write!(f, "multicast {}:{}", group, port),
            Discovery::Broadcast { addr } => write!(f, "broadcast {}", addr),
            Discovery::Peers { seeds } => write!(f, "{} seed peer(s)", seeds.len()),
        }
    }
}

const RECV_BUFFER: usize = 65_536;

pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    discovery: Discovery,
    learned: RwLock<HashSet<SocketAddr>>,
    send_timeout: Duration,
}

impl UdpTransport {
    pub async fn bind(bind: SocketAddr, discovery: Discovery, send_timeout: Duration) -> Result<Self> {
        let shared_port = matches!(discovery, Discovery::Multicast { .. });
        let socket = bind_socket(bind, shared_port)?;

        match &discovery {
            Discovery::Multicast { group, .. } => {
                socket
                    .join_multicast_v4(*group, Ipv4Addr::UNSPECIFIED)
                    .map_err(|e| transport_error("join multicast group", e))?;
                socket
                    .set_multicast_loop_v4(true)
                    .map_err(|e| transport_error("enable multicast loop", e))?;
            }
            Discovery::Broadcast { .. } => {
                socket
                    .set_broadcast(true)
                    .map_err(|e| transport_error("enable broadcast", e))?;
            }
            Discovery::Peers { .. } => {}
        }

        let local_addr = socket
            .local_addr()
            .map_err(|e| transport_error("read local address", e))?;

        tracing::info!("Gossip socket bound to {} ({})", local_addr, discovery);

        Ok(Self {
            socket,
            local_addr,
            discovery,
            learned: RwLock::new(HashSet::new()),
            send_timeout,
        })
    }

    async fn send_with_timeout(&self, addr: SocketAddr, payload: &[u8]) -> Result<()> {
        match tokio::time::timeout(self.send_timeout, self.socket.send_to(payload, addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(transport_error(&format!("send to {}", addr), e)),
            Err(_) => Err(SwarmError::Transport(format!("send to {} timed out", addr))),
        }
    }

    fn peer_list(&self, seeds: &[SocketAddr]) -> Vec<SocketAddr> {
        let mut targets: HashSet<SocketAddr> = seeds.iter().copied().collect();
        if let Ok(learned) = self.learned.read() {
            targets.extend(learned.iter().copied());
        }
        targets.remove(&self.local_addr);
        targets.into_iter().collect()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn broadcast(&self, payload: &[u8]) -> Result<()> {
        match &self.discovery {
            Discovery::Multicast { group, port } => {
                self.send_with_timeout(SocketAddr::from((*group, *port)), payload)
                    .await
            }
            Discovery::Broadcast { addr } => self.send_with_timeout(*addr, payload).await,
            Discovery::Peers { seeds } => {
                let targets = self.peer_list(seeds);
                let mut failures = 0;
                for addr in &targets {
                    if let Err(e) = self.send_with_timeout(*addr, payload).await {
                        tracing::debug!("{}", e);
                        failures += 1;
                    }
                }
                if failures > 0 && failures == targets.len() {
                    return Err(SwarmError::Transport(format!(
                        "all {} peer sends failed",
                        failures
                    )));
                }
                Ok(())
            }
        }
    }

    async fn send_to(&self, addr: SocketAddr, payload: &[u8]) -> Result<()> {
        self.send_with_timeout(addr, payload).await
    }

    async fn recv(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; RECV_BUFFER];
        let (len, src) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| transport_error("receive", e))?;
        buf.truncate(len);
        Ok((buf, src))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn note_peer(&self, addr: SocketAddr) {
        if !matches!(self.discovery, Discovery::Peers { .. }) || addr == self.local_addr {
            return;
        }
        if let Ok(mut learned) = self.learned.write()
            && learned.insert(addr)
        {
            tracing::debug!("Learned peer address {}", addr);
        }
    }
}

/// Peers on one host all bind the multicast port, which needs address reuse
/// set before binding.
fn bind_socket(bind: SocketAddr, shared_port: bool) -> Result<UdpSocket> {
    let domain = if bind.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| transport_error("create socket", e))?;
    if shared_port {
        socket
            .set_reuse_address(true)
            .map_err(|e| transport_error("set SO_REUSEADDR", e))?;
        #[cfg(unix)]
        socket
            .set_reuse_port(true)
            .map_err(|e| transport_error("set SO_REUSEPORT", e))?;
    }
    socket
        .set_nonblocking(true)
        .map_err(|e| transport_error("set non-blocking", e))?;
    socket
        .bind(&bind.into())
        .map_err(|e| transport_error(&format!("bind {}", bind), e))?;

    UdpSocket::from_std(socket.into()).map_err(|e| transport_error("register socket", e))
}

fn transport_error(action: &str, e: std::io::Error) -> SwarmError {
    SwarmError::Transport(format!("{} failed: {}", action, e))
}
