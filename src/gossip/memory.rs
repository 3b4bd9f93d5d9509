//! In-process transport for multi-peer tests and simulations.

use super::transport::Transport;
use crate::error::{Result, SwarmError};

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::sync::{Mutex, mpsc};

type Datagram = (Vec<u8>, SocketAddr);

/// A shared in-memory "subnet". Every joined transport receives broadcasts
/// from all the others.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<DashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>,
    next_port: Arc<AtomicU16>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self) -> MemoryTransport {
        let port = 40_000 + self.next_port.fetch_add(1, Ordering::Relaxed);
        let addr = SocketAddr::from((Ipv4Addr::new(10, 0, 0, 1), port));
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.insert(addr, tx);

        MemoryTransport {
            addr,
            network: self.clone(),
            inbox: Mutex::new(rx),
        }
    }

    /// Cuts an endpoint off; datagrams to it are dropped from now on.
    pub fn disconnect(&self, addr: SocketAddr) {
        self.endpoints.remove(&addr);
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

pub struct MemoryTransport {
    addr: SocketAddr,
    network: MemoryNetwork,
    inbox: Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn broadcast(&self, payload: &[u8]) -> Result<()> {
        for endpoint in self.network.endpoints.iter() {
            if *endpoint.key() != self.addr {
                // A closed inbox is a crashed peer; datagrams to it are lost.
                let _ = endpoint.value().send((payload.to_vec(), self.addr));
            }
        }
        Ok(())
    }

    async fn send_to(&self, addr: SocketAddr, payload: &[u8]) -> Result<()> {
        let endpoint = self
            .network
            .endpoints
            .get(&addr)
            .ok_or_else(|| SwarmError::Transport(format!("no endpoint at {}", addr)))?;
        endpoint
            .send((payload.to_vec(), self.addr))
            .map_err(|_| SwarmError::Transport(format!("endpoint {} closed", addr)))
    }

    async fn recv(&self) -> Result<Datagram> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| SwarmError::Transport("memory network closed".to_string()))
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}
