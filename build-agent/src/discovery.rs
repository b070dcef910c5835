// Agent discovery
// Listening agents broadcast JSON beacons over UDP; submitters collect them

use serde::{Deserialize, Serialize};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Advertisement sent by a listening agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBeacon {
    pub agent_name: String,
    /// Port of the agent's gRPC server
    pub rpc_port: u16,
    pub version: String,
}

impl AgentBeacon {
    pub fn new(agent_name: impl Into<String>, rpc_port: u16) -> Self {
        Self {
            agent_name: agent_name.into(),
            rpc_port,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// An agent heard during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredAgent {
    pub beacon: AgentBeacon,
    /// Sender IP with the advertised RPC port
    pub address: SocketAddr,
}

/// Send `beacon` to `target` every `interval`, forever.
///
/// Send failures are logged and retried on the next tick.
pub async fn send_beacons(
    socket: UdpSocket,
    target: SocketAddr,
    beacon: AgentBeacon,
    interval: Duration,
) -> io::Result<()> {
    let payload = serde_json::to_vec(&beacon)?;
    tracing::info!(agent = %beacon.agent_name, %target, ?interval, "broadcasting beacons");
    loop {
        if let Err(e) = socket.send_to(&payload, target).await {
            tracing::debug!(error = %e, %target, "beacon not sent");
        }
        tokio::time::sleep(interval).await;
    }
}

/// Broadcast `beacon` on the local network's discovery port
pub async fn broadcast_beacons(
    beacon: AgentBeacon,
    discovery_port: u16,
    interval: Duration,
) -> io::Result<()> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    let target = SocketAddr::from((Ipv4Addr::BROADCAST, discovery_port));
    send_beacons(socket, target, beacon, interval).await
}

/// Listen on `port` for `window` and return every distinct agent heard
pub async fn discover_agents(port: u16, window: Duration) -> io::Result<Vec<DiscoveredAgent>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    collect_beacons(&socket, window).await
}

/// Read beacons from `socket` until `window` elapses.
///
/// Datagrams that are not beacons are ignored. Agents are distinct by address.
pub async fn collect_beacons(socket: &UdpSocket, window: Duration) -> io::Result<Vec<DiscoveredAgent>> {
    let deadline = tokio::time::Instant::now() + window;
    let mut agents: Vec<DiscoveredAgent> = Vec::new();
    let mut buf = [0u8; 2048];

    loop {
        let (len, sender) =
            match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => break,
            };

        let beacon: AgentBeacon = match serde_json::from_slice(&buf[..len]) {
            Ok(beacon) => beacon,
            Err(e) => {
                tracing::debug!(%sender, error = %e, "ignoring datagram");
                continue;
            }
        };

        let address = SocketAddr::new(sender.ip(), beacon.rpc_port);
        if agents.iter().all(|agent| agent.address != address) {
            tracing::debug!(agent = %beacon.agent_name, %address, "agent discovered");
            agents.push(DiscoveredAgent { beacon, address });
        }
    }

    Ok(agents)
}
