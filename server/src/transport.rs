//! Reliable ordered transport used by the room
//!
//! The room only sees the [`Transport`] trait and a queue of [`RoomEvent`]s.
//! [`TcpTransport`] is the concrete implementation: length-prefixed packets
//! over TCP, one reader task and one writer task per accepted peer.

use bincode::{deserialize, serialize};
use log::{debug, info, warn};
use parking_lot::Mutex;
use shared::handshake::{read_packet, write_packet};
use shared::{ConnectReply, ConnectRequest, RejectReason};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::{Result, ServerError};
use crate::room::RoomEvent;

/// Transport-level connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operations the room needs from its transport
///
/// `send` must be reliable and ordered per peer. Incoming traffic is delivered
/// separately as [`RoomEvent`]s.
pub trait Transport: Send + Sync + 'static {
    /// Peers currently accepted and not yet disconnected
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Queues `data` for delivery to one peer
    fn send(&self, peer: PeerId, data: &[u8]) -> Result<()>;

    /// Completes a pending connection request
    fn accept(&self, peer: PeerId) -> Result<()>;

    /// Refuses a pending connection request
    fn reject(&self, peer: PeerId, reason: RejectReason);

    /// Closes an accepted connection
    fn disconnect(&self, peer: PeerId);

    fn peer_count(&self) -> usize {
        self.connected_peers().len()
    }
}

enum Outbound {
    Packet(Vec<u8>),
    Close,
}

struct PeerHandle {
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: Arc<Notify>,
}

type PeerTable = Mutex<BTreeMap<PeerId, PeerHandle>>;

struct PendingConnection {
    stream: TcpStream,
    addr: SocketAddr,
}

/// TCP implementation of [`Transport`]
pub struct TcpTransport {
    events: mpsc::UnboundedSender<RoomEvent>,
    pending: Mutex<HashMap<PeerId, PendingConnection>>,
    peers: Arc<PeerTable>,
    next_peer_id: AtomicU32,
    handshake_timeout: Duration,
}

impl TcpTransport {
    pub fn new(events: mpsc::UnboundedSender<RoomEvent>, handshake_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            events,
            pending: Mutex::new(HashMap::new()),
            peers: Arc::new(Mutex::new(BTreeMap::new())),
            next_peer_id: AtomicU32::new(1),
            handshake_timeout,
        })
    }

    /// Spawns a task accepting connections until the listener fails or the
    /// task is aborted
    pub fn spawn_listener(self: &Arc<Self>, listener: Arc<TcpListener>) -> JoinHandle<()> {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let transport = Arc::clone(&transport);
                        tokio::spawn(async move {
                            transport.handshake(stream, addr).await;
                        });
                    }
                    Err(e) => {
                        warn!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Reads the connection request and hands the decision to the room
    async fn handshake(self: Arc<Self>, mut stream: TcpStream, addr: SocketAddr) {
        let packet = match timeout(self.handshake_timeout, read_packet(&mut stream)).await {
            Ok(Ok(packet)) => packet,
            Ok(Err(e)) => {
                debug!("Handshake read from {} failed: {}", addr, e);
                return;
            }
            Err(_) => {
                debug!("Handshake from {} timed out", addr);
                return;
            }
        };

        let request: ConnectRequest = match deserialize(&packet) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed connection request from {}: {}", addr, e);
                return;
            }
        };

        let peer = PeerId(self.next_peer_id.fetch_add(1, Ordering::Relaxed));
        self.pending
            .lock()
            .insert(peer, PendingConnection { stream, addr });

        let event = RoomEvent::ConnectionRequest {
            peer,
            key: request.key,
        };
        if self.events.send(event).is_err() {
            debug!("Room closed before handling connection from {}", addr);
            self.pending.lock().remove(&peer);
        }
    }

    fn spawn_writer(
        mut writer: OwnedWriteHalf,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        peer: PeerId,
    ) {
        tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                match message {
                    Outbound::Packet(data) => {
                        if let Err(e) = write_packet(&mut writer, &data).await {
                            warn!("Failed to write to peer {}: {}", peer, e);
                            break;
                        }
                    }
                    Outbound::Close => break,
                }
            }
            let _ = writer.shutdown().await;
        });
    }

    fn spawn_reader(
        mut reader: OwnedReadHalf,
        peer: PeerId,
        shutdown: Arc<Notify>,
        peers: Arc<PeerTable>,
        events: mpsc::UnboundedSender<RoomEvent>,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = read_packet(&mut reader) => match result {
                        Ok(data) => {
                            if events.send(RoomEvent::Received { peer, data }).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!("Peer {} read ended: {}", peer, e);
                            break;
                        }
                    },
                    _ = shutdown.notified() => return,
                }
            }

            // Only report peers the room has not already dropped itself
            let removed = peers.lock().remove(&peer);
            if let Some(handle) = removed {
                let _ = handle.outbound.send(Outbound::Close);
                info!("Peer {} ({}) disconnected", peer, handle.addr);
                let _ = events.send(RoomEvent::Disconnected { peer });
            }
        });
    }

    fn send_reply(stream: TcpStream, reply: ConnectReply, addr: SocketAddr) {
        tokio::spawn(async move {
            let mut stream = stream;
            match serialize(&reply) {
                Ok(bytes) => {
                    if let Err(e) = write_packet(&mut stream, &bytes).await {
                        debug!("Failed to send {:?} to {}: {}", reply, addr, e);
                    }
                }
                Err(e) => warn!("Failed to encode {:?}: {}", reply, e),
            }
            let _ = stream.shutdown().await;
        });
    }
}

impl Transport for TcpTransport {
    fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.lock().keys().copied().collect()
    }

    fn send(&self, peer: PeerId, data: &[u8]) -> Result<()> {
        let peers = self.peers.lock();
        let handle = peers.get(&peer).ok_or(ServerError::PeerNotConnected(peer))?;
        handle
            .outbound
            .send(Outbound::Packet(data.to_vec()))
            .map_err(|_| ServerError::PeerNotConnected(peer))
    }

    fn accept(&self, peer: PeerId) -> Result<()> {
        let PendingConnection { stream, addr } = self
            .pending
            .lock()
            .remove(&peer)
            .ok_or(ServerError::PeerNotConnected(peer))?;

        let accepted = serialize(&ConnectReply::Accepted)?;
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());

        // The reply is the first packet the writer sends, ahead of any message
        let _ = outbound_tx.send(Outbound::Packet(accepted));
        self.peers.lock().insert(
            peer,
            PeerHandle {
                addr,
                outbound: outbound_tx,
                shutdown: Arc::clone(&shutdown),
            },
        );

        Self::spawn_writer(writer, outbound_rx, peer);
        Self::spawn_reader(
            reader,
            peer,
            shutdown,
            Arc::clone(&self.peers),
            self.events.clone(),
        );
        info!("Peer {} ({}) connected", peer, addr);
        Ok(())
    }

    fn reject(&self, peer: PeerId, reason: RejectReason) {
        if let Some(PendingConnection { stream, addr }) = self.pending.lock().remove(&peer) {
            info!("Rejected connection from {}: {}", addr, reason);
            Self::send_reply(stream, ConnectReply::Rejected { reason }, addr);
        }
    }

    fn disconnect(&self, peer: PeerId) {
        if let Some(handle) = self.peers.lock().remove(&peer) {
            let _ = handle.outbound.send(Outbound::Close);
            handle.shutdown.notify_one();
            info!("Disconnected peer {} ({})", peer, handle.addr);
        }
    }
}
