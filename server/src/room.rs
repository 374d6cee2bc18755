//! Room lifecycle: admission, match start, frame broadcast and teardown
//!
//! A room runs two execution contexts. The event context owns the [`Room`] and
//! processes [`RoomEvent`]s from the transport one at a time. Once the room is
//! full it assigns player ids, sends every peer its start message and spawns
//! the tick loop, which packs and broadcasts one frame per tick until the last
//! peer has left. The two contexts share only the input queue, an atomic
//! running flag and a few counters.

use log::{debug, error, info, trace, warn};
use rand::Rng;
use shared::message::{read_input_payload, read_tag};
use shared::{
    Checksum, MessageTag, NetReader, NetWriter, PlayerId, ProtocolError, StartSimulation,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Duration, Instant};

use crate::checksum::{ChecksumOutcome, ChecksumTracker};
use crate::config::RoomConfig;
use crate::error::Result;
use crate::frame_packer::{input_channel, FramePacker, InputSink};
use crate::gateway::{self, Admission};
use crate::transport::{PeerId, Transport};

/// Pause between two passes of the tick loop
const TICK_LOOP_YIELD: Duration = Duration::from_millis(1);

/// Notifications delivered by the transport, in the order they happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    ConnectionRequest { peer: PeerId, key: String },
    Received { peer: PeerId, data: Vec<u8> },
    Disconnected { peer: PeerId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoomState {
    WaitingForPlayers = 0,
    Starting = 1,
    Running = 2,
    Stopped = 3,
}

impl RoomState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RoomState::WaitingForPlayers,
            1 => RoomState::Starting,
            2 => RoomState::Running,
            _ => RoomState::Stopped,
        }
    }
}

/// State visible to both the event context and the tick loop
#[derive(Debug)]
struct SharedState {
    state: AtomicU8,
    running: AtomicBool,
    frames_broadcast: AtomicU64,
}

impl SharedState {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(RoomState::WaitingForPlayers as u8),
            running: AtomicBool::new(false),
            frames_broadcast: AtomicU64::new(0),
        }
    }

    fn state(&self) -> RoomState {
        RoomState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: RoomState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Statistics for one finished (or aborted) match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub seed: Option<i32>,
    pub players: usize,
    pub frames_broadcast: u64,
    pub checksums_recorded: u64,
    pub checksums_valid: u64,
    pub desyncs: u64,
}

/// Client messages the room understands
enum Inbound<'a> {
    Input(&'a [u8]),
    Checksum(Checksum),
}

fn decode_inbound(data: &[u8]) -> std::result::Result<Inbound<'_>, ProtocolError> {
    let mut reader = NetReader::new(data);
    match read_tag(&mut reader)? {
        MessageTag::Input => Ok(Inbound::Input(read_input_payload(&mut reader)?)),
        MessageTag::Checksum => {
            let checksum = Checksum::deserialize(&mut reader)?;
            reader.expect_end()?;
            Ok(Inbound::Checksum(checksum))
        }
        other => Err(ProtocolError::UnsupportedTag(other)),
    }
}

/// One match worth of lockstep relay state
///
/// A room hosts exactly one match. Once it has stopped, a new `Room` is
/// needed for the next one.
pub struct Room<T: Transport> {
    config: RoomConfig,
    transport: Arc<T>,
    shared: Arc<SharedState>,
    /// Accepted peers in connection-arrival order
    arrivals: Vec<PeerId>,
    player_ids: HashMap<PeerId, PlayerId>,
    checksums: ChecksumTracker,
    inputs: Option<InputSink>,
    tick_loop: Option<JoinHandle<()>>,
    seed: Option<i32>,
    writer: NetWriter,
    summary: MatchSummary,
}

impl<T: Transport> Room<T> {
    pub fn new(config: RoomConfig, transport: Arc<T>) -> Result<Self> {
        config.validate()?;
        info!(
            "Room opened. Waiting for {} players at {} fps...",
            config.room_size, config.target_fps
        );
        Ok(Self {
            checksums: ChecksumTracker::with_retention(config.checksum_retention),
            config,
            transport,
            shared: Arc::new(SharedState::new()),
            arrivals: Vec::new(),
            player_ids: HashMap::new(),
            inputs: None,
            tick_loop: None,
            seed: None,
            writer: NetWriter::with_capacity(16),
            summary: MatchSummary::default(),
        })
    }

    pub fn state(&self) -> RoomState {
        self.shared.state()
    }

    /// True from match start until the last peer has left
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn peer_count(&self) -> usize {
        self.arrivals.len()
    }

    pub fn player_id(&self, peer: PeerId) -> Option<PlayerId> {
        self.player_ids.get(&peer).copied()
    }

    pub fn seed(&self) -> Option<i32> {
        self.seed
    }

    pub fn frames_broadcast(&self) -> u64 {
        self.shared.frames_broadcast.load(Ordering::Acquire)
    }

    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            seed: self.seed,
            players: self.player_ids.len(),
            frames_broadcast: self.frames_broadcast(),
            ..self.summary.clone()
        }
    }

    pub fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::ConnectionRequest { peer, key } => {
                self.handle_connection_request(peer, &key);
            }
            RoomEvent::Received { peer, data } => {
                self.handle_received(peer, &data);
            }
            RoomEvent::Disconnected { peer } => {
                self.handle_disconnect(peer);
            }
        }
    }

    /// Admits or refuses a peer; the room starts as soon as it is full
    pub fn handle_connection_request(&mut self, peer: PeerId, key: &str) -> Admission {
        let admission = if self.state() == RoomState::WaitingForPlayers {
            gateway::decide(
                self.arrivals.len(),
                self.config.room_size,
                key,
                &self.config.connection_key,
            )
        } else {
            Admission::Reject(shared::RejectReason::MatchInProgress)
        };

        match admission {
            Admission::Accept => {
                if let Err(e) = self.transport.accept(peer) {
                    warn!("Failed to accept peer {}: {}", peer, e);
                    return admission;
                }
                self.arrivals.push(peer);
                if self.arrivals.len() == self.config.room_size {
                    self.start_match();
                } else {
                    info!(
                        "{} / {} players have connected.",
                        self.arrivals.len(),
                        self.config.room_size
                    );
                }
            }
            Admission::Reject(reason) => {
                info!("Refusing peer {}: {}", peer, reason);
                self.transport.reject(peer, reason);
            }
        }
        admission
    }

    /// Routes one client message; returns the checksum verdict if it was one
    pub fn handle_received(&mut self, peer: PeerId, data: &[u8]) -> Option<ChecksumOutcome> {
        if !self.arrivals.contains(&peer) {
            debug!("Ignoring message from unknown peer {}", peer);
            return None;
        }

        match decode_inbound(data) {
            Ok(Inbound::Input(payload)) => {
                self.add_input(peer, payload);
                None
            }
            Ok(Inbound::Checksum(checksum)) => Some(self.observe_checksum(peer, checksum)),
            Err(e) => {
                self.protocol_violation(peer, e);
                None
            }
        }
    }

    pub fn handle_disconnect(&mut self, peer: PeerId) {
        let Some(position) = self.arrivals.iter().position(|p| *p == peer) else {
            return;
        };
        self.arrivals.remove(position);

        if !self.arrivals.is_empty() {
            info!("{} players remaining.", self.arrivals.len());
        } else if self.is_running() {
            info!("All players left, stopping current simulation...");
            self.shared.running.store(false, Ordering::Release);
        } else {
            info!("All players left before the match started.");
        }
    }

    fn add_input(&mut self, peer: PeerId, payload: &[u8]) {
        let Some(sink) = self.inputs.as_ref().filter(|_| self.is_running()) else {
            debug!("Discarding input from peer {} outside a running match", peer);
            return;
        };
        match sink.add_input(payload.to_vec()) {
            Ok(true) => trace!("Queued {} byte input from peer {}", payload.len(), peer),
            Ok(false) => debug!("Tick loop gone, dropping input from peer {}", peer),
            Err(e) => self.protocol_violation(peer, e),
        }
    }

    fn observe_checksum(&mut self, peer: PeerId, checksum: Checksum) -> ChecksumOutcome {
        let outcome = self.checksums.observe(checksum.frame_number, checksum.value);
        match outcome {
            ChecksumOutcome::Recorded => {
                self.summary.checksums_recorded += 1;
            }
            ChecksumOutcome::Valid => {
                self.summary.checksums_valid += 1;
                debug!(
                    "Checksum valid: frame {} value {} (peer {})",
                    checksum.frame_number, checksum.value, peer
                );
            }
            ChecksumOutcome::Desync => {
                self.summary.desyncs += 1;
                warn!(
                    "Desync: frame {} peer {} reported {}, expected {:?}",
                    checksum.frame_number,
                    peer,
                    checksum.value,
                    self.checksums.canonical(checksum.frame_number)
                );
            }
        }
        outcome
    }

    /// Drops the offending message and the peer that sent it
    fn protocol_violation(&mut self, peer: PeerId, error: ProtocolError) {
        warn!("Protocol error from peer {}: {}. Disconnecting.", peer, error);
        self.transport.disconnect(peer);
        self.handle_disconnect(peer);
    }

    /// Full -> Running: ids, seed, start messages, then the tick loop
    fn start_match(&mut self) {
        self.shared.set_state(RoomState::Starting);
        info!("Room is full, starting new simulation...");

        self.checksums.clear();
        let (sink, packer) = input_channel();
        self.inputs = Some(sink);

        let seed: i32 = rand::thread_rng().gen();
        self.seed = Some(seed);

        for (index, peer) in self.arrivals.iter().enumerate() {
            // room_size <= 256 was validated, so the index fits
            let player_id = index as PlayerId;
            self.player_ids.insert(*peer, player_id);

            let start = StartSimulation {
                seed,
                target_fps: self.config.target_fps as i32,
                player_id,
            };
            self.writer.reset();
            self.writer.put_u8(MessageTag::StartSimulation as u8);
            start.serialize(&mut self.writer);
            if let Err(e) = self.transport.send(*peer, self.writer.data()) {
                warn!("Failed to send start message to peer {}: {}", peer, e);
            }
        }

        self.shared.running.store(true, Ordering::Release);
        self.shared.set_state(RoomState::Running);
        self.tick_loop = Some(tokio::spawn(run_tick_loop(
            packer,
            Arc::clone(&self.transport),
            Arc::clone(&self.shared),
            self.config.tick_interval(),
        )));
        info!("Simulation started with seed {}", seed);
    }

    /// Best-effort notice to every peer, then tears the room down
    pub fn shutdown(&mut self, reason: &str) {
        error!("Shutting down room: {}", reason);
        self.shared.running.store(false, Ordering::Release);

        let notice = [MessageTag::Shutdown as u8];
        for peer in self.arrivals.drain(..) {
            if let Err(e) = self.transport.send(peer, &notice) {
                debug!("Could not notify peer {}: {}", peer, e);
            }
            self.transport.disconnect(peer);
        }
        self.shared.set_state(RoomState::Stopped);
    }

    /// Drives the room from the event queue until the match is over
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<RoomEvent>) -> MatchSummary {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        if self.state() != RoomState::Stopped {
                            self.shutdown("transport event queue closed");
                        }
                        break;
                    }
                },
                result = join_tick_loop(&mut self.tick_loop) => {
                    self.tick_loop = None;
                    if let Err(e) = result {
                        self.shutdown(&format!("tick loop failed: {}", e));
                    }
                    break;
                }
            }
        }

        if let Some(handle) = self.tick_loop.take() {
            let _ = handle.await;
        }
        let summary = self.summary();
        info!("Match finished: {:?}", summary);
        summary
    }
}

impl<T: Transport> Drop for Room<T> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
    }
}

async fn join_tick_loop(handle: &mut Option<JoinHandle<()>>) -> std::result::Result<(), JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// Fixed-cadence broadcast loop
///
/// Elapsed time feeds an accumulator; every whole tick interval in it yields
/// one frame, so a late pass catches up instead of skipping frames. The
/// running flag is checked once per pass, so a few frames may still go out
/// after the last peer has left.
async fn run_tick_loop<T: Transport>(
    mut packer: FramePacker,
    transport: Arc<T>,
    shared: Arc<SharedState>,
    tick_interval: Duration,
) {
    let mut last_tick = Instant::now();
    let mut accumulated = Duration::ZERO;

    while shared.running.load(Ordering::Acquire) {
        let now = Instant::now();
        accumulated += now.duration_since(last_tick);
        last_tick = now;

        while accumulated >= tick_interval {
            let frame = packer.pack();
            broadcast(transport.as_ref(), frame);
            shared.frames_broadcast.fetch_add(1, Ordering::AcqRel);
            accumulated -= tick_interval;
        }

        sleep(TICK_LOOP_YIELD).await;
    }

    shared.set_state(RoomState::Stopped);
    info!(
        "Simulation stopped after {} frames",
        shared.frames_broadcast.load(Ordering::Acquire)
    );
}

/// Sends the same bytes to every connected peer; one failing peer does not
/// stop delivery to the others
fn broadcast<T: Transport>(transport: &T, data: &[u8]) {
    for peer in transport.connected_peers() {
        if let Err(e) = transport.send(peer, data) {
            warn!("Failed to send frame to peer {}: {}", peer, e);
        }
    }
}
