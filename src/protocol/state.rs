use std::collections::{HashSet, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, info, trace, warn};

use super::effect::Outbox;
use super::message::{
    datagram_text, Envelope, Frame, Inbound, MessageId, HISTORY_END, HISTORY_START,
};
use crate::core::{Config, Role, COORDINATOR_TAG};
use crate::history::HistoryBuffer;
use crate::relay::{AckTracker, RelayEngine};

/// Payload of the coordinator's liveness broadcast
pub const HEARTBEAT_TEXT: &str = "System: AP heartbeat";

/// Number of message ids a peer remembers for duplicate suppression
pub const RECENT_IDS: usize = 64;

/// State every role works on
#[derive(Debug)]
pub struct Shared {
    /// Own address
    pub local_ip: IpAddr,
    /// Own address and application port
    pub local_addr: SocketAddr,
    pub history: HistoryBuffer,
    pub relay: RelayEngine,
    pub acks: AckTracker,
}

impl Shared {
    fn outbox(&self) -> &Outbox {
        self.relay.outbox()
    }
}

/// Per-role behaviour, selected once at construction
pub trait RoleHandler: Send {
    fn role(&self) -> Role;

    /// Called once before the first loop iteration
    fn start(&mut self, shared: &mut Shared, now: Duration);

    /// Dispatches one inbound datagram
    fn handle_inbound(&mut self, shared: &mut Shared, inbound: Inbound, now: Duration);

    /// Called once per loop iteration
    fn tick(&mut self, shared: &mut Shared, now: Duration);

    /// Whether a history replay is being received
    fn receiving_history(&self) -> bool {
        false
    }
}

/// Coordinator: relays, replays history to joiners, broadcasts liveness
#[derive(Debug)]
pub struct CoordinatorHandler {
    heartbeat_interval: Duration,
    last_heartbeat: Duration,
}

impl CoordinatorHandler {
    pub fn new(heartbeat_interval: Duration) -> Self {
        CoordinatorHandler {
            heartbeat_interval,
            last_heartbeat: Duration::ZERO,
        }
    }

    fn relay(&self, shared: &mut Shared, envelope: &Envelope, inbound: &Inbound) {
        shared.relay.relay_and_ack(
            &mut shared.history,
            &shared.acks,
            envelope,
            inbound.raw.clone(),
            inbound.from,
        );
        shared.outbox().display(envelope.payload.clone());
    }

    fn admit(&self, shared: &mut Shared, peer: SocketAddr, now: Duration) {
        info!(peer = %peer.ip(), "New client");
        shared.relay.replay_history(&shared.history, peer);

        let notice = format!("System: {} joined", peer.ip());
        shared.history.append(&notice);
        let envelope = Envelope::new(MessageId::generate(now, COORDINATOR_TAG), notice.clone());
        shared.relay.broadcast(Frame::Message(envelope));
        shared.outbox().display(notice);
    }
}

impl RoleHandler for CoordinatorHandler {
    fn role(&self) -> Role {
        Role::Coordinator
    }

    fn start(&mut self, shared: &mut Shared, _now: Duration) {
        info!(ip = %shared.local_ip, "Coordinator started");
        shared
            .history
            .append(&format!("System: AP started at {}", shared.local_ip));
    }

    fn handle_inbound(&mut self, shared: &mut Shared, inbound: Inbound, now: Duration) {
        match &inbound.frame {
            Frame::NewClient => self.admit(shared, inbound.from, now),
            Frame::Ack(id) => shared.acks.on_ack(id, inbound.from),
            Frame::Message(envelope) => self.relay(shared, envelope, &inbound),
            // only NEW_CLIENT and ACK are control tokens here
            Frame::HistoryStart | Frame::HistoryEnd | Frame::Raw(_) => {
                match Envelope::decode(&inbound.text()) {
                    Some(envelope) => self.relay(shared, &envelope, &inbound),
                    None => debug!(from = %inbound.from, "Dropping malformed datagram"),
                }
            }
        }
    }

    fn tick(&mut self, shared: &mut Shared, now: Duration) {
        if now.saturating_sub(self.last_heartbeat) <= self.heartbeat_interval {
            return;
        }
        self.last_heartbeat = now;

        // not recorded in the coordinator's own history
        let envelope = Envelope::new(MessageId::generate(now, COORDINATOR_TAG), HEARTBEAT_TEXT);
        let wire = envelope.encode();
        debug!(wire = %wire, "Heartbeat");
        shared.relay.broadcast(Frame::Message(envelope));
        shared.outbox().display(wire);
    }
}

/// Peer-side history ingestion
#[derive(Debug, Default)]
pub enum ReplayState {
    #[default]
    Idle,
    ReceivingHistory {
        /// Sender of `HISTORY_START`
        source: SocketAddr,
        /// Chunk bytes received so far
        pending: BytesMut,
        /// Uptime of the last marker or chunk
        last_activity: Duration,
    },
}

/// Bounded set of recently seen message ids, oldest forgotten first
#[derive(Debug)]
pub struct RecentIds {
    order: VecDeque<MessageId>,
    seen: HashSet<MessageId>,
    limit: usize,
}

impl RecentIds {
    pub fn new(limit: usize) -> Self {
        RecentIds {
            order: VecDeque::with_capacity(limit),
            seen: HashSet::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    /// Remembers `id`; returns false if it was already known
    pub fn insert(&mut self, id: &MessageId) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.clone());
        self.seen.insert(id.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Peer: joins via the coordinator, displays and acknowledges messages
#[derive(Debug)]
pub struct PeerHandler {
    coordinator: SocketAddr,
    history_timeout: Duration,
    /// `[<own-ip>]`, the origin prefix of this peer's own messages
    own_prefix: String,
    replay: ReplayState,
    recent: RecentIds,
}

impl PeerHandler {
    pub fn new(coordinator: SocketAddr, local_ip: IpAddr, history_timeout: Duration) -> Self {
        PeerHandler {
            coordinator,
            history_timeout,
            own_prefix: Role::Peer.origin_prefix(local_ip),
            replay: ReplayState::Idle,
            recent: RecentIds::new(RECENT_IDS),
        }
    }

    fn deliver(&mut self, shared: &mut Shared, envelope: &Envelope, from: SocketAddr) {
        if envelope.payload.starts_with(&self.own_prefix) {
            trace!(id = %envelope.id, "Suppressing own message");
            return;
        }

        if self.recent.insert(&envelope.id) {
            shared.outbox().display(envelope.payload.clone());
        } else {
            debug!(id = %envelope.id, "Duplicate message");
        }
        shared.acks.send_ack(from, &envelope.id);
    }

    fn begin_replay(&mut self, shared: &mut Shared, from: SocketAddr, now: Duration) {
        if let ReplayState::ReceivingHistory { .. } = self.replay {
            warn!("History replay restarted before the previous one finished");
            self.finish_replay(shared);
        }
        info!(from = %from.ip(), "Receiving history...");
        self.replay = ReplayState::ReceivingHistory {
            source: from,
            pending: BytesMut::new(),
            last_activity: now,
        };
    }

    /// Moves accumulated chunks into the local history and displays them
    fn finish_replay(&mut self, shared: &mut Shared) {
        let ReplayState::ReceivingHistory { pending, .. } = std::mem::take(&mut self.replay)
        else {
            return;
        };

        let text = datagram_text(&pending);
        let mut count = 0usize;
        for line in text.lines().filter(|line| !line.is_empty()) {
            shared.history.append(line);
            shared.outbox().display(line);
            count += 1;
        }
        info!(lines = count, "History received");
    }

    /// Whether a replay from `from` is in progress
    fn replaying_from(&self, from: SocketAddr) -> bool {
        matches!(&self.replay, ReplayState::ReceivingHistory { source, .. } if *source == from)
    }

    /// Handles a datagram from the replay source.
    ///
    /// Chunks are cut at fixed offsets and may begin with marker text, so
    /// only an exact marker ends or restarts the replay.
    fn ingest(&mut self, shared: &mut Shared, inbound: &Inbound, now: Duration) {
        let text = inbound.text();
        if text == HISTORY_END {
            self.finish_replay(shared);
        } else if text == HISTORY_START {
            self.begin_replay(shared, inbound.from, now);
        } else if let ReplayState::ReceivingHistory {
            pending,
            last_activity,
            ..
        } = &mut self.replay
        {
            pending.extend_from_slice(&inbound.raw);
            *last_activity = now;
        }
    }
}

impl RoleHandler for PeerHandler {
    fn role(&self) -> Role {
        Role::Peer
    }

    fn start(&mut self, shared: &mut Shared, _now: Duration) {
        info!(ip = %shared.local_ip, coordinator = %self.coordinator, "Peer started");
        shared
            .outbox()
            .unicast(self.coordinator, Frame::NewClient);
        shared
            .history
            .append(&format!("System: Client {} joined", shared.local_ip));
    }

    fn handle_inbound(&mut self, shared: &mut Shared, inbound: Inbound, now: Duration) {
        if self.replaying_from(inbound.from) {
            self.ingest(shared, &inbound, now);
            return;
        }

        match &inbound.frame {
            Frame::HistoryStart => self.begin_replay(shared, inbound.from, now),
            Frame::HistoryEnd => {
                debug!(from = %inbound.from, "HISTORY_END without a replay from this sender");
            }
            Frame::Ack(id) => shared.acks.on_ack(id, inbound.from),
            Frame::NewClient => trace!(from = %inbound.from, "Ignoring NEW_CLIENT"),
            Frame::Message(envelope) => self.deliver(shared, envelope, inbound.from),
            Frame::Raw(_) => debug!(from = %inbound.from, "Dropping malformed datagram"),
        }
    }

    fn tick(&mut self, shared: &mut Shared, now: Duration) {
        if let ReplayState::ReceivingHistory { last_activity, .. } = &self.replay {
            if now.saturating_sub(*last_activity) > self.history_timeout {
                warn!("History replay timed out, keeping what arrived");
                self.finish_replay(shared);
            }
        }
    }

    fn receiving_history(&self) -> bool {
        matches!(self.replay, ReplayState::ReceivingHistory { .. })
    }
}

/// Information about the current protocol state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    pub role: Role,
    pub history_bytes: usize,
    pub history_lines: usize,
    pub acks_observed: u64,
    pub receiving_history: bool,
}

/// Protocol engine for one device
pub struct ProtocolState {
    shared: Shared,
    handler: Box<dyn RoleHandler>,
}

impl ProtocolState {
    /// Creates the engine for the configured role.
    ///
    /// `local_addr` is the node's own address and bound port; datagrams
    /// from it are its own broadcasts looping back and are ignored.
    pub fn new(config: &Config, local_addr: SocketAddr, outbox: Outbox) -> Self {
        let local_ip = local_addr.ip();
        let handler: Box<dyn RoleHandler> = match config.role {
            Role::Coordinator => Box::new(CoordinatorHandler::new(config.timing.heartbeat_interval)),
            Role::Peer => Box::new(PeerHandler::new(
                config.network.coordinator_addr(),
                local_ip,
                config.timing.history_timeout,
            )),
        };

        let shared = Shared {
            local_ip,
            local_addr,
            history: HistoryBuffer::with_chunk_size(
                config.history.capacity,
                config.history.chunk_size,
            ),
            relay: RelayEngine::new(outbox.clone(), config.timing.chunk_pacing),
            acks: AckTracker::new(outbox),
        };

        ProtocolState { shared, handler }
    }

    pub fn role(&self) -> Role {
        self.handler.role()
    }

    pub fn start(&mut self, now: Duration) {
        self.handler.start(&mut self.shared, now);
    }

    /// Sends one line of operator input to everyone
    pub fn submit_local(&mut self, line: &str, now: Duration) {
        let input = line.trim();
        if input.is_empty() {
            return;
        }

        let role = self.role();
        let formatted = format!("{}: {}", role.origin_prefix(self.shared.local_ip), input);
        let id = MessageId::generate(now, &role.tag(self.shared.local_ip));

        self.shared.history.append(&formatted);
        self.shared
            .relay
            .broadcast(Frame::Message(Envelope::new(id, formatted.clone())));
        self.shared.outbox().display(format!(">> {}", formatted));

        if role == Role::Peer {
            debug!("Waiting for ACKs...");
        }
    }

    pub fn handle_inbound(&mut self, inbound: Inbound, now: Duration) {
        if inbound.from == self.shared.local_addr {
            trace!("Ignoring own datagram");
            return;
        }
        self.handler.handle_inbound(&mut self.shared, inbound, now);
    }

    pub fn tick(&mut self, now: Duration) {
        self.handler.tick(&mut self.shared, now);
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.shared.history
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn state_info(&self) -> StateInfo {
        StateInfo {
            role: self.role(),
            history_bytes: self.shared.history.size(),
            history_lines: self.shared.history.lines().count(),
            acks_observed: self.shared.acks.observed(),
            receiving_history: self.handler.receiving_history(),
        }
    }
}
