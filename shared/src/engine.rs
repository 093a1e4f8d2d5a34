use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    time::Instant,
};

use log::{debug, info, trace, warn};

use crate::{
    config::ReplicationConfig,
    constants::DECODE_ERROR_FLAG_THRESHOLD,
    error::ReplicationError,
    events::{Events, Expiry},
    observer::ChangeObserver,
    protocol::{Protocol, ProtocolError},
    rpc::{
        dispatch, method_hash, validate_outgoing, RpcClass, RpcError, RpcMessage, RpcQueue,
        RpcTarget,
    },
    tick_scheduler::{SendBudget, TickScheduler},
    timer::Timer,
    transport::Transport,
    types::{HostType, NetworkId, PeerId, PrefabRef, SceneHandle, Tick, VariableIndex},
    wire::{Frame, FrameCodec, ReplicatedValue},
    world::{
        remote::{BufferRefusal, BufferedMessage, MessageBuffer, Resolved},
        DeltaOutcome, PeerRemoval, ReplicatedObject, RpcHandler, ScenePlacement, SpawnError,
        SpawnManager, SpawnOptions, SpawnRecord, VariableError, VariableManager,
    },
};

/// Inbound frames waiting for the next receive window. Transport callbacks
/// only push here, decoding happens inside `advance`.
pub struct InboundQueue {
    timer: Timer,
    max_per_advance: usize,
    frames: VecDeque<(PeerId, Vec<u8>)>,
}

impl InboundQueue {
    pub fn new(config: &ReplicationConfig) -> Self {
        Self {
            timer: Timer::from_rate(config.receive_tick_rate),
            max_per_advance: config.max_receive_events_per_tick,
            frames: VecDeque::new(),
        }
    }

    pub fn push(&mut self, peer: PeerId, bytes: Vec<u8>) {
        self.frames.push_back((peer, bytes));
    }

    /// Takes the frames to process during this `advance`, oldest first.
    /// Frames over the per-advance limit stay queued.
    pub fn take_ready(&mut self, now: Instant) -> Vec<(PeerId, Vec<u8>)> {
        if self.frames.is_empty() || !self.timer.ringing(now) {
            return Vec::new();
        }
        self.timer.reset(now);

        let count = self.frames.len().min(self.max_per_advance);
        if count < self.frames.len() {
            trace!(
                "receive limit reached, {} frames left queued",
                self.frames.len() - count
            );
        }
        self.frames.drain(..count).collect()
    }

    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.frames.retain(|(sender, _)| sender != peer);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// The replication core shared by Server and Client. Owns every object,
/// the outgoing RPC queues and the early-arrival buffer, and runs the
/// per-tick pipeline. Connection handshakes live in the wrappers.
pub struct ReplicationEngine {
    host_type: HostType,
    local_peer: Option<PeerId>,
    config: ReplicationConfig,
    protocol: Protocol,
    codec: FrameCodec,
    scheduler: TickScheduler,
    rpc_timer: Timer,
    inbound: InboundQueue,
    spawns: SpawnManager,
    variables: VariableManager,
    rpc_queue: RpcQueue,
    buffer: MessageBuffer,
    peers: BTreeSet<PeerId>,
    decode_errors: HashMap<PeerId, u32>,
}

impl ReplicationEngine {
    pub fn new(
        host_type: HostType,
        config: ReplicationConfig,
        mut protocol: Protocol,
    ) -> Result<Self, ReplicationError> {
        config.validate()?;
        if !protocol.is_locked() {
            protocol.lock(config.rpc_hash_width)?;
        } else if protocol.hash_width() != config.rpc_hash_width {
            return Err(ProtocolError::AlreadyLocked.into());
        }

        let local_peer = match host_type {
            HostType::Server => Some(PeerId::SERVER),
            HostType::Client => None,
        };

        Ok(Self {
            host_type,
            local_peer,
            codec: FrameCodec::from_config(&config),
            scheduler: TickScheduler::new(config.tick_interval),
            rpc_timer: Timer::from_rate(config.event_tick_rate),
            inbound: InboundQueue::new(&config),
            spawns: SpawnManager::new(host_type, &config),
            variables: VariableManager::new(host_type, &config),
            rpc_queue: RpcQueue::new(),
            buffer: MessageBuffer::new(
                config.enable_message_buffering,
                config.message_buffer_timeout,
                config.max_buffered_messages,
            ),
            peers: BTreeSet::new(),
            decode_errors: HashMap::new(),
            config,
            protocol,
        })
    }

    // Queries

    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    pub fn local_peer(&self) -> Option<PeerId> {
        self.local_peer
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn current_tick(&self) -> Tick {
        self.scheduler.current_tick()
    }

    pub fn object(&self, network_id: &NetworkId) -> Option<&ReplicatedObject> {
        self.spawns.object(network_id)
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.spawns.network_ids()
    }

    pub fn owner(&self, network_id: &NetworkId) -> Option<PeerId> {
        self.spawns.owner(network_id)
    }

    pub fn value(&self, network_id: &NetworkId, index: VariableIndex) -> Option<&ReplicatedValue> {
        Some(self.spawns.object(network_id)?.variable(index)?.value())
    }

    pub fn is_tombstoned(&self, network_id: &NetworkId) -> bool {
        self.spawns.is_tombstoned(network_id)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn pending_spawn_records(&self) -> usize {
        self.spawns.pending_len()
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.iter()
    }

    // Peers

    /// Starts replicating to and from `peer`
    pub fn add_peer(&mut self, peer: PeerId) {
        self.peers.insert(peer);
    }

    pub fn set_local_peer(&mut self, peer: Option<PeerId>) {
        self.local_peer = peer;
    }

    pub fn sync_tick(&mut self, tick: Tick) {
        self.scheduler.sync_tick(tick);
    }

    /// Forgets a peer: queued frames and RPCs to or from it are dropped, and
    /// on the Server its objects are despawned or handed back
    pub fn remove_peer(&mut self, peer: &PeerId, now: Instant) -> Result<PeerRemoval, SpawnError> {
        self.peers.remove(peer);
        self.inbound.remove_peer(peer);
        self.rpc_queue.remove_peer(peer);
        self.decode_errors.remove(peer);
        self.spawns.remove_peer(peer, now)
    }

    /// Drops every object received from the Server, as after losing the
    /// connection to it
    pub fn clear_remote_world(&mut self, now: Instant, events: &mut Events) {
        for network_id in self.spawns.network_ids() {
            if self.spawns.apply_despawn(network_id, now).is_ok() {
                self.buffer.purge(&network_id);
                events.push_despawn(network_id);
            }
        }
    }

    // Inbound

    pub fn receive(&mut self, peer: PeerId, bytes: Vec<u8>) {
        self.inbound.push(peer, bytes);
    }

    pub fn take_inbound(&mut self, now: Instant) -> Vec<(PeerId, Vec<u8>)> {
        self.inbound.take_ready(now)
    }

    /// Drops queued frames and the decode error count of a peer that never
    /// got connected
    pub fn discard_inbound(&mut self, peer: &PeerId) {
        self.inbound.remove_peer(peer);
        self.decode_errors.remove(peer);
    }

    /// Decodes one frame, reporting failures and counting them against the
    /// sender
    pub fn decode(
        &mut self,
        peer: PeerId,
        bytes: &[u8],
        events: &mut Events,
    ) -> Option<(Tick, Frame)> {
        match self.codec.decode(peer, bytes) {
            Ok(decoded) => Some(decoded),
            Err(source) => {
                warn!("discarding undecodable frame from {:?}: {}", peer, source);
                events.push_error(ReplicationError::Decode { peer, source });

                let count = self.decode_errors.entry(peer).or_insert(0);
                *count += 1;
                if *count == DECODE_ERROR_FLAG_THRESHOLD {
                    warn!("{:?} has sent {} undecodable frames", peer, count);
                    events.push_error(ReplicationError::MisbehavingPeer {
                        peer,
                        count: *count,
                    });
                }
                None
            }
        }
    }

    /// Routes a decoded replication frame. Connection-control frames belong
    /// to the Server/Client wrappers and are reported as unexpected here.
    pub fn handle_frame(
        &mut self,
        sender: PeerId,
        tick: Tick,
        frame: Frame,
        now: Instant,
        events: &mut Events,
    ) {
        let message_type = frame.message_type();
        let from_authority = self.host_type == HostType::Client && sender.is_server();

        match frame {
            Frame::Spawn(spawn) if from_authority => {
                let network_id = spawn.network_id;
                match self.spawns.apply_spawn(&self.protocol, spawn) {
                    Ok(()) => {
                        events.push_spawn(network_id);
                        self.replay_buffered(network_id, now, events);
                    }
                    Err(error) => events.push_error(error),
                }
            }
            Frame::Despawn { network_id } if from_authority => {
                if !self.spawns.contains(&network_id) {
                    debug!("ignoring despawn of unknown object {}", network_id);
                    return;
                }
                match self.spawns.apply_despawn(network_id, now) {
                    Ok(()) => {
                        self.buffer.purge(&network_id);
                        events.push_despawn(network_id);
                    }
                    Err(error) => events.push_error(error),
                }
            }
            Frame::OwnershipChange { network_id, owner } if from_authority => {
                match self.spawns.apply_ownership_change(network_id, owner) {
                    Ok(_) => events.push_ownership_change(network_id, owner),
                    Err(_) if self.spawns.is_tombstoned(&network_id) => {}
                    Err(error) => events.push_error(error),
                }
            }
            Frame::VariableDelta {
                network_id,
                variable_index,
                value,
            } => {
                let message = BufferedMessage::VariableDelta {
                    sender,
                    tick,
                    variable_index,
                    value,
                };
                if self.resolve_target(network_id, &message, now, events) {
                    self.apply_buffered(network_id, message, events);
                }
            }
            Frame::RpcBatch { messages, .. } => {
                trace!("received {} rpcs from {:?}", messages.len(), sender);
                for rpc in messages {
                    let network_id = rpc.target;
                    let message = BufferedMessage::Rpc(rpc);
                    if self.resolve_target(network_id, &message, now, events) {
                        self.apply_buffered(network_id, message, events);
                    }
                }
            }
            _ => {
                warn!("discarding unexpected {:?} frame from {:?}", message_type, sender);
                events.push_error(ReplicationError::UnexpectedFrame {
                    peer: sender,
                    message_type,
                });
            }
        }
    }

    /// Whether `network_id` is live. Otherwise the message is buffered,
    /// ignored for a tombstoned id, or reported on the Server, which never
    /// waits for spawns.
    fn resolve_target(
        &mut self,
        network_id: NetworkId,
        message: &BufferedMessage,
        now: Instant,
        events: &mut Events,
    ) -> bool {
        if self.spawns.contains(&network_id) {
            return true;
        }
        if self.spawns.is_tombstoned(&network_id) {
            trace!("ignoring late message for despawned object {}", network_id);
            return false;
        }
        if self.host_type == HostType::Server {
            match message {
                BufferedMessage::VariableDelta { .. } => {
                    events.push_error(VariableError::ObjectNotFound { network_id })
                }
                BufferedMessage::Rpc(_) => {
                    events.push_error(RpcError::ObjectNotFound { network_id })
                }
            }
            return false;
        }

        match self.buffer.push(network_id, message.clone(), now) {
            Ok(()) => {}
            Err(BufferRefusal::Disabled) => {
                warn!(
                    "message buffering disabled, dropping message for unknown object {}",
                    network_id
                );
            }
            Err(BufferRefusal::Full) => {}
        }
        false
    }

    fn apply_buffered(&mut self, network_id: NetworkId, message: BufferedMessage, events: &mut Events) {
        match message {
            BufferedMessage::VariableDelta {
                sender,
                tick,
                variable_index,
                value,
            } => {
                match self.variables.apply_delta(
                    &mut self.spawns,
                    self.local_peer,
                    sender,
                    tick,
                    network_id,
                    variable_index,
                    value,
                ) {
                    Ok(DeltaOutcome::Applied) => {
                        trace!("applied variable {} of object {}", variable_index, network_id);
                    }
                    Ok(_) => {}
                    Err(error) => events.push_error(error),
                }
            }
            BufferedMessage::Rpc(rpc) => {
                match dispatch(&self.protocol, &mut self.spawns, self.host_type, &rpc) {
                    Ok(call) => events.push_rpc(call),
                    Err(error) => events.push_error(error),
                }
            }
        }
    }

    fn replay_buffered(&mut self, network_id: NetworkId, now: Instant, events: &mut Events) {
        let Resolved { messages, expired } = self.buffer.resolve(&network_id, now);
        for _ in 0..expired {
            debug!("buffered message for object {} expired", network_id);
            events.push_expiry(Expiry::BufferedMessage { network_id });
        }
        if !messages.is_empty() {
            debug!(
                "replaying {} buffered messages for object {}",
                messages.len(),
                network_id
            );
        }
        for message in messages {
            self.apply_buffered(network_id, message, events);
        }
    }

    // Local operations

    pub fn spawn(
        &mut self,
        prefab: PrefabRef,
        options: SpawnOptions,
        now: Instant,
    ) -> Result<NetworkId, SpawnError> {
        self.spawns.spawn(&self.protocol, prefab, options, now)
    }

    pub fn despawn(&mut self, network_id: NetworkId, now: Instant) -> Result<(), SpawnError> {
        self.spawns.despawn(network_id, now)
    }

    pub fn change_ownership(
        &mut self,
        network_id: NetworkId,
        owner: PeerId,
    ) -> Result<PeerId, SpawnError> {
        self.spawns.change_ownership(network_id, owner)
    }

    pub fn remove_ownership(&mut self, network_id: NetworkId) -> Result<PeerId, SpawnError> {
        self.spawns.remove_ownership(network_id)
    }

    pub fn register_scene(
        &mut self,
        scene: SceneHandle,
        placements: &[ScenePlacement],
    ) -> Result<Vec<NetworkId>, SpawnError> {
        self.spawns.register_scene(scene, placements)
    }

    pub fn claim_scene_object(
        &mut self,
        scene: SceneHandle,
        placement: u32,
    ) -> Result<NetworkId, SpawnError> {
        self.spawns.claim_scene_object(&self.protocol, scene, placement)
    }

    pub fn unload_scene(
        &mut self,
        scene: SceneHandle,
        now: Instant,
    ) -> Result<Vec<NetworkId>, SpawnError> {
        self.spawns.unload_scene(scene, now)
    }

    /// Queues spawn frames of every object `peer` may see
    pub fn queue_late_join(&mut self, peer: PeerId) {
        self.spawns.queue_late_join(peer);
    }

    pub fn write_variable(
        &mut self,
        network_id: NetworkId,
        index: VariableIndex,
        value: ReplicatedValue,
    ) -> Result<bool, VariableError> {
        let tick = self.scheduler.current_tick();
        self.variables
            .write(&mut self.spawns, self.local_peer, network_id, index, value, tick)
    }

    pub fn observe_variable(
        &mut self,
        network_id: NetworkId,
        index: VariableIndex,
        observer: ChangeObserver,
    ) -> Result<(), VariableError> {
        self.variables
            .observe(&mut self.spawns, network_id, index, observer)
    }

    /// Binds `handler` to one method of one object. A despawn drops it.
    pub fn bind_rpc(
        &mut self,
        network_id: NetworkId,
        method: &str,
        handler: RpcHandler,
    ) -> Result<(), RpcError> {
        let object = self
            .spawns
            .object_mut(&network_id)
            .ok_or(RpcError::ObjectNotFound { network_id })?;
        let (hash, _) = self
            .protocol
            .endpoint_by_name(&object.prefab(), method)
            .ok_or(RpcError::UnknownMethod {
                network_id,
                method_hash: method_hash(method, self.protocol.hash_width()),
            })?;
        object.bind_handler(hash, handler);
        Ok(())
    }

    /// Queues a call for the next RPC flush. Clients always call the Server;
    /// the Server calls every connected peer in `target` that may see the
    /// object.
    pub fn queue_rpc(
        &mut self,
        network_id: NetworkId,
        method: &str,
        payload: Vec<u8>,
        target: RpcTarget,
    ) -> Result<(), RpcError> {
        let method_hash = validate_outgoing(
            &self.protocol,
            &self.spawns,
            self.host_type,
            self.local_peer,
            network_id,
            method,
            payload.len(),
            self.config.length_cap(),
        )?;
        let sender = self.local_peer.ok_or(RpcError::NotConnected)?;

        let (class, recipients): (RpcClass, Vec<PeerId>) = match self.host_type {
            HostType::Client => {
                if !self.peers.contains(&PeerId::SERVER) {
                    return Err(RpcError::NotConnected);
                }
                (RpcClass::ServerRpc, vec![PeerId::SERVER])
            }
            HostType::Server => {
                let object = self
                    .spawns
                    .object(&network_id)
                    .ok_or(RpcError::ObjectNotFound { network_id })?;
                let recipients = self
                    .peers
                    .iter()
                    .filter(|peer| target.includes(peer) && object.in_scope(peer))
                    .copied()
                    .collect();
                (RpcClass::ClientRpc, recipients)
            }
        };

        let tick = self.scheduler.current_tick();
        for peer in recipients {
            self.rpc_queue.push(
                peer,
                RpcMessage {
                    target: network_id,
                    method_hash,
                    sender,
                    payload: payload.clone(),
                    class,
                    tick,
                },
            );
        }
        Ok(())
    }

    // Outbound

    fn send_frame(
        &self,
        transport: &mut dyn Transport,
        peer: PeerId,
        tick: Tick,
        frame: &Frame,
        reliable: bool,
        events: &mut Events,
    ) {
        let bytes = self.codec.encode(tick, frame);
        if let Err(error) = transport.send(peer, &bytes, reliable) {
            warn!("failed to send {:?} to {:?}: {}", frame.message_type(), peer, error);
            events.push_error(error);
        }
    }

    /// Sends a connection-control frame right away, outside the tick pipeline
    pub fn send_control(
        &self,
        transport: &mut dyn Transport,
        peer: PeerId,
        frame: &Frame,
        events: &mut Events,
    ) {
        self.send_frame(transport, peer, self.current_tick(), frame, true, events);
    }

    /// Runs every tick elapsed up to `now`. Each tick scans variables, flushes
    /// RPCs, processes spawn records and sweeps the buffer, in that order.
    /// All send work shares one budget; what doesn't fit is deferred.
    pub fn run_ticks(&mut self, now: Instant, transport: &mut dyn Transport, events: &mut Events) {
        let mut budget = SendBudget::new(self.config.max_send_events_per_tick);

        for (tick, tick_at) in self.scheduler.collect_elapsed(now) {
            events.push_tick(tick);
            self.send_deltas(tick, tick_at, transport, &mut budget, events);
            self.flush_rpcs(tick, tick_at, transport, &mut budget, events);
            self.process_spawn_records(tick, transport, &mut budget, events);

            for network_id in self.buffer.sweep(tick_at) {
                debug!("buffered message for object {} expired", network_id);
                events.push_expiry(Expiry::BufferedMessage { network_id });
            }
            self.spawns.sweep_tombstones(tick_at);
        }
    }

    fn send_deltas(
        &mut self,
        tick: Tick,
        tick_at: Instant,
        transport: &mut dyn Transport,
        budget: &mut SendBudget,
        events: &mut Events,
    ) {
        let deltas =
            self.variables
                .collect_deltas(&mut self.spawns, self.local_peer, tick_at, budget);

        for delta in deltas {
            let frame = Frame::VariableDelta {
                network_id: delta.network_id,
                variable_index: delta.variable_index,
                value: delta.value,
            };
            for peer in delta.recipients {
                if self.peers.contains(&peer) {
                    self.send_frame(transport, peer, tick, &frame, delta.reliable, events);
                }
            }
        }
    }

    fn flush_rpcs(
        &mut self,
        tick: Tick,
        tick_at: Instant,
        transport: &mut dyn Transport,
        budget: &mut SendBudget,
        events: &mut Events,
    ) {
        if self.rpc_queue.is_empty() || !self.rpc_timer.ringing(tick_at) {
            return;
        }
        self.rpc_timer.reset(tick_at);

        let class = match self.host_type {
            HostType::Server => RpcClass::ClientRpc,
            HostType::Client => RpcClass::ServerRpc,
        };
        for peer in self.rpc_queue.peers() {
            if !budget.try_take() {
                trace!("send budget exhausted, deferring rpc batches");
                return;
            }
            let messages = self.rpc_queue.take(&peer);
            let frame = Frame::RpcBatch { class, messages };
            self.send_frame(transport, peer, tick, &frame, true, events);
        }
    }

    fn process_spawn_records(
        &mut self,
        tick: Tick,
        transport: &mut dyn Transport,
        budget: &mut SendBudget,
        events: &mut Events,
    ) {
        while let Some(record) = self.spawns.next_pending() {
            let (frame, targets) = match &record {
                SpawnRecord::Spawn {
                    network_id,
                    recipients,
                } => {
                    let (Some(frame), Some(object)) = (
                        self.spawns.spawn_frame(network_id),
                        self.spawns.object(network_id),
                    ) else {
                        continue;
                    };
                    let candidates: Vec<PeerId> = match recipients {
                        Some(recipients) => recipients.clone(),
                        None => self.peers.iter().copied().collect(),
                    };
                    let targets: Vec<PeerId> = candidates
                        .into_iter()
                        .filter(|peer| {
                            self.peers.contains(peer)
                                && object.in_scope(peer)
                                && !object.is_observed_by(peer)
                        })
                        .collect();
                    (Frame::Spawn(frame), targets)
                }
                SpawnRecord::Despawn {
                    network_id,
                    recipients,
                } => {
                    let targets = recipients
                        .iter()
                        .filter(|peer| self.peers.contains(peer))
                        .copied()
                        .collect();
                    (
                        Frame::Despawn {
                            network_id: *network_id,
                        },
                        targets,
                    )
                }
                SpawnRecord::OwnershipChange { network_id } => {
                    let (Some(object), Some(owner)) = (
                        self.spawns.object(network_id),
                        self.spawns.owner(network_id),
                    ) else {
                        continue;
                    };
                    let targets = object
                        .observers()
                        .iter()
                        .filter(|peer| self.peers.contains(peer))
                        .copied()
                        .collect();
                    (
                        Frame::OwnershipChange {
                            network_id: *network_id,
                            owner,
                        },
                        targets,
                    )
                }
            };

            if targets.is_empty() {
                continue;
            }
            if !budget.try_take() {
                trace!("send budget exhausted, deferring spawn records");
                self.spawns.defer_pending(record);
                return;
            }

            let network_id = record.network_id();
            for peer in targets {
                self.send_frame(transport, peer, tick, &frame, true, events);
                if let SpawnRecord::Spawn { .. } = record {
                    self.spawns.mark_observed(&network_id, peer);
                }
            }
            if let SpawnRecord::Spawn { .. } = record {
                info!("sent spawn of object {}", network_id);
            }
        }
    }
}
