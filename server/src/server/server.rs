use std::{collections::BTreeMap, mem, time::Instant};

use log::{info, warn};

use netrep_shared::{
    ChangeObserver, ConfigError, DenyReason, Events, Expiry, Frame, HostType, NetworkId, PeerId,
    PeerRemoval, PrefabRef, Protocol, ReplicatedObject, ReplicatedValue, ReplicationConfig,
    ReplicationEngine, ReplicationError, RpcCall, RpcError, RpcTarget, SceneHandle, ScenePlacement,
    SpawnError, SpawnOptions, Tick, Timer, Transport, VariableError, VariableIndex,
};

use crate::{user::PendingConnection, ServerError};

/// The authoritative host. Owns every replicated object, decides who may
/// connect and relays Client-authored changes. Nothing happens on its own:
/// the embedding loop feeds transport events in and calls `advance`.
pub struct Server {
    engine: ReplicationEngine,
    transport: Box<dyn Transport>,
    pending: BTreeMap<PeerId, PendingConnection>,
    incoming_events: Events,
    player_prefab: Option<PrefabRef>,
    awaiting_player_object: Vec<PeerId>,
    resync_timer: Option<Timer>,
}

impl Server {
    /// Create a new Server. Fails on an invalid config, a `player_prefab`
    /// missing from the Protocol or a Protocol whose method hashes collide.
    pub fn new(
        config: ReplicationConfig,
        protocol: Protocol,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ReplicationError> {
        let engine = ReplicationEngine::new(HostType::Server, config, protocol)?;

        let player_prefab = match &engine.config().player_prefab {
            Some(name) => Some(
                engine
                    .protocol()
                    .prefab_ref(name)
                    .ok_or_else(|| ConfigError::UnknownPlayerPrefab { name: name.clone() })?,
            ),
            None => None,
        };
        let resync_timer = engine
            .config()
            .enable_time_resync
            .then(|| Timer::new(engine.config().time_resync_interval));

        Ok(Self {
            engine,
            transport,
            pending: BTreeMap::new(),
            incoming_events: Events::new(),
            player_prefab,
            awaiting_player_object: Vec::new(),
            resync_timer,
        })
    }

    // Transport callbacks

    /// A Client opened a link. It stays pending until approved.
    pub fn peer_connected(&mut self, peer: PeerId, now: Instant) {
        if peer.is_server() || self.engine.is_connected(&peer) || self.pending.contains_key(&peer) {
            warn!("ignoring duplicate connection from {:?}", peer);
            return;
        }
        info!("peer {:?} connected, awaiting connection request", peer);
        self.pending.insert(peer, PendingConnection::new(now));
    }

    /// Queues bytes received from `peer` for the next `advance`
    pub fn receive(&mut self, peer: PeerId, bytes: Vec<u8>) {
        self.engine.receive(peer, bytes);
    }

    /// A Client's link closed. Its player objects are despawned, the rest of
    /// what it owned returns to the Server.
    pub fn peer_disconnected(&mut self, peer: PeerId, now: Instant) {
        if self.pending.remove(&peer).is_some() {
            self.engine.discard_inbound(&peer);
            info!("pending peer {:?} disconnected", peer);
            return;
        }
        if !self.engine.is_connected(&peer) {
            return;
        }

        match self.engine.remove_peer(&peer, now) {
            Ok(PeerRemoval {
                despawned,
                returned_to_server,
            }) => {
                info!(
                    "peer {:?} disconnected, {} objects despawned, {} returned to server",
                    peer,
                    despawned.len(),
                    returned_to_server.len()
                );
                for network_id in despawned {
                    self.incoming_events.push_despawn(network_id);
                }
                for network_id in returned_to_server {
                    self.incoming_events
                        .push_ownership_change(network_id, PeerId::SERVER);
                }
            }
            Err(error) => self.incoming_events.push_error(error),
        }
        self.incoming_events.push_disconnection(peer);
    }

    /// Closes the link to a connected or pending Client
    pub fn disconnect(&mut self, peer: PeerId, now: Instant) {
        self.transport.disconnect(peer);
        self.peer_disconnected(peer, now);
    }

    // Connections

    /// Approves a pending Client that has sent its connection request
    pub fn accept_connection(&mut self, peer: PeerId) -> Result<(), ServerError> {
        if self.engine.is_connected(&peer) {
            return Err(ServerError::AlreadyConnected { peer });
        }
        match self.pending.get(&peer) {
            Some(pending) if pending.has_requested() => {}
            _ => return Err(ServerError::NoPendingConnection { peer }),
        }
        let mut events = mem::take(&mut self.incoming_events);
        self.approve(peer, &mut events);
        self.incoming_events = events;
        Ok(())
    }

    /// Denies a pending Client and closes its link
    pub fn reject_connection(&mut self, peer: PeerId) -> Result<(), ServerError> {
        if self.pending.remove(&peer).is_none() {
            return Err(ServerError::NoPendingConnection { peer });
        }
        info!("rejecting connection from {:?}", peer);
        let mut events = mem::take(&mut self.incoming_events);
        self.deny(peer, DenyReason::Rejected, &mut events);
        self.incoming_events = events;
        Ok(())
    }

    fn deny(&mut self, peer: PeerId, reason: DenyReason, events: &mut Events) {
        self.pending.remove(&peer);
        self.engine.send_control(
            self.transport.as_mut(),
            peer,
            &Frame::ConnectionDenied { reason },
            events,
        );
        self.engine.discard_inbound(&peer);
        self.transport.disconnect(peer);
    }

    fn approve(&mut self, peer: PeerId, events: &mut Events) {
        self.pending.remove(&peer);
        self.engine.add_peer(peer);
        self.engine.send_control(
            self.transport.as_mut(),
            peer,
            &Frame::ConnectionApproved { client_id: peer },
            events,
        );
        self.engine.queue_late_join(peer);
        if self.player_prefab.is_some() {
            self.awaiting_player_object.push(peer);
        }
        events.push_connection(peer);
        info!("approved connection from {:?}", peer);
    }

    fn handle_connection_request(
        &mut self,
        peer: PeerId,
        protocol_version: u32,
        fingerprint: u64,
        payload: Vec<u8>,
        events: &mut Events,
    ) {
        let Some(pending) = self.pending.get(&peer) else {
            warn!("ignoring connection request from {:?}, which is not pending", peer);
            return;
        };
        if pending.has_requested() {
            return;
        }

        let config = self.engine.config();
        let mismatch = if protocol_version != config.protocol_version {
            Some(DenyReason::ProtocolVersion)
        } else if config.force_same_prefabs && fingerprint != self.engine.protocol().fingerprint() {
            Some(DenyReason::PrefabMismatch)
        } else {
            None
        };
        if let Some(reason) = mismatch {
            warn!("denying connection from {:?}: {:?}", peer, reason);
            self.deny(peer, reason, events);
            events.push_error(ReplicationError::IncompatiblePeer { peer, reason });
            return;
        }

        let Some(pending) = self.pending.get_mut(&peer) else {
            return;
        };

        if self.engine.config().connection_approval {
            pending.set_request(payload.clone());
            events.push_connection_request(peer, payload);
        } else {
            pending.set_request(payload);
            self.approve(peer, events);
        }
    }

    fn expire_pending(&mut self, now: Instant, events: &mut Events) {
        let timeout = self.engine.config().client_connection_buffer_timeout;
        let expired: Vec<PeerId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.is_expired(now, timeout))
            .map(|(peer, _)| *peer)
            .collect();

        for peer in expired {
            warn!("pending connection from {:?} timed out", peer);
            self.pending.remove(&peer);
            self.engine.discard_inbound(&peer);
            self.transport.disconnect(peer);
            events.push_expiry(Expiry::PendingConnection { peer });
        }
    }

    // Update loop

    /// Processes queued inbound frames, then every tick elapsed up to `now`,
    /// and returns what happened since the last call
    pub fn advance(&mut self, now: Instant) -> Events {
        let mut events = mem::take(&mut self.incoming_events);

        for (peer, bytes) in self.engine.take_inbound(now) {
            let Some((tick, frame)) = self.engine.decode(peer, &bytes, &mut events) else {
                continue;
            };
            match frame {
                Frame::ConnectionRequest {
                    protocol_version,
                    fingerprint,
                    payload,
                } => {
                    self.handle_connection_request(
                        peer,
                        protocol_version,
                        fingerprint,
                        payload,
                        &mut events,
                    );
                }
                frame if self.engine.is_connected(&peer) => {
                    self.engine.handle_frame(peer, tick, frame, now, &mut events);
                }
                frame => {
                    warn!(
                        "discarding {:?} frame from unapproved peer {:?}",
                        frame.message_type(),
                        peer
                    );
                    events.push_error(ReplicationError::UnexpectedFrame {
                        peer,
                        message_type: frame.message_type(),
                    });
                }
            }
        }

        self.expire_pending(now, &mut events);
        self.spawn_player_objects(now, &mut events);
        self.send_time_sync(now, &mut events);
        self.engine
            .run_ticks(now, self.transport.as_mut(), &mut events);

        events
    }

    fn spawn_player_objects(&mut self, now: Instant, events: &mut Events) {
        let Some(prefab) = self.player_prefab else {
            return;
        };
        for peer in mem::take(&mut self.awaiting_player_object) {
            if !self.engine.is_connected(&peer) {
                continue;
            }
            let options = SpawnOptions::default().owned_by(peer).player_object();
            match self.engine.spawn(prefab, options, now) {
                Ok(network_id) => info!("spawned player object {} for {:?}", network_id, peer),
                Err(error) => events.push_error(error),
            }
        }
    }

    fn send_time_sync(&mut self, now: Instant, events: &mut Events) {
        let Some(timer) = self.resync_timer.as_mut() else {
            return;
        };
        if !timer.ringing(now) {
            return;
        }
        timer.reset(now);

        let peers: Vec<PeerId> = self.engine.peers().copied().collect();
        for peer in peers {
            self.engine
                .send_control(self.transport.as_mut(), peer, &Frame::TimeSync, events);
        }
    }

    // Objects

    pub fn prefab(&self, name: &str) -> Option<PrefabRef> {
        self.engine.protocol().prefab_ref(name)
    }

    pub fn spawn(
        &mut self,
        prefab: PrefabRef,
        options: SpawnOptions,
        now: Instant,
    ) -> Result<NetworkId, SpawnError> {
        self.engine.spawn(prefab, options, now)
    }

    pub fn despawn(&mut self, network_id: NetworkId, now: Instant) -> Result<(), SpawnError> {
        self.engine.despawn(network_id, now)
    }

    /// Hands an object to a connected Client or back to the Server,
    /// returning the previous owner
    pub fn change_ownership(
        &mut self,
        network_id: NetworkId,
        owner: PeerId,
    ) -> Result<PeerId, ServerError> {
        if !owner.is_server() && !self.engine.is_connected(&owner) {
            return Err(ServerError::NotConnected { peer: owner });
        }
        Ok(self.engine.change_ownership(network_id, owner)?)
    }

    pub fn remove_ownership(&mut self, network_id: NetworkId) -> Result<PeerId, SpawnError> {
        self.engine.remove_ownership(network_id)
    }

    pub fn register_scene(
        &mut self,
        scene: SceneHandle,
        placements: &[ScenePlacement],
    ) -> Result<Vec<NetworkId>, SpawnError> {
        self.engine.register_scene(scene, placements)
    }

    pub fn claim_scene_object(
        &mut self,
        scene: SceneHandle,
        placement: u32,
    ) -> Result<NetworkId, SpawnError> {
        self.engine.claim_scene_object(scene, placement)
    }

    /// Despawns every live object of the scene marked `destroy_with_scene`
    pub fn unload_scene(
        &mut self,
        scene: SceneHandle,
        now: Instant,
    ) -> Result<Vec<NetworkId>, SpawnError> {
        self.engine.unload_scene(scene, now)
    }

    pub fn object(&self, network_id: &NetworkId) -> Option<&ReplicatedObject> {
        self.engine.object(network_id)
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.engine.network_ids()
    }

    pub fn owner(&self, network_id: &NetworkId) -> Option<PeerId> {
        self.engine.owner(network_id)
    }

    // Variables

    pub fn set_variable<V: Into<ReplicatedValue>>(
        &mut self,
        network_id: NetworkId,
        index: VariableIndex,
        value: V,
    ) -> Result<bool, VariableError> {
        self.engine.write_variable(network_id, index, value.into())
    }

    pub fn variable(&self, network_id: &NetworkId, index: VariableIndex) -> Option<&ReplicatedValue> {
        self.engine.value(network_id, index)
    }

    pub fn observe_variable(
        &mut self,
        network_id: NetworkId,
        index: VariableIndex,
        observer: ChangeObserver,
    ) -> Result<(), VariableError> {
        self.engine.observe_variable(network_id, index, observer)
    }

    // RPCs

    /// Binds a handler for `ServerRpc` calls to `method` on one object
    pub fn bind_rpc<F>(&mut self, network_id: NetworkId, method: &str, handler: F) -> Result<(), RpcError>
    where
        F: FnMut(&RpcCall) -> Result<(), String> + 'static,
    {
        self.engine.bind_rpc(network_id, method, Box::new(handler))
    }

    /// Queues a `ClientRpc` for the next flush
    pub fn call_client_rpc(
        &mut self,
        network_id: NetworkId,
        method: &str,
        payload: Vec<u8>,
        target: RpcTarget,
    ) -> Result<(), RpcError> {
        self.engine.queue_rpc(network_id, method, payload, target)
    }

    // Peers

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.engine.peers().copied().collect()
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.engine.is_connected(peer)
    }

    pub fn pending_connection(&self, peer: &PeerId) -> Option<&PendingConnection> {
        self.pending.get(peer)
    }

    pub fn current_tick(&self) -> Tick {
        self.engine.current_tick()
    }

    pub fn engine(&self) -> &ReplicationEngine {
        &self.engine
    }
}
