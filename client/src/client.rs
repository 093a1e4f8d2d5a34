use std::{mem, time::Instant};

use log::{info, warn};

use netrep_shared::{
    ChangeObserver, DenyReason, Events, Frame, HostType, NetworkId, PeerId, Protocol, ReplicatedObject,
    ReplicatedValue, ReplicationEngine, ReplicationError, RpcCall, RpcError, RpcTarget,
    SceneHandle, ScenePlacement, SpawnError, Tick, Transport, VariableError, VariableIndex,
};

use crate::{ClientConfig, ConnectionState};

/// A Client of one Server. Mirrors the objects the Server replicates to it
/// and sends changes to the ones it may write.
pub struct Client {
    engine: ReplicationEngine,
    transport: Box<dyn Transport>,
    connection_payload: Vec<u8>,
    state: ConnectionState,
    rejection: Option<DenyReason>,
    incoming_events: Events,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        protocol: Protocol,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ReplicationError> {
        Ok(Self {
            engine: ReplicationEngine::new(HostType::Client, config.replication, protocol)?,
            transport,
            connection_payload: config.connection_payload,
            state: ConnectionState::Disconnected,
            rejection: None,
            incoming_events: Events::new(),
        })
    }

    // Transport callbacks

    /// The link to the Server is open, sends the connection request
    pub fn server_connected(&mut self) {
        if self.state == ConnectionState::Connected {
            return;
        }
        info!("link to server open, requesting connection");
        self.state = ConnectionState::Requesting;
        self.rejection = None;
        let frame = Frame::ConnectionRequest {
            protocol_version: self.engine.config().protocol_version,
            fingerprint: self.engine.protocol().fingerprint(),
            payload: self.connection_payload.clone(),
        };
        self.engine.send_control(
            self.transport.as_mut(),
            PeerId::SERVER,
            &frame,
            &mut self.incoming_events,
        );
    }

    /// Queues bytes received from the Server for the next `advance`
    pub fn receive(&mut self, bytes: Vec<u8>) {
        self.engine.receive(PeerId::SERVER, bytes);
    }

    /// The link to the Server closed. Every mirrored object is dropped.
    pub fn server_disconnected(&mut self, now: Instant) {
        let was_connected = self.state == ConnectionState::Connected;
        if self.state != ConnectionState::Rejected {
            self.state = ConnectionState::Disconnected;
        }
        if let Err(error) = self.engine.remove_peer(&PeerId::SERVER, now) {
            self.incoming_events.push_error(error);
        }
        if !was_connected {
            return;
        }

        info!("disconnected from server");
        self.engine.set_local_peer(None);
        self.engine.clear_remote_world(now, &mut self.incoming_events);
        self.incoming_events.push_disconnection(PeerId::SERVER);
    }

    fn handle_approval(&mut self, client_id: PeerId, tick: Tick, events: &mut Events) {
        if self.state != ConnectionState::Requesting {
            warn!("ignoring unexpected connection approval");
            return;
        }
        info!("connection approved as {:?}", client_id);
        self.state = ConnectionState::Connected;
        self.engine.set_local_peer(Some(client_id));
        self.engine.sync_tick(tick);
        self.engine.add_peer(PeerId::SERVER);
        events.push_connection(client_id);
    }

    fn handle_denial(&mut self, reason: DenyReason, events: &mut Events) {
        if self.state != ConnectionState::Requesting {
            warn!("ignoring unexpected connection denial");
            return;
        }
        info!("connection rejected by server: {:?}", reason);
        self.state = ConnectionState::Rejected;
        self.rejection = Some(reason);
        events.push_rejection(PeerId::SERVER);
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
                Frame::ConnectionApproved { client_id } => {
                    self.handle_approval(client_id, tick, &mut events);
                }
                Frame::ConnectionDenied { reason } => self.handle_denial(reason, &mut events),
                Frame::TimeSync if self.state == ConnectionState::Connected => {
                    self.engine.sync_tick(tick);
                }
                frame if self.state == ConnectionState::Connected => {
                    self.engine.handle_frame(peer, tick, frame, now, &mut events);
                }
                frame => {
                    warn!(
                        "discarding {:?} frame received before connection approval",
                        frame.message_type()
                    );
                    events.push_error(ReplicationError::UnexpectedFrame {
                        peer,
                        message_type: frame.message_type(),
                    });
                }
            }
        }

        self.engine
            .run_ticks(now, self.transport.as_mut(), &mut events);
        events
    }

    // Connection

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Why the Server denied the last connection request
    pub fn rejection_reason(&self) -> Option<DenyReason> {
        self.rejection
    }

    /// The id the Server assigned on approval
    pub fn peer_id(&self) -> Option<PeerId> {
        self.engine.local_peer()
    }

    pub fn current_tick(&self) -> Tick {
        self.engine.current_tick()
    }

    // Objects

    /// Registers a scene's pre-placed objects, the same way the Server does
    pub fn register_scene(
        &mut self,
        scene: SceneHandle,
        placements: &[ScenePlacement],
    ) -> Result<Vec<NetworkId>, SpawnError> {
        self.engine.register_scene(scene, placements)
    }

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

    /// Whether this Client owns the object
    pub fn owns(&self, network_id: &NetworkId) -> bool {
        self.peer_id().is_some() && self.owner(network_id) == self.peer_id()
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

    /// Binds a handler for `ClientRpc` calls to `method` on one object
    pub fn bind_rpc<F>(&mut self, network_id: NetworkId, method: &str, handler: F) -> Result<(), RpcError>
    where
        F: FnMut(&RpcCall) -> Result<(), String> + 'static,
    {
        self.engine.bind_rpc(network_id, method, Box::new(handler))
    }

    /// Queues a `ServerRpc` for the next flush
    pub fn call_server_rpc(
        &mut self,
        network_id: NetworkId,
        method: &str,
        payload: Vec<u8>,
    ) -> Result<(), RpcError> {
        self.engine
            .queue_rpc(network_id, method, payload, RpcTarget::Peer(PeerId::SERVER))
    }

    pub fn engine(&self) -> &ReplicationEngine {
        &self.engine
    }
}
