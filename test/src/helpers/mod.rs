//! A Server and any number of Clients wired together through one
//! [`LocalTransportHub`], advanced in lockstep on a simulated clock.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use log::debug;

use netrep_client::{Client, ClientConfig};
use netrep_server::Server;
use netrep_shared::{
    Events, NetworkId, PeerId, Protocol, ReplicatedValue, ReplicationConfig, SpawnOptions,
    VariableIndex,
};

use crate::{local_transport::LocalTransportHub, test_protocol::protocol};

/// Everything each peer reported during one step
pub struct StepEvents {
    pub server: Events,
    pub clients: BTreeMap<PeerId, Events>,
}

impl StepEvents {
    pub fn client(&mut self, peer: PeerId) -> &mut Events {
        self.clients.entry(peer).or_default()
    }
}

pub struct TestSession {
    hub: LocalTransportHub,
    config: ReplicationConfig,
    server: Server,
    clients: BTreeMap<PeerId, Client>,
    next_peer: u64,
    now: Instant,
}

impl TestSession {
    pub fn new(config: ReplicationConfig) -> Self {
        Self::with_hub(config, LocalTransportHub::new())
    }

    pub fn with_hub(config: ReplicationConfig, hub: LocalTransportHub) -> Self {
        let server = Server::new(
            config.clone(),
            protocol(),
            Box::new(hub.transport(PeerId::SERVER)),
        )
        .expect("test config is valid");
        Self {
            hub,
            config,
            server,
            clients: BTreeMap::new(),
            next_peer: 1,
            now: Instant::now(),
        }
    }

    pub fn hub(&self) -> &LocalTransportHub {
        &self.hub
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    pub fn client(&self, peer: PeerId) -> &Client {
        self.clients.get(&peer).expect("no such client")
    }

    pub fn client_mut(&mut self, peer: PeerId) -> &mut Client {
        self.clients.get_mut(&peer).expect("no such client")
    }

    pub fn client_ids(&self) -> Vec<PeerId> {
        self.clients.keys().copied().collect()
    }

    /// Opens a link for a new Client, which immediately sends its connection
    /// request. Nothing is delivered until the next step.
    pub fn add_client(&mut self, payload: Vec<u8>) -> PeerId {
        let config = ClientConfig {
            replication: self.config.clone(),
            connection_payload: payload,
        };
        self.add_client_with(config, protocol())
    }

    /// Like `add_client`, for a Client whose config or Protocol differs from
    /// the Server's
    pub fn add_client_with(&mut self, config: ClientConfig, protocol: Protocol) -> PeerId {
        let peer = PeerId::new(self.next_peer);
        self.next_peer += 1;
        self.hub.open(PeerId::SERVER, peer);

        let mut client = Client::new(config, protocol, Box::new(self.hub.transport(peer)))
            .expect("test config is valid");
        self.server.peer_connected(peer, self.now);
        client.server_connected();
        self.clients.insert(peer, client);
        peer
    }

    /// Adds a Client and steps until the Server has approved it
    pub fn connect_client(&mut self) -> PeerId {
        let peer = self.add_client(Vec::new());
        for _ in 0..8 {
            self.step();
            if self.client(peer).is_connected() {
                return peer;
            }
        }
        panic!("{:?} never connected", peer);
    }

    /// Drops a Client's link, as if its process went away
    pub fn disconnect_client(&mut self, peer: PeerId) -> Option<Client> {
        self.hub.close(PeerId::SERVER, peer);
        self.server.peer_disconnected(peer, self.now);
        let mut client = self.clients.remove(&peer)?;
        client.server_disconnected(self.now);
        Some(client)
    }

    /// Advances the clock by one tick interval. Frames sent to the Server are
    /// delivered first, then the Server advances, then every Client receives
    /// what is due and advances.
    pub fn step(&mut self) -> StepEvents {
        self.advance_by(self.config.tick_interval)
    }

    pub fn advance_by(&mut self, elapsed: Duration) -> StepEvents {
        self.now += elapsed;
        self.hub.next_round();

        for (from, bytes) in self.hub.deliver(PeerId::SERVER) {
            self.server.receive(from, bytes);
        }
        let server = self.server.advance(self.now);

        let mut clients = BTreeMap::new();
        for (peer, client) in self.clients.iter_mut() {
            for (_, bytes) in self.hub.deliver(*peer) {
                client.receive(bytes);
            }
            clients.insert(*peer, client.advance(self.now));
        }

        for (initiator, peer) in self.hub.take_disconnects() {
            if !initiator.is_server() {
                continue;
            }
            debug!("server closed the link to {:?}", peer);
            if let Some(client) = self.clients.get_mut(&peer) {
                client.server_disconnected(self.now);
            }
        }

        StepEvents { server, clients }
    }

    /// Steps `count` times, keeping every step's events
    pub fn run(&mut self, count: usize) -> Vec<StepEvents> {
        (0..count).map(|_| self.step()).collect()
    }

    /// Steps until no frame is in flight, at least `min_steps` times
    pub fn settle(&mut self, min_steps: usize) {
        self.run(min_steps);
        for _ in 0..64 {
            if self.hub.in_flight() == 0 {
                return;
            }
            self.step();
        }
        panic!("frames still in flight after 64 steps");
    }

    pub fn spawn(&mut self, prefab: &str, options: SpawnOptions) -> NetworkId {
        let prefab = self.server.prefab(prefab).expect("prefab is registered");
        self.server
            .spawn(prefab, options, self.now)
            .expect("spawn succeeds")
    }

    pub fn despawn(&mut self, network_id: NetworkId) {
        self.server
            .despawn(network_id, self.now)
            .expect("despawn succeeds");
    }

    /// The value every peer currently holds for one variable, Server first
    pub fn values(&self, network_id: NetworkId, index: VariableIndex) -> Vec<Option<ReplicatedValue>> {
        let mut values = vec![self.server.variable(&network_id, index).cloned()];
        for client in self.clients.values() {
            values.push(client.variable(&network_id, index).cloned());
        }
        values
    }
}
