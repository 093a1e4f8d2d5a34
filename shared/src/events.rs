use std::{mem, vec::IntoIter};

use crate::{
    error::ReplicationError,
    rpc::RpcCall,
    types::{NetworkId, PeerId, Tick},
};

/// Something that timed out instead of completing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expiry {
    /// A message buffered for an object that never spawned in time
    BufferedMessage { network_id: NetworkId },
    /// A connected Client that was not approved in time
    PendingConnection { peer: PeerId },
}

/// Everything that happened during one `advance` call. Read by type, e.g.
/// `events.read::<SpawnEvent>()`.
pub struct Events {
    connections: Vec<PeerId>,
    disconnections: Vec<PeerId>,
    connection_requests: Vec<(PeerId, Vec<u8>)>,
    rejections: Vec<PeerId>,
    spawns: Vec<NetworkId>,
    despawns: Vec<NetworkId>,
    ownership_changes: Vec<(NetworkId, PeerId)>,
    rpcs: Vec<RpcCall>,
    errors: Vec<ReplicationError>,
    expiries: Vec<Expiry>,
    ticks: Vec<Tick>,
    empty: bool,
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

impl Events {
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
            disconnections: Vec::new(),
            connection_requests: Vec::new(),
            rejections: Vec::new(),
            spawns: Vec::new(),
            despawns: Vec::new(),
            ownership_changes: Vec::new(),
            rpcs: Vec::new(),
            errors: Vec::new(),
            expiries: Vec::new(),
            ticks: Vec::new(),
            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: Event>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: Event>(&self) -> bool {
        V::has(self)
    }

    // Push

    pub fn push_connection(&mut self, peer: PeerId) {
        self.connections.push(peer);
        self.empty = false;
    }

    pub fn push_disconnection(&mut self, peer: PeerId) {
        self.disconnections.push(peer);
        self.empty = false;
    }

    pub fn push_connection_request(&mut self, peer: PeerId, payload: Vec<u8>) {
        self.connection_requests.push((peer, payload));
        self.empty = false;
    }

    pub fn push_rejection(&mut self, peer: PeerId) {
        self.rejections.push(peer);
        self.empty = false;
    }

    pub fn push_spawn(&mut self, network_id: NetworkId) {
        self.spawns.push(network_id);
        self.empty = false;
    }

    pub fn push_despawn(&mut self, network_id: NetworkId) {
        self.despawns.push(network_id);
        self.empty = false;
    }

    pub fn push_ownership_change(&mut self, network_id: NetworkId, owner: PeerId) {
        self.ownership_changes.push((network_id, owner));
        self.empty = false;
    }

    pub fn push_rpc(&mut self, call: RpcCall) {
        self.rpcs.push(call);
        self.empty = false;
    }

    pub fn push_error<E: Into<ReplicationError>>(&mut self, error: E) {
        self.errors.push(error.into());
        self.empty = false;
    }

    pub fn push_expiry(&mut self, expiry: Expiry) {
        self.expiries.push(expiry);
        self.empty = false;
    }

    pub fn push_tick(&mut self, tick: Tick) {
        self.ticks.push(tick);
        self.empty = false;
    }
}

// Event Trait
pub trait Event {
    type Iter;

    fn iter(events: &mut Events) -> Self::Iter;

    fn has(events: &Events) -> bool;
}

macro_rules! impl_event {
    ($event:ident, $field:ident, $item:ty) => {
        impl Event for $event {
            type Iter = IntoIter<$item>;

            fn iter(events: &mut Events) -> Self::Iter {
                let list = mem::take(&mut events.$field);
                IntoIterator::into_iter(list)
            }

            fn has(events: &Events) -> bool {
                !events.$field.is_empty()
            }
        }
    };
}

/// A Client's connection was approved. On the Client side the peer id is
/// the one the Server assigned to it.
pub struct ConnectEvent;
impl_event!(ConnectEvent, connections, PeerId);

pub struct DisconnectEvent;
impl_event!(DisconnectEvent, disconnections, PeerId);

/// A Client asks to connect, with the payload it sent. Only raised when the
/// Server requires connection approval.
pub struct ConnectionRequestEvent;
impl_event!(ConnectionRequestEvent, connection_requests, (PeerId, Vec<u8>));

/// The Server denied this Client's connection
pub struct RejectEvent;
impl_event!(RejectEvent, rejections, PeerId);

pub struct SpawnEvent;
impl_event!(SpawnEvent, spawns, NetworkId);

pub struct DespawnEvent;
impl_event!(DespawnEvent, despawns, NetworkId);

/// Object id and its new owner
pub struct OwnershipChangeEvent;
impl_event!(OwnershipChangeEvent, ownership_changes, (NetworkId, PeerId));

pub struct RpcEvent;
impl_event!(RpcEvent, rpcs, RpcCall);

pub struct ErrorEvent;
impl_event!(ErrorEvent, errors, ReplicationError);

pub struct ExpiryEvent;
impl_event!(ExpiryEvent, expiries, Expiry);

pub struct TickEvent;
impl_event!(TickEvent, ticks, Tick);
