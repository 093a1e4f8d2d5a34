//! # Netrep Shared
//! Tick-driven replication & RPC engine shared between netrep-server &
//! netrep-client crates.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use netrep_serde::{
    BitReader, BitWrite, BitWriter, Serde, SerdeErr, UnsignedInteger, UnsignedVariableInteger,
};

mod config;
mod constants;
mod engine;
mod error;
mod events;
mod identifier_pool;
mod observer;
mod protocol;
mod rpc;
mod tick_scheduler;
mod timer;
mod transport;
mod types;
mod wire;
mod world;
mod wrapping_number;

pub use config::{ConfigError, ReplicationConfig, RpcHashWidth};
pub use constants::{
    DECODE_ERROR_FLAG_THRESHOLD, DEFAULT_CONNECTION_BUFFER_TIMEOUT, DEFAULT_ID_RECYCLE_DELAY,
    DEFAULT_MESSAGE_BUFFER_TIMEOUT, DEFAULT_TICK_INTERVAL, DEFAULT_TIME_RESYNC_INTERVAL,
    SCENE_NETWORK_ID_FLAG,
};
pub use engine::{InboundQueue, ReplicationEngine};
pub use error::ReplicationError;
pub use events::{
    ConnectEvent, ConnectionRequestEvent, DespawnEvent, DisconnectEvent, ErrorEvent, Event,
    Events, Expiry, ExpiryEvent, OwnershipChangeEvent, RejectEvent, RpcEvent, SpawnEvent,
    TickEvent,
};
pub use identifier_pool::IdentifierPool;
pub use observer::{ChangeObserver, ObserverList};
pub use protocol::{Prefab, Protocol, ProtocolError, ProtocolPlugin, RpcEndpoint, VariableDef};
pub use rpc::{method_hash, RpcCall, RpcClass, RpcError, RpcMessage, RpcQueue, RpcTarget};
pub use tick_scheduler::{SendBudget, TickScheduler};
pub use timer::Timer;
pub use transport::{Transport, TransportError};
pub use types::{HostType, MethodHash, NetworkId, PeerId, PrefabRef, SceneHandle, Tick, VariableIndex};
pub use wire::{DenyReason, Frame, FrameCodec, MessageType, ReplicatedValue, SpawnFrame, ValueKind};
pub use world::{
    remote::{BufferRefusal, BufferedMessage, MessageBuffer, Resolved},
    scene_network_id, DeltaOutcome, OutgoingDelta, OwnershipTable, PeerRemoval, ReplicatedObject,
    ReplicatedVariable, RpcHandler, ScenePlacement, SpawnError, SpawnManager, SpawnOptions,
    SpawnRecord, SpawnState, VariableError, VariableManager, VariableSettings, WritePermission,
};
pub use wrapping_number::{tick_greater_than, tick_less_than, wrapping_tick_diff};
