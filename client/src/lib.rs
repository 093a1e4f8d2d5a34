//! # Netrep Client
//! A Client of a netrep session. Performs the connection handshake, mirrors
//! the objects the Server replicates to it, writes the variables it owns and
//! calls `ServerRpc`s.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use netrep_shared::{
        scene_network_id, BitReader, BitWrite, BitWriter, ReplicatedValue, Serde, SerdeErr,
        UnsignedInteger, UnsignedVariableInteger, ValueKind,
    };
}

mod client;
mod client_config;
mod connection_state;

pub use client::Client;
pub use client_config::ClientConfig;
pub use connection_state::ConnectionState;
pub use netrep_shared::{
    ConnectEvent, DespawnEvent, DisconnectEvent, ErrorEvent, Event, Events, Expiry, ExpiryEvent,
    OwnershipChangeEvent, RejectEvent, RpcEvent, SpawnEvent, TickEvent,
};
