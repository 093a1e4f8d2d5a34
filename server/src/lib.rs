//! # Netrep Server
//! The authoritative host of a netrep session. Approves connecting Clients,
//! spawns replicated objects, owns their ownership table and relays
//! Client-authored changes to every other observer.

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

mod error;
mod server;
mod user;

pub use error::ServerError;
pub use netrep_shared::{
    ConnectEvent, ConnectionRequestEvent, DespawnEvent, DisconnectEvent, ErrorEvent, Event,
    Events, Expiry, ExpiryEvent, OwnershipChangeEvent, RpcEvent, SpawnEvent, TickEvent,
};
pub use server::Server;
pub use user::PendingConnection;
