mod error;
mod object;
mod ownership;
mod spawn_manager;
mod variable;
mod variable_manager;

pub mod remote;

pub use error::{SpawnError, VariableError};
pub use object::{ReplicatedObject, RpcHandler, SpawnState};
pub use ownership::{OwnershipTable, VariableSettings, WritePermission};
pub use spawn_manager::{
    scene_network_id, PeerRemoval, ScenePlacement, SpawnManager, SpawnOptions, SpawnRecord,
};
pub use variable::ReplicatedVariable;
pub use variable_manager::{DeltaOutcome, OutgoingDelta, VariableManager};
