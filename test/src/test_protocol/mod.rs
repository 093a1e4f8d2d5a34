//! Prefabs shared by every end-to-end test

use netrep_shared::{Prefab, Protocol, RpcEndpoint, VariableIndex, VariableSettings};

pub const AVATAR: &str = "avatar";
pub const CRATE: &str = "crate";

// avatar variables
pub const POSITION: VariableIndex = 0;
pub const HEALTH: VariableIndex = 1;
pub const FLAG: VariableIndex = 2;
pub const SPEED: VariableIndex = 3;

/// Number of variables of the crate prefab, all Server-written
pub const CRATE_SLOTS: VariableIndex = 10;

pub fn avatar() -> Prefab {
    Prefab::new(AVATAR)
        .variable("position", [0.0f32; 3], VariableSettings::owner_only())
        .variable("health", 100u32, VariableSettings::server_only())
        .variable("flag", false, VariableSettings::everyone())
        .variable("speed", 0.0f32, VariableSettings::owner_only().unreliable())
        .server_rpc("jump")
        .rpc(RpcEndpoint::server("ping").allow_any_caller())
        .client_rpc("hit")
}

pub fn crate_prefab() -> Prefab {
    let mut prefab = Prefab::new(CRATE).client_rpc("shake");
    for slot in 0..CRATE_SLOTS {
        prefab = prefab.variable(&format!("slot{}", slot), 0u32, VariableSettings::server_only());
    }
    prefab
}

pub fn protocol() -> Protocol {
    let mut protocol = Protocol::builder();
    protocol.add_prefab(avatar());
    protocol.add_prefab(crate_prefab());
    protocol
}
