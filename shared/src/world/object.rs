use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    protocol::Prefab,
    rpc::RpcCall,
    types::{MethodHash, NetworkId, PeerId, PrefabRef, SceneHandle, VariableIndex},
    wire::ReplicatedValue,
    world::{error::SpawnError, variable::ReplicatedVariable},
};

/// Handler bound to one method of one object. An `Err` is reported as an
/// error event without affecting the rest of the batch.
pub type RpcHandler = Box<dyn FnMut(&RpcCall) -> Result<(), String>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpawnState {
    Unspawned,
    Spawned,
    /// Terminal
    Despawned,
}

/// A live replicated object. Owned by the [`SpawnManager`](super::SpawnManager),
/// everything else refers to it by `network_id`.
pub struct ReplicatedObject {
    network_id: NetworkId,
    prefab: PrefabRef,
    is_player_object: bool,
    is_scene_object: bool,
    destroy_with_scene: bool,
    scene: Option<SceneHandle>,
    state: SpawnState,
    variables: Vec<ReplicatedVariable>,
    handlers: HashMap<MethodHash, RpcHandler>,
    /// Peers allowed to see the object, `None` meaning every peer
    scope: Option<HashSet<PeerId>>,
    /// Peers which have been sent the spawn frame
    observers: BTreeSet<PeerId>,
}

pub(crate) struct ObjectInit {
    pub network_id: NetworkId,
    pub prefab: PrefabRef,
    pub is_player_object: bool,
    pub is_scene_object: bool,
    pub destroy_with_scene: bool,
    pub scene: Option<SceneHandle>,
    pub scope: Option<HashSet<PeerId>>,
}

impl ReplicatedObject {
    pub(crate) fn new(init: ObjectInit, prefab: &Prefab) -> Self {
        let variables = prefab
            .variables()
            .iter()
            .map(|def| ReplicatedVariable::new(def.initial.clone(), def.settings))
            .collect();
        Self::with_variables(init, variables)
    }

    /// Builds an object from received values, which must line up with the
    /// prefab's variables one to one
    pub(crate) fn from_values(
        init: ObjectInit,
        prefab: &Prefab,
        values: Vec<ReplicatedValue>,
    ) -> Result<Self, SpawnError> {
        let defs = prefab.variables();
        if defs.len() != values.len()
            || defs
                .iter()
                .zip(values.iter())
                .any(|(def, value)| def.initial.kind() != value.kind())
        {
            return Err(SpawnError::SpawnValueMismatch {
                network_id: init.network_id,
            });
        }
        let variables = defs
            .iter()
            .zip(values)
            .map(|(def, value)| ReplicatedVariable::new(value, def.settings))
            .collect();
        Ok(Self::with_variables(init, variables))
    }

    fn with_variables(init: ObjectInit, variables: Vec<ReplicatedVariable>) -> Self {
        Self {
            network_id: init.network_id,
            prefab: init.prefab,
            is_player_object: init.is_player_object,
            is_scene_object: init.is_scene_object,
            destroy_with_scene: init.destroy_with_scene,
            scene: init.scene,
            state: SpawnState::Unspawned,
            variables,
            handlers: HashMap::new(),
            scope: init.scope,
            observers: BTreeSet::new(),
        }
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn prefab(&self) -> PrefabRef {
        self.prefab
    }

    pub fn is_player_object(&self) -> bool {
        self.is_player_object
    }

    pub fn is_scene_object(&self) -> bool {
        self.is_scene_object
    }

    pub fn destroy_with_scene(&self) -> bool {
        self.destroy_with_scene
    }

    pub fn scene(&self) -> Option<SceneHandle> {
        self.scene
    }

    pub fn state(&self) -> SpawnState {
        self.state
    }

    pub(crate) fn transition(&mut self, to: SpawnState) -> Result<(), SpawnError> {
        let valid = matches!(
            (self.state, to),
            (SpawnState::Unspawned, SpawnState::Spawned)
                | (SpawnState::Spawned, SpawnState::Despawned)
                | (SpawnState::Unspawned, SpawnState::Despawned)
        );
        if !valid {
            return Err(SpawnError::InvalidStateTransition {
                network_id: self.network_id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn variables(&self) -> &[ReplicatedVariable] {
        &self.variables
    }

    pub fn variable(&self, index: VariableIndex) -> Option<&ReplicatedVariable> {
        self.variables.get(index as usize)
    }

    pub(crate) fn variable_mut(&mut self, index: VariableIndex) -> Option<&mut ReplicatedVariable> {
        self.variables.get_mut(index as usize)
    }

    pub(crate) fn variables_mut(&mut self) -> &mut [ReplicatedVariable] {
        &mut self.variables
    }

    pub fn values(&self) -> Vec<ReplicatedValue> {
        self.variables
            .iter()
            .map(|variable| variable.value().clone())
            .collect()
    }

    pub(crate) fn bind_handler(&mut self, method_hash: MethodHash, handler: RpcHandler) {
        self.handlers.insert(method_hash, handler);
    }

    pub(crate) fn handler_mut(&mut self, method_hash: &MethodHash) -> Option<&mut RpcHandler> {
        self.handlers.get_mut(method_hash)
    }

    pub fn in_scope(&self, peer: &PeerId) -> bool {
        match &self.scope {
            None => true,
            Some(scope) => scope.contains(peer),
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope.is_none()
    }

    pub fn observers(&self) -> &BTreeSet<PeerId> {
        &self.observers
    }

    pub fn is_observed_by(&self, peer: &PeerId) -> bool {
        self.observers.contains(peer)
    }

    pub(crate) fn add_observer(&mut self, peer: PeerId) {
        self.observers.insert(peer);
    }

    pub(crate) fn remove_observer(&mut self, peer: &PeerId) {
        self.observers.remove(peer);
    }
}
