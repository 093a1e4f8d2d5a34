use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    time::{Duration, Instant},
};

use log::{debug, info};

use crate::{
    config::ReplicationConfig,
    constants::SCENE_NETWORK_ID_FLAG,
    identifier_pool::IdentifierPool,
    protocol::{Prefab, Protocol},
    types::{HostType, NetworkId, PeerId, PrefabRef, SceneHandle},
    wire::SpawnFrame,
    world::{
        error::SpawnError,
        object::{ObjectInit, ReplicatedObject, SpawnState},
        ownership::OwnershipTable,
    },
};

const MAX_SCENE_HANDLE: SceneHandle = (1 << 31) - 1;

/// Derives the network id of a pre-placed scene object. Scene ids carry
/// [`SCENE_NETWORK_ID_FLAG`] and can never collide with pool-issued ids.
pub fn scene_network_id(scene: SceneHandle, placement: u32) -> NetworkId {
    SCENE_NETWORK_ID_FLAG | ((scene as NetworkId) << 32) | placement as NetworkId
}

fn split_scene_network_id(network_id: NetworkId) -> (SceneHandle, u32) {
    let scene = ((network_id & !SCENE_NETWORK_ID_FLAG) >> 32) as SceneHandle;
    let placement = (network_id & 0xffff_ffff) as u32;
    (scene, placement)
}

/// How a runtime object is spawned
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnOptions {
    pub owner: PeerId,
    pub is_player_object: bool,
    pub scene: Option<SceneHandle>,
    pub destroy_with_scene: bool,
    /// Peers allowed to see the object, `None` meaning all of them
    pub scope: Option<Vec<PeerId>>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            owner: PeerId::SERVER,
            is_player_object: false,
            scene: None,
            destroy_with_scene: false,
            scope: None,
        }
    }
}

impl SpawnOptions {
    pub fn owned_by(mut self, owner: PeerId) -> Self {
        self.owner = owner;
        self
    }

    /// Marks the object as its owner's player object, despawned when the
    /// owner disconnects
    pub fn player_object(mut self) -> Self {
        self.is_player_object = true;
        self
    }

    pub fn in_scene(mut self, scene: SceneHandle, destroy_with_scene: bool) -> Self {
        self.scene = Some(scene);
        self.destroy_with_scene = destroy_with_scene;
        self
    }

    pub fn visible_to<I: IntoIterator<Item = PeerId>>(mut self, peers: I) -> Self {
        self.scope = Some(peers.into_iter().collect());
        self
    }
}

/// One pre-placed object of a scene definition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScenePlacement {
    pub prefab: PrefabRef,
    pub destroy_with_scene: bool,
}

struct SceneEntry {
    scene: SceneHandle,
    prefab: PrefabRef,
    destroy_with_scene: bool,
    claimed: bool,
}

/// A create/destroy intent waiting for the spawn/despawn step of a tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpawnRecord {
    Spawn {
        network_id: NetworkId,
        /// `None` sends to every connected peer in the object's scope
        recipients: Option<Vec<PeerId>>,
    },
    Despawn {
        network_id: NetworkId,
        recipients: Vec<PeerId>,
    },
    OwnershipChange {
        network_id: NetworkId,
    },
}

impl SpawnRecord {
    pub fn network_id(&self) -> NetworkId {
        match self {
            SpawnRecord::Spawn { network_id, .. }
            | SpawnRecord::Despawn { network_id, .. }
            | SpawnRecord::OwnershipChange { network_id } => *network_id,
        }
    }
}

/// What happened to a disconnected Client's objects
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerRemoval {
    pub despawned: Vec<NetworkId>,
    pub returned_to_server: Vec<NetworkId>,
}

/// Owns every live object, the ownership table and the id pool
pub struct SpawnManager {
    host_type: HostType,
    objects: BTreeMap<NetworkId, ReplicatedObject>,
    ownership: OwnershipTable,
    pool: IdentifierPool,
    scenes: BTreeMap<NetworkId, SceneEntry>,
    pending: VecDeque<SpawnRecord>,
    tombstones: HashMap<NetworkId, Instant>,
    tombstone_ttl: Duration,
}

impl SpawnManager {
    pub fn new(host_type: HostType, config: &ReplicationConfig) -> Self {
        Self {
            host_type,
            objects: BTreeMap::new(),
            ownership: OwnershipTable::new(),
            pool: IdentifierPool::new(
                config.network_id_range.clone(),
                config.recycle_network_ids,
                config.id_recycle_delay,
            ),
            scenes: BTreeMap::new(),
            pending: VecDeque::new(),
            tombstones: HashMap::new(),
            tombstone_ttl: config.id_recycle_delay,
        }
    }

    // Queries

    pub fn object(&self, network_id: &NetworkId) -> Option<&ReplicatedObject> {
        self.objects.get(network_id)
    }

    pub(crate) fn object_mut(&mut self, network_id: &NetworkId) -> Option<&mut ReplicatedObject> {
        self.objects.get_mut(network_id)
    }

    pub fn contains(&self, network_id: &NetworkId) -> bool {
        self.objects.contains_key(network_id)
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.objects.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ownership(&self) -> &OwnershipTable {
        &self.ownership
    }

    pub fn owner(&self, network_id: &NetworkId) -> Option<PeerId> {
        self.ownership.owner(network_id)
    }

    /// Live objects alongside the ownership table, for scans that mutate
    /// variables while checking permissions
    pub(crate) fn split_mut(
        &mut self,
    ) -> (&mut BTreeMap<NetworkId, ReplicatedObject>, &OwnershipTable) {
        (&mut self.objects, &self.ownership)
    }

    pub fn is_tombstoned(&self, network_id: &NetworkId) -> bool {
        self.tombstones.contains_key(network_id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // Authoritative operations

    fn require_authority(&self, operation: &'static str) -> Result<(), SpawnError> {
        match self.host_type {
            HostType::Server => Ok(()),
            HostType::Client => Err(SpawnError::NotAuthoritative {
                peer: PeerId::SERVER,
                operation,
            }),
        }
    }

    /// Spawns a runtime object. It is live locally at once, its spawn frame
    /// goes out during the next tick's spawn step.
    pub fn spawn(
        &mut self,
        protocol: &Protocol,
        prefab: PrefabRef,
        options: SpawnOptions,
        now: Instant,
    ) -> Result<NetworkId, SpawnError> {
        self.require_authority("spawn")?;
        let prefab_def = protocol
            .prefab(&prefab)
            .ok_or(SpawnError::PrefabNotFound {
                index: prefab.index(),
            })?;
        let network_id = self.pool.generate(now)?;

        let init = ObjectInit {
            network_id,
            prefab,
            is_player_object: options.is_player_object,
            is_scene_object: false,
            destroy_with_scene: options.destroy_with_scene,
            scene: options.scene,
            scope: options
                .scope
                .map(|peers| peers.into_iter().collect::<HashSet<_>>()),
        };
        self.insert_local(init, prefab_def, options.owner)?;
        info!("spawned object {} owned by {:?}", network_id, options.owner);
        Ok(network_id)
    }

    fn insert_local(
        &mut self,
        init: ObjectInit,
        prefab: &Prefab,
        owner: PeerId,
    ) -> Result<(), SpawnError> {
        let network_id = init.network_id;
        if self.objects.contains_key(&network_id) {
            return Err(SpawnError::DuplicateNetworkId { network_id });
        }
        let mut object = ReplicatedObject::new(init, prefab);
        object.transition(SpawnState::Spawned)?;

        self.tombstones.remove(&network_id);
        self.ownership.set_owner(network_id, owner);
        self.objects.insert(network_id, object);
        self.pending.push_back(SpawnRecord::Spawn {
            network_id,
            recipients: None,
        });
        Ok(())
    }

    /// Registers the pre-placed objects of a scene. Every peer registers the
    /// same scenes; only the Server claims them.
    pub fn register_scene(
        &mut self,
        scene: SceneHandle,
        placements: &[ScenePlacement],
    ) -> Result<Vec<NetworkId>, SpawnError> {
        if scene > MAX_SCENE_HANDLE {
            return Err(SpawnError::SceneHandleOutOfRange { scene });
        }

        let mut output = Vec::with_capacity(placements.len());
        for (index, placement) in placements.iter().enumerate() {
            let network_id = scene_network_id(scene, index as u32);
            let claimed = self.objects.contains_key(&network_id);
            self.scenes.insert(
                network_id,
                SceneEntry {
                    scene,
                    prefab: placement.prefab,
                    destroy_with_scene: placement.destroy_with_scene,
                    claimed,
                },
            );
            output.push(network_id);
        }
        debug!("registered {} objects of scene {}", output.len(), scene);
        Ok(output)
    }

    /// Brings a registered scene object to life under Server ownership
    pub fn claim_scene_object(
        &mut self,
        protocol: &Protocol,
        scene: SceneHandle,
        placement: u32,
    ) -> Result<NetworkId, SpawnError> {
        self.require_authority("claim scene objects")?;
        let network_id = scene_network_id(scene, placement);
        let Some(entry) = self.scenes.get(&network_id) else {
            return Err(SpawnError::SceneObjectNotRegistered { scene, placement });
        };
        if entry.claimed {
            return Err(SpawnError::SceneObjectAlreadyClaimed { network_id });
        }
        let prefab = entry.prefab;
        let prefab_def = protocol.prefab(&prefab).ok_or(SpawnError::PrefabNotFound {
            index: prefab.index(),
        })?;

        let init = ObjectInit {
            network_id,
            prefab,
            is_player_object: false,
            is_scene_object: true,
            destroy_with_scene: entry.destroy_with_scene,
            scene: Some(scene),
            scope: None,
        };
        self.insert_local(init, prefab_def, PeerId::SERVER)?;
        if let Some(entry) = self.scenes.get_mut(&network_id) {
            entry.claimed = true;
        }
        info!("claimed scene object {} of scene {}", network_id, scene);
        Ok(network_id)
    }

    /// Removes an object at once. Its id goes back to the pool and peers
    /// which were sent its spawn get a despawn frame. A despawn before the
    /// spawn frame went out cancels both. The id stays tombstoned so that
    /// Client messages sent before they learnt of the despawn are ignored.
    pub fn despawn(&mut self, network_id: NetworkId, now: Instant) -> Result<(), SpawnError> {
        self.require_authority("despawn")?;
        let mut object = self
            .objects
            .remove(&network_id)
            .ok_or(SpawnError::ObjectNotFound { network_id })?;
        object.transition(SpawnState::Despawned)?;

        self.ownership.remove(&network_id);
        self.pool.release(network_id, now);
        self.tombstones.insert(network_id, now);
        // a despawn still queued for an earlier holder of this id must go out
        self.pending.retain(|record| match record {
            SpawnRecord::Despawn { .. } => true,
            _ => record.network_id() != network_id,
        });

        if object.observers().is_empty() {
            debug!("object {} despawned before its spawn went out", network_id);
        } else {
            self.pending.push_back(SpawnRecord::Despawn {
                network_id,
                recipients: object.observers().iter().copied().collect(),
            });
        }
        info!("despawned object {}", network_id);
        Ok(())
    }

    /// Hands an object to `owner`, returning the previous owner
    pub fn change_ownership(
        &mut self,
        network_id: NetworkId,
        owner: PeerId,
    ) -> Result<PeerId, SpawnError> {
        self.require_authority("change ownership")?;
        if !self.objects.contains_key(&network_id) {
            return Err(SpawnError::ObjectNotFound { network_id });
        }
        let previous = self
            .ownership
            .set_owner(network_id, owner)
            .unwrap_or(PeerId::SERVER);
        if previous != owner {
            self.pending
                .push_back(SpawnRecord::OwnershipChange { network_id });
            info!(
                "object {} changed owner from {:?} to {:?}",
                network_id, previous, owner
            );
        }
        Ok(previous)
    }

    pub fn remove_ownership(&mut self, network_id: NetworkId) -> Result<PeerId, SpawnError> {
        self.change_ownership(network_id, PeerId::SERVER)
    }

    /// Forgets a scene. On the Server every live object of the scene marked
    /// `destroy_with_scene` is despawned; Clients learn of those through
    /// despawn frames.
    pub fn unload_scene(
        &mut self,
        scene: SceneHandle,
        now: Instant,
    ) -> Result<Vec<NetworkId>, SpawnError> {
        let mut despawned = Vec::new();
        if self.host_type == HostType::Server {
            despawned = self
                .objects
                .values()
                .filter(|object| object.scene() == Some(scene) && object.destroy_with_scene())
                .map(|object| object.network_id())
                .collect();
            for network_id in &despawned {
                self.despawn(*network_id, now)?;
            }
        }
        self.scenes.retain(|_, entry| entry.scene != scene);
        Ok(despawned)
    }

    /// Queues the spawn of every object `peer` may see, for a newly
    /// approved Client
    pub fn queue_late_join(&mut self, peer: PeerId) {
        for (network_id, object) in self.objects.iter() {
            if object.in_scope(&peer) {
                self.pending.push_back(SpawnRecord::Spawn {
                    network_id: *network_id,
                    recipients: Some(vec![peer]),
                });
            }
        }
    }

    /// Detaches a disconnected peer. Its player objects are despawned, every
    /// other object it owned returns to the Server.
    pub fn remove_peer(&mut self, peer: &PeerId, now: Instant) -> Result<PeerRemoval, SpawnError> {
        for object in self.objects.values_mut() {
            object.remove_observer(peer);
        }

        let mut removal = PeerRemoval::default();
        if self.host_type != HostType::Server {
            return Ok(removal);
        }
        for network_id in self.ownership.owned_by(peer) {
            let is_player_object = self
                .objects
                .get(&network_id)
                .map(|object| object.is_player_object())
                .unwrap_or(false);
            if is_player_object {
                self.despawn(network_id, now)?;
                removal.despawned.push(network_id);
            } else {
                self.remove_ownership(network_id)?;
                removal.returned_to_server.push(network_id);
            }
        }
        Ok(removal)
    }

    pub(crate) fn next_pending(&mut self) -> Option<SpawnRecord> {
        self.pending.pop_front()
    }

    pub(crate) fn defer_pending(&mut self, record: SpawnRecord) {
        self.pending.push_front(record);
    }

    pub fn spawn_frame(&self, network_id: &NetworkId) -> Option<SpawnFrame> {
        let object = self.objects.get(network_id)?;
        Some(SpawnFrame {
            network_id: *network_id,
            owner: self.ownership.owner(network_id)?,
            prefab: object.prefab(),
            is_player_object: object.is_player_object(),
            is_scene_object: object.is_scene_object(),
            destroy_with_scene: object.destroy_with_scene(),
            scene: object.scene(),
            values: object.values(),
        })
    }

    pub(crate) fn mark_observed(&mut self, network_id: &NetworkId, peer: PeerId) {
        if let Some(object) = self.objects.get_mut(network_id) {
            object.add_observer(peer);
        }
    }

    // Receiving side

    /// Materializes an object from a received spawn frame
    pub fn apply_spawn(&mut self, protocol: &Protocol, frame: SpawnFrame) -> Result<(), SpawnError> {
        let network_id = frame.network_id;
        if self.objects.contains_key(&network_id) {
            return Err(SpawnError::DuplicateNetworkId { network_id });
        }
        let prefab_def = protocol
            .prefab(&frame.prefab)
            .ok_or(SpawnError::PrefabNotFound {
                index: frame.prefab.index(),
            })?;

        if frame.is_scene_object {
            let (scene, placement) = split_scene_network_id(network_id);
            let Some(entry) = self.scenes.get(&network_id) else {
                return Err(SpawnError::SceneObjectNotRegistered { scene, placement });
            };
            if entry.claimed {
                return Err(SpawnError::SceneObjectAlreadyClaimed { network_id });
            }
        }

        let init = ObjectInit {
            network_id,
            prefab: frame.prefab,
            is_player_object: frame.is_player_object,
            is_scene_object: frame.is_scene_object,
            destroy_with_scene: frame.destroy_with_scene,
            scene: frame.scene,
            scope: None,
        };
        let mut object = ReplicatedObject::from_values(init, prefab_def, frame.values)?;
        object.transition(SpawnState::Spawned)?;

        if let Some(entry) = self.scenes.get_mut(&network_id) {
            entry.claimed = true;
        }
        self.tombstones.remove(&network_id);
        self.ownership.set_owner(network_id, frame.owner);
        self.objects.insert(network_id, object);
        debug!("object {} spawned by remote", network_id);
        Ok(())
    }

    /// Removes an object on a received despawn, leaving a tombstone so that
    /// late messages addressed to it are ignored
    pub fn apply_despawn(&mut self, network_id: NetworkId, now: Instant) -> Result<(), SpawnError> {
        let mut object = self
            .objects
            .remove(&network_id)
            .ok_or(SpawnError::ObjectNotFound { network_id })?;
        object.transition(SpawnState::Despawned)?;
        self.ownership.remove(&network_id);
        self.tombstones.insert(network_id, now);
        debug!("object {} despawned by remote", network_id);
        Ok(())
    }

    pub fn apply_ownership_change(
        &mut self,
        network_id: NetworkId,
        owner: PeerId,
    ) -> Result<PeerId, SpawnError> {
        if !self.objects.contains_key(&network_id) {
            return Err(SpawnError::ObjectNotFound { network_id });
        }
        Ok(self
            .ownership
            .set_owner(network_id, owner)
            .unwrap_or(PeerId::SERVER))
    }

    pub fn sweep_tombstones(&mut self, now: Instant) {
        let ttl = self.tombstone_ttl;
        self.tombstones
            .retain(|_, despawned_at| now.saturating_duration_since(*despawned_at) < ttl);
    }
}
