use std::collections::HashMap;

use crate::{
    config::RpcHashWidth,
    rpc::{method_hash, Fnv1a, RpcClass},
    types::{MethodHash, PrefabRef, VariableIndex},
    wire::ReplicatedValue,
    world::{VariableSettings, WritePermission},
};

pub mod error;
pub use error::ProtocolError;

// Protocol Plugin
pub trait ProtocolPlugin {
    fn build(&self, protocol: &mut Protocol);
}

/// Declaration of one replicated variable of a prefab
#[derive(Clone, Debug)]
pub struct VariableDef {
    pub name: String,
    pub initial: ReplicatedValue,
    pub settings: VariableSettings,
}

/// Declaration of one remotely callable method of a prefab
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub name: String,
    pub class: RpcClass,
    /// For `ServerRpc`s, whether only the object's owner may call it
    pub require_ownership: bool,
}

impl RpcEndpoint {
    pub fn server(name: &str) -> Self {
        Self {
            name: name.to_string(),
            class: RpcClass::ServerRpc,
            require_ownership: true,
        }
    }

    pub fn client(name: &str) -> Self {
        Self {
            name: name.to_string(),
            class: RpcClass::ClientRpc,
            require_ownership: false,
        }
    }

    /// Lets any Client call this `ServerRpc`, owner or not
    pub fn allow_any_caller(mut self) -> Self {
        self.require_ownership = false;
        self
    }
}

/// The shape shared by every object spawned from it: an ordered variable
/// list and the methods it exposes
#[derive(Clone, Debug)]
pub struct Prefab {
    name: String,
    variables: Vec<VariableDef>,
    endpoints: Vec<RpcEndpoint>,
}

impl Prefab {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            variables: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn variable<V: Into<ReplicatedValue>>(
        mut self,
        name: &str,
        initial: V,
        settings: VariableSettings,
    ) -> Self {
        self.variables.push(VariableDef {
            name: name.to_string(),
            initial: initial.into(),
            settings,
        });
        self
    }

    pub fn rpc(mut self, endpoint: RpcEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn server_rpc(self, name: &str) -> Self {
        self.rpc(RpcEndpoint::server(name))
    }

    pub fn client_rpc(self, name: &str) -> Self {
        self.rpc(RpcEndpoint::client(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn variable_index(&self, name: &str) -> Option<VariableIndex> {
        self.variables
            .iter()
            .position(|variable| variable.name == name)
            .and_then(|index| VariableIndex::try_from(index).ok())
    }

    pub fn endpoints(&self) -> &[RpcEndpoint] {
        &self.endpoints
    }
}

// Protocol
pub struct Protocol {
    prefabs: Vec<Prefab>,
    method_tables: Vec<HashMap<MethodHash, usize>>,
    hash_width: RpcHashWidth,
    fingerprint: u64,
    locked: bool,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            prefabs: Vec::new(),
            method_tables: Vec::new(),
            hash_width: RpcHashWidth::FourBytes,
            fingerprint: 0,
            locked: false,
        }
    }
}

impl Protocol {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn add_plugin<P: ProtocolPlugin>(&mut self, plugin: P) -> &mut Self {
        self.check_lock();
        plugin.build(self);
        self
    }

    /// Registers a prefab and returns the handle used to spawn it
    ///
    /// # Panics
    ///
    /// Panics if the Protocol is locked or the prefab name is taken. Use
    /// `try_add_prefab` for a fallible version.
    pub fn add_prefab(&mut self, prefab: Prefab) -> PrefabRef {
        match self.try_add_prefab(prefab) {
            Ok(prefab_ref) => prefab_ref,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_add_prefab(&mut self, prefab: Prefab) -> Result<PrefabRef, ProtocolError> {
        self.try_check_lock()?;
        if self.prefab_ref(prefab.name()).is_some() {
            return Err(ProtocolError::DuplicatePrefab {
                name: prefab.name.clone(),
            });
        }
        if prefab.variables.len() > VariableIndex::MAX as usize {
            return Err(ProtocolError::TooManyVariables {
                prefab: prefab.name.clone(),
                max: VariableIndex::MAX as usize,
            });
        }
        let index = u16::try_from(self.prefabs.len()).map_err(|_| ProtocolError::TooManyPrefabs {
            max: u16::MAX as usize,
        })?;
        self.prefabs.push(prefab);
        Ok(PrefabRef::new(index))
    }

    /// Freezes the Protocol and computes method hashes at `hash_width`.
    /// Fails if two methods of one prefab collide at that width.
    pub fn lock(&mut self, hash_width: RpcHashWidth) -> Result<(), ProtocolError> {
        self.try_check_lock()?;

        let mut method_tables = Vec::with_capacity(self.prefabs.len());
        for prefab in &self.prefabs {
            let mut table: HashMap<MethodHash, usize> = HashMap::new();
            for (index, endpoint) in prefab.endpoints.iter().enumerate() {
                let hash = method_hash(&endpoint.name, hash_width);
                if let Some(existing) = table.insert(hash, index) {
                    return Err(ProtocolError::MethodHashCollision {
                        prefab: prefab.name.clone(),
                        first: prefab.endpoints[existing].name.clone(),
                        second: endpoint.name.clone(),
                        hash,
                    });
                }
            }
            method_tables.push(table);
        }

        self.method_tables = method_tables;
        self.hash_width = hash_width;
        self.fingerprint = self.compute_fingerprint();
        self.locked = true;
        Ok(())
    }

    /// Digest of everything both sides of a connection must agree on: hash
    /// width, prefab order and names, variable kinds and settings, methods.
    /// Only meaningful once locked.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn compute_fingerprint(&self) -> u64 {
        let mut hasher = Fnv1a::new();
        hasher.write(&[self.hash_width.bits() as u8]);
        for prefab in &self.prefabs {
            write_str(&mut hasher, &prefab.name);
            for variable in &prefab.variables {
                write_str(&mut hasher, &variable.name);
                let settings = &variable.settings;
                let permission: u8 = match settings.permission {
                    WritePermission::ServerOnly => 0,
                    WritePermission::OwnerOnly => 1,
                    WritePermission::Everyone => 2,
                };
                hasher.write(&[
                    variable.initial.kind().tag(),
                    permission,
                    settings.reliable as u8,
                ]);
                hasher.write(&settings.send_rate_hz.to_le_bytes());
            }
            for endpoint in &prefab.endpoints {
                write_str(&mut hasher, &endpoint.name);
                let class: u8 = match endpoint.class {
                    RpcClass::ServerRpc => 0,
                    RpcClass::ClientRpc => 1,
                };
                hasher.write(&[class, endpoint.require_ownership as u8]);
            }
            // separates one prefab's members from the next prefab's name
            hasher.write(&[0xff]);
        }
        hasher.finish()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn hash_width(&self) -> RpcHashWidth {
        self.hash_width
    }

    pub fn prefab(&self, prefab_ref: &PrefabRef) -> Option<&Prefab> {
        self.prefabs.get(prefab_ref.index() as usize)
    }

    pub fn prefab_ref(&self, name: &str) -> Option<PrefabRef> {
        self.prefabs
            .iter()
            .position(|prefab| prefab.name == name)
            .and_then(|index| u16::try_from(index).ok())
            .map(PrefabRef::new)
    }

    /// Looks up a method by hash. Only valid once locked.
    pub fn endpoint(&self, prefab_ref: &PrefabRef, hash: &MethodHash) -> Option<&RpcEndpoint> {
        let index = prefab_ref.index() as usize;
        let endpoint_index = self.method_tables.get(index)?.get(hash)?;
        self.prefabs.get(index)?.endpoints.get(*endpoint_index)
    }

    /// Looks up a method by name, returning its hash at the locked width
    pub fn endpoint_by_name(
        &self,
        prefab_ref: &PrefabRef,
        name: &str,
    ) -> Option<(MethodHash, &RpcEndpoint)> {
        let hash = method_hash(name, self.hash_width);
        let endpoint = self.endpoint(prefab_ref, &hash)?;
        if endpoint.name != name {
            return None;
        }
        Some((hash, endpoint))
    }

    fn check_lock(&self) {
        if self.locked {
            panic!("Protocol already locked!");
        }
    }

    fn try_check_lock(&self) -> Result<(), ProtocolError> {
        if self.locked {
            Err(ProtocolError::AlreadyLocked)
        } else {
            Ok(())
        }
    }
}

fn write_str(hasher: &mut Fnv1a, value: &str) {
    hasher.write(&(value.len() as u32).to_le_bytes());
    hasher.write(value.as_bytes());
}
