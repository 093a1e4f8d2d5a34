use std::fmt;

use netrep_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedVariableInteger};

pub type NetworkId = u64;
pub type Tick = u32;
pub type MethodHash = u64;
pub type VariableIndex = u16;
pub type SceneHandle = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Server,
    Client,
}

impl HostType {
    pub fn invert(self) -> Self {
        match self {
            HostType::Server => HostType::Client,
            HostType::Client => HostType::Server,
        }
    }
}

/// Identifies a peer. The authoritative host is always `PeerId::SERVER`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub const SERVER: PeerId = PeerId(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_server(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_server() {
            write!(f, "PeerId(server)")
        } else {
            write!(f, "PeerId({})", self.0)
        }
    }
}

impl Serde for PeerId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.to::<u64>()?;
        Ok(Self(value))
    }
}

/// Index of a prefab registered with the [`Protocol`](crate::Protocol)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrefabRef(u16);

impl PrefabRef {
    pub(crate) fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u16 {
        self.0
    }
}

impl Serde for PrefabRef {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<5>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<5>::de(reader)?.to::<u16>()?;
        Ok(Self(value))
    }
}
