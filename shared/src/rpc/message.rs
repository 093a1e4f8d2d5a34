use netrep_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::{
    config::RpcHashWidth,
    types::{MethodHash, NetworkId, PeerId, Tick},
};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable identifier of a method name. FNV-1a over the UTF-8 bytes, truncated
/// to the configured width so that every peer agrees on it.
///
/// # Examples
/// ```
/// # use netrep_shared::{method_hash, RpcHashWidth};
/// let wide = method_hash("jump", RpcHashWidth::EightBytes);
/// let narrow = method_hash("jump", RpcHashWidth::FourBytes);
/// assert_eq!(narrow, wide & 0xffff_ffff);
/// ```
pub fn method_hash(name: &str, width: RpcHashWidth) -> MethodHash {
    let mut hasher = Fnv1a::new();
    hasher.write(name.as_bytes());
    let hash = hasher.finish();
    match width {
        RpcHashWidth::FourBytes => hash & 0xffff_ffff,
        RpcHashWidth::EightBytes => hash,
    }
}

/// Incremental 64-bit FNV-1a
pub(crate) struct Fnv1a(u64);

impl Fnv1a {
    pub(crate) fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= *byte as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    pub(crate) fn finish(&self) -> u64 {
        self.0
    }
}

/// Direction of an RPC
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RpcClass {
    /// Client to Server
    ServerRpc,
    /// Server to one, several or all Clients
    ClientRpc,
}

impl Serde for RpcClass {
    fn ser(&self, writer: &mut dyn BitWrite) {
        writer.write_bit(matches!(self, RpcClass::ClientRpc));
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if reader.read_bit()? {
            Ok(RpcClass::ClientRpc)
        } else {
            Ok(RpcClass::ServerRpc)
        }
    }
}

/// One queued or received call. `sender` and `tick` are not written per
/// message: the receiver fills them in from the link and the frame header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcMessage {
    pub target: NetworkId,
    pub method_hash: MethodHash,
    pub sender: PeerId,
    pub payload: Vec<u8>,
    pub class: RpcClass,
    pub tick: Tick,
}

/// A dispatched call, as handed to handlers and surfaced through `RpcEvent`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcCall {
    pub sender: PeerId,
    pub network_id: NetworkId,
    pub method: String,
    pub payload: Vec<u8>,
    pub tick: Tick,
}

/// Which Clients a `ClientRpc` goes to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpcTarget {
    /// Every Client observing the object
    All,
    Peer(PeerId),
    Peers(Vec<PeerId>),
}

impl RpcTarget {
    pub fn includes(&self, peer: &PeerId) -> bool {
        match self {
            RpcTarget::All => true,
            RpcTarget::Peer(target) => target == peer,
            RpcTarget::Peers(targets) => targets.contains(peer),
        }
    }
}
