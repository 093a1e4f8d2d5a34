use netrep_serde::{
    read_length, read_length_capped, write_length, BitReader, BitWrite, BitWriter, Serde,
    SerdeErr, UnsignedVariableInteger,
};

use crate::{
    config::{ReplicationConfig, RpcHashWidth},
    rpc::{RpcClass, RpcMessage},
    types::{MethodHash, NetworkId, PeerId, PrefabRef, SceneHandle, Tick, VariableIndex},
    wire::{
        frame::{DenyReason, Frame, MessageType, SpawnFrame},
        ReplicatedValue,
    },
};

type IdInteger = UnsignedVariableInteger<7>;
type IndexInteger = UnsignedVariableInteger<3>;

/// Turns frames into bytes and back. Holds the per-session settings which
/// change the layout: method hash width and the payload length cap.
#[derive(Clone, Debug)]
pub struct FrameCodec {
    hash_width: RpcHashWidth,
    length_cap: Option<usize>,
}

impl FrameCodec {
    pub fn new(hash_width: RpcHashWidth, length_cap: Option<usize>) -> Self {
        Self {
            hash_width,
            length_cap,
        }
    }

    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self::new(config.rpc_hash_width, config.length_cap())
    }

    pub fn hash_width(&self) -> RpcHashWidth {
        self.hash_width
    }

    pub fn length_cap(&self) -> Option<usize> {
        self.length_cap
    }

    pub fn encode(&self, tick: Tick, frame: &Frame) -> Vec<u8> {
        let mut writer = BitWriter::new();

        // Header
        frame.message_type().to_byte().ser(&mut writer);
        tick.ser(&mut writer);

        match frame {
            Frame::ConnectionRequest {
                protocol_version,
                fingerprint,
                payload,
            } => {
                protocol_version.ser(&mut writer);
                fingerprint.ser(&mut writer);
                write_length(&mut writer, payload.len());
                writer.write_bytes(payload);
            }
            Frame::ConnectionApproved { client_id } => client_id.ser(&mut writer),
            Frame::ConnectionDenied { reason } => reason.to_byte().ser(&mut writer),
            Frame::Spawn(spawn) => write_spawn(&mut writer, spawn),
            Frame::Despawn { network_id } => write_id(&mut writer, *network_id),
            Frame::VariableDelta {
                network_id,
                variable_index,
                value,
            } => {
                write_id(&mut writer, *network_id);
                IndexInteger::new(*variable_index).ser(&mut writer);
                value.ser(&mut writer);
            }
            Frame::RpcBatch { class, messages } => {
                class.ser(&mut writer);
                write_length(&mut writer, messages.len());
                for message in messages {
                    write_id(&mut writer, message.target);
                    self.write_hash(&mut writer, message.method_hash);
                    write_length(&mut writer, message.payload.len());
                    writer.write_bytes(&message.payload);
                }
            }
            Frame::OwnershipChange { network_id, owner } => {
                write_id(&mut writer, *network_id);
                owner.ser(&mut writer);
            }
            Frame::TimeSync => {}
        }

        writer.to_bytes()
    }

    /// Decodes one frame. `sender` is stamped onto any contained RPCs.
    pub fn decode(&self, sender: PeerId, bytes: &[u8]) -> Result<(Tick, Frame), SerdeErr> {
        let mut reader = BitReader::new(bytes);

        let message_type = MessageType::from_byte(u8::de(&mut reader)?)?;
        let tick = Tick::de(&mut reader)?;

        let frame = match message_type {
            MessageType::ConnectionRequest => {
                let protocol_version = u32::de(&mut reader)?;
                let fingerprint = u64::de(&mut reader)?;
                let length = read_length_capped(&mut reader, self.length_cap)?;
                Frame::ConnectionRequest {
                    protocol_version,
                    fingerprint,
                    payload: reader.read_bytes(length)?,
                }
            }
            MessageType::ConnectionApproved => Frame::ConnectionApproved {
                client_id: PeerId::de(&mut reader)?,
            },
            MessageType::ConnectionDenied => Frame::ConnectionDenied {
                reason: DenyReason::from_byte(u8::de(&mut reader)?)?,
            },
            MessageType::Spawn => Frame::Spawn(self.read_spawn(&mut reader)?),
            MessageType::Despawn => Frame::Despawn {
                network_id: read_id(&mut reader)?,
            },
            MessageType::VariableDelta => Frame::VariableDelta {
                network_id: read_id(&mut reader)?,
                variable_index: IndexInteger::de(&mut reader)?.to::<VariableIndex>()?,
                value: ReplicatedValue::de_capped(&mut reader, self.length_cap)?,
            },
            MessageType::RpcBatch => {
                let class = RpcClass::de(&mut reader)?;
                // Not pre-allocated: the count comes off the wire
                let count = read_length(&mut reader)?;
                let mut messages = Vec::new();
                for _ in 0..count {
                    let target = read_id(&mut reader)?;
                    let method_hash = self.read_hash(&mut reader)?;
                    let length = read_length_capped(&mut reader, self.length_cap)?;
                    let payload = reader.read_bytes(length)?;
                    messages.push(RpcMessage {
                        target,
                        method_hash,
                        sender,
                        payload,
                        class,
                        tick,
                    });
                }
                Frame::RpcBatch { class, messages }
            }
            MessageType::OwnershipChange => Frame::OwnershipChange {
                network_id: read_id(&mut reader)?,
                owner: PeerId::de(&mut reader)?,
            },
            MessageType::TimeSync => Frame::TimeSync,
        };

        Ok((tick, frame))
    }

    fn write_hash(&self, writer: &mut dyn BitWrite, hash: MethodHash) {
        match self.hash_width {
            RpcHashWidth::FourBytes => ((hash & 0xffff_ffff) as u32).ser(writer),
            RpcHashWidth::EightBytes => hash.ser(writer),
        }
    }

    fn read_hash(&self, reader: &mut BitReader) -> Result<MethodHash, SerdeErr> {
        match self.hash_width {
            RpcHashWidth::FourBytes => Ok(u32::de(reader)? as MethodHash),
            RpcHashWidth::EightBytes => MethodHash::de(reader),
        }
    }

    fn read_spawn(&self, reader: &mut BitReader) -> Result<SpawnFrame, SerdeErr> {
        let network_id = read_id(reader)?;
        let owner = PeerId::de(reader)?;
        let prefab = PrefabRef::de(reader)?;
        let is_player_object = bool::de(reader)?;
        let is_scene_object = bool::de(reader)?;
        let destroy_with_scene = bool::de(reader)?;
        let scene = Option::<SceneHandle>::de(reader)?;

        let count = read_length(reader)?;
        let mut values = Vec::new();
        for _ in 0..count {
            values.push(ReplicatedValue::de_capped(reader, self.length_cap)?);
        }

        Ok(SpawnFrame {
            network_id,
            owner,
            prefab,
            is_player_object,
            is_scene_object,
            destroy_with_scene,
            scene,
            values,
        })
    }
}

fn write_id(writer: &mut dyn BitWrite, network_id: NetworkId) {
    IdInteger::new(network_id).ser(writer);
}

fn read_id(reader: &mut BitReader) -> Result<NetworkId, SerdeErr> {
    IdInteger::de(reader)?.to::<NetworkId>()
}

fn write_spawn(writer: &mut dyn BitWrite, spawn: &SpawnFrame) {
    write_id(writer, spawn.network_id);
    spawn.owner.ser(writer);
    spawn.prefab.ser(writer);
    spawn.is_player_object.ser(writer);
    spawn.is_scene_object.ser(writer);
    spawn.destroy_with_scene.ser(writer);
    spawn.scene.ser(writer);
    write_length(writer, spawn.values.len());
    for value in &spawn.values {
        value.ser(writer);
    }
}
