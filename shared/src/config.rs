use std::{default::Default, ops::Range, time::Duration};

use thiserror::Error;

use crate::{
    constants::{
        DEFAULT_CONNECTION_BUFFER_TIMEOUT, DEFAULT_ID_RECYCLE_DELAY,
        DEFAULT_MESSAGE_BUFFER_TIMEOUT, DEFAULT_TICK_INTERVAL, DEFAULT_TIME_RESYNC_INTERVAL,
        SCENE_NETWORK_ID_FLAG,
    },
    NetworkId,
};

/// Width of the method hash written into every RPC
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcHashWidth {
    FourBytes,
    EightBytes,
}

impl RpcHashWidth {
    pub fn bits(&self) -> u32 {
        match self {
            RpcHashWidth::FourBytes => 32,
            RpcHashWidth::EightBytes => 64,
        }
    }
}

/// Contains Config properties shared by Server and Client peers
#[derive(Clone, Debug)]
pub struct ReplicationConfig {
    /// How many times per second queued inbound frames are processed
    pub receive_tick_rate: u32,
    /// Length of one replication tick
    pub tick_interval: Duration,
    /// Max inbound frames decoded per `advance` call, the rest stay queued
    pub max_receive_events_per_tick: usize,
    /// Max outgoing deltas, spawn/despawn records and RPC batches per
    /// `advance` call, the rest is deferred
    pub max_send_events_per_tick: usize,
    /// How many times per second queued RPCs are flushed
    pub event_tick_rate: u32,
    /// Whether replicated variables are scanned and applied at all
    pub enable_variable_replication: bool,
    /// Whether variable values and RPC payloads are capped at
    /// `max_variable_length` bytes
    pub ensure_variable_length_safety: bool,
    pub max_variable_length: usize,
    /// Whether released network ids are reused after `id_recycle_delay`
    pub recycle_network_ids: bool,
    pub id_recycle_delay: Duration,
    /// Ids handed out to runtime spawns. Must not overlap scene-derived ids.
    pub network_id_range: Range<NetworkId>,
    pub rpc_hash_width: RpcHashWidth,
    /// Whether messages for not-yet-spawned objects are held back
    pub enable_message_buffering: bool,
    pub message_buffer_timeout: Duration,
    pub max_buffered_messages: usize,
    /// Whether the Server must explicitly accept each connection request
    pub connection_approval: bool,
    /// How long a connected but not yet approved Client may stay pending
    pub client_connection_buffer_timeout: Duration,
    /// Sent with every connection request. The Server denies Clients whose
    /// version differs from its own.
    pub protocol_version: u32,
    /// Whether the Server denies Clients whose Protocol fingerprint differs
    /// from its own
    pub force_same_prefabs: bool,
    /// Prefab spawned for every approved Client, owned by it and despawned
    /// when it leaves. Only read by the Server.
    pub player_prefab: Option<String>,
    /// Whether the Server periodically re-sends its tick to every Client
    pub enable_time_resync: bool,
    pub time_resync_interval: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            receive_tick_rate: 64,
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_receive_events_per_tick: 500,
            max_send_events_per_tick: 500,
            event_tick_rate: 64,
            enable_variable_replication: true,
            ensure_variable_length_safety: false,
            max_variable_length: 1 << 16,
            recycle_network_ids: true,
            id_recycle_delay: DEFAULT_ID_RECYCLE_DELAY,
            network_id_range: 1..(1 << 32),
            rpc_hash_width: RpcHashWidth::FourBytes,
            enable_message_buffering: true,
            message_buffer_timeout: DEFAULT_MESSAGE_BUFFER_TIMEOUT,
            max_buffered_messages: 1024,
            connection_approval: false,
            client_connection_buffer_timeout: DEFAULT_CONNECTION_BUFFER_TIMEOUT,
            protocol_version: 0,
            force_same_prefabs: true,
            player_prefab: None,
            enable_time_resync: false,
            time_resync_interval: DEFAULT_TIME_RESYNC_INTERVAL,
        }
    }
}

impl ReplicationConfig {
    /// Checks invariants which must hold before any peer starts. A failure
    /// here is a misconfiguration, never a runtime condition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.receive_tick_rate == 0 {
            return Err(ConfigError::ZeroRate {
                field: "receive_tick_rate",
            });
        }
        if self.event_tick_rate == 0 {
            return Err(ConfigError::ZeroRate {
                field: "event_tick_rate",
            });
        }
        if self.max_send_events_per_tick == 0 {
            return Err(ConfigError::ZeroRate {
                field: "max_send_events_per_tick",
            });
        }
        if self.max_receive_events_per_tick == 0 {
            return Err(ConfigError::ZeroRate {
                field: "max_receive_events_per_tick",
            });
        }

        let range = &self.network_id_range;
        if range.start == 0 || range.start >= range.end {
            return Err(ConfigError::EmptyNetworkIdRange {
                start: range.start,
                end: range.end,
            });
        }
        if range.end > SCENE_NETWORK_ID_FLAG {
            return Err(ConfigError::NetworkIdRangeCollision {
                end: range.end,
                scene_start: SCENE_NETWORK_ID_FLAG,
            });
        }

        if self.ensure_variable_length_safety && self.max_variable_length == 0 {
            return Err(ConfigError::ZeroLengthCap);
        }
        if self.enable_message_buffering && self.max_buffered_messages == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }
        if self.enable_time_resync && self.time_resync_interval.is_zero() {
            return Err(ConfigError::ZeroResyncInterval);
        }
        Ok(())
    }

    /// The payload length cap to apply while decoding, if enabled
    pub fn length_cap(&self) -> Option<usize> {
        if self.ensure_variable_length_safety {
            Some(self.max_variable_length)
        } else {
            None
        }
    }

    /// Set the tick interval from a float, as found in config files
    pub fn with_tick_interval_seconds(mut self, seconds: f32) -> Self {
        self.tick_interval = Duration::from_secs_f32(seconds);
        self
    }
}

/// Misconfigurations detected at construction time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("tick_interval must be greater than zero")]
    ZeroTickInterval,

    #[error("{field} must be greater than zero")]
    ZeroRate { field: &'static str },

    #[error("network_id_range {start}..{end} is empty or starts at the reserved id 0")]
    EmptyNetworkIdRange { start: NetworkId, end: NetworkId },

    #[error("network_id_range ends at {end}, overlapping scene-derived ids starting at {scene_start}")]
    NetworkIdRangeCollision {
        end: NetworkId,
        scene_start: NetworkId,
    },

    #[error("ensure_variable_length_safety requires a non-zero max_variable_length")]
    ZeroLengthCap,

    #[error("enable_message_buffering requires a non-zero max_buffered_messages")]
    ZeroBufferCapacity,

    #[error("enable_time_resync requires a non-zero time_resync_interval")]
    ZeroResyncInterval,

    #[error("player_prefab {name:?} is not registered in the Protocol")]
    UnknownPlayerPrefab { name: String },
}
