use std::time::Duration;

use crate::NetworkId;

/// Scene-derived network ids all carry this bit, runtime ids never do
pub const SCENE_NETWORK_ID_FLAG: NetworkId = 1 << 63;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_ID_RECYCLE_DELAY: Duration = Duration::from_secs(120);
pub const DEFAULT_MESSAGE_BUFFER_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_CONNECTION_BUFFER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TIME_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// A peer that sends this many undecodable frames is flagged
pub const DECODE_ERROR_FLAG_THRESHOLD: u32 = 8;
