//! Protocol constants

use std::time::Duration;

/// Default TCP port for the chat service
pub const DEFAULT_PORT: u16 = 8888;

/// Size of the big-endian length prefix in front of each frame
pub const FRAME_HEADER_SIZE: usize = 4;

/// Maximum frame payload size (64 KiB)
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Inactivity allowed on a connection before it is considered dead
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for a single frame write to a peer
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for the client's login frame
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between client heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Longest display name kept at login, in bytes
pub const MAX_NAME_LEN: usize = 64;

/// Display name the server uses for System announcements
pub const SYSTEM_SENDER: &str = "system";

/// Display name given to clients that log in with a blank name
pub const GUEST_NAME: &str = "guest";

/// Heartbeat probe content
pub const HEARTBEAT_CONTENT: &str = "PING";
