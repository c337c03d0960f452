//! Connection state machine
//!
//! Tracks one connection from accept to close.
//!
//! ```text
//! Connecting ──► Authenticating ──► Active ──► Closing ──► Closed
//!                      │                                     ▲
//!                      └──────────── login failed ───────────┘
//! ```

use std::net::SocketAddr;
use std::time::Instant;

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Socket accepted, nothing read yet
    Connecting,
    /// Waiting for the login frame
    Authenticating,
    /// Registered and in the read loop
    Active,
    /// Tearing down
    Closing,
    /// Terminal
    Closed,
}

/// Why a connection left the Active phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent Leave
    Left,
    /// Liveness window elapsed without a frame
    TimedOut,
    /// Read failed or the peer hung up
    Disconnected(String),
    /// Server is shutting down
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Left => write!(f, "left"),
            CloseReason::TimedOut => write!(f, "timed out"),
            CloseReason::Disconnected(reason) => write!(f, "disconnected: {}", reason),
            CloseReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}

/// Per-connection state owned by the connection handler
#[derive(Debug)]
pub struct SessionState {
    /// Connection sequence number (log correlation only)
    pub conn_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// When the socket was accepted
    pub connected_at: Instant,

    /// When login completed
    pub authenticated_at: Option<Instant>,

    /// Frames decoded in the Active phase
    pub frames_received: u64,

    /// Why the connection is closing
    pub close_reason: Option<CloseReason>,
}

impl SessionState {
    pub fn new(conn_id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            conn_id,
            peer_addr,
            phase: SessionPhase::Connecting,
            connected_at: Instant::now(),
            authenticated_at: None,
            frames_received: 0,
            close_reason: None,
        }
    }

    /// Start waiting for the login frame
    pub fn start_login(&mut self) {
        if self.phase == SessionPhase::Connecting {
            self.phase = SessionPhase::Authenticating;
        }
    }

    /// Login succeeded and the session is registered
    pub fn activate(&mut self) {
        if self.phase == SessionPhase::Authenticating {
            self.phase = SessionPhase::Active;
            self.authenticated_at = Some(Instant::now());
        }
    }

    /// Login failed; skip straight to Closed without registering
    pub fn reject(&mut self) {
        if self.phase == SessionPhase::Authenticating {
            self.phase = SessionPhase::Closed;
        }
    }

    /// Leave the read loop
    pub fn begin_close(&mut self, reason: CloseReason) {
        if self.phase == SessionPhase::Active {
            self.phase = SessionPhase::Closing;
            self.close_reason = Some(reason);
        }
    }

    /// Teardown finished
    pub fn finish_close(&mut self) {
        if self.phase == SessionPhase::Closing {
            self.phase = SessionPhase::Closed;
        }
    }

    /// Count one decoded frame
    pub fn on_frame(&mut self) {
        self.frames_received += 1;
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Time since accept
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
