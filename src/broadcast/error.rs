//! Broadcast pipeline errors

/// Why a message was not accepted for broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastError {
    /// Queue full under `SaturationPolicy::DropNewest`
    Saturated,
    /// Workers have stopped
    Closed,
}

impl std::fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastError::Saturated => write!(f, "Broadcast queue saturated"),
            BroadcastError::Closed => write!(f, "Broadcast pipeline closed"),
        }
    }
}

impl std::error::Error for BroadcastError {}
