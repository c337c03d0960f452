//! Registry error types

use crate::session::SessionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A caller-chosen id is already held by another live session
    DuplicateId(SessionId),
    /// No free id was found after repeated random draws
    IdSpaceExhausted,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateId(id) => write!(f, "Session id already registered: {}", id),
            RegistryError::IdSpaceExhausted => write!(f, "No free session id available"),
        }
    }
}

impl std::error::Error for RegistryError {}
