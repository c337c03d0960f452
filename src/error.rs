//! Error types
//!
//! Transport and codec errors end the one session they occur on. Store errors
//! are recovered inside the activity adapter and never end a connection.

use std::fmt;
use std::io;

use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket I/O failure (reset, broken pipe, ...)
    Io(io::Error),
    /// Malformed frame on the wire
    Codec(CodecError),
    /// Registry rejected an operation
    Registry(RegistryError),
    /// Activity store failure
    Store(StoreError),
    /// A read or write did not complete within its deadline
    Timeout,
    /// Peer closed the connection, or the session was already torn down
    ConnectionClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Codec(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::Io(e),
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Store(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

/// Frame encoding/decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload ended before a field was complete
    UnexpectedEof,
    /// Declared payload length exceeds the frame limit
    FrameTooLarge(usize),
    /// A string field is not valid UTF-8
    InvalidUtf8,
    /// Bytes left over after the last field
    TrailingBytes(usize),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::UnexpectedEof => write!(f, "Unexpected end of frame"),
            CodecError::FrameTooLarge(len) => write!(f, "Frame too large: {} bytes", len),
            CodecError::InvalidUtf8 => write!(f, "Invalid UTF-8 in string field"),
            CodecError::TrailingBytes(n) => write!(f, "{} trailing bytes after message", n),
        }
    }
}

impl std::error::Error for CodecError {}

/// Activity store errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached
    Unavailable(String),
    /// A store call exceeded its deadline
    Timeout,
    /// Store rejected the command
    Command(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(reason) => write!(f, "Store unavailable: {}", reason),
            StoreError::Timeout => write!(f, "Store call timed out"),
            StoreError::Command(reason) => write!(f, "Store command failed: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

impl Error {
    /// Whether this error means the liveness window elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
