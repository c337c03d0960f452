//! Session management
//!
//! A `Session` is the shared handle for one logged-in client; `SessionState`
//! is the connection handler's private view of the same connection.

pub mod handle;
pub mod state;

pub use handle::{BoxedWriter, Session, SessionId, SESSION_ID_LEN};
pub use state::{CloseReason, SessionPhase, SessionState};
