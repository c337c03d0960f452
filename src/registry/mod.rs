//! Session registry
//!
//! The registry is the single source of truth for who is online. Every
//! membership change goes through its write lock; broadcast and online-count
//! queries take the read lock and work on point-in-time snapshots.
//!
//! ```text
//!                   Arc<SessionRegistry>
//!              ┌──────────────────────────┐
//!              │ sessions: RwLock<HashMap<│
//!              │   SessionId,             │
//!              │   Arc<Session>>>         │
//!              └─────┬──────────────┬─────┘
//!         write lock │              │ read lock
//!                    ▼              ▼
//!        register / unregister   snapshot / count
//!        (connection handlers)   (broadcast workers)
//!                    │
//!                    └──► departures channel ──► activity cleanup
//! ```

pub mod error;
pub mod store;

pub use error::RegistryError;
pub use store::{Departure, SessionRegistry};
