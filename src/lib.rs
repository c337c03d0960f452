//! Real-time TCP chat server
//!
//! Clients connect over TCP, log in with a display name, exchange broadcast
//! messages and query an activity leaderboard.
//!
//! # Architecture
//!
//! ```text
//!  TCP ──► ChatServer ──spawn──► Connection (one task per socket)
//!                                   │  login ─► SessionRegistry::register
//!                                   │  Normal ─► ActivityStore::record_activity
//!                                   │          └► BroadcastPipeline::enqueue
//!                                   │  Rank   ─► ActivityStore::leaderboard
//!                                   │  close  ─► SessionRegistry::unregister
//!                                   ▼
//!                         broadcast workers ──► every other Session
//! ```
//!
//! # Example
//!
//! ```no_run
//! use chatroom_rs::activity::MemoryBackend;
//! use chatroom_rs::{ChatServer, ServerConfig};
//!
//! # async fn example() -> chatroom_rs::Result<()> {
//! let server = ChatServer::new(ServerConfig::default(), MemoryBackend::new());
//! server
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

pub mod activity;
pub mod broadcast;
pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use activity::{ActivityBackend, ActivityStore, MemoryBackend};
pub use client::{ChatClient, ClientConfig, ClientEvent};
pub use error::{Error, Result};
pub use protocol::{Message, MessageKind};
pub use server::{ChatServer, ServerConfig};
pub use session::{Session, SessionId};
