//! Chat server
//!
//! [`ChatServer`] accepts TCP connections and runs one [`Connection`] task
//! per socket. Connections share the registry, the activity store and the
//! broadcast pipeline through a [`ServerContext`].

pub mod config;
pub mod connection;
pub mod context;
pub mod listener;

pub use config::ServerConfig;
pub use connection::{BoxedReader, Connection};
pub use context::ServerContext;
pub use listener::ChatServer;
