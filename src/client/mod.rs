//! Chat client
//!
//! Library side of the terminal client: connect and log in, send text and
//! Rank requests, keep the session alive with heartbeats, and surface
//! everything the server sends as [`ClientEvent`]s.

pub mod chat;
pub mod config;

pub use chat::{ChatClient, ClientEvent, ClientStats};
pub use config::ClientConfig;
