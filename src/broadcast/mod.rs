//! Broadcast pipeline
//!
//! Decouples "this message goes to everyone" from the cost of writing to
//! every socket. Connection handlers push onto a bounded queue; a fixed pool
//! of workers drains it and fans each message out to every registered
//! session except the sender.
//!
//! ```text
//!  [Connection] ──enqueue──►  bounded queue (1000)  ──► worker 0 ─┐
//!  [Connection] ──enqueue──►                        ──► worker 1 ─┼─► registry.snapshot()
//!                                                    ──► worker N ─┘        │
//!                                                                  send_frame() per peer
//! ```
//!
//! The frame is encoded once per message; recipients share the same `Bytes`
//! allocation. Sender exclusion compares session ids, not connections.

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{Dispatch, PipelineConfig, SaturationPolicy};
pub use error::BroadcastError;
pub use pipeline::{fan_out, BroadcastPipeline, Delivery, WorkerPool};
