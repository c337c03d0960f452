//! Chat wire protocol
//!
//! The message model, the length-prefixed frame codec, and protocol constants.

pub mod codec;
pub mod constants;
pub mod message;

pub use codec::{decode, encode, fit_content, payload_len, read_message, write_message};
pub use message::{unix_now, Message, MessageKind};
