//! Session handle
//!
//! A `Session` is one logged-in client as seen by the rest of the server. It
//! owns the write half of the connection; the read half stays with the
//! connection handler.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::{encode, unix_now, Message};

/// Write half of a connection
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// Length of generated session ids
pub const SESSION_ID_LEN: usize = 4;

/// Short session token, empty until the registry assigns one
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random short token. Uniqueness is enforced by the registry.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(uuid[..SESSION_ID_LEN].to_string())
    }

    /// Empty placeholder for a session that is not registered yet
    pub fn unassigned() -> Self {
        Self(String::new())
    }

    pub fn is_assigned(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One connected, logged-in client
pub struct Session {
    id: SessionId,
    display_name: String,
    joined_at: i64,
    peer_addr: Option<SocketAddr>,
    write_timeout: Duration,
    /// `None` once closed
    writer: Mutex<Option<BoxedWriter>>,
}

impl Session {
    /// Create an unregistered session around a connection's write half
    pub fn new(display_name: impl Into<String>, writer: BoxedWriter, write_timeout: Duration) -> Self {
        Self {
            id: SessionId::unassigned(),
            display_name: display_name.into(),
            joined_at: unix_now(),
            peer_addr: None,
            write_timeout,
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Use a caller-chosen id instead of a generated one
    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = id;
        self
    }

    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    pub(crate) fn assign_id(&mut self, id: SessionId) {
        self.id = id;
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Login time, seconds since the Unix epoch
    pub fn joined_at(&self) -> i64 {
        self.joined_at
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Write one message to this client within the write timeout.
    ///
    /// Fails with `ConnectionClosed` after `close`. A frame that times out
    /// may be half-written, so the writer is dropped and later sends fail.
    /// A message too large to frame is refused before anything is written.
    pub async fn send(&self, msg: &Message) -> Result<()> {
        self.send_frame(encode(msg)?).await
    }

    /// Write an already encoded frame. Fan-out encodes once and shares the bytes.
    pub async fn send_frame(&self, frame: Bytes) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::ConnectionClosed)?;

        let result = timeout(self.write_timeout, async {
            writer.write_all(&frame).await?;
            writer.flush().await
        })
        .await;

        match result {
            Ok(written) => Ok(written?),
            Err(_) => {
                guard.take();
                Err(Error::Timeout)
            }
        }
    }

    /// Shut down the write half. Returns `true` only for the call that closed it.
    pub async fn close(&self) -> bool {
        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => {
                let _ = timeout(self.write_timeout, writer.shutdown()).await;
                true
            }
            None => false,
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("joined_at", &self.joined_at)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::protocol::constants::MAX_PAYLOAD_SIZE;
    use crate::protocol::{read_message, MessageKind};
    use tokio::io::duplex;

    #[test]
    fn test_generated_ids() {
        let id = SessionId::generate();
        assert!(id.is_assigned());
        assert_eq!(id.as_str().len(), SESSION_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!SessionId::unassigned().is_assigned());
    }

    #[tokio::test]
    async fn test_send_writes_frame() {
        let (client, server) = duplex(1024);
        let session = Session::new("alice", Box::new(server), Duration::from_secs(1))
            .with_id(SessionId::from("a1b2"));

        session.send(&Message::system("hello")).await.unwrap();

        let mut client = client;
        let msg = read_message(&mut client).await.unwrap();
        assert_eq!(msg.kind, MessageKind::System);
        assert_eq!(msg.content, "hello");
    }

    #[tokio::test]
    async fn test_close_exactly_once() {
        let (_client, server) = duplex(64);
        let session = Session::new("bob", Box::new(server), Duration::from_secs(1));

        assert!(session.close().await);
        assert!(!session.close().await);
        assert!(session.is_closed().await);

        let err = session.send(&Message::system("late")).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_send_times_out_on_full_pipe() {
        // Peer never reads, so the tiny buffer fills up
        let (_client, server) = duplex(8);
        let session = Session::new("carol", Box::new(server), Duration::from_millis(50));

        let err = session
            .send(&Message::system("this frame is larger than eight bytes"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(session.is_closed().await);
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped_fails() {
        let (client, server) = duplex(64);
        drop(client);
        let session = Session::new("dave", Box::new(server), Duration::from_secs(1));

        assert!(session.send(&Message::system("gone")).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_message_refused_and_session_kept() {
        let (mut client, server) = duplex(1024);
        let session = Session::new("erin", Box::new(server), Duration::from_secs(1));

        let huge = Message::rank_report("x".repeat(MAX_PAYLOAD_SIZE));
        let err = session.send(&huge).await.unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::FrameTooLarge(_))));
        assert!(!session.is_closed().await);

        session.send(&Message::system("still here")).await.unwrap();
        let msg = read_message(&mut client).await.unwrap();
        assert_eq!(msg.content, "still here");
    }
}
