//! Per-connection handler
//!
//! Drives one accepted socket through login, the read loop, and teardown.
//! The write half moves into the registered [`Session`]; the read half stays
//! here and is only ever touched by this task.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::activity::ActivityBackend;
use crate::broadcast::BroadcastError;
use crate::error::{Error, Result};
use crate::protocol::codec::floor_char_boundary;
use crate::protocol::constants::{GUEST_NAME, MAX_NAME_LEN};
use crate::protocol::{fit_content, read_message, unix_now, Message, MessageKind};
use crate::server::context::ServerContext;
use crate::session::{BoxedWriter, CloseReason, Session, SessionState};

/// Read half of a connection
pub type BoxedReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// One client connection
pub struct Connection<B: ActivityBackend> {
    state: SessionState,
    reader: BufReader<BoxedReader>,
    /// Handed to the session at login
    writer: Option<BoxedWriter>,
    ctx: ServerContext<B>,
    shutdown: watch::Receiver<bool>,
}

impl<B: ActivityBackend> Connection<B> {
    pub fn new(
        conn_id: u64,
        peer_addr: SocketAddr,
        reader: BoxedReader,
        writer: BoxedWriter,
        ctx: ServerContext<B>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            state: SessionState::new(conn_id, peer_addr),
            reader: BufReader::new(reader),
            writer: Some(writer),
            ctx,
            shutdown,
        }
    }

    /// Wrap an accepted TCP socket
    pub fn from_tcp(
        conn_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        ctx: ServerContext<B>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (reader, writer) = socket.into_split();
        Self::new(
            conn_id,
            peer_addr,
            Box::new(reader),
            Box::new(writer),
            ctx,
            shutdown,
        )
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the connection to completion
    ///
    /// Returns an error only if login failed. Once a session is registered
    /// every ending is a normal close and teardown always runs.
    pub async fn run(&mut self) -> Result<()> {
        self.state.start_login();

        let session = match self.login().await {
            Ok(session) => session,
            Err(e) => {
                self.state.reject();
                tracing::debug!(
                    conn_id = self.state.conn_id,
                    peer = %self.state.peer_addr,
                    error = %e,
                    "Login failed"
                );
                return Err(e);
            }
        };

        self.state.activate();
        self.ctx.metrics.session_opened();
        tracing::info!(
            conn_id = self.state.conn_id,
            session_id = %session.id(),
            name = session.display_name(),
            peer = %self.state.peer_addr,
            "User joined"
        );

        self.greet(&session).await;

        let reason = self.read_loop(&session).await;
        self.state.begin_close(reason.clone());
        self.teardown(&session, &reason).await;
        self.state.finish_close();

        Ok(())
    }

    async fn login(&mut self) -> Result<Arc<Session>> {
        let msg = timeout(self.ctx.config.login_timeout, read_message(&mut self.reader)).await??;

        if msg.kind != MessageKind::Join {
            tracing::debug!(
                conn_id = self.state.conn_id,
                kind = %msg.kind,
                "Login frame is not a Join, taking its sender name anyway"
            );
        }

        let name = match msg.from.trim() {
            "" => GUEST_NAME.to_string(),
            name => name[..floor_char_boundary(name, MAX_NAME_LEN)].trim_end().to_string(),
        };

        let writer = self.writer.take().ok_or(Error::ConnectionClosed)?;
        let session = Session::new(name, writer, self.ctx.config.write_timeout)
            .with_peer_addr(self.state.peer_addr);
        let session = self.ctx.registry.register(session).await?;

        // Store trouble is logged by the adapter and does not block the login
        let _ = self
            .ctx
            .activity
            .register_user(session.id(), session.display_name(), session.joined_at())
            .await;

        Ok(session)
    }

    /// Direct Join acknowledgement, then the arrival announcement
    async fn greet(&self, session: &Arc<Session>) {
        let welcome = Message::welcome(session.display_name(), session.id().as_str());
        if let Err(e) = session.send(&welcome).await {
            tracing::debug!(session_id = %session.id(), error = %e, "Failed to send welcome");
        }

        let online = self.ctx.registry.count().await;
        let notice = format!(
            "{}({}) joined, {} online",
            session.display_name(),
            session.id(),
            online
        );
        self.ctx.pipeline.announce(&Message::system(notice)).await;
    }

    async fn read_loop(&mut self, session: &Arc<Session>) -> CloseReason {
        loop {
            if *self.shutdown.borrow() {
                return CloseReason::Shutdown;
            }

            let read = tokio::select! {
                _ = self.shutdown.changed() => return CloseReason::Shutdown,
                read = timeout(self.ctx.config.idle_timeout, read_message(&mut self.reader)) => read,
            };

            let msg = match read {
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) => return CloseReason::Disconnected(e.to_string()),
                Err(_) => return CloseReason::TimedOut,
            };

            self.state.on_frame();
            self.ctx.metrics.message_received();

            if let Some(reason) = self.dispatch(session, msg).await {
                return reason;
            }
        }
    }

    /// Act on one inbound frame. `Some` ends the session.
    async fn dispatch(&self, session: &Arc<Session>, msg: Message) -> Option<CloseReason> {
        match msg.kind {
            MessageKind::Normal => {
                let _ = self.ctx.activity.record_activity(session.id()).await;

                // Sender identity comes from the session, never from the frame
                let mut relay = Message {
                    kind: MessageKind::Normal,
                    from: session.display_name().to_string(),
                    id: session.id().to_string(),
                    content: msg.content,
                    timestamp: if msg.timestamp < 0 {
                        unix_now()
                    } else {
                        msg.timestamp
                    },
                };
                if fit_content(&mut relay) {
                    tracing::warn!(
                        session_id = %session.id(),
                        "Relayed message exceeded the frame limit, content truncated"
                    );
                }

                match self.ctx.pipeline.enqueue(relay).await {
                    Ok(()) | Err(BroadcastError::Saturated) => {}
                    Err(e) => {
                        tracing::debug!(session_id = %session.id(), error = %e, "Broadcast not queued")
                    }
                }
                None
            }
            MessageKind::Rank => {
                let board = self
                    .ctx
                    .activity
                    .leaderboard(
                        session.id(),
                        session.display_name(),
                        self.ctx.config.leaderboard_size,
                    )
                    .await;

                let mut report = Message::rank_report(board.render());
                fit_content(&mut report);

                match session.send(&report).await {
                    Ok(()) => None,
                    Err(e) => Some(CloseReason::Disconnected(e.to_string())),
                }
            }
            MessageKind::Leave => Some(CloseReason::Left),
            MessageKind::Heartbeat => {
                tracing::trace!(session_id = %session.id(), "Heartbeat");
                None
            }
            MessageKind::Join | MessageKind::System | MessageKind::Unknown(_) => {
                tracing::debug!(session_id = %session.id(), kind = %msg.kind, "Ignoring frame");
                None
            }
        }
    }

    async fn teardown(&self, session: &Arc<Session>, reason: &CloseReason) {
        if self.ctx.registry.unregister(session).await {
            self.ctx.metrics.session_closed();

            let online = self.ctx.registry.count().await;
            let notice = format!(
                "{}({}) left, {} online",
                session.display_name(),
                session.id(),
                online
            );
            self.ctx.pipeline.announce(&Message::system(notice)).await;
        }

        session.close().await;

        tracing::info!(
            conn_id = self.state.conn_id,
            session_id = %session.id(),
            name = session.display_name(),
            reason = %reason,
            frames = self.state.frames_received,
            duration_ms = self.state.duration().as_millis() as u64,
            "User left"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::activity::{ActivityStore, MemoryBackend};
    use crate::broadcast::{BroadcastPipeline, WorkerPool};
    use crate::protocol::write_message;
    use crate::registry::SessionRegistry;
    use crate::server::config::ServerConfig;
    use crate::session::SessionPhase;
    use crate::stats::ServerMetrics;

    struct Harness {
        ctx: ServerContext<MemoryBackend>,
        shutdown: watch::Sender<bool>,
        _workers: WorkerPool,
        next_conn_id: u64,
    }

    type Outcome = (Result<()>, SessionPhase, Option<CloseReason>, u64);

    impl Harness {
        fn new(config: ServerConfig) -> Self {
            let (departures_tx, departures_rx) = mpsc::unbounded_channel();
            let registry = Arc::new(SessionRegistry::with_departures(departures_tx));
            let activity = Arc::new(ActivityStore::new(MemoryBackend::new()));
            activity.spawn_cleanup_task(departures_rx);
            let metrics = Arc::new(ServerMetrics::new());
            let (pipeline, workers) = BroadcastPipeline::start(
                config.pipeline.clone(),
                Arc::clone(&registry),
                Arc::clone(&metrics),
            );
            let (shutdown, _) = watch::channel(false);

            Self {
                ctx: ServerContext::new(Arc::new(config), registry, activity, pipeline, metrics),
                shutdown,
                _workers: workers,
                next_conn_id: 1,
            }
        }

        fn connect(&mut self) -> (DuplexStream, JoinHandle<Outcome>) {
            let (client, server) = duplex(64 * 1024);
            let (reader, writer) = tokio::io::split(server);
            let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);

            let mut connection = Connection::new(
                self.next_conn_id,
                peer,
                Box::new(reader),
                Box::new(writer),
                self.ctx.clone(),
                self.shutdown.subscribe(),
            );
            self.next_conn_id += 1;

            let task = tokio::spawn(async move {
                let result = connection.run().await;
                let state = connection.state();
                (
                    result,
                    state.phase,
                    state.close_reason.clone(),
                    state.frames_received,
                )
            });
            (client, task)
        }

        /// Connect and log in, returning the assigned id
        async fn join(&mut self, name: &str) -> (DuplexStream, JoinHandle<Outcome>, String) {
            let (mut client, task) = self.connect();
            write_message(&mut client, &Message::login(name)).await.unwrap();
            let ack = next_of_kind(&mut client, MessageKind::Join).await;
            (client, task, ack.id)
        }
    }

    async fn next_of_kind(stream: &mut DuplexStream, kind: MessageKind) -> Message {
        loop {
            let msg = timeout(Duration::from_secs(2), read_message(stream))
                .await
                .expect("timed out waiting for a frame")
                .unwrap();
            if msg.kind == kind {
                return msg;
            }
        }
    }

    async fn finish(task: JoinHandle<Outcome>) -> Outcome {
        timeout(Duration::from_secs(2), task)
            .await
            .expect("connection did not finish")
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_welcome_and_leave() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut client, task) = h.connect();

        write_message(&mut client, &Message::login("alice")).await.unwrap();

        let ack = next_of_kind(&mut client, MessageKind::Join).await;
        assert_eq!(ack.from, "alice");
        assert_eq!(ack.id.len(), 4);
        assert_eq!(ack.content, "Welcome alice!");

        let arrival = next_of_kind(&mut client, MessageKind::System).await;
        assert_eq!(arrival.content, format!("alice({}) joined, 1 online", ack.id));
        assert_eq!(h.ctx.registry.count().await, 1);

        write_message(&mut client, &Message::leave("alice", ack.id.as_str()))
            .await
            .unwrap();

        let (result, phase, reason, frames) = finish(task).await;
        assert!(result.is_ok());
        assert_eq!(phase, SessionPhase::Closed);
        assert_eq!(reason, Some(CloseReason::Left));
        assert_eq!(frames, 1);
        assert_eq!(h.ctx.registry.count().await, 0);

        let stats = h.ctx.metrics.snapshot();
        assert_eq!(stats.sessions_opened, 1);
        assert_eq!(stats.sessions_closed, 1);
    }

    #[tokio::test]
    async fn test_blank_name_becomes_guest() {
        let mut h = Harness::new(ServerConfig::default());
        let (_client, _task, id) = h.join("   ").await;

        let session = h.ctx.registry.get(&id.as_str().into()).await.unwrap();
        assert_eq!(session.display_name(), GUEST_NAME);
    }

    #[tokio::test]
    async fn test_login_timeout_rejects() {
        let mut h = Harness::new(ServerConfig::default().login_timeout(Duration::from_millis(50)));
        let (_client, task) = h.connect();

        let (result, phase, reason, _) = finish(task).await;
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(phase, SessionPhase::Closed);
        assert!(reason.is_none());
        assert_eq!(h.ctx.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_login_rejects() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut client, task) = h.connect();

        // One-byte payload: kind tag only, fields missing
        client.write_all(&[0, 0, 0, 1, 1]).await.unwrap();

        let (result, phase, _, _) = finish(task).await;
        assert!(matches!(result, Err(Error::Codec(_))));
        assert_eq!(phase, SessionPhase::Closed);
        assert_eq!(h.ctx.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_normal_is_relayed_with_session_identity() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut alice, _alice_task, _) = h.join("alice").await;
        let (mut bob, _bob_task, bob_id) = h.join("bob").await;

        let mut forged = Message::normal("mallory", "zzzz", "hi there");
        forged.timestamp = -5;
        write_message(&mut bob, &forged).await.unwrap();

        let relayed = next_of_kind(&mut alice, MessageKind::Normal).await;
        assert_eq!(relayed.from, "bob");
        assert_eq!(relayed.id, bob_id);
        assert_eq!(relayed.content, "hi there");
        assert!(relayed.timestamp > 0);

        let score = h.ctx.activity.score_and_rank(&bob_id.as_str().into()).await.unwrap();
        assert_eq!(score.score, 1);
    }

    #[tokio::test]
    async fn test_rank_reply_goes_to_caller_only() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut alice, _alice_task, alice_id) = h.join("alice").await;

        for text in ["one", "two"] {
            write_message(&mut alice, &Message::normal("alice", alice_id.as_str(), text))
                .await
                .unwrap();
        }
        write_message(&mut alice, &Message::rank_request("alice", alice_id.as_str()))
            .await
            .unwrap();

        let report = next_of_kind(&mut alice, MessageKind::Rank).await;
        assert!(report.content.contains("=== Activity Leaderboard ==="));
        assert!(report.content.contains(&format!("Your rank: #1 [alice({})] current score: 2", alice_id)));
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_and_cleans_up() {
        let mut h = Harness::new(ServerConfig::default().idle_timeout(Duration::from_millis(100)));
        let (_client, task, id) = h.join("bob").await;
        assert_eq!(h.ctx.activity.backend().len().await, 1);

        let (result, phase, reason, _) = finish(task).await;
        assert!(result.is_ok());
        assert_eq!(phase, SessionPhase::Closed);
        assert_eq!(reason, Some(CloseReason::TimedOut));
        assert!(!h.ctx.registry.contains(&id.as_str().into()).await);

        // Record removal runs in the background
        timeout(Duration::from_secs(2), async {
            while !h.ctx.activity.backend().is_empty().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("activity record not removed");
    }

    #[tokio::test]
    async fn test_peer_hangup_disconnects() {
        let mut h = Harness::new(ServerConfig::default());
        let (client, task, _) = h.join("carol").await;
        drop(client);

        let (_, phase, reason, _) = finish(task).await;
        assert_eq!(phase, SessionPhase::Closed);
        assert!(matches!(reason, Some(CloseReason::Disconnected(_))));
        assert_eq!(h.ctx.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal_closes() {
        let mut h = Harness::new(ServerConfig::default());
        let (_client, task, _) = h.join("dave").await;

        h.shutdown.send(true).unwrap();

        let (_, _, reason, _) = finish(task).await;
        assert_eq!(reason, Some(CloseReason::Shutdown));
    }

    #[tokio::test]
    async fn test_unknown_and_heartbeat_frames_ignored() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut client, task, id) = h.join("erin").await;

        let mut odd = Message::system("spoofed");
        odd.kind = MessageKind::Unknown(99);
        write_message(&mut client, &odd).await.unwrap();
        write_message(&mut client, &Message::system("spoofed")).await.unwrap();
        write_message(&mut client, &Message::heartbeat("erin", id.as_str())).await.unwrap();
        write_message(&mut client, &Message::leave("erin", id.as_str())).await.unwrap();

        let (_, _, reason, frames) = finish(task).await;
        assert_eq!(reason, Some(CloseReason::Left));
        assert_eq!(frames, 4);
        assert_eq!(h.ctx.metrics.snapshot().broadcasts_enqueued, 0);
    }

    #[tokio::test]
    async fn test_departure_announced_to_others() {
        let mut h = Harness::new(ServerConfig::default());
        let (mut alice, _alice_task, _) = h.join("alice").await;
        let (mut bob, bob_task, bob_id) = h.join("bob").await;

        write_message(&mut bob, &Message::leave("bob", bob_id.as_str())).await.unwrap();
        finish(bob_task).await;

        let expected = format!("bob({}) left, 1 online", bob_id);
        loop {
            let notice = next_of_kind(&mut alice, MessageKind::System).await;
            if notice.content == expected {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_run_future_is_send() {
        fn assert_send<T: Send>(_: T) {}

        let h = Harness::new(ServerConfig::default());
        let (_client, server) = duplex(64);
        let (reader, writer) = tokio::io::split(server);
        let mut connection = Connection::new(
            1,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000),
            Box::new(reader),
            Box::new(writer),
            h.ctx.clone(),
            h.shutdown.subscribe(),
        );

        assert_send(connection.run());
    }

    #[tokio::test]
    async fn test_long_name_is_capped() {
        let mut h = Harness::new(ServerConfig::default());
        let long = "é".repeat(MAX_NAME_LEN);
        let (mut client, _task) = h.connect();
        write_message(&mut client, &Message::login(long.as_str())).await.unwrap();

        let ack = next_of_kind(&mut client, MessageKind::Join).await;
        assert_eq!(ack.from, "é".repeat(MAX_NAME_LEN / 2));
        let session = h.ctx.registry.get(&ack.id.as_str().into()).await.unwrap();
        assert_eq!(session.display_name().len(), MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn test_full_size_message_relays_within_frame_limit() {
        use crate::protocol::constants::MAX_PAYLOAD_SIZE;
        use crate::protocol::payload_len;

        let mut h = Harness::new(ServerConfig::default());
        let (mut alice, alice_task, _) = h.join("alice").await;
        let (mut bob, _bob_task, bob_id) = h.join("bob").await;

        // Empty sender fields leave the whole frame to the content
        let mut big = Message::normal("", "", "x".repeat(MAX_PAYLOAD_SIZE - 17));
        big.timestamp = 1;
        assert_eq!(payload_len(&big), MAX_PAYLOAD_SIZE);
        write_message(&mut bob, &big).await.unwrap();

        let relayed = next_of_kind(&mut alice, MessageKind::Normal).await;
        assert_eq!(relayed.from, "bob");
        assert_eq!(relayed.id, bob_id);
        assert!(payload_len(&relayed) <= MAX_PAYLOAD_SIZE);
        assert!(relayed.content.len() < big.content.len());

        write_message(&mut bob, &Message::normal("bob", bob_id.as_str(), "after"))
            .await
            .unwrap();
        let next = next_of_kind(&mut alice, MessageKind::Normal).await;
        assert_eq!(next.content, "after");
        assert!(!alice_task.is_finished());
        assert_eq!(h.ctx.registry.count().await, 2);
    }
}
