//! Chat client
//!
//! High-level API for joining a chat server, sending text and keeping the
//! session alive with heartbeats.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};

use crate::error::{Error, Result};
use crate::protocol::{read_message, unix_now, write_message, Message, MessageKind};

use super::config::ClientConfig;

/// Events from the chat client
#[derive(Debug)]
pub enum ClientEvent {
    /// Logged in; carries the server-assigned id
    Connected { name: String, id: String },

    /// Frame received from the server
    Message(Message),

    /// Connection is gone
    Disconnected(String),
}

/// Locally tracked activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Normal messages sent this session
    pub score: u64,
    /// Time of the last Normal message, seconds since the Unix epoch
    pub last_activity: Option<i64>,
}

/// State shared by the client and its background tasks
struct Link {
    name: String,
    id: String,
    /// `None` once closed
    writer: Mutex<Option<OwnedWriteHalf>>,
    write_timeout: Duration,
    stop: watch::Sender<bool>,
}

impl Link {
    async fn send(&self, msg: &Message) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        timeout(self.write_timeout, write_message(writer, msg)).await?
    }

    /// Send Leave if possible and close. Returns `true` only for the call that closed.
    async fn close(&self) -> bool {
        let writer = self.writer.lock().await.take();
        self.stop.send_replace(true);

        match writer {
            Some(mut writer) => {
                let leave = Message::leave(self.name.as_str(), self.id.as_str());
                let _ = timeout(self.write_timeout, write_message(&mut writer, &leave)).await;
                let _ = writer.shutdown().await;
                true
            }
            None => false,
        }
    }

    fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

/// Chat client
///
/// # Example
/// ```no_run
/// use chatroom_rs::client::{ChatClient, ClientConfig, ClientEvent};
///
/// # async fn example() -> chatroom_rs::error::Result<()> {
/// let (mut client, mut events) = ChatClient::new(ClientConfig::new("127.0.0.1:8888"));
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// client.connect("alice").await?;
/// client.send_text("hello").await?;
/// client.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ChatClient {
    config: ClientConfig,
    event_tx: mpsc::Sender<ClientEvent>,
    link: Option<Arc<Link>>,
    tasks: Vec<JoinHandle<()>>,
    stats: ClientStats,
}

impl ChatClient {
    /// Create a new client.
    ///
    /// Returns the client and a receiver for events.
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel(256);

        let client = Self {
            config,
            event_tx: tx,
            link: None,
            tasks: Vec::new(),
            stats: ClientStats::default(),
        };

        (client, rx)
    }

    /// Connect, log in under `name` and start the receive and heartbeat tasks.
    pub async fn connect(&mut self, name: &str) -> Result<()> {
        let stream = timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.server_addr.as_str()),
        )
        .await??;
        stream.set_nodelay(true)?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_message(&mut writer, &Message::login(name)).await?;
        let ack = timeout(self.config.connect_timeout, wait_for_welcome(&mut reader)).await??;

        tracing::debug!(name = %ack.from, id = %ack.id, "Logged in");

        let (stop, stop_rx) = watch::channel(false);
        let link = Arc::new(Link {
            name: ack.from.clone(),
            id: ack.id.clone(),
            writer: Mutex::new(Some(writer)),
            write_timeout: self.config.write_timeout,
            stop,
        });

        self.tasks.push(tokio::spawn(receive_loop(
            reader,
            Arc::clone(&link),
            stop_rx.clone(),
            self.event_tx.clone(),
        )));
        self.tasks.push(tokio::spawn(heartbeat_loop(
            Arc::clone(&link),
            self.config.heartbeat_interval,
            stop_rx,
            self.event_tx.clone(),
        )));

        let _ = self
            .event_tx
            .send(ClientEvent::Connected {
                name: ack.from,
                id: ack.id,
            })
            .await;

        self.link = Some(link);
        self.stats = ClientStats::default();
        Ok(())
    }

    /// Send chat text to everyone else in the room.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        let link = self.link()?;
        link.send(&Message::normal(link.name.as_str(), link.id.as_str(), text))
            .await?;

        self.stats.score += 1;
        self.stats.last_activity = Some(unix_now());
        Ok(())
    }

    /// Ask for the leaderboard. The reply arrives as a Rank event.
    pub async fn request_rank(&self) -> Result<()> {
        let link = self.link()?;
        link.send(&Message::rank_request(link.name.as_str(), link.id.as_str()))
            .await
    }

    /// Send Leave, close the connection and stop the background tasks.
    pub async fn shutdown(&mut self) {
        if let Some(link) = self.link.take() {
            if link.close().await {
                let _ = self
                    .event_tx
                    .send(ClientEvent::Disconnected("client shutdown".into()))
                    .await;
            }
        }

        for mut task in self.tasks.drain(..) {
            if timeout(self.config.write_timeout, &mut task).await.is_err() {
                task.abort();
            }
        }
    }

    /// Check if currently logged in and the connection is up.
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| !link.is_stopped())
    }

    /// Server-assigned id
    pub fn id(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.id.as_str())
    }

    /// Display name as confirmed by the server
    pub fn name(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.name.as_str())
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    fn link(&self) -> Result<&Arc<Link>> {
        self.link
            .as_ref()
            .filter(|link| !link.is_stopped())
            .ok_or(Error::ConnectionClosed)
    }
}

/// Skip frames until the Join acknowledgement that carries our id
async fn wait_for_welcome(reader: &mut BufReader<OwnedReadHalf>) -> Result<Message> {
    loop {
        let msg = read_message(reader).await?;
        if msg.kind == MessageKind::Join && !msg.id.is_empty() {
            return Ok(msg);
        }
    }
}

async fn receive_loop(
    mut reader: BufReader<OwnedReadHalf>,
    link: Arc<Link>,
    mut stop: watch::Receiver<bool>,
    events: mpsc::Sender<ClientEvent>,
) {
    loop {
        let read = tokio::select! {
            _ = stop.changed() => break,
            read = read_message(&mut reader) => read,
        };

        match read {
            Ok(msg) => {
                let _ = events.send(ClientEvent::Message(msg)).await;
            }
            Err(e) => {
                if link.close().await {
                    tracing::debug!(error = %e, "Connection lost");
                    let _ = events.send(ClientEvent::Disconnected(e.to_string())).await;
                }
                break;
            }
        }
    }
}

async fn heartbeat_loop(
    link: Arc<Link>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    events: mpsc::Sender<ClientEvent>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                let heartbeat = Message::heartbeat(link.name.as_str(), link.id.as_str());
                if let Err(e) = link.send(&heartbeat).await {
                    tracing::warn!(error = %e, "Heartbeat failed, shutting down");
                    if link.close().await {
                        let reason = format!("heartbeat failed: {}", e);
                        let _ = events.send(ClientEvent::Disconnected(reason)).await;
                    }
                    break;
                }
            }
        }
    }
}
