//! Chat server listener
//!
//! Handles the TCP accept loop and spawns connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::activity::{ActivityBackend, ActivityStore};
use crate::broadcast::BroadcastPipeline;
use crate::error::Result;
use crate::registry::{Departure, SessionRegistry};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::context::ServerContext;
use crate::stats::{ServerMetrics, ServerStats};

/// Chat server
pub struct ChatServer<B: ActivityBackend> {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    activity: Arc<ActivityStore<B>>,
    metrics: Arc<ServerMetrics>,
    /// Taken by the first `serve` call
    departures: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Departure>>>,
    next_conn_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<B: ActivityBackend> ChatServer<B> {
    /// Create a new server with the given configuration and activity backend
    pub fn new(config: ServerConfig, backend: B) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let (departures_tx, departures_rx) = mpsc::unbounded_channel();
        let activity = ActivityStore::with_config(backend, config.store.clone());

        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::with_departures(departures_tx)),
            activity: Arc::new(activity),
            metrics: Arc::new(ServerMetrics::new()),
            departures: std::sync::Mutex::new(Some(departures_rx)),
            next_conn_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn activity(&self) -> &Arc<ActivityStore<B>> {
        &self.activity
    }

    pub fn stats(&self) -> ServerStats {
        self.metrics.snapshot()
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server fails to bind.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Chat server listening");

        self.serve(listener, shutdown).await
    }

    /// Accept on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown the listener is dropped, every connection is told to close
    /// and gets `shutdown_grace` to finish before being aborted. Sessions of
    /// aborted connections are evicted here. The broadcast workers then drain
    /// what is queued and exit.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (pipeline, mut workers) = BroadcastPipeline::start(
            self.config.pipeline.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
        );

        let departures = match self.departures.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let cleanup_handle = match departures {
            Some(rx) => Some(self.activity.spawn_cleanup_task(rx)),
            None => {
                tracing::warn!("Activity cleanup already consumed by an earlier run");
                None
            }
        };

        let ctx = ServerContext::new(
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            Arc::clone(&self.activity),
            pipeline,
            Arc::clone(&self.metrics),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        self.handle_connection(socket, peer_addr, &ctx, &shutdown_rx, &mut connections);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
                // Reap finished connections
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        let _ = shutdown_tx.send(true);

        let grace = self.config.shutdown_grace;
        let drained = timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = connections.len(),
                "Connections still open after grace period, aborting"
            );
            connections.shutdown().await;
            self.evict_remaining().await;
        }

        // Last producer handle; workers drain the queue and exit
        drop(ctx);
        if timeout(grace, workers.join()).await.is_err() {
            tracing::warn!("Broadcast workers did not drain in time, aborting");
            workers.abort().await;
        }

        if let Some(handle) = cleanup_handle {
            handle.abort();
        }

        tracing::info!("Chat server stopped");
        Ok(())
    }

    /// Unregister sessions whose handlers were aborted and remove their
    /// activity records
    async fn evict_remaining(&self) {
        let mut removals = JoinSet::new();

        for session in self.registry.snapshot().await {
            if self.registry.unregister(&session).await {
                self.metrics.session_closed();
            }
            session.close().await;

            tracing::info!(
                session_id = %session.id(),
                name = session.display_name(),
                "Evicted session of aborted connection"
            );

            let activity = Arc::clone(&self.activity);
            removals.spawn(async move {
                let _ = activity
                    .remove_user(session.id(), session.joined_at())
                    .await;
            });
        }

        while removals.join_next().await.is_some() {}
    }

    fn handle_connection(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        ctx: &ServerContext<B>,
        shutdown: &watch::Receiver<bool>,
        connections: &mut JoinSet<()>,
    ) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.metrics.connection_rejected();
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.metrics.connection_accepted();

        tracing::debug!(conn_id = conn_id, peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let ctx = ctx.clone();
        let shutdown = shutdown.clone();

        connections.spawn(async move {
            let _permit = permit;
            let mut connection = Connection::from_tcp(conn_id, socket, peer_addr, ctx, shutdown);

            if let Err(e) = connection.run().await {
                tracing::debug!(conn_id = conn_id, error = %e, "Connection error");
            }

            tracing::debug!(conn_id = conn_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}
