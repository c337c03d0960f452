//! Server-wide counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time copy of the server counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Connections accepted
    pub connections_accepted: u64,
    /// Connections refused by the connection limit
    pub connections_rejected: u64,
    /// Sessions that completed login
    pub sessions_opened: u64,
    /// Sessions torn down
    pub sessions_closed: u64,
    /// Frames decoded from clients
    pub messages_received: u64,
    /// Messages accepted by the broadcast pipeline
    pub broadcasts_enqueued: u64,
    /// Messages dropped because the pipeline was saturated
    pub broadcasts_dropped: u64,
    /// Successful per-recipient writes
    pub deliveries: u64,
    /// Failed per-recipient writes
    pub delivery_failures: u64,
    /// Time since the counters were created
    pub uptime: Duration,
}

impl ServerStats {
    /// Sessions currently open according to the counters
    pub fn sessions_open(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }
}

/// Lock-free counters shared by the listener, connections and workers
#[derive(Debug)]
pub struct ServerMetrics {
    started_at: Instant,
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    messages_received: AtomicU64,
    broadcasts_enqueued: AtomicU64,
    broadcasts_dropped: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            broadcasts_enqueued: AtomicU64::new(0),
            broadcasts_dropped: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_enqueued(&self) {
        self.broadcasts_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_dropped(&self) {
        self.broadcasts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivery_failed(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            broadcasts_enqueued: self.broadcasts_enqueued.load(Ordering::Relaxed),
            broadcasts_dropped: self.broadcasts_dropped.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
