//! Broadcast pipeline implementation

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};

use super::config::{Dispatch, PipelineConfig, SaturationPolicy};
use super::error::BroadcastError;
use crate::error::Error;
use crate::protocol::{encode, Message};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionId};
use crate::stats::ServerMetrics;

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Producer handle for the broadcast queue
///
/// Cheap to clone. The workers drain what is left and exit once every
/// handle has been dropped.
#[derive(Clone)]
pub struct BroadcastPipeline {
    lanes: Vec<mpsc::Sender<Message>>,
    saturation: SaturationPolicy,
    registry: Arc<SessionRegistry>,
    metrics: Arc<ServerMetrics>,
}

/// Handles of the running broadcast workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

enum Lane {
    Shared(Arc<Mutex<mpsc::Receiver<Message>>>),
    Owned(mpsc::Receiver<Message>),
}

impl Lane {
    async fn recv(&mut self) -> Option<Message> {
        match self {
            Lane::Shared(rx) => rx.lock().await.recv().await,
            Lane::Owned(rx) => rx.recv().await,
        }
    }
}

impl BroadcastPipeline {
    /// Create the queue(s) and spawn the worker pool
    pub fn start(
        config: PipelineConfig,
        registry: Arc<SessionRegistry>,
        metrics: Arc<ServerMetrics>,
    ) -> (Self, WorkerPool) {
        let workers = config.workers.max(1);
        let capacity = config.lane_capacity();

        let (lanes, receivers): (Vec<_>, Vec<_>) = match config.dispatch {
            Dispatch::Shared => {
                let (tx, rx) = mpsc::channel(capacity);
                let rx = Arc::new(Mutex::new(rx));
                let receivers = (0..workers).map(|_| Lane::Shared(Arc::clone(&rx))).collect();
                (vec![tx], receivers)
            }
            Dispatch::PartitionBySender => (0..workers)
                .map(|_| {
                    let (tx, rx) = mpsc::channel(capacity);
                    (tx, Lane::Owned(rx))
                })
                .unzip(),
        };

        let handles = receivers
            .into_iter()
            .enumerate()
            .map(|(worker_id, lane)| {
                let registry = Arc::clone(&registry);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(run_worker(worker_id, lane, registry, metrics))
            })
            .collect();

        tracing::debug!(
            workers = workers,
            capacity = capacity,
            dispatch = ?config.dispatch,
            saturation = ?config.saturation,
            "Broadcast workers started"
        );

        let pipeline = Self {
            lanes,
            saturation: config.saturation,
            registry,
            metrics,
        };

        (pipeline, WorkerPool { handles })
    }

    /// Queue a message for every session except its sender
    ///
    /// Under `SaturationPolicy::Block` this waits for room in the queue.
    pub async fn enqueue(&self, msg: Message) -> Result<(), BroadcastError> {
        let lane = &self.lanes[self.lane_for(&msg.id)];

        match self.saturation {
            SaturationPolicy::Block => lane.send(msg).await.map_err(|_| BroadcastError::Closed)?,
            SaturationPolicy::DropNewest => match lane.try_send(msg) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    self.metrics.broadcast_dropped();
                    tracing::warn!(
                        session_id = %msg.id,
                        "Broadcast queue saturated, message dropped"
                    );
                    return Err(BroadcastError::Saturated);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(BroadcastError::Closed),
            },
        }

        self.metrics.broadcast_enqueued();
        Ok(())
    }

    /// Send a message to every current session without queueing or waiting
    ///
    /// Used for System announcements. Each recipient gets its own task.
    pub async fn announce(&self, msg: &Message) {
        let frame = match encode(msg) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Announcement not sent");
                return;
            }
        };

        for session in self.registry.snapshot().await {
            let frame = frame.clone();
            let metrics = Arc::clone(&self.metrics);
            tokio::spawn(async move {
                let result = session.send_frame(frame).await;
                record_send(&metrics, &session, result);
            });
        }
    }

    fn lane_for(&self, sender: &str) -> usize {
        if self.lanes.len() == 1 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        sender.hash(&mut hasher);
        (hasher.finish() % self.lanes.len() as u64) as usize
    }
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit
    ///
    /// A handle is dropped only once its worker has finished, so a join cut
    /// short by a timeout can be followed by `abort`.
    pub async fn join(&mut self) {
        while let Some(handle) = self.handles.last_mut() {
            let _ = handle.await;
            self.handles.pop();
        }
    }

    /// Stop the workers without draining
    pub async fn abort(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.join().await;
    }
}

/// Write `msg` to every session in a registry snapshot whose id differs from
/// the message's id. Waits for all writes; one failure never affects another.
pub async fn fan_out(
    registry: &SessionRegistry,
    metrics: &ServerMetrics,
    msg: &Message,
) -> Delivery {
    let sender = SessionId::new(msg.id.as_str());
    let frame: Bytes = match encode(msg) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(session_id = %msg.id, error = %e, "Broadcast not encodable, dropped");
            return Delivery::default();
        }
    };

    let mut sends = JoinSet::new();
    for session in registry.snapshot().await {
        if *session.id() == sender {
            continue;
        }
        let frame = frame.clone();
        sends.spawn(async move {
            let result = session.send_frame(frame).await;
            (session, result)
        });
    }

    let mut delivery = Delivery::default();
    while let Some(joined) = sends.join_next().await {
        match joined {
            Ok((session, result)) => {
                if result.is_ok() {
                    delivery.delivered += 1;
                } else {
                    delivery.failed += 1;
                }
                record_send(metrics, &session, result);
            }
            Err(e) => {
                delivery.failed += 1;
                metrics.delivery_failed();
                tracing::warn!(error = %e, "Delivery task failed");
            }
        }
    }

    delivery
}

async fn run_worker(
    worker_id: usize,
    mut lane: Lane,
    registry: Arc<SessionRegistry>,
    metrics: Arc<ServerMetrics>,
) {
    while let Some(msg) = lane.recv().await {
        let delivery = fan_out(&registry, &metrics, &msg).await;
        tracing::trace!(
            worker = worker_id,
            session_id = %msg.id,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Broadcast delivered"
        );
    }

    tracing::debug!(worker = worker_id, "Broadcast worker stopped");
}

// Teardown of a failed recipient is left to its own connection handler
fn record_send(metrics: &ServerMetrics, session: &Session, result: Result<(), Error>) {
    match result {
        Ok(()) => metrics.delivered(),
        Err(e) => {
            metrics.delivery_failed();
            tracing::warn!(
                session_id = %session.id(),
                name = session.display_name(),
                error = %e,
                "Failed to deliver message"
            );
        }
    }
}
