//! Handles shared by every connection of one running server

use std::sync::Arc;

use crate::activity::{ActivityBackend, ActivityStore};
use crate::broadcast::BroadcastPipeline;
use crate::registry::SessionRegistry;
use crate::server::config::ServerConfig;
use crate::stats::ServerMetrics;

/// Everything a connection handler needs besides its socket
pub struct ServerContext<B: ActivityBackend> {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub activity: Arc<ActivityStore<B>>,
    pub pipeline: BroadcastPipeline,
    pub metrics: Arc<ServerMetrics>,
}

impl<B: ActivityBackend> ServerContext<B> {
    pub fn new(
        config: Arc<ServerConfig>,
        registry: Arc<SessionRegistry>,
        activity: Arc<ActivityStore<B>>,
        pipeline: BroadcastPipeline,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            config,
            registry,
            activity,
            pipeline,
            metrics,
        }
    }
}

// Manual impl: a derive would require `B: Clone`
impl<B: ActivityBackend> Clone for ServerContext<B> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            activity: Arc::clone(&self.activity),
            pipeline: self.pipeline.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}
