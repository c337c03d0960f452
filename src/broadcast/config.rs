//! Broadcast pipeline configuration

/// What `enqueue` does when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaturationPolicy {
    /// Wait for room. Backpressure reaches the sender's read loop.
    Block,
    /// Drop the new message and log a warning
    DropNewest,
}

/// How messages are spread over the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// One queue drained by every worker. No ordering across workers.
    Shared,
    /// One queue per worker, chosen by sender id. Per-sender FIFO.
    PartitionBySender,
}

/// Broadcast pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Messages in flight across all queues
    pub capacity: usize,

    /// Worker tasks draining the queue(s)
    pub workers: usize,

    /// Behavior on a full queue
    pub saturation: SaturationPolicy,

    /// Queue layout
    pub dispatch: Dispatch,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            workers: 5,
            saturation: SaturationPolicy::Block,
            dispatch: Dispatch::Shared,
        }
    }
}

impl PipelineConfig {
    /// Set total queue capacity (at least 1)
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Set worker count (at least 1)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn saturation(mut self, policy: SaturationPolicy) -> Self {
        self.saturation = policy;
        self
    }

    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Capacity of each queue for the configured layout
    pub fn lane_capacity(&self) -> usize {
        match self.dispatch {
            Dispatch::Shared => self.capacity.max(1),
            Dispatch::PartitionBySender => (self.capacity / self.workers.max(1)).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.workers, 5);
        assert_eq!(config.saturation, SaturationPolicy::Block);
        assert_eq!(config.dispatch, Dispatch::Shared);
        assert_eq!(config.lane_capacity(), 1000);
    }

    #[test]
    fn test_zero_values_clamped() {
        let config = PipelineConfig::default().capacity(0).workers(0);
        assert_eq!(config.capacity, 1);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_partitioned_lane_capacity() {
        let config = PipelineConfig::default()
            .capacity(1000)
            .workers(4)
            .dispatch(Dispatch::PartitionBySender);
        assert_eq!(config.lane_capacity(), 250);

        let config = config.capacity(2).workers(8);
        assert_eq!(config.lane_capacity(), 1);
    }
}
