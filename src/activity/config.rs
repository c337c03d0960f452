//! Activity store configuration

use std::time::Duration;

/// Activity store adapter configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Deadline for a single store call
    pub op_timeout: Duration,

    /// Deadline for removing a departed user's record
    pub cleanup_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(2),
            cleanup_timeout: Duration::from_secs(3),
        }
    }
}

impl StoreConfig {
    /// Set the per-call deadline
    pub fn op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Set the cleanup deadline
    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }
}
