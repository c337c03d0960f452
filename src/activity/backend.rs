//! Activity backend interface
//!
//! The primitives the server needs from an ordered-set key-value store:
//! atomic score increment, insert-if-absent, top-N by score, per-key rank,
//! and per-key profile metadata with delete. Each method is one atomic unit
//! from the caller's point of view.

use std::future::Future;

use crate::error::StoreError;

/// Profile metadata kept next to a user's score
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub display_name: String,
    /// Seconds since the Unix epoch
    pub joined_at: i64,
    /// Seconds since the Unix epoch
    pub last_active: i64,
}

/// One row of a score ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub user_id: String,
    pub score: u64,
}

/// A user's score and 0-based rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub score: u64,
    pub rank: usize,
}

/// Storage primitives behind the activity adapter
///
/// Ranking order is score descending; equal scores rank by record creation
/// order, earliest first.
pub trait ActivityBackend: Send + Sync + 'static {
    /// Add `delta` to the user's score and set its last-active time.
    /// Creates the score entry if absent. Returns the new score.
    fn increment(
        &self,
        user_id: &str,
        delta: u64,
        at: i64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Create a zero score entry if none exists and (re)write the profile
    fn register(
        &self,
        user_id: &str,
        profile: UserProfile,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete score entry and profile if they belong to the login made at
    /// `joined_at`. A record without a profile belongs to any login.
    /// Returns whether anything was removed.
    fn remove(
        &self,
        user_id: &str,
        joined_at: i64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Highest `n` scores, best first
    fn top(&self, n: usize) -> impl Future<Output = Result<Vec<ScoreEntry>, StoreError>> + Send;

    /// Score and rank, or `None` if the user has no score entry
    fn placement(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<Placement>, StoreError>> + Send;

    /// Profile metadata, or `None` if absent
    fn profile(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send;
}
