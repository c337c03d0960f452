//! Activity store adapter
//!
//! Wraps an [`ActivityBackend`] with per-call deadlines and logging. Every
//! store failure stops here: it is logged and handed back as a `StoreError`
//! for the caller to shrug off. Nothing in this module ends a connection.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::backend::{ActivityBackend, ScoreEntry, UserProfile};
use super::config::StoreConfig;
use super::report::{Leaderboard, LeaderboardRow, Standing};
use crate::error::StoreError;
use crate::protocol::unix_now;
use crate::registry::Departure;
use crate::session::SessionId;

/// Activity tracking backed by an external ordered-set store
pub struct ActivityStore<B: ActivityBackend> {
    backend: B,
    config: StoreConfig,
}

impl<B: ActivityBackend> ActivityStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    pub fn with_config(backend: B, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Count one Normal message: score +1 and last-active updated together
    pub async fn record_activity(&self, user_id: &SessionId) -> Result<u64, StoreError> {
        let at = unix_now();
        self.call(
            "record_activity",
            user_id,
            self.backend.increment(user_id.as_str(), 1, at),
        )
        .await
    }

    /// Create the user's zero score if absent and (re)write its profile
    pub async fn register_user(
        &self,
        user_id: &SessionId,
        display_name: &str,
        joined_at: i64,
    ) -> Result<(), StoreError> {
        let profile = UserProfile {
            display_name: display_name.to_string(),
            joined_at,
            last_active: unix_now(),
        };
        self.call(
            "register_user",
            user_id,
            self.backend.register(user_id.as_str(), profile),
        )
        .await
    }

    /// Delete the score and profile left by the login at `joined_at`,
    /// bounded by `cleanup_timeout`. A newer login under the same id keeps
    /// its record.
    pub async fn remove_user(&self, user_id: &SessionId, joined_at: i64) -> Result<(), StoreError> {
        let result = timeout(
            self.config.cleanup_timeout,
            self.backend.remove(user_id.as_str(), joined_at),
        )
        .await
        .unwrap_or(Err(StoreError::Timeout));

        match result {
            Ok(removed) => {
                tracing::debug!(session_id = %user_id, removed = removed, "Activity record removed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = %user_id, error = %e, "Failed to remove activity record");
                Err(e)
            }
        }
    }

    /// Highest `n` scores, best first
    pub async fn top_n(&self, n: usize) -> Result<Vec<ScoreEntry>, StoreError> {
        match timeout(self.config.op_timeout, self.backend.top(n)).await {
            Ok(Ok(entries)) => Ok(entries),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to read top scores");
                Err(e)
            }
            Err(_) => {
                tracing::warn!("Timed out reading top scores");
                Err(StoreError::Timeout)
            }
        }
    }

    /// The user's score and rank; rank is `None` when the user has no record
    pub async fn score_and_rank(&self, user_id: &SessionId) -> Result<Standing, StoreError> {
        let placement = self
            .call(
                "score_and_rank",
                user_id,
                self.backend.placement(user_id.as_str()),
            )
            .await?;

        Ok(match placement {
            Some(p) => Standing {
                score: p.score,
                rank: Some(p.rank),
            },
            None => Standing::default(),
        })
    }

    /// Build the leaderboard for one caller
    ///
    /// Never fails: store errors yield an empty or partial report flagged as
    /// degraded.
    pub async fn leaderboard(&self, caller: &SessionId, caller_name: &str, n: usize) -> Leaderboard {
        let mut board = Leaderboard {
            caller_id: caller.to_string(),
            caller_name: caller_name.to_string(),
            ..Default::default()
        };

        match self.top_n(n).await {
            Ok(entries) => {
                for entry in entries {
                    let id = SessionId::new(entry.user_id.as_str());
                    let profile = match self.call("profile", &id, self.backend.profile(&entry.user_id)).await {
                        Ok(profile) => profile,
                        Err(_) => {
                            board.degraded = true;
                            None
                        }
                    };

                    board.rows.push(LeaderboardRow {
                        display_name: profile
                            .as_ref()
                            .map(|p| p.display_name.clone())
                            .unwrap_or_default(),
                        last_active: profile.map(|p| p.last_active),
                        user_id: entry.user_id,
                        score: entry.score,
                    });
                }
            }
            Err(_) => board.degraded = true,
        }

        match self.score_and_rank(caller).await {
            Ok(standing) => board.standing = standing,
            Err(_) => board.degraded = true,
        }

        board
    }

    /// Remove the records of departed sessions in the background
    ///
    /// Each id gets its own task so one slow removal never delays another.
    pub fn spawn_cleanup_task(
        self: &Arc<Self>,
        mut departures: mpsc::UnboundedReceiver<Departure>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(departure) = departures.recv().await {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let _ = store
                        .remove_user(&departure.id, departure.joined_at)
                        .await;
                });
            }
            tracing::debug!("Activity cleanup task stopped");
        })
    }

    async fn call<T, F>(&self, op: &'static str, user_id: &SessionId, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match timeout(self.config.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(op = op, session_id = %user_id, error = %e, "Activity store call failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(op = op, session_id = %user_id, "Activity store call timed out");
                Err(StoreError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::activity::{MemoryBackend, Placement};

    /// Backend whose every call fails
    struct DownBackend;

    impl ActivityBackend for DownBackend {
        async fn increment(&self, _: &str, _: u64, _: i64) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn register(&self, _: &str, _: UserProfile) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn remove(&self, _: &str, _: i64) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn top(&self, _: usize) -> Result<Vec<ScoreEntry>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn placement(&self, _: &str) -> Result<Option<Placement>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn profile(&self, _: &str) -> Result<Option<UserProfile>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    /// Backend that never answers
    struct HungBackend;

    impl ActivityBackend for HungBackend {
        async fn increment(&self, _: &str, _: u64, _: i64) -> Result<u64, StoreError> {
            std::future::pending().await
        }
        async fn register(&self, _: &str, _: UserProfile) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn remove(&self, _: &str, _: i64) -> Result<bool, StoreError> {
            std::future::pending().await
        }
        async fn top(&self, _: usize) -> Result<Vec<ScoreEntry>, StoreError> {
            std::future::pending().await
        }
        async fn placement(&self, _: &str) -> Result<Option<Placement>, StoreError> {
            std::future::pending().await
        }
        async fn profile(&self, _: &str) -> Result<Option<UserProfile>, StoreError> {
            std::future::pending().await
        }
    }

    fn id(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[tokio::test]
    async fn test_record_activity_counts_messages() {
        let store = ActivityStore::new(MemoryBackend::new());
        store.register_user(&id("a1b2"), "alice", 100).await.unwrap();

        for expected in 1..=3 {
            assert_eq!(store.record_activity(&id("a1b2")).await.unwrap(), expected);
        }

        let standing = store.score_and_rank(&id("a1b2")).await.unwrap();
        assert_eq!(standing, Standing { score: 3, rank: Some(0) });
    }

    #[tokio::test]
    async fn test_unknown_user_is_unranked() {
        let store = ActivityStore::new(MemoryBackend::new());
        let standing = store.score_and_rank(&id("zzzz")).await.unwrap();
        assert_eq!(standing, Standing { score: 0, rank: None });
    }

    #[tokio::test]
    async fn test_fresh_user_ranks_last_among_zero_scores() {
        let store = ActivityStore::new(MemoryBackend::new());
        store.register_user(&id("a1b2"), "alice", 100).await.unwrap();
        store.register_user(&id("c3d4"), "bob", 101).await.unwrap();
        store.record_activity(&id("c3d4")).await.unwrap();
        store.register_user(&id("e5f6"), "carol", 102).await.unwrap();

        let standing = store.score_and_rank(&id("e5f6")).await.unwrap();
        assert_eq!(standing, Standing { score: 0, rank: Some(2) });
    }

    #[tokio::test]
    async fn test_remove_user() {
        let store = ActivityStore::new(MemoryBackend::new());
        store.register_user(&id("a1b2"), "alice", 100).await.unwrap();
        store.remove_user(&id("a1b2"), 100).await.unwrap();

        assert!(store.backend().is_empty().await);
    }

    #[tokio::test]
    async fn test_leaderboard() {
        let store = ActivityStore::new(MemoryBackend::new());
        store.register_user(&id("a1b2"), "alice", 100).await.unwrap();
        store.register_user(&id("c3d4"), "bob", 100).await.unwrap();
        for _ in 0..3 {
            store.record_activity(&id("a1b2")).await.unwrap();
        }

        let board = store.leaderboard(&id("c3d4"), "bob", 10).await;
        assert!(!board.degraded);
        assert_eq!(board.rows.len(), 2);
        assert_eq!(board.rows[0].display_name, "alice");
        assert_eq!(board.rows[0].score, 3);
        assert_eq!(board.standing, Standing { score: 0, rank: Some(1) });
        assert!(board.render().contains("Your rank: #2 [bob(c3d4)] current score: 0"));
    }

    #[tokio::test]
    async fn test_failures_are_contained() {
        let store = ActivityStore::new(DownBackend);

        assert!(matches!(
            store.record_activity(&id("a1b2")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.remove_user(&id("a1b2"), 100).await.is_err());

        let board = store.leaderboard(&id("a1b2"), "alice", 10).await;
        assert!(board.degraded);
        assert!(board.rows.is_empty());
        assert_eq!(board.standing.rank, None);
    }

    #[tokio::test]
    async fn test_hung_store_times_out() {
        let config = StoreConfig::default()
            .op_timeout(Duration::from_millis(20))
            .cleanup_timeout(Duration::from_millis(20));
        let store = ActivityStore::with_config(HungBackend, config);

        assert_eq!(
            store.record_activity(&id("a1b2")).await,
            Err(StoreError::Timeout)
        );
        assert_eq!(store.remove_user(&id("a1b2"), 100).await, Err(StoreError::Timeout));
        assert!(store.leaderboard(&id("a1b2"), "alice", 10).await.degraded);
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_departed() {
        let store = Arc::new(ActivityStore::new(MemoryBackend::new()));
        store.register_user(&id("a1b2"), "alice", 100).await.unwrap();
        store.register_user(&id("c3d4"), "bob", 100).await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = store.spawn_cleanup_task(rx);

        tx.send(Departure { id: id("a1b2"), joined_at: 100 }).unwrap();
        drop(tx);
        handle.await.unwrap();

        // Removal runs in its own task; give it a moment
        for _ in 0..50 {
            if store.backend().len().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.backend().len().await, 1);
        assert!(store.score_and_rank(&id("c3d4")).await.unwrap().rank.is_some());
    }

    #[tokio::test]
    async fn test_late_cleanup_keeps_reused_id() {
        let store = Arc::new(ActivityStore::new(MemoryBackend::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = store.spawn_cleanup_task(rx);

        // Same id handed to a new login before the old one's cleanup runs
        store.register_user(&id("a1b2"), "alice", 100).await.unwrap();
        store.register_user(&id("a1b2"), "bob", 160).await.unwrap();
        store.record_activity(&id("a1b2")).await.unwrap();

        tx.send(Departure { id: id("a1b2"), joined_at: 100 }).unwrap();
        drop(tx);
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let board = store.leaderboard(&id("a1b2"), "bob", 10).await;
        assert_eq!(board.rows.len(), 1);
        assert_eq!(board.rows[0].display_name, "bob");
        assert_eq!(board.standing.score, 1);

        store.remove_user(&id("a1b2"), 160).await.unwrap();
        assert!(store.backend().is_empty().await);
    }
}
