//! In-process activity backend
//!
//! Sorted-set semantics over a `HashMap` guarded by one `RwLock`, so every
//! backend call is atomic with respect to every other.

use std::cmp::Reverse;
use std::collections::HashMap;

use tokio::sync::RwLock;

use super::backend::{ActivityBackend, Placement, ScoreEntry, UserProfile};
use crate::error::StoreError;

#[derive(Debug)]
struct Record {
    score: u64,
    /// Creation order, breaks score ties
    seq: u64,
    profile: UserProfile,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, Record>,
    next_seq: u64,
}

impl Inner {
    fn insert_if_absent(&mut self, user_id: &str) -> &mut Record {
        let next_seq = &mut self.next_seq;
        self.records.entry(user_id.to_string()).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            Record {
                score: 0,
                seq,
                profile: UserProfile::default(),
            }
        })
    }

    fn ranked(&self) -> Vec<(&String, &Record)> {
        let mut ranked: Vec<_> = self.records.iter().collect();
        ranked.sort_by_key(|(_, r)| (Reverse(r.score), r.seq));
        ranked
    }
}

/// Activity backend held in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked users
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

impl ActivityBackend for MemoryBackend {
    async fn increment(&self, user_id: &str, delta: u64, at: i64) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner.insert_if_absent(user_id);
        record.score = record.score.saturating_add(delta);
        record.profile.last_active = at;
        Ok(record.score)
    }

    async fn register(&self, user_id: &str, profile: UserProfile) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.insert_if_absent(user_id).profile = profile;
        Ok(())
    }

    async fn remove(&self, user_id: &str, joined_at: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let owned = inner
            .records
            .get(user_id)
            .is_some_and(|r| r.profile.joined_at == 0 || r.profile.joined_at == joined_at);
        if owned {
            inner.records.remove(user_id);
        }
        Ok(owned)
    }

    async fn top(&self, n: usize) -> Result<Vec<ScoreEntry>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .ranked()
            .into_iter()
            .take(n)
            .map(|(id, r)| ScoreEntry {
                user_id: id.clone(),
                score: r.score,
            })
            .collect())
    }

    async fn placement(&self, user_id: &str) -> Result<Option<Placement>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .ranked()
            .into_iter()
            .position(|(id, _)| id == user_id)
            .map(|rank| Placement {
                score: inner.records[user_id].score,
                rank,
            }))
    }

    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.records.get(user_id).map(|r| r.profile.clone()))
    }
}
