//! Session registry implementation

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use super::error::RegistryError;
use crate::session::{Session, SessionId};

/// Random draws before giving up on finding a free id
const MAX_ID_ATTEMPTS: usize = 32;

/// A session that has left the registry
///
/// `joined_at` tells this login apart from a later one that reuses the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub id: SessionId,
    pub joined_at: i64,
}

/// Registry of live sessions
///
/// Thread-safe via `RwLock`. Broadcast workers and online-count queries share
/// the read lock; register and unregister take the write lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,

    /// Receives every session removed by `unregister`
    departures: Option<mpsc::UnboundedSender<Departure>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            departures: None,
        }
    }

    /// Create a registry that reports removed sessions on `departures`
    pub fn with_departures(departures: mpsc::UnboundedSender<Departure>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            departures: Some(departures),
        }
    }

    /// Register a logged-in session
    ///
    /// Assigns a fresh unique id unless the session already carries one.
    /// Returns the shared handle stored in the registry.
    pub async fn register(&self, mut session: Session) -> Result<Arc<Session>, RegistryError> {
        let mut sessions = self.sessions.write().await;

        if session.id().is_assigned() {
            if sessions.contains_key(session.id()) {
                return Err(RegistryError::DuplicateId(session.id().clone()));
            }
        } else {
            let id = (0..MAX_ID_ATTEMPTS)
                .map(|_| SessionId::generate())
                .find(|id| !sessions.contains_key(id))
                .ok_or(RegistryError::IdSpaceExhausted)?;
            session.assign_id(id);
        }

        let session = Arc::new(session);
        sessions.insert(session.id().clone(), Arc::clone(&session));

        tracing::info!(
            session_id = %session.id(),
            name = session.display_name(),
            online = sessions.len(),
            "Session registered"
        );

        Ok(session)
    }

    /// Remove a session
    ///
    /// Returns `true` only for the call that actually removed it. The entry
    /// must be this exact session, so a stale handle cannot evict a newer
    /// session that reuses the id.
    pub async fn unregister(&self, session: &Arc<Session>) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(session.id()) {
                Some(current) if Arc::ptr_eq(current, session) => {
                    sessions.remove(session.id());
                    Some(sessions.len())
                }
                _ => None,
            }
        };

        let Some(online) = removed else {
            return false;
        };

        tracing::info!(
            session_id = %session.id(),
            name = session.display_name(),
            online = online,
            "Session unregistered"
        );

        if let Some(ref departures) = self.departures {
            let departure = Departure {
                id: session.id().clone(),
                joined_at: session.joined_at(),
            };
            if departures.send(departure).is_err() {
                tracing::debug!(session_id = %session.id(), "Departure listener gone");
            }
        }

        true
    }

    /// Point-in-time copy of every live session
    ///
    /// Sessions in the snapshot may disconnect at any moment; sends to them
    /// fail on their own without touching the registry.
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Number of live sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Look up a session by id
    pub async fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
