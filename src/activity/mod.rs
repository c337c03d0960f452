//! Activity tracking and the leaderboard
//!
//! Scores live in an external ordered-set store reached through
//! [`ActivityBackend`]. The [`ActivityStore`] adapter is the only component
//! that talks to it; the server never caches scores itself.
//!
//! Ranking order is score descending, then record creation order. A user
//! gets a zero-score record at login, so a freshly joined user is ranked
//! last among the zero-score users rather than reported as unranked.

pub mod backend;
pub mod config;
pub mod memory;
pub mod report;
pub mod store;

pub use backend::{ActivityBackend, Placement, ScoreEntry, UserProfile};
pub use config::StoreConfig;
pub use memory::MemoryBackend;
pub use report::{format_clock, Leaderboard, LeaderboardRow, Standing};
pub use store::ActivityStore;
