//! Leaderboard report

use std::fmt::Write;

/// One leaderboard line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub user_id: String,
    pub display_name: String,
    pub score: u64,
    /// `None` when the profile could not be read
    pub last_active: Option<i64>,
}

/// The caller's own standing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Standing {
    pub score: u64,
    /// 0-based rank, `None` if the caller has no record
    pub rank: Option<usize>,
}

/// Leaderboard as returned to one caller
#[derive(Debug, Clone, Default)]
pub struct Leaderboard {
    pub rows: Vec<LeaderboardRow>,
    pub caller_id: String,
    pub caller_name: String,
    pub standing: Standing,
    /// Some store call failed; the report may be empty or partial
    pub degraded: bool,
}

impl Leaderboard {
    /// Human-readable report
    pub fn render(&self) -> String {
        let mut out = String::from("=== Activity Leaderboard ===\n");

        if self.rows.is_empty() {
            out.push_str("(no active users yet)\n");
        }

        for (i, row) in self.rows.iter().enumerate() {
            let last_active = row
                .last_active
                .map(format_clock)
                .unwrap_or_else(|| "just now".to_string());
            let mark = if row.user_id == self.caller_id { " <- you" } else { "" };

            let _ = writeln!(
                out,
                "{}. {:<15} ({}) (score: {:>4}) [last active: {}]{}",
                i + 1,
                row.display_name,
                row.user_id,
                row.score,
                last_active,
                mark
            );
        }

        let rank = match self.standing.rank {
            Some(rank) => format!("Your rank: #{}", rank + 1),
            None => "You are not yet ranked".to_string(),
        };
        let _ = write!(
            out,
            "\n{} [{}({})] current score: {}\n",
            rank, self.caller_name, self.caller_id, self.standing.score
        );

        if self.degraded {
            out.push_str("(leaderboard partially unavailable)\n");
        }

        out
    }
}

/// `HH:MM` (UTC) for a Unix timestamp
pub fn format_clock(unix_secs: i64) -> String {
    let secs_of_day = unix_secs.rem_euclid(86_400);
    format!("{:02}:{:02}", secs_of_day / 3600, (secs_of_day % 3600) / 60)
}
