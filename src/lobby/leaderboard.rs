//! Leaderboard projection

use serde::Serialize;

use crate::peer::RoomCode;

use super::state::LobbyState;

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub id: RoomCode,
    pub name: String,
    pub score: u32,
}

/// Highest scores first, ties broken by peer id, at most `limit` rows
pub fn project(state: &LobbyState, limit: usize) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<LeaderboardEntry> = state
        .records()
        .map(|r| LeaderboardEntry {
            id: r.id.clone(),
            name: r.display_name.clone(),
            score: r.score,
        })
        .collect();

    rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    rows.truncate(limit);
    rows
}
