//! Lobby state reducer

use std::collections::HashMap;

use tracing::debug;

use crate::peer::RoomCode;

/// One participant as seen by the local peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub id: RoomCode,
    pub display_name: String,
    pub ready: bool,
    pub score: u32,
}

impl PeerRecord {
    pub fn new(id: RoomCode, display_name: String) -> Self {
        Self {
            id,
            display_name,
            ready: false,
            score: 0,
        }
    }
}

/// Inputs to the reducer, from local actions or remote messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyEvent {
    Joined { id: RoomCode, name: String },
    ReadyToggled { id: RoomCode, ready: bool },
    ScoreUpdated { id: RoomCode, score: u32 },
    Left { id: RoomCode },
}

/// Everyone the local peer knows about, keyed by peer id
///
/// The local peer's record is created with the state and never removed.
#[derive(Debug, Clone)]
pub struct LobbyState {
    local_id: RoomCode,
    records: HashMap<RoomCode, PeerRecord>,
}

impl LobbyState {
    pub fn new(local_id: RoomCode, local_name: impl Into<String>) -> Self {
        let mut records = HashMap::new();
        records.insert(
            local_id.clone(),
            PeerRecord::new(local_id.clone(), local_name.into()),
        );
        Self { local_id, records }
    }

    pub fn local_id(&self) -> &RoomCode {
        &self.local_id
    }

    pub fn local(&self) -> Option<&PeerRecord> {
        self.records.get(&self.local_id)
    }

    pub fn get(&self, id: &RoomCode) -> Option<&PeerRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &RoomCode) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &PeerRecord> {
        self.records.values()
    }

    /// Apply one event; returns true if anything changed
    pub fn apply(&mut self, event: LobbyEvent) -> bool {
        match event {
            LobbyEvent::Joined { id, name } => match self.records.get_mut(&id) {
                Some(record) if record.display_name == name => false,
                Some(record) => {
                    record.display_name = name;
                    true
                }
                None => {
                    debug!(peer = %id, name = %name, "Peer joined lobby");
                    self.records.insert(id.clone(), PeerRecord::new(id, name));
                    true
                }
            },

            LobbyEvent::ReadyToggled { id, ready } => match self.records.get_mut(&id) {
                Some(record) if record.ready != ready => {
                    record.ready = ready;
                    true
                }
                Some(_) => false,
                None => {
                    debug!(peer = %id, "Ready flag for unknown peer ignored");
                    false
                }
            },

            // Last writer wins, lower scores overwrite higher ones
            LobbyEvent::ScoreUpdated { id, score } => {
                let record = self
                    .records
                    .entry(id.clone())
                    .or_insert_with(|| PeerRecord::new(id.clone(), id.to_string()));
                let changed = record.score != score;
                record.score = score;
                changed
            }

            LobbyEvent::Left { id } => {
                if id == self.local_id {
                    return false;
                }
                self.records.remove(&id).is_some()
            }
        }
    }

    /// Clear every ready flag, used when returning to the lobby
    pub fn reset_ready(&mut self) {
        for record in self.records.values_mut() {
            record.ready = false;
        }
    }

    /// Zero every score, used when a new round starts
    pub fn reset_scores(&mut self) {
        for record in self.records.values_mut() {
            record.score = 0;
        }
    }
}

/// True when the lobby is non-empty and every record is ready
pub fn all_ready(state: &LobbyState) -> bool {
    !state.is_empty() && state.records().all(|r| r.ready)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    fn lobby() -> LobbyState {
        LobbyState::new(code("HQST2"), "Host")
    }

    #[test]
    fn starts_with_only_local_record() {
        let state = lobby();
        assert_eq!(state.len(), 1);
        let local = state.local().unwrap();
        assert_eq!(local.display_name, "Host");
        assert!(!local.ready);
        assert_eq!(local.score, 0);
    }

    #[test]
    fn join_and_leave_track_membership() {
        let mut state = lobby();
        assert!(state.apply(LobbyEvent::Joined {
            id: code("GUEST"),
            name: "Ann".into()
        }));
        assert!(state.apply(LobbyEvent::Joined {
            id: code("PLAY3"),
            name: "Bo".into()
        }));
        assert!(state.apply(LobbyEvent::Left { id: code("GUEST") }));
        assert!(!state.apply(LobbyEvent::Left { id: code("GUEST") }));

        let mut ids: Vec<_> = state.records().map(|r| r.id.to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["HQST2", "PLAY3"]);
    }

    #[test]
    fn rejoin_keeps_score_and_updates_name() {
        let mut state = lobby();
        state.apply(LobbyEvent::Joined {
            id: code("GUEST"),
            name: "Ann".into(),
        });
        state.apply(LobbyEvent::ScoreUpdated {
            id: code("GUEST"),
            score: 200,
        });
        state.apply(LobbyEvent::Joined {
            id: code("GUEST"),
            name: "Annie".into(),
        });

        let guest = state.get(&code("GUEST")).unwrap();
        assert_eq!(guest.display_name, "Annie");
        assert_eq!(guest.score, 200);
    }

    #[test]
    fn local_record_cannot_leave() {
        let mut state = lobby();
        assert!(!state.apply(LobbyEvent::Left { id: code("HQST2") }));
        assert!(state.local().is_some());
    }

    #[test]
    fn score_updates_are_last_write_wins() {
        let mut state = lobby();
        state.apply(LobbyEvent::ScoreUpdated {
            id: code("HQST2"),
            score: 500,
        });
        state.apply(LobbyEvent::ScoreUpdated {
            id: code("HQST2"),
            score: 100,
        });
        assert_eq!(state.local().unwrap().score, 100);
    }

    #[test]
    fn score_for_unknown_peer_creates_record() {
        let mut state = lobby();
        state.apply(LobbyEvent::ScoreUpdated {
            id: code("GUEST"),
            score: 300,
        });
        let guest = state.get(&code("GUEST")).unwrap();
        assert_eq!(guest.display_name, "GUEST");
        assert_eq!(guest.score, 300);
    }

    #[test]
    fn ready_for_unknown_peer_is_ignored() {
        let mut state = lobby();
        assert!(!state.apply(LobbyEvent::ReadyToggled {
            id: code("GUEST"),
            ready: true
        }));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn all_ready_needs_every_record() {
        let mut state = lobby();
        state.apply(LobbyEvent::Joined {
            id: code("GUEST"),
            name: "Ann".into(),
        });
        assert!(!all_ready(&state));

        state.apply(LobbyEvent::ReadyToggled {
            id: code("HQST2"),
            ready: true,
        });
        assert!(!all_ready(&state));

        state.apply(LobbyEvent::ReadyToggled {
            id: code("GUEST"),
            ready: true,
        });
        assert!(all_ready(&state));

        state.reset_ready();
        assert!(!all_ready(&state));
    }

    #[test]
    fn reset_scores_zeroes_every_record() {
        let mut state = lobby();
        state.apply(LobbyEvent::ScoreUpdated {
            id: code("HQST2"),
            score: 300,
        });
        state.apply(LobbyEvent::ScoreUpdated {
            id: code("GUEST"),
            score: 100,
        });

        state.reset_scores();
        assert!(state.records().all(|r| r.score == 0));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn solo_lobby_is_ready_once_local_is() {
        let mut state = lobby();
        state.apply(LobbyEvent::ReadyToggled {
            id: code("HQST2"),
            ready: true,
        });
        assert!(all_ready(&state));
    }
}
