#![allow(dead_code)]

use std::sync::Arc;

use aim_lobby::config::GameConfig;
use aim_lobby::lobby::{LobbySession, SessionEvent};
use aim_lobby::peer::{PeerBroker, RoomCode};

pub fn code(s: &str) -> RoomCode {
    RoomCode::parse(s).expect("valid room code")
}

pub fn config() -> GameConfig {
    GameConfig {
        session_secs: 2,
        seed: Some(9),
        ..GameConfig::default()
    }
}

pub fn broker() -> Arc<PeerBroker> {
    Arc::new(PeerBroker::new())
}

/// Pump every session for a few rounds so replies to replies get through
pub fn settle(sessions: &mut [&mut LobbySession]) -> Vec<Vec<SessionEvent>> {
    let mut seen: Vec<Vec<SessionEvent>> = vec![Vec::new(); sessions.len()];
    for _ in 0..8 {
        for (i, session) in sessions.iter_mut().enumerate() {
            seen[i].extend(session.pump());
        }
    }
    seen
}

pub fn count_started(events: &[SessionEvent]) -> usize {
    events.iter().filter(|e| **e == SessionEvent::Started).count()
}
