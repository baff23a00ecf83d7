//! Lobby coordination: links, peer records, readiness and scores

pub mod connection;
pub mod leaderboard;
pub mod session;
pub mod state;

pub use connection::{ConnectionManager, IdTakenPolicy, Role};
pub use leaderboard::{project, LeaderboardEntry};
pub use session::{LobbySession, SessionError, SessionEvent};
pub use state::{all_ready, LobbyEvent, LobbyState, PeerRecord};
