//! Lobby session - the context object owning one peer's view of a room
//!
//! The peer's links, score table and countdown live here and are driven
//! through `&mut self` from a single task.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ConfigError, GameConfig};
use crate::game::{Crosshair, FrameScheduler, SchedulerTick, SessionClock, SessionPhase, TargetField};
use crate::peer::{ConnectError, RoomCode, Transport, TransportEvent};
use crate::ws::protocol::PeerMsg;

use super::connection::{ConnectionManager, IdTakenPolicy, Role};
use super::leaderboard::{project, LeaderboardEntry};
use super::state::{all_ready, LobbyEvent, LobbyState};

/// Things the presentation layer may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PeerJoined { id: RoomCode, name: String },
    PeerLeft { id: RoomCode },
    ReadyChanged { id: RoomCode, ready: bool },
    Started,
    ScoreChanged { id: RoomCode, score: u32 },
    Ended { score: u32 },
}

/// Session setup failures
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

enum Step {
    Transport(Option<TransportEvent>),
    Tick(SchedulerTick),
}

/// One peer's lobby, match and leaderboard
pub struct LobbySession {
    conn: ConnectionManager,
    lobby: LobbyState,
    role: Role,
    local_name: String,
    config: GameConfig,
    clock: SessionClock,
    field: TargetField,
    crosshair: Crosshair,
    scheduler: FrameScheduler,
    score: u32,
}

impl LobbySession {
    /// Host a room under `code`
    pub fn host(
        transport: Arc<dyn Transport>,
        code: &RoomCode,
        name: &str,
        config: GameConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let mut conn = ConnectionManager::new(transport);
        let id = conn.host_room(code)?;
        Ok(Self::from_connection(conn, id, Role::Host, name, config))
    }

    /// Join the room hosted under `code`
    pub fn join(
        transport: Arc<dyn Transport>,
        code: &RoomCode,
        name: &str,
        config: GameConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let mut conn = ConnectionManager::new(transport);
        let id = conn.join_room(code, name)?;
        Ok(Self::from_connection(conn, id, Role::Guest, name, config))
    }

    /// Host `code`, or apply `policy` when someone already hosts it
    pub fn connect(
        transport: Arc<dyn Transport>,
        code: &RoomCode,
        name: &str,
        policy: IdTakenPolicy,
        config: GameConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let mut conn = ConnectionManager::new(transport);
        let (id, role) = conn.connect(code, name, policy)?;
        Ok(Self::from_connection(conn, id, role, name, config))
    }

    fn from_connection(
        conn: ConnectionManager,
        id: RoomCode,
        role: Role,
        name: &str,
        config: GameConfig,
    ) -> Self {
        let field = TargetField::new(&config);
        let crosshair = Crosshair::centered(config.field_width, config.field_height, config.sensitivity);
        let scheduler = FrameScheduler::new(config.frame_rate);

        Self {
            conn,
            lobby: LobbyState::new(id, name),
            role,
            local_name: name.to_string(),
            config,
            clock: SessionClock::new(),
            field,
            crosshair,
            scheduler,
            score: 0,
        }
    }

    pub fn local_id(&self) -> &RoomCode {
        self.lobby.local_id()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn lobby(&self) -> &LobbyState {
        &self.lobby
    }

    pub fn phase(&self) -> SessionPhase {
        self.clock.phase()
    }

    pub fn remaining_secs(&self) -> u32 {
        self.clock.remaining_secs()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_ready(&self) -> bool {
        self.lobby.local().map(|r| r.ready).unwrap_or(false)
    }

    pub fn targets(&self) -> &TargetField {
        &self.field
    }

    pub fn targets_mut(&mut self) -> &mut TargetField {
        &mut self.field
    }

    pub fn crosshair(&self) -> Crosshair {
        self.crosshair
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    /// Current leaderboard rows
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        project(&self.lobby, self.config.leaderboard_limit)
    }

    /// Wait for the next transport event or scheduler tick and apply it
    ///
    /// Returns `None` once the transport endpoint is gone.
    pub async fn next_events(&mut self) -> Option<Vec<SessionEvent>> {
        if self.clock.is_running() && !self.scheduler.is_running() {
            self.scheduler.start();
        }

        let step = tokio::select! {
            event = self.conn.next_event() => Step::Transport(event),
            tick = self.scheduler.tick() => Step::Tick(tick),
        };

        match step {
            Step::Transport(Some(event)) => Some(self.handle(event)),
            Step::Transport(None) => None,
            Step::Tick(SchedulerTick::Frame) => {
                self.on_frame();
                Some(Vec::new())
            }
            Step::Tick(SchedulerTick::Second) => Some(self.on_second()),
        }
    }

    /// Apply every transport event that is already queued
    pub fn pump(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.conn.try_next_event() {
            events.extend(self.handle(event));
        }
        events
    }

    /// Apply one transport event
    pub fn handle(&mut self, event: TransportEvent) -> Vec<SessionEvent> {
        match event {
            TransportEvent::Connection { peer } => {
                debug!(peer = %peer, "Link opened, waiting for initInfo");
                Vec::new()
            }
            TransportEvent::Data { peer, msg } => self.handle_message(&peer, msg),
            TransportEvent::Closed { peer } => {
                let mut events = Vec::new();
                if self.lobby.apply(LobbyEvent::Left { id: peer.clone() }) {
                    info!(peer = %peer, "Peer left lobby");
                    events.push(SessionEvent::PeerLeft { id: peer });
                    // The one peer holding everyone up may just have left
                    self.check_consensus(&mut events);
                }
                events
            }
        }
    }

    fn handle_message(&mut self, from: &RoomCode, msg: PeerMsg) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        match msg {
            PeerMsg::InitInfo { name, reply } => {
                let changed = self.lobby.apply(LobbyEvent::Joined {
                    id: from.clone(),
                    name: name.clone(),
                });
                if changed {
                    events.push(SessionEvent::PeerJoined {
                        id: from.clone(),
                        name,
                    });
                }

                if !reply {
                    self.send(
                        from,
                        PeerMsg::InitInfo {
                            name: self.local_name.clone(),
                            reply: true,
                        },
                    );
                    let ids: Vec<RoomCode> = self.conn.links().filter(|id| *id != from).cloned().collect();
                    if !ids.is_empty() {
                        self.send(from, PeerMsg::PeerList { ids });
                    }
                }
                // Late joiners would otherwise never learn we are ready
                if self.is_ready() {
                    self.send(from, PeerMsg::ReadyStatus { status: true });
                }
            }

            PeerMsg::ReadyStatus { status } => {
                if !self.lobby.contains(from) {
                    warn!(peer = %from, "readyStatus before initInfo, ignoring");
                    return events;
                }
                if self.lobby.apply(LobbyEvent::ReadyToggled {
                    id: from.clone(),
                    ready: status,
                }) {
                    events.push(SessionEvent::ReadyChanged {
                        id: from.clone(),
                        ready: status,
                    });
                }
                self.check_consensus(&mut events);
            }

            PeerMsg::GameStart => {
                events.extend(self.start_session());
            }

            PeerMsg::PeerList { ids } => {
                for id in ids {
                    if &id == self.local_id() || self.conn.is_linked(&id) {
                        continue;
                    }
                    if let Err(e) = self.conn.link_peer(&id, &self.local_name) {
                        warn!(peer = %id, error = %e, "Could not link to room member");
                    }
                }
            }

            PeerMsg::ScoreUpdate { id, score } => {
                if &id == self.local_id() {
                    debug!(peer = %from, "Ignoring remote score for local peer");
                    return events;
                }
                if !self.conn.is_linked(&id) {
                    warn!(peer = %from, id = %id, "scoreUpdate for unlinked peer, ignoring");
                    return events;
                }
                self.lobby.apply(LobbyEvent::ScoreUpdated {
                    id: id.clone(),
                    score,
                });
                events.push(SessionEvent::ScoreChanged { id, score });
            }
        }

        events
    }

    /// Flip the local ready flag
    pub fn toggle_ready(&mut self) -> Vec<SessionEvent> {
        let ready = !self.is_ready();
        self.set_ready(ready)
    }

    /// Set the local ready flag and tell everyone; only allowed in the lobby
    pub fn set_ready(&mut self, ready: bool) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.clock.phase() != SessionPhase::Idle {
            return events;
        }

        let id = self.local_id().clone();
        if self.lobby.apply(LobbyEvent::ReadyToggled {
            id: id.clone(),
            ready,
        }) {
            events.push(SessionEvent::ReadyChanged { id, ready });
        }
        self.conn.broadcast(&PeerMsg::ReadyStatus { status: ready });
        self.check_consensus(&mut events);
        events
    }

    fn check_consensus(&mut self, events: &mut Vec<SessionEvent>) {
        if self.clock.phase() != SessionPhase::Idle || !all_ready(&self.lobby) {
            return;
        }

        info!(peers = self.lobby.len(), "Everyone ready, starting session");
        self.conn.broadcast(&PeerMsg::GameStart);
        events.extend(self.start_session());
    }

    /// Idle -> Running; later calls are no-ops
    fn start_session(&mut self) -> Option<SessionEvent> {
        if !self.clock.start(self.config.session_secs) {
            debug!(phase = ?self.clock.phase(), "Session already started");
            return None;
        }

        self.score = 0;
        self.lobby.reset_scores();
        self.field.clear();
        self.crosshair = Crosshair::centered(
            self.config.field_width,
            self.config.field_height,
            self.crosshair.sensitivity,
        );

        info!(peer = %self.local_id(), secs = self.config.session_secs, "Session started");
        Some(SessionEvent::Started)
    }

    /// One render frame
    pub fn on_frame(&mut self) {
        if self.clock.is_running() {
            self.field.step();
        }
    }

    /// One countdown second
    pub fn on_second(&mut self) -> Vec<SessionEvent> {
        if !self.clock.tick() {
            return Vec::new();
        }

        self.field.clear();
        self.scheduler.stop();
        info!(peer = %self.local_id(), score = self.score, "Session ended");
        vec![SessionEvent::Ended { score: self.score }]
    }

    /// Raw pointer movement
    pub fn move_pointer(&mut self, dx: f32, dy: f32) {
        if self.clock.is_running() {
            let (w, h) = self.field.size();
            self.crosshair.apply_motion(dx, dy, w, h);
        }
    }

    /// Change pointer sensitivity
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.crosshair.sensitivity = sensitivity;
    }

    /// Shoot at the crosshair; a hit scores and is broadcast
    pub fn fire(&mut self) -> Vec<SessionEvent> {
        if !self.clock.is_running() || !self.field.hit(self.crosshair.x, self.crosshair.y) {
            return Vec::new();
        }

        self.score += self.config.hit_score;
        let id = self.local_id().clone();
        self.lobby.apply(LobbyEvent::ScoreUpdated {
            id: id.clone(),
            score: self.score,
        });
        self.conn.broadcast(&PeerMsg::ScoreUpdate {
            id: id.clone(),
            score: self.score,
        });

        debug!(peer = %id, score = self.score, "Target hit");
        vec![SessionEvent::ScoreChanged { id, score: self.score }]
    }

    /// After a session ends, go back to the lobby with everyone unready
    pub fn return_to_lobby(&mut self) -> Vec<SessionEvent> {
        if self.clock.phase() != SessionPhase::Ended {
            return Vec::new();
        }

        self.clock.reset();
        self.lobby.reset_ready();
        self.conn.broadcast(&PeerMsg::ReadyStatus { status: false });
        vec![SessionEvent::ReadyChanged {
            id: self.local_id().clone(),
            ready: false,
        }]
    }

    /// Leave the room
    pub fn close(&mut self) {
        self.scheduler.stop();
        self.conn.close();
    }

    fn send(&mut self, to: &RoomCode, msg: PeerMsg) {
        if let Err(e) = self.conn.send_to(to, msg) {
            warn!(peer = %to, error = %e, "Failed to send to peer");
        }
    }
}
