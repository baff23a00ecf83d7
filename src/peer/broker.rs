//! In-process peer broker
//!
//! Owns the room code namespace and routes messages between open links.
//! Local sessions use it directly; remote peers reach it through the
//! WebSocket endpoint.

use std::collections::HashSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::peer::transport::{ConnectError, Endpoint, Transport, TransportEvent};
use crate::peer::RoomCode;
use crate::ws::protocol::PeerMsg;

/// Attempts at picking an unclaimed random code before giving up
const MAX_CODE_ATTEMPTS: usize = 64;

/// A claimed identity
struct PeerSlot {
    token: Uuid,
    tx: mpsc::UnboundedSender<TransportEvent>,
    links: Mutex<HashSet<RoomCode>>,
}

impl PeerSlot {
    fn deliver(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Registry of open endpoints and their links
pub struct PeerBroker {
    peers: DashMap<RoomCode, PeerSlot>,
}

impl PeerBroker {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Number of claimed identities
    pub fn open_peers(&self) -> usize {
        self.peers.len()
    }

    pub fn is_claimed(&self, id: &RoomCode) -> bool {
        self.peers.contains_key(id)
    }

    /// Pick a random code nobody holds right now
    pub fn free_code<R: Rng>(&self, rng: &mut R) -> Result<RoomCode, ConnectError> {
        (0..MAX_CODE_ATTEMPTS)
            .map(|_| RoomCode::generate(rng))
            .find(|code| !self.is_claimed(code))
            .ok_or_else(|| ConnectError::TransportError("no free room code".to_string()))
    }

    /// Claim a random unclaimed code
    pub fn open_any(&self) -> Result<Endpoint, ConnectError> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_CODE_ATTEMPTS {
            match self.open(&RoomCode::generate(&mut rng)) {
                Err(ConnectError::IdUnavailable(_)) => continue,
                other => return other,
            }
        }
        Err(ConnectError::TransportError("no free room code".to_string()))
    }

    /// Peers currently linked to `id`
    pub fn links_of(&self, id: &RoomCode) -> Vec<RoomCode> {
        self.peers
            .get(id)
            .map(|slot| slot.links.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    fn has_link(&self, from: &RoomCode, to: &RoomCode) -> bool {
        self.peers
            .get(from)
            .map(|slot| slot.links.lock().contains(to))
            .unwrap_or(false)
    }

    fn unlink(&self, owner: &RoomCode, other: &RoomCode) -> bool {
        self.peers
            .get(owner)
            .map(|slot| slot.links.lock().remove(other))
            .unwrap_or(false)
    }
}

impl Default for PeerBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for PeerBroker {
    fn open(&self, id: &RoomCode) -> Result<Endpoint, ConnectError> {
        match self.peers.entry(id.clone()) {
            Entry::Occupied(_) => {
                debug!(peer = %id, "Room code already claimed");
                Err(ConnectError::IdUnavailable(id.clone()))
            }
            Entry::Vacant(vacant) => {
                let (tx, events) = mpsc::unbounded_channel();
                let token = Uuid::new_v4();
                vacant.insert(PeerSlot {
                    token,
                    tx,
                    links: Mutex::new(HashSet::new()),
                });

                info!(peer = %id, "Peer endpoint opened");

                Ok(Endpoint {
                    id: id.clone(),
                    token,
                    events,
                })
            }
        }
    }

    fn connect(&self, from: &RoomCode, to: &RoomCode) -> Result<(), ConnectError> {
        if from == to {
            return Err(ConnectError::TransportError("cannot link a peer to itself".to_string()));
        }

        if !self.peers.contains_key(from) {
            return Err(ConnectError::NotOpen);
        }

        // Register on the target side first so a vanished target leaves no half link
        {
            let target = self
                .peers
                .get(to)
                .ok_or_else(|| ConnectError::PeerNotFound(to.clone()))?;
            target.links.lock().insert(from.clone());
            if !target.deliver(TransportEvent::Connection { peer: from.clone() }) {
                target.links.lock().remove(from);
                return Err(ConnectError::PeerNotFound(to.clone()));
            }
        }

        match self.peers.get(from) {
            Some(source) => {
                source.links.lock().insert(to.clone());
            }
            None => {
                self.unlink(to, from);
                return Err(ConnectError::NotOpen);
            }
        }

        info!(from = %from, to = %to, "Peer link opened");
        Ok(())
    }

    fn send(&self, from: &RoomCode, to: &RoomCode, msg: PeerMsg) -> Result<(), ConnectError> {
        if !self.has_link(from, to) {
            return Err(ConnectError::TransportError(format!("no open link {from} -> {to}")));
        }

        let target = self
            .peers
            .get(to)
            .ok_or_else(|| ConnectError::PeerNotFound(to.clone()))?;

        debug!(from = %from, to = %to, kind = msg.kind(), "Relaying peer message");

        if target.deliver(TransportEvent::Data {
            peer: from.clone(),
            msg,
        }) {
            Ok(())
        } else {
            Err(ConnectError::TransportError(format!("peer {to} stopped receiving")))
        }
    }

    fn disconnect(&self, from: &RoomCode, to: &RoomCode) {
        let had_link = self.unlink(from, to);
        self.unlink(to, from);

        if had_link {
            if let Some(target) = self.peers.get(to) {
                target.deliver(TransportEvent::Closed { peer: from.clone() });
            }
            info!(from = %from, to = %to, "Peer link closed");
        }
    }

    fn release(&self, id: &RoomCode, token: Uuid) {
        let Some((_, slot)) = self.peers.remove_if(id, |_, slot| slot.token == token) else {
            warn!(peer = %id, "Release ignored, peer not held by caller");
            return;
        };

        let links: Vec<RoomCode> = slot.links.lock().drain().collect();
        for other in links {
            if let Some(remote) = self.peers.get(&other) {
                remote.links.lock().remove(id);
                remote.deliver(TransportEvent::Closed { peer: id.clone() });
            }
        }

        info!(peer = %id, "Peer endpoint released");
    }
}
