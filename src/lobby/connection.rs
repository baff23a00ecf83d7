//! Connection manager - one local identity, many open links

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::peer::{ConnectError, Endpoint, RoomCode, Transport, TransportEvent};
use crate::ws::protocol::PeerMsg;

/// Attempts at claiming a random guest identity
const GUEST_ID_ATTEMPTS: usize = 16;

/// What to do when the requested room code is already hosted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdTakenPolicy {
    /// Join the existing host as a guest
    #[default]
    JoinAsGuest,
    /// Report `IdUnavailable` to the caller
    Fail,
}

impl FromStr for IdTakenPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join" | "join_as_guest" | "guest" => Ok(Self::JoinAsGuest),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown id taken policy '{other}'")),
        }
    }
}

/// Which side of the room the local peer ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

type IncomingHandler = Box<dyn FnMut(&RoomCode) + Send>;
type DisconnectHandler = Box<dyn FnOnce(&RoomCode) + Send>;

/// Owns the local transport identity and the set of open links
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    endpoint: Option<Endpoint>,
    links: BTreeSet<RoomCode>,
    /// `Closed` events for links we dropped ourselves after a failed send
    dropped: VecDeque<TransportEvent>,
    on_incoming: Option<IncomingHandler>,
    on_disconnect: HashMap<RoomCode, Vec<DisconnectHandler>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            endpoint: None,
            links: BTreeSet::new(),
            dropped: VecDeque::new(),
            on_incoming: None,
            on_disconnect: HashMap::new(),
        }
    }

    /// Local identity, once hosting or joined
    pub fn local_id(&self) -> Option<&RoomCode> {
        self.endpoint.as_ref().map(|e| &e.id)
    }

    /// Currently open links
    pub fn links(&self) -> impl Iterator<Item = &RoomCode> {
        self.links.iter()
    }

    pub fn is_linked(&self, peer: &RoomCode) -> bool {
        self.links.contains(peer)
    }

    /// Claim `code` and wait for guests
    pub fn host_room(&mut self, code: &RoomCode) -> Result<RoomCode, ConnectError> {
        self.close();
        let endpoint = self.transport.open(code)?;
        let id = endpoint.id.clone();
        self.endpoint = Some(endpoint);

        info!(room = %id, "Hosting room");
        Ok(id)
    }

    /// Claim a random identity, link to `code` and introduce ourselves
    pub fn join_room(&mut self, code: &RoomCode, display_name: &str) -> Result<RoomCode, ConnectError> {
        self.close();
        let endpoint = self.open_guest_identity()?;
        let id = endpoint.id.clone();

        if let Err(e) = self.transport.connect(&id, code) {
            self.transport.release(&id, endpoint.token);
            return Err(e);
        }

        self.endpoint = Some(endpoint);
        self.links.insert(code.clone());
        self.introduce(code, display_name)?;

        info!(room = %code, peer = %id, "Joined room");
        Ok(id)
    }

    /// Link to another peer in the room we already belong to
    pub fn link_peer(&mut self, peer: &RoomCode, display_name: &str) -> Result<(), ConnectError> {
        let id = self.local_id().cloned().ok_or(ConnectError::NotOpen)?;
        if &id == peer || self.links.contains(peer) {
            return Ok(());
        }

        self.transport.connect(&id, peer)?;
        self.links.insert(peer.clone());
        self.introduce(peer, display_name)?;

        debug!(peer = %peer, "Linked to room member");
        Ok(())
    }

    fn introduce(&mut self, peer: &RoomCode, display_name: &str) -> Result<(), ConnectError> {
        self.send_to(
            peer,
            PeerMsg::InitInfo {
                name: display_name.to_string(),
                reply: false,
            },
        )
    }

    /// Host `code`, falling back according to `policy` when it is taken
    pub fn connect(
        &mut self,
        code: &RoomCode,
        display_name: &str,
        policy: IdTakenPolicy,
    ) -> Result<(RoomCode, Role), ConnectError> {
        match self.host_room(code) {
            Ok(id) => Ok((id, Role::Host)),
            Err(ConnectError::IdUnavailable(_)) if policy == IdTakenPolicy::JoinAsGuest => {
                info!(room = %code, "Room already hosted, joining as guest");
                let id = self.join_room(code, display_name)?;
                Ok((id, Role::Guest))
            }
            Err(e) => Err(e),
        }
    }

    /// Called with the remote id whenever a peer links to us
    pub fn on_incoming_connection(&mut self, handler: impl FnMut(&RoomCode) + Send + 'static) {
        self.on_incoming = Some(Box::new(handler));
    }

    /// Called once when the link to `peer` closes
    pub fn on_disconnect(&mut self, peer: &RoomCode, handler: impl FnOnce(&RoomCode) + Send + 'static) {
        self.on_disconnect
            .entry(peer.clone())
            .or_default()
            .push(Box::new(handler));
    }

    /// Send to one linked peer
    pub fn send_to(&mut self, peer: &RoomCode, msg: PeerMsg) -> Result<(), ConnectError> {
        let id = self.local_id().cloned().ok_or(ConnectError::NotOpen)?;
        if !self.links.contains(peer) {
            return Err(ConnectError::TransportError(format!("no open link to {peer}")));
        }

        let result = self.transport.send(&id, peer, msg);
        if let Err(ref e) = result {
            warn!(peer = %peer, error = %e, "Send failed, dropping link");
            self.drop_link(peer);
        }
        result
    }

    /// Send to every linked peer; returns how many accepted the message
    pub fn broadcast(&mut self, msg: &PeerMsg) -> usize {
        let Some(id) = self.local_id().cloned() else {
            return 0;
        };

        let mut delivered = 0;
        let mut failed = Vec::new();

        for peer in &self.links {
            match self.transport.send(&id, peer, msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(peer = %peer, error = %e, kind = msg.kind(), "Broadcast failed");
                    failed.push(peer.clone());
                }
            }
        }

        for peer in failed {
            self.drop_link(&peer);
        }

        debug!(kind = msg.kind(), delivered, "Broadcast sent");
        delivered
    }

    /// Wait for the next transport event, running registered handlers first
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.dropped.pop_front() {
            return Some(event);
        }
        let event = self.endpoint.as_mut()?.events.recv().await?;
        self.observe(&event);
        Some(event)
    }

    /// Non-blocking variant of [`Self::next_event`]
    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.dropped.pop_front() {
            return Some(event);
        }
        let event = self.endpoint.as_mut()?.events.try_recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    /// Close every link and give up the local identity
    pub fn close(&mut self) {
        let Some(endpoint) = self.endpoint.take() else {
            return;
        };

        self.links.clear();
        self.dropped.clear();
        self.on_disconnect.clear();
        self.transport.release(&endpoint.id, endpoint.token);
        info!(peer = %endpoint.id, "Connection closed");
    }

    fn open_guest_identity(&self) -> Result<Endpoint, ConnectError> {
        for _ in 0..GUEST_ID_ATTEMPTS {
            match self.transport.open(&RoomCode::random()) {
                Err(ConnectError::IdUnavailable(_)) => continue,
                other => return other,
            }
        }
        Err(ConnectError::TransportError("could not claim a guest identity".to_string()))
    }

    fn observe(&mut self, event: &TransportEvent) {
        match event {
            TransportEvent::Connection { peer } => {
                self.links.insert(peer.clone());
                info!(peer = %peer, "Incoming connection");
                if let Some(handler) = self.on_incoming.as_mut() {
                    handler(peer);
                }
            }
            TransportEvent::Data { .. } => {}
            TransportEvent::Closed { peer } => {
                info!(peer = %peer, "Peer disconnected");
                self.links.remove(peer);
                self.fire_disconnect(peer);
            }
        }
    }

    fn drop_link(&mut self, peer: &RoomCode) {
        if self.links.remove(peer) {
            if let Some(id) = self.local_id().cloned() {
                self.transport.disconnect(&id, peer);
            }
            self.fire_disconnect(peer);
            self.dropped.push_back(TransportEvent::Closed { peer: peer.clone() });
        }
    }

    fn fire_disconnect(&mut self, peer: &RoomCode) {
        if let Some(handlers) = self.on_disconnect.remove(peer) {
            for handler in handlers {
                handler(peer);
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("local_id", &self.local_id())
            .field("links", &self.links)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerBroker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    fn manager(broker: &Arc<PeerBroker>) -> ConnectionManager {
        ConnectionManager::new(broker.clone())
    }

    #[test]
    fn host_twice_fails_with_id_unavailable() {
        let broker = Arc::new(PeerBroker::new());
        let mut first = manager(&broker);
        let mut second = manager(&broker);

        assert_eq!(first.host_room(&code("AB23C")).unwrap(), code("AB23C"));
        assert_eq!(
            second.host_room(&code("AB23C")),
            Err(ConnectError::IdUnavailable(code("AB23C")))
        );
    }

    #[test]
    fn join_missing_room_fails_and_releases_identity() {
        let broker = Arc::new(PeerBroker::new());
        let mut guest = manager(&broker);

        assert_eq!(
            guest.join_room(&code("NQPE2"), "Ann"),
            Err(ConnectError::PeerNotFound(code("NQPE2")))
        );
        assert!(guest.local_id().is_none());
        assert_eq!(broker.open_peers(), 0);
    }

    #[test]
    fn fallback_policy_decides_on_taken_code() {
        let broker = Arc::new(PeerBroker::new());
        let mut host = manager(&broker);
        host.host_room(&code("AB23C")).unwrap();

        let mut strict = manager(&broker);
        assert_eq!(
            strict.connect(&code("AB23C"), "Bo", IdTakenPolicy::Fail),
            Err(ConnectError::IdUnavailable(code("AB23C")))
        );

        let mut lenient = manager(&broker);
        let (id, role) = lenient
            .connect(&code("AB23C"), "Bo", IdTakenPolicy::JoinAsGuest)
            .unwrap();
        assert_eq!(role, Role::Guest);
        assert_ne!(id, code("AB23C"));
        assert!(lenient.is_linked(&code("AB23C")));
    }

    #[test]
    fn guest_introduces_itself_and_host_sees_connection() {
        let broker = Arc::new(PeerBroker::new());
        let mut host = manager(&broker);
        host.host_room(&code("AB23C")).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        host.on_incoming_connection(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut guest = manager(&broker);
        let guest_id = guest.join_room(&code("AB23C"), "Ann").unwrap();

        assert_eq!(
            host.try_next_event(),
            Some(TransportEvent::Connection {
                peer: guest_id.clone()
            })
        );
        assert_eq!(
            host.try_next_event(),
            Some(TransportEvent::Data {
                peer: guest_id.clone(),
                msg: PeerMsg::InitInfo {
                    name: "Ann".to_string(),
                    reply: false
                }
            })
        );
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(host.is_linked(&guest_id));
    }

    #[test]
    fn broadcast_reaches_every_link() {
        let broker = Arc::new(PeerBroker::new());
        let mut host = manager(&broker);
        host.host_room(&code("AB23C")).unwrap();

        let mut a = manager(&broker);
        let mut b = manager(&broker);
        a.join_room(&code("AB23C"), "Ann").unwrap();
        b.join_room(&code("AB23C"), "Bo").unwrap();
        while host.try_next_event().is_some() {}

        assert_eq!(host.broadcast(&PeerMsg::GameStart), 2);
        for guest in [&mut a, &mut b] {
            assert!(matches!(
                guest.try_next_event(),
                Some(TransportEvent::Data {
                    msg: PeerMsg::GameStart,
                    ..
                })
            ));
        }
    }

    #[test]
    fn disconnect_handler_runs_once_when_peer_leaves() {
        let broker = Arc::new(PeerBroker::new());
        let mut host = manager(&broker);
        host.host_room(&code("AB23C")).unwrap();

        let mut guest = manager(&broker);
        let guest_id = guest.join_room(&code("AB23C"), "Ann").unwrap();
        while host.try_next_event().is_some() {}

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        host.on_disconnect(&guest_id, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        guest.close();
        assert_eq!(
            host.try_next_event(),
            Some(TransportEvent::Closed {
                peer: guest_id.clone()
            })
        );
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!host.is_linked(&guest_id));
        assert_eq!(host.broadcast(&PeerMsg::GameStart), 0);
    }

    #[test]
    fn failed_send_surfaces_as_closed_event() {
        let broker = Arc::new(PeerBroker::new());
        let mut host = manager(&broker);
        host.host_room(&code("AB23C")).unwrap();

        // An endpoint whose receiver goes away while its code stays claimed
        let dead = broker.open(&code("GUEST")).unwrap();
        broker.connect(&dead.id, &code("AB23C")).unwrap();
        drop(dead);
        while host.try_next_event().is_some() {}
        assert!(host.is_linked(&code("GUEST")));

        assert_eq!(host.broadcast(&PeerMsg::GameStart), 0);
        assert!(!host.is_linked(&code("GUEST")));
        assert_eq!(
            host.try_next_event(),
            Some(TransportEvent::Closed { peer: code("GUEST") })
        );
        assert_eq!(host.try_next_event(), None);
    }

    #[test]
    fn link_peer_connects_guests_to_each_other() {
        let broker = Arc::new(PeerBroker::new());
        let mut host = manager(&broker);
        host.host_room(&code("AB23C")).unwrap();

        let mut a = manager(&broker);
        let mut b = manager(&broker);
        let a_id = a.join_room(&code("AB23C"), "Ann").unwrap();
        b.join_room(&code("AB23C"), "Bo").unwrap();

        b.link_peer(&a_id, "Bo").unwrap();
        b.link_peer(&a_id, "Bo").unwrap();
        assert!(b.is_linked(&a_id));

        let mut introductions = 0;
        while let Some(event) = a.try_next_event() {
            if let TransportEvent::Data {
                msg: PeerMsg::InitInfo { .. },
                ..
            } = event
            {
                introductions += 1;
            }
        }
        assert_eq!(introductions, 1);
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!("join".parse::<IdTakenPolicy>(), Ok(IdTakenPolicy::JoinAsGuest));
        assert_eq!("FAIL".parse::<IdTakenPolicy>(), Ok(IdTakenPolicy::Fail));
        assert!("retry".parse::<IdTakenPolicy>().is_err());
    }
}
