//! Peer transport boundary
//!
//! The lobby only talks to peers through [`Transport`]. How the bytes get
//! there (in-process broker, WebSocket relay) is the implementor's concern.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::peer::RoomCode;
use crate::ws::protocol::{PeerMsg, SignalErrorKind};

/// Events delivered to an open endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A remote peer opened a link to us
    Connection { peer: RoomCode },
    /// Message from a linked peer
    Data { peer: RoomCode, msg: PeerMsg },
    /// A link was closed by the remote side
    Closed { peer: RoomCode },
}

/// An identity claimed on a transport
#[derive(Debug)]
pub struct Endpoint {
    pub id: RoomCode,
    /// Proves ownership when releasing the identity
    pub token: Uuid,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Connection failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("Room code {0} is already taken")]
    IdUnavailable(RoomCode),

    #[error("Peer {0} not found")]
    PeerNotFound(RoomCode),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection is not open")]
    NotOpen,
}

impl ConnectError {
    /// Category reported to remote peers over the broker socket
    pub fn signal_kind(&self) -> SignalErrorKind {
        match self {
            Self::IdUnavailable(_) => SignalErrorKind::UnavailableId,
            Self::PeerNotFound(_) => SignalErrorKind::PeerUnavailable,
            Self::TransportError(_) | Self::NotOpen => SignalErrorKind::Network,
        }
    }
}

/// A peer-to-peer transport
pub trait Transport: Send + Sync {
    /// Claim `id` and start receiving events for it
    fn open(&self, id: &RoomCode) -> Result<Endpoint, ConnectError>;

    /// Open a link from `from` to `to`
    fn connect(&self, from: &RoomCode, to: &RoomCode) -> Result<(), ConnectError>;

    /// Deliver `msg` over the open link `from -> to`
    fn send(&self, from: &RoomCode, to: &RoomCode, msg: PeerMsg) -> Result<(), ConnectError>;

    /// Close the link between `from` and `to`
    fn disconnect(&self, from: &RoomCode, to: &RoomCode);

    /// Give up an identity, closing all of its links
    fn release(&self, id: &RoomCode, token: Uuid);
}
