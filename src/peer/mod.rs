//! Peer identities and the transport they travel over

pub mod broker;
pub mod room_code;
pub mod transport;

pub use broker::PeerBroker;
pub use room_code::{RoomCode, RoomCodeError};
pub use transport::{ConnectError, Endpoint, Transport, TransportEvent};
