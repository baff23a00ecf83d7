//! Wire protocol message definitions
//! `PeerMsg` travels peer-to-peer; the signal types frame it for the broker socket

use serde::{Deserialize, Serialize};

use crate::peer::RoomCode;

/// Application messages exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerMsg {
    /// Identity exchange, sent when a link opens
    InitInfo {
        name: String,
        /// Set when answering another peer's `initInfo`
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        reply: bool,
    },

    /// Local ready flag changed
    ReadyStatus { status: bool },

    /// Everyone is ready, start the session
    GameStart,

    /// A peer's score changed
    ScoreUpdate { id: RoomCode, score: u32 },

    /// Other peers the sender is linked to, so newcomers can link to them too
    PeerList { ids: Vec<RoomCode> },
}

impl PeerMsg {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitInfo { .. } => "initInfo",
            Self::ReadyStatus { .. } => "readyStatus",
            Self::GameStart => "gameStart",
            Self::ScoreUpdate { .. } => "scoreUpdate",
            Self::PeerList { .. } => "peerList",
        }
    }
}

/// Frames sent from a remote peer to the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientSignal {
    /// Open a link to another peer
    Connect { peer: RoomCode },

    /// Send a message over an open link
    Send { peer: RoomCode, payload: PeerMsg },

    /// Close a link
    Close { peer: RoomCode },
}

/// Frames sent from the broker to a remote peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerSignal {
    /// Identity claimed, endpoint is open
    Open {
        id: RoomCode,
        /// Set when the requested code was taken and we were linked to its holder
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<RoomCode>,
    },

    /// Another peer opened a link to us
    Connection { peer: RoomCode },

    /// Message relayed from a linked peer
    Data { peer: RoomCode, payload: PeerMsg },

    /// A link was closed by the other side
    Closed { peer: RoomCode },

    /// Request failed
    Error { kind: SignalErrorKind, message: String },
}

/// Error categories reported to remote peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalErrorKind {
    /// Requested id is already claimed
    UnavailableId,
    /// Target peer does not exist
    PeerUnavailable,
    /// Anything else
    Network,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    #[test]
    fn peer_messages_use_browser_field_names() {
        let msg = PeerMsg::ScoreUpdate {
            id: code("AB23C"),
            score: 300,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "scoreUpdate", "id": "AB23C", "score": 300})
        );

        let start = serde_json::to_value(PeerMsg::GameStart).unwrap();
        assert_eq!(start, json!({"type": "gameStart"}));

        let list = PeerMsg::PeerList {
            ids: vec![code("AB23C"), code("XYZ23")],
        };
        assert_eq!(
            serde_json::to_value(&list).unwrap(),
            json!({"type": "peerList", "ids": ["AB23C", "XYZ23"]})
        );
    }

    #[test]
    fn init_info_reply_is_optional() {
        let msg: PeerMsg = serde_json::from_value(json!({"type": "initInfo", "name": "Mia"})).unwrap();
        assert_eq!(
            msg,
            PeerMsg::InitInfo {
                name: "Mia".to_string(),
                reply: false
            }
        );

        let reply = PeerMsg::InitInfo {
            name: "Mia".to_string(),
            reply: true,
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"type": "initInfo", "name": "Mia", "reply": true})
        );
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let res = serde_json::from_value::<PeerMsg>(json!({"type": "chat", "text": "hi"}));
        assert!(res.is_err());
    }

    #[test]
    fn signal_frames_round_trip_payload() {
        let frame: ClientSignal = serde_json::from_value(json!({
            "type": "send",
            "peer": "XYZ23",
            "payload": {"type": "readyStatus", "status": true}
        }))
        .unwrap();

        match frame {
            ClientSignal::Send { peer, payload } => {
                assert_eq!(peer, code("XYZ23"));
                assert_eq!(payload, PeerMsg::ReadyStatus { status: true });
            }
            other => panic!("unexpected frame {other:?}"),
        }

        let err = ServerSignal::Error {
            kind: SignalErrorKind::UnavailableId,
            message: "taken".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"type": "error", "kind": "unavailable-id", "message": "taken"})
        );
    }
}
