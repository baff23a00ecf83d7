//! WebSocket upgrade handler - exposes the peer broker to remote peers

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::lobby::IdTakenPolicy;
use crate::peer::{ConnectError, Endpoint, PeerBroker, RoomCode, Transport, TransportEvent};
use crate::util::rate_limit::SignalRateLimiter;
use crate::ws::protocol::{ClientSignal, ServerSignal};

/// Query parameters for the broker socket
#[derive(Debug, Deserialize)]
pub struct PeerQuery {
    /// Requested room code; a random one is assigned when absent
    pub id: Option<String>,
}

/// WebSocket upgrade handler
pub async fn peer_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<PeerQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query.id, state))
}

/// Claim the requested identity, or any free one
///
/// A taken code is refused under [`IdTakenPolicy::Fail`]. Otherwise the
/// socket gets a random identity already linked to the code's holder, which
/// is returned alongside the endpoint.
pub fn claim_identity(
    broker: &PeerBroker,
    requested: Option<&str>,
    policy: IdTakenPolicy,
) -> Result<(Endpoint, Option<RoomCode>), ConnectError> {
    let Some(raw) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok((broker.open_any()?, None));
    };

    let code = RoomCode::parse(raw).map_err(|e| ConnectError::TransportError(e.to_string()))?;
    match broker.open(&code) {
        Ok(endpoint) => Ok((endpoint, None)),
        Err(ConnectError::IdUnavailable(_)) if policy == IdTakenPolicy::JoinAsGuest => {
            let endpoint = broker.open_any()?;
            if let Err(e) = broker.connect(&endpoint.id, &code) {
                broker.release(&endpoint.id, endpoint.token);
                return Err(e);
            }
            debug!(room = %code, peer = %endpoint.id, "Code taken, joined as guest");
            Ok((endpoint, Some(code)))
        }
        Err(e) => Err(e),
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, requested: Option<String>, state: AppState) {
    let (mut ws_sink, ws_stream) = socket.split();

    let policy = state.config.id_taken_policy;
    let (endpoint, host) = match claim_identity(&state.broker, requested.as_deref(), policy) {
        Ok(claimed) => claimed,
        Err(e) => {
            warn!(requested = ?requested, error = %e, "Peer identity refused");
            let refusal = ServerSignal::Error {
                kind: e.signal_kind(),
                message: e.to_string(),
            };
            let _ = send_msg(&mut ws_sink, &refusal).await;
            let _ = ws_sink.close().await;
            return;
        }
    };

    let id = endpoint.id.clone();
    let token = endpoint.token;
    info!(peer = %id, host = ?host, "Remote peer connected");

    if let Err(e) = send_msg(&mut ws_sink, &ServerSignal::Open { id: id.clone(), host }).await {
        error!(peer = %id, error = %e, "Failed to send open");
        state.broker.release(&id, token);
        return;
    }

    let limiter = SignalRateLimiter::new(state.config.signal_rate_limit);
    run_session(state.broker.clone(), endpoint, limiter, ws_sink, ws_stream).await;

    // Cleanup on disconnect
    state.broker.release(&id, token);
    info!(peer = %id, "Remote peer disconnected");
}

/// Pump broker events out and client frames in until either side closes
async fn run_session(
    broker: Arc<PeerBroker>,
    endpoint: Endpoint,
    limiter: SignalRateLimiter,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
) {
    let Endpoint { id, mut events, .. } = endpoint;
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerSignal>();

    // Writer task: broker events and replies -> WebSocket
    let writer_id = id.clone();
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => to_signal(event),
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(peer = %writer_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> broker
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !limiter.check() {
                    warn!(peer = %id, "Rate limited signaling frame");
                    continue;
                }

                match serde_json::from_str::<ClientSignal>(&text) {
                    Ok(frame) => {
                        if let Err(e) = apply_frame(&broker, &id, frame) {
                            let _ = reply_tx.send(ServerSignal::Error {
                                kind: e.signal_kind(),
                                message: e.to_string(),
                            });
                        }
                    }
                    Err(e) => {
                        warn!(peer = %id, error = %e, "Failed to parse signaling frame");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(peer = %id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(peer = %id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(peer = %id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Execute one client frame against the broker
pub fn apply_frame(broker: &PeerBroker, id: &RoomCode, frame: ClientSignal) -> Result<(), ConnectError> {
    match frame {
        ClientSignal::Connect { peer } => broker.connect(id, &peer),
        ClientSignal::Send { peer, payload } => broker.send(id, &peer, payload),
        ClientSignal::Close { peer } => {
            broker.disconnect(id, &peer);
            Ok(())
        }
    }
}

fn to_signal(event: TransportEvent) -> ServerSignal {
    match event {
        TransportEvent::Connection { peer } => ServerSignal::Connection { peer },
        TransportEvent::Data { peer, msg } => ServerSignal::Data { peer, payload: msg },
        TransportEvent::Closed { peer } => ServerSignal::Closed { peer },
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerSignal,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{PeerMsg, SignalErrorKind};

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    #[test]
    fn claim_honours_requested_code() {
        let broker = PeerBroker::new();
        let (endpoint, host) = claim_identity(&broker, Some("ab23c"), IdTakenPolicy::Fail).unwrap();
        assert_eq!(endpoint.id, code("AB23C"));
        assert_eq!(host, None);

        let err = claim_identity(&broker, Some("AB23C"), IdTakenPolicy::Fail).unwrap_err();
        assert_eq!(err.signal_kind(), SignalErrorKind::UnavailableId);
    }

    #[test]
    fn taken_code_joins_holder_as_guest() {
        let broker = PeerBroker::new();
        let mut holder = broker.open(&code("AB23C")).unwrap();

        let (guest, host) = claim_identity(&broker, Some("AB23C"), IdTakenPolicy::JoinAsGuest).unwrap();
        assert_eq!(host, Some(code("AB23C")));
        assert_ne!(guest.id, code("AB23C"));
        assert_eq!(
            holder.events.try_recv().unwrap(),
            TransportEvent::Connection { peer: guest.id.clone() }
        );
    }

    #[test]
    fn claim_without_code_picks_random() {
        let broker = PeerBroker::new();
        assert!(claim_identity(&broker, None, IdTakenPolicy::Fail).is_ok());
        assert!(claim_identity(&broker, Some("  "), IdTakenPolicy::Fail).is_ok());
        assert_eq!(broker.open_peers(), 2);
    }

    #[test]
    fn malformed_code_is_a_network_error() {
        let broker = PeerBroker::new();
        let err = claim_identity(&broker, Some("TOO-LONG"), IdTakenPolicy::JoinAsGuest).unwrap_err();
        assert_eq!(err.signal_kind(), SignalErrorKind::Network);
    }

    #[test]
    fn frames_drive_the_broker() {
        let broker = PeerBroker::new();
        let mut host = broker.open(&code("AB23C")).unwrap();
        let guest = broker.open(&code("GUEST")).unwrap();

        let missing = apply_frame(&broker, &guest.id, ClientSignal::Connect { peer: code("NQPE2") });
        assert_eq!(missing.unwrap_err().signal_kind(), SignalErrorKind::PeerUnavailable);

        apply_frame(&broker, &guest.id, ClientSignal::Connect { peer: code("AB23C") }).unwrap();
        apply_frame(
            &broker,
            &guest.id,
            ClientSignal::Send {
                peer: code("AB23C"),
                payload: PeerMsg::GameStart,
            },
        )
        .unwrap();

        assert!(matches!(
            to_signal(host.events.try_recv().unwrap()),
            ServerSignal::Connection { .. }
        ));
        assert!(matches!(
            to_signal(host.events.try_recv().unwrap()),
            ServerSignal::Data {
                payload: PeerMsg::GameStart,
                ..
            }
        ));

        apply_frame(&broker, &guest.id, ClientSignal::Close { peer: code("AB23C") }).unwrap();
        assert!(matches!(
            to_signal(host.events.try_recv().unwrap()),
            ServerSignal::Closed { .. }
        ));
    }
}
