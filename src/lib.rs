//! Aim Lobby - peer-to-peer aim trainer lobby core
//!
//! Peers claim a short room code, link to each other through a
//! [`peer::Transport`], agree that everyone is ready and then play a timed
//! target-shooting round whose scores are broadcast to every linked peer.
//! The binary runs a [`peer::PeerBroker`] behind a WebSocket endpoint so
//! browser peers can share the same room namespace.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod peer;
pub mod util;
pub mod ws;
