//! Broker WebSocket endpoint and wire types

pub mod handler;
pub mod protocol;
