//! WebSocket connections, the trip registry, event fan-out, and heartbeat.

pub mod connection;
pub mod consumer;
pub mod dispatcher;
pub mod heartbeat;
pub mod registry;
