//! # taxi-server
//!
//! Real-time trip channel over Axum WebSockets.
//!
//! - Handshake at `/taxi/` authenticates a JWT (`4001` on failure)
//! - Clients subscribe to one trip at a time (`4003` if not rider or driver)
//! - [`EventDispatcher`] fans trip events out to that trip's subscribers
//! - Bounded per-connection queues with drop-oldest backpressure
//! - Heartbeat, `/health`, `/metrics`, graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod trips;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use routes::{RouteKind, RouteTable};
pub use server::TaxiServer;
pub use shutdown::ShutdownCoordinator;
pub use trips::{InMemoryTripRepository, TripAccess};
pub use websocket::connection::ClientConnection;
pub use websocket::consumer::{ConsumerSession, SessionState, Step, TaxiConsumer};
pub use websocket::dispatcher::{EventDispatcher, PublishReport};
pub use websocket::registry::{ConnectionRegistry, RegistrationHandle};
