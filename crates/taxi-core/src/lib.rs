//! # taxi-core
//!
//! Foundation types shared by every crate of the taxi channel service.
//!
//! - **Branded IDs**: [`ConnectionId`] and [`TripId`] as newtypes for type safety
//! - **Identity**: the authenticated user behind a connection
//! - **Trips**: [`Trip`], [`TripStatus`], and the transient [`TripEvent`]
//! - **Wire messages**: inbound subscription requests, outbound event envelopes,
//!   and the close codes used to terminate a channel
//! - **Errors**: the channel error taxonomy built on `thiserror`
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod identity;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod trips;

pub use errors::{ChannelError, DeliveryError, RejectionReason};
pub use identity::Identity;
pub use ids::{ConnectionId, TripId};
pub use messages::{Action, CloseCode, InboundMessage, OutboundMessage};
pub use trips::{Trip, TripEvent, TripStatus};
