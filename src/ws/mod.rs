//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The endpoint at `/ws` streams [`crate::domain::DealEvent`]s for the
//! deals a client subscribed to, and answers read-only deal queries.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
