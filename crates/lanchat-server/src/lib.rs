//! # lanchat-server
//!
//! Axum HTTP + `WebSocket` chat server.
//!
//! - [`registry`]: live sessions, display names, fan-out
//! - [`presence`]: contact-list snapshots pushed on every membership change
//! - [`router`]: per-connection state machine for inbound envelopes
//! - [`websocket`]: socket split into reader/writer around the router
//! - [`server`]: routes (`/`, `/ws`, `/health`), listener, graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod presence;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use registry::{NamePolicy, Registry};
pub use server::ChatServer;
pub use session::{Session, SessionHandle};
