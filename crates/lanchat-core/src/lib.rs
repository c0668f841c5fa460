//! # lanchat-core
//!
//! Shared building blocks for the lanchat server:
//!
//! - [`ids`]: the branded [`SessionId`] handed out at connect time
//! - [`protocol`]: inbound/outbound JSON envelopes, decoded once at the boundary
//! - [`errors`]: protocol and registry error taxonomy
//! - [`logging`]: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::{ProtocolError, RegistryError};
pub use ids::SessionId;
pub use protocol::{Contact, Inbound, Outbound, Profile, Recipient};
