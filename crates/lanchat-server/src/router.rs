//! Per-connection message routing.
//!
//! A [`SessionRouter`] owns one session and is driven by discrete
//! [`SessionEvent`]s. It does not touch the transport: the WebSocket glue
//! feeds it events through a channel, which keeps the state machine testable
//! on its own.
//!
//! ```text
//! Unregistered --register(ok)--> Registered(name)
//!      |  register(taken): error envelope, stay
//!      |                                |
//!      +------------ Closed <-----------+   (transport close / fault)
//! ```

use std::sync::Arc;

use lanchat_core::protocol::now_millis;
use lanchat_core::{Inbound, Outbound, Profile, ProtocolError, Recipient, RegistryError};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::registry::Registry;
use crate::session::SessionHandle;

/// Why a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent a Close frame or the stream ended.
    Client,
    /// Transport error; handled exactly like a normal close.
    Fault(String),
    /// Server shutdown.
    Shutdown,
}

/// Lifecycle event for one connection.
#[derive(Debug)]
pub enum SessionEvent {
    /// Connection accepted; the session joins the registry.
    Connected,
    /// One text frame.
    Received(String),
    /// A frame kind the protocol does not use (e.g. binary).
    Unsupported(&'static str),
    /// Connection gone.
    Closed(CloseReason),
}

/// Routing state of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no display name yet.
    Unregistered,
    /// Display name accepted.
    Registered {
        /// Display name.
        name: String,
    },
    /// Removed from the registry; terminal.
    Closed,
}

impl SessionState {
    fn label(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Registered { .. } => "registered",
            Self::Closed => "closed",
        }
    }
}

/// Whether the driver should keep feeding events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep going.
    Continue,
    /// Session closed; stop.
    Stop,
}

/// Body of a routed envelope.
enum Payload {
    Text(String),
    Image(String),
}

/// State machine for one connection.
pub struct SessionRouter {
    session: Arc<SessionHandle>,
    registry: Arc<Registry>,
    profile: Profile,
    state: SessionState,
}

impl SessionRouter {
    /// Create a router for a freshly accepted connection.
    pub fn new(session: Arc<SessionHandle>, registry: Arc<Registry>, profile: Profile) -> Self {
        Self {
            session,
            registry,
            profile,
            state: SessionState::Unregistered,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The session this router drives.
    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.session
    }

    /// Consume events until the session closes. If the channel ends without
    /// a `Closed` event the transport is treated as faulted.
    #[instrument(skip_all, fields(session_id = %self.session.id()))]
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if self.on_event(event) == Flow::Stop {
                return;
            }
        }
        let _ = self.on_event(SessionEvent::Closed(CloseReason::Fault(
            "event channel closed".into(),
        )));
    }

    /// Apply one event.
    pub fn on_event(&mut self, event: SessionEvent) -> Flow {
        if self.state == SessionState::Closed {
            return Flow::Stop;
        }
        match event {
            SessionEvent::Connected => {
                info!(
                    session_id = %self.session.id(),
                    remote = %self.session.remote_addr(),
                    "client connected"
                );
                self.registry.add(self.session.clone());
            }
            SessionEvent::Received(text) => {
                if let Err(e) = self.on_text(&text) {
                    warn!(
                        session_id = %self.session.id(),
                        state = self.state.label(),
                        error = %e,
                        "dropping envelope"
                    );
                }
            }
            SessionEvent::Unsupported(kind) => {
                let e = ProtocolError::UnsupportedFrame(kind);
                warn!(session_id = %self.session.id(), error = %e, "dropping envelope");
            }
            SessionEvent::Closed(reason) => {
                self.close(&reason);
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn on_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        let envelope = Inbound::decode(text)?;
        debug!(kind = envelope.kind(), state = self.state.label(), "envelope received");

        match (&self.state, envelope) {
            (SessionState::Unregistered, Inbound::Register { username }) => self.register(&username),
            (SessionState::Registered { name }, Inbound::Message { to, content }) => {
                let name = name.clone();
                self.deliver(to, &name, Payload::Text(content));
                Ok(())
            }
            (SessionState::Registered { name }, Inbound::Image { to, image_data }) => {
                if !self.profile.images_enabled() {
                    return Err(ProtocolError::ImagesDisabled);
                }
                let name = name.clone();
                self.deliver(to, &name, Payload::Image(image_data));
                Ok(())
            }
            (state, envelope) => Err(ProtocolError::UnexpectedEnvelope {
                kind: envelope.kind(),
                state: state.label(),
            }),
        }
    }

    fn register(&mut self, username: &str) -> Result<(), ProtocolError> {
        let name = username.trim();
        if name.is_empty() {
            return Err(ProtocolError::EmptyUsername);
        }

        // On success the registry queues the `registered` ack ahead of presence
        match self.registry.rename(self.session.id(), name) {
            Ok(()) => {
                info!(session_id = %self.session.id(), username = name, "client registered");
                self.state = SessionState::Registered {
                    name: name.to_owned(),
                };
            }
            Err(e @ RegistryError::NameTaken { .. }) => {
                info!(session_id = %self.session.id(), username = name, "registration rejected: name taken");
                let _ = self.session.send_envelope(&Outbound::Error {
                    message: e.to_string(),
                });
            }
            Err(e) => {
                // Only reachable if the session was never added or already removed.
                warn!(session_id = %self.session.id(), error = %e, "registration failed");
            }
        }
        Ok(())
    }

    fn deliver(&self, to: Recipient, from_name: &str, payload: Payload) {
        let from = self.session.id().clone();
        let from_name = from_name.to_owned();
        let timestamp = now_millis();
        let envelope = match payload {
            Payload::Text(content) => Outbound::Message {
                from,
                from_name,
                content,
                timestamp,
            },
            Payload::Image(image_data) => Outbound::Image {
                from,
                from_name,
                image_data,
                timestamp,
            },
        };
        let frame = match envelope.to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound envelope");
                return;
            }
        };

        match to {
            Recipient::All => {
                let recipients = self.registry.broadcast(&frame);
                debug!(session_id = %self.session.id(), recipients, "broadcast delivered");
            }
            Recipient::Session(target) => {
                if self.registry.send_to(&target, frame) {
                    debug!(session_id = %self.session.id(), target = %target, "direct message delivered");
                } else {
                    debug!(session_id = %self.session.id(), target = %target, "direct message dropped: recipient not live");
                }
            }
        }
    }

    fn close(&mut self, reason: &CloseReason) {
        let name = match &self.state {
            SessionState::Registered { name } => Some(name.as_str()),
            _ => None,
        };
        match reason {
            CloseReason::Fault(detail) => {
                info!(session_id = %self.session.id(), username = name, fault = %detail, "client disconnected after transport fault");
            }
            CloseReason::Client | CloseReason::Shutdown => {
                info!(session_id = %self.session.id(), username = name, reason = ?reason, "client disconnected");
            }
        }
        let _ = self.registry.remove(self.session.id());
        self.state = SessionState::Closed;
    }
}
