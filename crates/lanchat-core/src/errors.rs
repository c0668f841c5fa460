//! Error taxonomy for envelope handling and registry mutations.
//!
//! None of these are fatal. A [`ProtocolError`] is logged and the envelope
//! dropped; a [`RegistryError::NameTaken`] becomes an `error` envelope sent
//! back to the requesting connection.

use thiserror::Error;

use crate::ids::SessionId;

/// An inbound envelope that cannot be acted on.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, unknown `type`, or missing/mistyped fields.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    /// A well-formed envelope that the session's current state does not accept.
    #[error("'{kind}' envelope not accepted while {state}")]
    UnexpectedEnvelope {
        /// Envelope tag.
        kind: &'static str,
        /// Session state name.
        state: &'static str,
    },

    /// `register` with a blank username.
    #[error("username must not be empty")]
    EmptyUsername,

    /// `image` envelope under a text-only profile.
    #[error("image envelopes are disabled")]
    ImagesDisabled,

    /// Non-text WebSocket frame.
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
}

/// A rejected registry mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Another live session already holds this display name.
    #[error("username '{name}' is already taken")]
    NameTaken {
        /// The contested name.
        name: String,
    },

    /// No live session with this id.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// The session already has a display name.
    #[error("session {0} is already registered")]
    AlreadyRegistered(SessionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display_includes_cause() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err = ProtocolError::Malformed(json_err);
        assert!(err.to_string().starts_with("malformed envelope:"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn unexpected_envelope_display() {
        let err = ProtocolError::UnexpectedEnvelope {
            kind: "message",
            state: "unregistered",
        };
        assert_eq!(
            err.to_string(),
            "'message' envelope not accepted while unregistered"
        );
    }

    #[test]
    fn name_taken_display() {
        let err = RegistryError::NameTaken {
            name: "alice".into(),
        };
        assert_eq!(err.to_string(), "username 'alice' is already taken");
    }

    #[test]
    fn unknown_session_display() {
        let err = RegistryError::UnknownSession(SessionId::from("user_x"));
        assert_eq!(err.to_string(), "unknown session: user_x");
    }
}
