//! JSON wire protocol.
//!
//! Every WebSocket text frame carries exactly one envelope, tagged by its
//! `"type"` field. Inbound frames are decoded once into [`Inbound`]; unknown
//! tags and missing fields surface as [`ProtocolError::Malformed`] rather than
//! being ignored. Outbound frames are built from [`Outbound`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::ids::SessionId;

/// Wire value of the broadcast recipient.
pub const ALL: &str = "all";

/// Addressing of a `message` or `image` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Recipient {
    /// Every live session, sender included.
    All,
    /// One session, by id.
    Session(SessionId),
}

impl From<String> for Recipient {
    fn from(s: String) -> Self {
        if s == ALL {
            Self::All
        } else {
            Self::Session(SessionId::from_string(s))
        }
    }
}

impl From<Recipient> for String {
    fn from(r: Recipient) -> Self {
        match r {
            Recipient::All => ALL.to_owned(),
            Recipient::Session(id) => id.to_string(),
        }
    }
}

/// Client → server envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Inbound {
    /// Claim a display name.
    Register {
        /// Requested display name.
        username: String,
    },
    /// Text message.
    Message {
        /// Recipient.
        to: Recipient,
        /// Message body.
        content: String,
    },
    /// Embedded image, as a data URI.
    Image {
        /// Recipient.
        to: Recipient,
        /// `data:image/...;base64,...`
        image_data: String,
    },
}

impl Inbound {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// The envelope's wire tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Message { .. } => "message",
            Self::Image { .. } => "image",
        }
    }
}

/// One row of the contact list: a projection of a registered session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Session id.
    pub id: SessionId,
    /// Display name.
    pub username: String,
    /// Remote IP address of the connection.
    pub ip: String,
}

/// Server → client envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Outbound {
    /// Full presence snapshot.
    ContactList {
        /// Every registered session, in connect order.
        contacts: Vec<Contact>,
    },
    /// Registration accepted; tells the client its own id.
    Registered {
        /// The registering session's id.
        id: SessionId,
    },
    /// Delivered text message.
    Message {
        /// Sender id.
        from: SessionId,
        /// Sender display name.
        from_name: String,
        /// Message body.
        content: String,
        /// Server receive time, epoch milliseconds.
        timestamp: i64,
    },
    /// Delivered image.
    Image {
        /// Sender id.
        from: SessionId,
        /// Sender display name.
        from_name: String,
        /// Image data URI.
        image_data: String,
        /// Server receive time, epoch milliseconds.
        timestamp: i64,
    },
    /// Registration conflict.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl Outbound {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Protocol profile a deployment runs with.
///
/// `Full` enforces unique display names and accepts images. `Basic` allows
/// duplicate names and rejects `image` envelopes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Unique names, images enabled.
    #[default]
    Full,
    /// Shared names allowed, text only.
    Basic,
}

impl Profile {
    /// Whether registration rejects a name held by another live session.
    pub fn unique_names(self) -> bool {
        matches!(self, Self::Full)
    }

    /// Whether `image` envelopes are routed.
    pub fn images_enabled(self) -> bool {
        matches!(self, Self::Full)
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Basic => "basic",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "basic" => Ok(Self::Basic),
            other => Err(format!("unknown profile '{other}' (expected 'full' or 'basic')")),
        }
    }
}
