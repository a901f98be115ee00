//! Signaling and admin message types.
//!
//! Every message kind is a closed tagged union matched exhaustively:
//! adding a new kind is a compile-time-checked change, and an inbound
//! record with an unknown tag fails to parse instead of silently
//! dispatching nowhere.

use serde::{Deserialize, Serialize};

use crate::{envelope::WireSignedEnvelope, error::MalformedMessageError};

/// A decrypted signaling message.
///
/// The `type` tag on the wire is one of `sdp-offer`, `sdp-answer`,
/// `ice`, or `presence`. Offers, answers and candidates are addressed
/// point-to-point; presence is a room-wide broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    /// Transport session offer from an initiating peer.
    #[serde(rename = "sdp-offer")]
    Offer {
        /// Sender identity.
        from: String,
        /// Intended recipient identity.
        to: String,
        /// Serialized session description.
        sdp: String,
    },

    /// Transport session answer from a responding peer.
    #[serde(rename = "sdp-answer")]
    Answer {
        /// Sender identity.
        from: String,
        /// Intended recipient identity.
        to: String,
        /// Serialized session description.
        sdp: String,
    },

    /// A connectivity candidate for an in-progress negotiation.
    #[serde(rename = "ice")]
    IceCandidate {
        /// Sender identity.
        from: String,
        /// Intended recipient identity.
        to: String,
        /// Serialized candidate.
        candidate: String,
    },

    /// Room-wide liveness announcement.
    #[serde(rename = "presence")]
    Presence {
        /// Sender identity.
        from: String,
        /// Sender wall-clock timestamp, Unix milliseconds.
        ts: u64,
    },
}

impl SignalMessage {
    /// The sender identity.
    pub fn sender(&self) -> &str {
        match self {
            Self::Offer { from, .. }
            | Self::Answer { from, .. }
            | Self::IceCandidate { from, .. }
            | Self::Presence { from, .. } => from,
        }
    }

    /// The addressed recipient, or `None` for room-wide broadcasts.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Offer { to, .. } | Self::Answer { to, .. } | Self::IceCandidate { to, .. } => {
                Some(to)
            }
            Self::Presence { .. } => None,
        }
    }

    /// Serialize to the JSON plaintext sealed into a signal envelope.
    pub fn encode(&self) -> Vec<u8> {
        let Ok(bytes) = serde_json::to_vec(self) else {
            unreachable!("signal messages always serialize to JSON");
        };
        bytes
    }

    /// Parse a decrypted signal payload.
    ///
    /// # Errors
    ///
    /// [`MalformedMessageError::Json`] on schema mismatch or unknown
    /// `type` tag.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedMessageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A moderation action, sealed under the `meta` subkey.
///
/// The `op` tag on the wire is one of `rename`, `kick`, or `rotate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum AdminAction {
    /// Assign a display name to a participant.
    #[serde(rename = "rename")]
    Rename {
        /// Identity being renamed.
        target: String,
        /// New display name.
        name: String,
    },

    /// Remove a participant from the room.
    #[serde(rename = "kick")]
    Kick {
        /// Identity being removed.
        target: String,
    },

    /// Coordinate a key rotation: every peer derives successor keys
    /// from this salt.
    #[serde(rename = "rotate")]
    Rotate {
        /// Fresh rotation salt chosen by the initiating admin.
        salt: Vec<u8>,
    },
}

impl AdminAction {
    /// Serialize to the JSON plaintext sealed into an admin envelope.
    pub fn encode(&self) -> Vec<u8> {
        let Ok(bytes) = serde_json::to_vec(self) else {
            unreachable!("admin actions always serialize to JSON");
        };
        bytes
    }

    /// Parse a decrypted admin payload.
    ///
    /// # Errors
    ///
    /// [`MalformedMessageError::Json`] on schema mismatch or unknown
    /// `op` tag.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedMessageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A relay row: the outermost JSON record written to the store.
///
/// The relay sees only this shape: a sender identity, an optional
/// recipient, and an opaque signed envelope. The `type` tag separates
/// signaling traffic (`enc`) from admin traffic (`admin_enc`), which
/// are sealed under different subkeys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayRecord {
    /// A sealed [`SignalMessage`], encrypted under the signaling key.
    #[serde(rename = "enc")]
    Signal {
        /// Sender identity (relay-visible, unauthenticated hint; the
        /// authenticated sender is inside the envelope).
        from: String,
        /// Recipient identity, absent for broadcasts.
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        /// The sealed, signed payload.
        body: WireSignedEnvelope,
    },

    /// A sealed [`AdminAction`], encrypted under the meta key.
    #[serde(rename = "admin_enc")]
    Admin {
        /// Sender identity (relay-visible hint).
        from: String,
        /// The sealed, signed payload.
        body: WireSignedEnvelope,
    },
}

impl RelayRecord {
    /// Serialize to the JSON row written to the relay.
    pub fn encode(&self) -> String {
        let Ok(json) = serde_json::to_string(self) else {
            unreachable!("relay records always serialize to JSON");
        };
        json
    }

    /// Parse a row received from the relay.
    ///
    /// # Errors
    ///
    /// [`MalformedMessageError::Json`] on any schema mismatch; callers
    /// drop the row and keep the channel alive.
    pub fn decode(json: &str) -> Result<Self, MalformedMessageError> {
        Ok(serde_json::from_str(json)?)
    }
}
