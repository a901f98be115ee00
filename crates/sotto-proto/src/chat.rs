//! Chat and file transfer payload types.
//!
//! Chat messages are double-wrapped: the [`ChatBody`] plaintext is
//! sealed under the `chat` subkey, the resulting envelope is embedded
//! in a [`MessageRecord`] and sealed again under the `auth` subkey.
//! Compromise of one subkey alone reveals neither content (needs
//! `chat`) nor the ability to forge receivable frames (needs `auth`).

use serde::{Deserialize, Serialize};

use crate::{envelope::WireEnvelope, error::MalformedMessageError};

/// File transfer chunk size in bytes.
pub const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Inner plaintext of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBody {
    /// Sender identity.
    pub from: String,
    /// Message text.
    pub text: String,
    /// Sender wall-clock timestamp, Unix milliseconds.
    pub ts: u64,
}

/// Outer plaintext of a chat message: the inner envelope, re-sealed.
///
/// This is the `{enc: ...}` wrapper between the two encryption layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// The inner chat envelope, sealed under the `chat` subkey.
    pub enc: WireEnvelope,
}

/// One chunk of a file transfer, sealed under the `file` subkey.
///
/// Files are split into [`FILE_CHUNK_SIZE`] pieces and reassembled in
/// sequence order on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    /// Transfer identifier, unique per sender.
    pub file_id: String,
    /// Zero-based chunk index.
    pub seq: u32,
    /// Chunk payload, at most [`FILE_CHUNK_SIZE`] bytes.
    pub data: Vec<u8>,
    /// Set on the final chunk of the transfer.
    pub last: bool,
}

/// One message on a peer data channel.
///
/// Chat, voice, and file traffic share the channel; the `kind` tag
/// routes each sealed envelope to the right subkey on the receiving
/// side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PeerFrame {
    /// A double-wrapped chat message; `enc` is the outer envelope,
    /// sealed under the `auth` subkey.
    #[serde(rename = "chat")]
    Chat {
        /// Outer envelope of the nested wrap.
        enc: WireEnvelope,
    },

    /// A recorded voice note, sealed whole under the `chat` subkey.
    ///
    /// The mime tag travels in the clear so the receiver can hand the
    /// decrypted blob straight to playback.
    #[serde(rename = "voice")]
    Voice {
        /// Audio container type, e.g. `audio/webm`.
        mime: String,
        /// The sealed audio blob.
        enc: WireEnvelope,
    },

    /// A sealed [`FileChunk`], encrypted under the `file` subkey.
    #[serde(rename = "file")]
    File {
        /// The sealed chunk.
        enc: WireEnvelope,
    },
}

impl PeerFrame {
    /// Serialize to the bytes sent over a peer data channel.
    pub fn encode(&self) -> Vec<u8> {
        let Ok(bytes) = serde_json::to_vec(self) else {
            unreachable!("peer frames always serialize to JSON");
        };
        bytes
    }

    /// Parse a message received over a peer data channel.
    ///
    /// # Errors
    ///
    /// [`MalformedMessageError::Json`] on schema mismatch or unknown
    /// `kind` tag.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedMessageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl ChatBody {
    /// Serialize to the inner plaintext sealed under the `chat` key.
    pub fn encode(&self) -> Vec<u8> {
        let Ok(bytes) = serde_json::to_vec(self) else {
            unreachable!("chat bodies always serialize to JSON");
        };
        bytes
    }

    /// Parse a fully decrypted chat body.
    ///
    /// # Errors
    ///
    /// [`MalformedMessageError::Json`] on schema mismatch.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedMessageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl MessageRecord {
    /// Serialize to the outer plaintext sealed under the `auth` key.
    pub fn encode(&self) -> Vec<u8> {
        let Ok(bytes) = serde_json::to_vec(self) else {
            unreachable!("message records always serialize to JSON");
        };
        bytes
    }

    /// Parse the decrypted outer layer of a chat message.
    ///
    /// # Errors
    ///
    /// [`MalformedMessageError::Json`] on schema mismatch.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedMessageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl FileChunk {
    /// Serialize to the plaintext sealed under the `file` key.
    pub fn encode(&self) -> Vec<u8> {
        let Ok(bytes) = serde_json::to_vec(self) else {
            unreachable!("file chunks always serialize to JSON");
        };
        bytes
    }

    /// Parse a decrypted file chunk.
    ///
    /// # Errors
    ///
    /// [`MalformedMessageError::Json`] on schema mismatch.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedMessageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
