//! Manual key rotation without a new room code.
//!
//! Successor keys are HKDF expansions over the raw bytes of the
//! current signaling key, salted by a fresh caller-supplied value and
//! labelled distinctly from the original subkey labels. Rotation is
//! local: there is no cross-peer handshake here; callers coordinate
//! out-of-band (e.g. an admin action carrying the salt) and keep the
//! previous keys around until every peer has rotated.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::{
    KEY_SIZE,
    keys::{KeySet, SymmetricKey},
};

/// Info label for the rotated chat key.
const ROTATED_CHAT_LABEL: &[u8] = b"sotto rotated chat v1";
/// Info label for the rotated signaling key.
const ROTATED_SIGNAL_LABEL: &[u8] = b"sotto rotated signal v1";
/// Info label for the rotated signaling HMAC key.
const ROTATED_HMAC_LABEL: &[u8] = b"sotto rotated hmac v1";

/// Successor keys produced by [`rotate`].
#[derive(Debug, Clone)]
pub struct RotatedKeys {
    /// Replacement for the chat subkey.
    pub chat: SymmetricKey,
    /// Replacement for the signaling subkey.
    pub signal: SymmetricKey,
    /// Replacement HMAC key for the signaling channel.
    pub signal_hmac: SymmetricKey,
}

/// Derive successor keys from the current signaling key.
///
/// Deterministic in `(current_signal, salt)`: peers that receive the
/// same salt derive the same successors. The labels are disjoint from
/// the original subkey labels, so rotated keys can never collide with
/// first-generation keys.
pub fn rotate(current_signal: &SymmetricKey, salt: &[u8]) -> RotatedKeys {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), current_signal.as_bytes());

    RotatedKeys {
        chat: expand(&hkdf, ROTATED_CHAT_LABEL),
        signal: expand(&hkdf, ROTATED_SIGNAL_LABEL),
        signal_hmac: expand(&hkdf, ROTATED_HMAC_LABEL),
    }
}

impl KeySet {
    /// Swap in rotated `chat`/`signal` keys in one assignment.
    ///
    /// Returns the previous signaling key so in-flight traffic sealed
    /// under it stays decryptable until all peers have rotated. No
    /// reader ever observes a half-updated set: the replacement is a
    /// plain field assignment on an exclusively borrowed value.
    pub fn apply_rotation(&mut self, rotated: &RotatedKeys) -> SymmetricKey {
        let previous_signal = std::mem::replace(&mut self.signal, rotated.signal.clone());
        self.chat = rotated.chat.clone();
        previous_signal
    }
}

fn expand(hkdf: &Hkdf<Sha256>, info: &[u8]) -> SymmetricKey {
    let mut out = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(info, &mut out) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    SymmetricKey::from_bytes(out)
}
