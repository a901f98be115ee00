//! Encrypted, HMAC-signed signaling over the untrusted relay.
//!
//! Outbound messages are sealed under the signaling key, signed over
//! `iv ‖ ciphertext ‖ sequence`, and wrapped into relay records.
//! Inbound rows follow a fixed pipeline: parse, verify, decrypt, then
//! dispatch. Any failure drops the row with a log line and the channel
//! continues; the relay can corrupt or replay rows but never kill the
//! channel or forge a message.
//!
//! After a key rotation the previous signaling keys are retained so
//! rows sealed before the rotation stay readable until every peer has
//! caught up.

use std::collections::HashMap;

use sotto_crypto::{
    AuthenticationError, IV_SIZE, Iv, SignalingKeys, SignedEnvelope, SymmetricKey, open_signed,
    seal_signed,
};
use sotto_proto::{AdminAction, RelayRecord, SignalMessage, WireSignedEnvelope};

use crate::env::Environment;

/// A verified, decrypted inbound row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A signaling message addressed to us (or broadcast).
    Signal {
        /// Authenticated sender identity (from inside the envelope).
        from: String,
        /// The decrypted message.
        message: SignalMessage,
    },
    /// An admin action.
    Admin {
        /// Relay-visible sender identity.
        from: String,
        /// The decrypted action.
        action: AdminAction,
    },
}

/// Signaling channel state for one room.
///
/// Owns the per-channel outbound sequence counter and the per-sender
/// replay floor for inbound rows. Pure state machine: publishing
/// returns the encoded record for the driver to write, and inbound
/// rows are handed in by the driver's subscription callback.
#[derive(Debug)]
pub struct SignalingChannel {
    local_id: String,
    keys: SignalingKeys,
    meta_key: SymmetricKey,
    previous: Option<SignalingKeys>,
    seq: u32,
    last_seen: HashMap<String, u32>,
}

impl SignalingChannel {
    /// Create a channel with freshly derived signaling keys.
    pub fn new(local_id: impl Into<String>, keys: SignalingKeys, meta_key: SymmetricKey) -> Self {
        Self {
            local_id: local_id.into(),
            keys,
            meta_key,
            previous: None,
            seq: 0,
            last_seen: HashMap::new(),
        }
    }

    /// Outbound sequence counter (next value to be used).
    #[must_use]
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Seal and sign a signaling message into an encoded relay record.
    ///
    /// The driver writes the record to the relay; on failure it goes
    /// to the retry queue, never back to the caller.
    pub fn publish<E: Environment>(&mut self, env: &E, message: &SignalMessage) -> String {
        let signed = self.seal(env, &self.keys.aes.clone(), &message.encode());

        RelayRecord::Signal {
            from: self.local_id.clone(),
            to: message.recipient().map(str::to_owned),
            body: WireSignedEnvelope::from(signed),
        }
        .encode()
    }

    /// Seal and sign an admin action into an encoded relay record.
    ///
    /// Admin payloads are sealed under the `meta` subkey but share the
    /// channel's signature key and sequence space.
    pub fn publish_admin<E: Environment>(&mut self, env: &E, action: &AdminAction) -> String {
        let signed = self.seal(env, &self.meta_key.clone(), &action.encode());

        RelayRecord::Admin { from: self.local_id.clone(), body: WireSignedEnvelope::from(signed) }
            .encode()
    }

    /// Verify, decrypt, and classify one inbound relay row.
    ///
    /// Returns `None` for rows that are malformed, misaddressed,
    /// replayed, or fail verification; each drop is logged and the
    /// channel stays usable.
    pub fn handle_row(&mut self, row: &str) -> Option<Inbound> {
        let record = match RelayRecord::decode(row) {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed relay row");
                return None;
            }
        };

        // Our own rows echo back through the subscription; skipping
        // them here keeps admin actions (rotation above all) from
        // being applied twice locally.
        let outer_from = match &record {
            RelayRecord::Signal { from, .. } | RelayRecord::Admin { from, .. } => from,
        };
        if *outer_from == self.local_id {
            return None;
        }

        match record {
            RelayRecord::Signal { from, to, body } => {
                // Misaddressed rows are expected in a shared room feed.
                if let Some(to) = &to
                    && *to != self.local_id
                {
                    return None;
                }

                let plaintext = self.verify_and_open(&from, body, None)?;

                let message = match SignalMessage::decode(&plaintext) {
                    Ok(message) => message,
                    Err(error) => {
                        tracing::warn!(%from, %error, "dropping undecodable signal payload");
                        return None;
                    }
                };

                // The relay-visible sender is an unauthenticated hint;
                // the envelope's inner sender is what we trust. A
                // mismatch means someone re-labelled a stolen row.
                if message.sender() != from {
                    tracing::warn!(outer = %from, inner = %message.sender(),
                        "dropping signal row with mismatched sender");
                    return None;
                }

                Some(Inbound::Signal { from, message })
            }
            RelayRecord::Admin { from, body } => {
                let meta_key = self.meta_key.clone();
                let plaintext = self.verify_and_open(&from, body, Some(&meta_key))?;

                let action = match AdminAction::decode(&plaintext) {
                    Ok(action) => action,
                    Err(error) => {
                        tracing::warn!(%from, %error, "dropping undecodable admin payload");
                        return None;
                    }
                };

                Some(Inbound::Admin { from, action })
            }
        }
    }

    /// Swap in rotated signaling keys, retaining the old ones for
    /// in-flight rows sealed before the rotation.
    pub fn apply_rotation(&mut self, keys: SignalingKeys) {
        self.previous = Some(std::mem::replace(&mut self.keys, keys));
    }

    /// Drop the retained pre-rotation keys once peers have caught up.
    pub fn retire_previous_keys(&mut self) {
        self.previous = None;
    }

    fn seal<E: Environment>(&mut self, env: &E, key: &SymmetricKey, plaintext: &[u8]) -> SignedEnvelope {
        let mut iv = [0u8; IV_SIZE];
        env.random_bytes(&mut iv);

        let signed = seal_signed(key, &self.keys.hmac, plaintext, self.seq, Iv::from_bytes(iv));
        self.seq = self.seq.wrapping_add(1);
        signed
    }

    /// Verify the signature, enforce the per-sender replay floor, and
    /// decrypt, falling back to pre-rotation keys on a signature
    /// mismatch.
    fn verify_and_open(
        &mut self,
        from: &str,
        body: WireSignedEnvelope,
        payload_key: Option<&SymmetricKey>,
    ) -> Option<Vec<u8>> {
        let signed = match body.into_signed_envelope() {
            Ok(signed) => signed,
            Err(error) => {
                tracing::warn!(%from, %error, "dropping row with malformed envelope");
                return None;
            }
        };

        // Replay floor: each sender's sequence must strictly increase.
        // Checked before decryption so replayed rows cost us nothing.
        if let Some(&floor) = self.last_seen.get(from)
            && signed.seq <= floor
        {
            tracing::debug!(%from, seq = signed.seq, floor, "dropping replayed row");
            return None;
        }

        let current_key = payload_key.unwrap_or(&self.keys.aes).clone();
        let result = open_signed(&current_key, &self.keys.hmac, &signed, None);

        let plaintext = match result {
            Ok(plaintext) => plaintext,
            Err(AuthenticationError::SignatureMismatch) => {
                // Rows sealed under the pre-rotation keys remain valid
                // until every peer has rotated.
                let previous = self.previous.as_ref()?;
                let key = payload_key.unwrap_or(&previous.aes).clone();
                match open_signed(&key, &previous.hmac, &signed, None) {
                    Ok(plaintext) => plaintext,
                    Err(error) => {
                        tracing::warn!(%from, %error, "dropping unverifiable row");
                        return None;
                    }
                }
            }
            Err(error) => {
                tracing::warn!(%from, %error, "dropping unverifiable row");
                return None;
            }
        };

        self.last_seen.insert(from.to_owned(), signed.seq);
        Some(plaintext)
    }
}
