//! Wire form of sealed envelopes.
//!
//! Relay rows are JSON. IV and ciphertext travel as JSON byte arrays,
//! signatures as base64 strings. These types are the permissive wire
//! shapes; conversion into the fixed-size crypto types validates
//! lengths and encodings, so a malformed row is rejected at the parse
//! boundary instead of deep inside a cipher call.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use sotto_crypto::{IV_SIZE, SIG_SIZE};

use crate::error::MalformedMessageError;

/// A sealed payload as it appears on the wire: `{iv: [..], ct: [..]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// 96-bit IV as a JSON byte array.
    pub iv: Vec<u8>,
    /// Ciphertext (GCM tag appended) as a JSON byte array.
    pub ct: Vec<u8>,
}

/// A signed envelope on the wire: adds `seq` and a base64 `sig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSignedEnvelope {
    /// 96-bit IV as a JSON byte array.
    pub iv: Vec<u8>,
    /// Ciphertext (GCM tag appended) as a JSON byte array.
    pub ct: Vec<u8>,
    /// Sender-local monotonic sequence number.
    pub seq: u32,
    /// Base64-encoded HMAC-SHA-256 over `iv ‖ ct ‖ seq`.
    pub sig: String,
}

impl WireEnvelope {
    /// Validate lengths and convert into the crypto envelope.
    ///
    /// # Errors
    ///
    /// [`MalformedMessageError::InvalidIvLength`] if the IV is not
    /// exactly [`IV_SIZE`] bytes.
    pub fn into_envelope(self) -> Result<sotto_crypto::Envelope, MalformedMessageError> {
        let iv: [u8; IV_SIZE] = self
            .iv
            .try_into()
            .map_err(|bad: Vec<u8>| MalformedMessageError::InvalidIvLength {
                expected: IV_SIZE,
                actual: bad.len(),
            })?;

        Ok(sotto_crypto::Envelope { iv, ct: self.ct })
    }
}

impl From<sotto_crypto::Envelope> for WireEnvelope {
    fn from(envelope: sotto_crypto::Envelope) -> Self {
        Self { iv: envelope.iv.to_vec(), ct: envelope.ct }
    }
}

impl WireSignedEnvelope {
    /// Validate lengths and encodings and convert into the crypto type.
    ///
    /// # Errors
    ///
    /// - [`MalformedMessageError::InvalidIvLength`] on a wrong-sized IV
    /// - [`MalformedMessageError::InvalidSignature`] if `sig` is not
    ///   base64 or does not decode to [`SIG_SIZE`] bytes
    pub fn into_signed_envelope(
        self,
    ) -> Result<sotto_crypto::SignedEnvelope, MalformedMessageError> {
        let envelope = WireEnvelope { iv: self.iv, ct: self.ct }.into_envelope()?;

        let decoded =
            BASE64.decode(&self.sig).map_err(|_| MalformedMessageError::InvalidSignature)?;
        let sig: [u8; SIG_SIZE] =
            decoded.try_into().map_err(|_| MalformedMessageError::InvalidSignature)?;

        Ok(sotto_crypto::SignedEnvelope { envelope, seq: self.seq, sig })
    }
}

impl From<sotto_crypto::SignedEnvelope> for WireSignedEnvelope {
    fn from(signed: sotto_crypto::SignedEnvelope) -> Self {
        Self {
            iv: signed.envelope.iv.to_vec(),
            ct: signed.envelope.ct,
            seq: signed.seq,
            sig: BASE64.encode(signed.sig),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn envelope() -> sotto_crypto::Envelope {
        sotto_crypto::Envelope { iv: [7; IV_SIZE], ct: vec![1, 2, 3] }
    }

    #[test]
    fn envelope_wire_round_trip() {
        let wire = WireEnvelope::from(envelope());
        let json = serde_json::to_string(&wire).unwrap();
        let parsed: WireEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.into_envelope().unwrap(), envelope());
    }

    #[test]
    fn envelope_serializes_as_byte_arrays() {
        let wire = WireEnvelope { iv: vec![0; IV_SIZE], ct: vec![9, 9] };
        let json = serde_json::to_string(&wire).unwrap();

        assert_eq!(json, r#"{"iv":[0,0,0,0,0,0,0,0,0,0,0,0],"ct":[9,9]}"#);
    }

    #[test]
    fn short_iv_is_rejected() {
        let wire = WireEnvelope { iv: vec![0; 7], ct: vec![] };

        assert!(matches!(
            wire.into_envelope(),
            Err(MalformedMessageError::InvalidIvLength { expected: IV_SIZE, actual: 7 })
        ));
    }

    #[test]
    fn signed_wire_round_trip() {
        let signed =
            sotto_crypto::SignedEnvelope { envelope: envelope(), seq: 42, sig: [3; SIG_SIZE] };

        let wire = WireSignedEnvelope::from(signed.clone());
        let json = serde_json::to_string(&wire).unwrap();
        let parsed: WireSignedEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.into_signed_envelope().unwrap(), signed);
    }

    #[test]
    fn signature_travels_as_base64() {
        let signed =
            sotto_crypto::SignedEnvelope { envelope: envelope(), seq: 0, sig: [0; SIG_SIZE] };

        let wire = WireSignedEnvelope::from(signed);
        assert_eq!(wire.sig, BASE64.encode([0u8; SIG_SIZE]));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let mut wire = WireSignedEnvelope::from(sotto_crypto::SignedEnvelope {
            envelope: envelope(),
            seq: 0,
            sig: [0; SIG_SIZE],
        });
        wire.sig = "not base64 !!!".to_owned();

        assert!(matches!(
            wire.into_signed_envelope(),
            Err(MalformedMessageError::InvalidSignature)
        ));
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let mut wire = WireSignedEnvelope::from(sotto_crypto::SignedEnvelope {
            envelope: envelope(),
            seq: 0,
            sig: [0; SIG_SIZE],
        });
        wire.sig = BASE64.encode([0u8; 16]);

        assert!(matches!(
            wire.into_signed_envelope(),
            Err(MalformedMessageError::InvalidSignature)
        ));
    }
}
