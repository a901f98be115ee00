//! Error types for Sotto cryptographic operations.
//!
//! Two deliberately narrow errors: key derivation failures are fatal to
//! a room join and must surface to the caller; authentication failures
//! mean the message is dropped. Neither carries plaintext or key
//! material in its payload.

use thiserror::Error;

/// Master key derivation failed.
///
/// This is fatal to joining a room. There is no silent fallback to a
/// weaker KDF; the caller must surface the failure to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyDerivationError {
    /// The Argon2id parameters were rejected by the underlying
    /// primitive (e.g. zero memory cost, oversized output).
    #[error("invalid KDF parameters: {reason}")]
    InvalidParams {
        /// Description from the underlying primitive.
        reason: String,
    },

    /// The hash computation itself failed.
    #[error("key derivation failed: {reason}")]
    DerivationFailed {
        /// Description from the underlying primitive.
        reason: String,
    },
}

/// An envelope failed authentication.
///
/// Any tag mismatch, signature mismatch, or replayed sequence yields
/// this error. The envelope is dropped; no partial plaintext is ever
/// returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The AEAD tag did not verify (tampering or wrong key).
    #[error("AEAD authentication failed")]
    TagMismatch,

    /// The HMAC signature did not verify.
    ///
    /// Checked before decryption, so a forged row never reaches the
    /// cipher.
    #[error("HMAC signature verification failed")]
    SignatureMismatch,

    /// The sequence number did not match the expected value.
    ///
    /// A well-formed, correctly signed envelope replayed out of order
    /// is rejected before decryption.
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Sequence number the caller expected.
        expected: u32,
        /// Sequence number carried by the envelope.
        actual: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_without_leaking_material() {
        let err = AuthenticationError::TagMismatch;
        assert_eq!(err.to_string(), "AEAD authentication failed");

        let err = AuthenticationError::SequenceMismatch { expected: 4, actual: 2 };
        assert_eq!(err.to_string(), "sequence mismatch: expected 4, got 2");

        let err = KeyDerivationError::InvalidParams { reason: "memory cost too small".to_string() };
        assert!(err.to_string().contains("invalid KDF parameters"));
    }
}
