//! Error taxonomy for the session layer.
//!
//! Each variant carries a distinct propagation policy:
//!
//! - [`SessionError::KeyDerivation`] is fatal to join and surfaces to
//!   the user; there is no silent fallback to a weaker KDF
//! - [`SessionError::Authentication`] and
//!   [`SessionError::MalformedMessage`] drop the offending message;
//!   the channel continues
//! - [`SessionError::RelayUnavailable`] is transient and retried with
//!   backoff; after the retry bound the message is dropped with one
//!   delivery-failure notification
//! - [`SessionError::TransportNegotiation`] allows one automatic
//!   restart, then the peer session is torn down

use sotto_crypto::{AuthenticationError, KeyDerivationError};
use sotto_proto::MalformedMessageError;
use thiserror::Error;

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Master key derivation failed. Fatal to join.
    #[error("key derivation failed: {0}")]
    KeyDerivation(#[from] KeyDerivationError),

    /// A cryptographic check failed. The message is dropped, never
    /// partially processed.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),

    /// An inbound payload failed to parse. Dropped, logged, channel
    /// continues.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] MalformedMessageError),

    /// The relay rejected or lost a publish. Retried per backoff
    /// policy until the attempt bound is exhausted.
    #[error("relay unavailable after {attempts} attempts")]
    RelayUnavailable {
        /// Publish attempts made, including the initial one.
        attempts: u32,
    },

    /// Transport negotiation with a peer failed past the single
    /// allowed restart.
    #[error("transport negotiation with {peer} failed after restart")]
    TransportNegotiation {
        /// The remote participant.
        peer: String,
    },

    /// An operation that requires an active room was called before
    /// `join` or after `leave`.
    #[error("no active room")]
    NotJoined,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_with_context() {
        let err = SessionError::RelayUnavailable { attempts: 6 };
        assert_eq!(err.to_string(), "relay unavailable after 6 attempts");

        let err = SessionError::TransportNegotiation { peer: "bob".to_owned() };
        assert_eq!(err.to_string(), "transport negotiation with bob failed after restart");
    }

    #[test]
    fn crypto_errors_convert() {
        let err: SessionError = AuthenticationError::TagMismatch.into();
        assert!(matches!(err, SessionError::Authentication(_)));
    }
}
