//! Wire decoding errors.

use thiserror::Error;

/// An inbound record failed to parse.
///
/// Decoding is total: arbitrary relay bytes produce this error, never
/// a panic. The channel drops the record, logs it, and continues.
#[derive(Debug, Error)]
pub enum MalformedMessageError {
    /// The record is not valid JSON or does not match the schema.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The IV field has the wrong length.
    #[error("invalid iv length: expected {expected} bytes, got {actual}")]
    InvalidIvLength {
        /// Required IV size in bytes.
        expected: usize,
        /// Length actually present on the wire.
        actual: usize,
    },

    /// The signature field is not valid base64 or has the wrong length.
    #[error("invalid signature encoding")]
    InvalidSignature,
}
