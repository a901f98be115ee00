//! Sotto Wire Protocol
//!
//! JSON record shapes exchanged through the relay and over peer data
//! channels. This crate owns serialization only: envelopes arrive as
//! permissive wire shapes (byte arrays, base64 strings) and convert
//! into the fixed-size [`sotto_crypto`] types at the parse boundary,
//! where every length and encoding is validated.
//!
//! Parsing is total. Arbitrary relay bytes produce a
//! [`MalformedMessageError`], never a panic; the channel drops the
//! record and continues.
//!
//! # Wire Formats
//!
//! ```text
//! Relay row:     {"type":"enc","from":..,"to":..,"body":{iv,ct,seq,sig}}
//!                {"type":"admin_enc","from":..,"body":{iv,ct,seq,sig}}
//! Envelope:      {"iv":[12 bytes],"ct":[N bytes]}
//! Signed:        adds "seq" and base64 "sig"
//! Signal:        {"type":"sdp-offer"|"sdp-answer"|"ice"|"presence",..}
//! Admin:         {"op":"rename"|"kick"|"rotate",..}
//! Chat (outer):  {"enc":{iv,ct}}   (the nested-wrap boundary)
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod chat;
pub mod envelope;
pub mod error;
pub mod signal;

pub use chat::{ChatBody, FILE_CHUNK_SIZE, FileChunk, MessageRecord, PeerFrame};
pub use envelope::{WireEnvelope, WireSignedEnvelope};
pub use error::MalformedMessageError;
pub use signal::{AdminAction, RelayRecord, SignalMessage};
