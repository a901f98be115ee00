//! Sotto Session Layer
//!
//! Action-based state machines for one participant's room session:
//! joining (key derivation), encrypted signaling over an untrusted
//! relay, per-peer transport negotiation, double-wrapped chat, and
//! chunked file transfer.
//!
//! # Architecture
//!
//! Everything here is sans-IO. State machines take events and return
//! actions; a driver (production glue or test harness) executes the
//! actions against the real relay and transport and feeds the results
//! back in. Time and randomness come from the [`Environment`] trait,
//! so tests run with a virtual clock and seeded RNG.
//!
//! ```text
//! driver events                          session actions
//! ─────────────                          ───────────────
//! relay row        ──> ┌──────────┐ ──>  Subscribe / Publish
//! publish outcome  ──> │ Session  │ ──>  SendPeer (data channel)
//! transport state  ──> │          │ ──>  Peer (offer/answer/ICE)
//! channel payload  ──> └──────────┘ ──>  Notify (user events)
//! ```
//!
//! The session owns the key set derived from the room code; no global
//! key state exists anywhere. Dropping the session (or leaving the
//! room) zeroizes all key material.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod file;
pub mod peer;
pub mod retry;
pub mod session;
pub mod signaling;

pub use env::Environment;
#[cfg(feature = "system")]
pub use env::SystemEnv;
pub use error::SessionError;
pub use file::{FileAssembler, MAX_TRANSFER_CHUNKS, chunk_file};
pub use peer::{PeerAction, PeerSession, PeerState, TransportState};
pub use retry::{Backoff, RetryConfig, RetryQueue};
pub use session::{Notification, Session, SessionAction};
pub use signaling::{Inbound, SignalingChannel};
