//! Sotto Cryptographic Primitives
//!
//! Cryptographic building blocks for the Sotto room protocol. Pure
//! functions with deterministic outputs. Callers provide random bytes
//! (IVs, rotation salts) for deterministic testing.
//!
//! # Key Lifecycle
//!
//! Two participants who type the same room code independently converge
//! on the same key material without any key exchange:
//!
//! ```text
//! Room code + pepper
//!        │
//!        ▼
//! SHA-256 → Storage id (relay-visible room handle)
//!        │
//!        ▼
//! Argon2id → Master key (memory-hard, offline-guessing resistant)
//!        │
//!        ▼
//! HKDF-SHA-256 → Subkeys: chat / signal / meta / auth / file
//!        │
//!        ▼
//! AEAD Envelopes → Ciphertext (optionally HMAC-signed)
//! ```
//!
//! # Security
//!
//! Root of trust:
//! - The room code is the sole shared secret; it is never transmitted
//! - The relay sees only the storage id (a one-way hash of the code)
//! - Master key derivation is deliberately expensive (tunable Argon2id
//!   time/memory cost) to resist offline guessing of short codes
//!
//! Subkey isolation:
//! - Each purpose gets an independent HKDF expansion with a fixed info
//!   label; knowledge of one subkey does not yield another
//! - Chat messages are double-wrapped (inner `chat`, outer `auth`) so
//!   a single subkey compromise reveals neither content nor the
//!   ability to forge receivable frames
//!
//! Authenticity:
//! - AES-256-GCM rejects any tampered envelope outright; decryption
//!   never yields partial plaintext
//! - Signed envelopes verify the HMAC (constant time) before the AEAD
//!   open, so forged rows are rejected without touching the cipher

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod envelope;
pub mod error;
pub mod frame;
pub mod keys;
pub mod rotation;

pub use envelope::{Envelope, Iv, SignedEnvelope, open, open_signed, seal, seal_signed};
pub use error::{AuthenticationError, KeyDerivationError};
pub use frame::{
    FrameCounterExhausted, FrameDecryptor, FrameEncryptor, FrameOutcome, FramePolicy, SealedFrame,
};
pub use keys::{
    KdfConfig, KeySet, MasterKey, SignalingKeys, StorageId, SymmetricKey, derive_master_key,
    derive_signaling_keys, derive_storage_id, derive_subkeys,
};
pub use rotation::{RotatedKeys, rotate};

/// Size of an AES-256-GCM key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV in bytes (96 bits).
pub const IV_SIZE: usize = 12;

/// Size of an HMAC-SHA-256 signature in bytes.
pub const SIG_SIZE: usize = 32;
