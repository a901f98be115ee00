//! Key hierarchy: room code to purpose-scoped subkeys.
//!
//! The room code is the sole root of trust. From it we derive, in
//! order: a storage id (the relay-visible room handle), a master key
//! (memory-hard, Argon2id), and five independent subkeys (HKDF-SHA-256
//! with fixed info labels). Every step is deterministic, so two
//! participants with the same code converge on identical keys without
//! exchanging a single byte.
//!
//! # Security
//!
//! - The storage id is a one-way hash: the relay never learns the code
//! - Argon2id cost parameters are tunable; the defaults match an
//!   interactive join (~hundreds of milliseconds on commodity hardware)
//! - Subkey info labels are fixed protocol constants; changing one is a
//!   wire-breaking change

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{KEY_SIZE, error::KeyDerivationError};

/// Info label for the chat subkey.
const CHAT_LABEL: &[u8] = b"chat";
/// Info label for the signaling subkey.
const SIGNAL_LABEL: &[u8] = b"signal";
/// Info label for the metadata subkey.
const META_LABEL: &[u8] = b"meta";
/// Info label for the outer-authentication subkey.
const AUTH_LABEL: &[u8] = b"auth";
/// Info label for the file transfer subkey.
const FILE_LABEL: &[u8] = b"file";

/// Info label for the auxiliary signaling AES key (single-key flows).
const SIGNALING_AES_LABEL: &[u8] = b"sotto signaling aes v1";
/// Info label for the auxiliary signaling HMAC key (single-key flows).
const SIGNALING_HMAC_LABEL: &[u8] = b"sotto signaling hmac v1";

/// Separator between room code and pepper in the storage id preimage.
const STORAGE_ID_SEPARATOR: &str = "::";

/// A 256-bit symmetric key.
///
/// Zeroized on drop. The raw bytes are only reachable through
/// [`as_bytes`](Self::as_bytes); `Debug` output is redacted.
#[derive(Clone)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// The memory-hard master key derived from the room code.
///
/// Used only to derive subkeys; never used for encryption directly.
/// Zeroized on drop.
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    /// Raw master key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// The relay-visible room identifier: 64 lowercase hex characters.
///
/// A one-way SHA-256 hash of `room_code || "::" || pepper`, so the
/// relay can partition rooms without ever seeing the code itself. Also
/// doubles as the Argon2id salt for master key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageId(String);

impl StorageId {
    /// The hex string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StorageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Argon2id cost parameters for master key derivation.
///
/// The defaults mirror an interactive room join: expensive enough to
/// frustrate offline guessing of short codes, cheap enough that a join
/// completes in well under a second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfConfig {
    /// Number of Argon2id passes.
    pub time_cost: u32,
    /// Memory usage in KiB.
    pub memory_kib: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self { time_cost: 2, memory_kib: 65536, parallelism: 1 }
    }
}

/// The five purpose-scoped subkeys derived once per room join.
///
/// Read-only after derivation except during explicit rotation, which
/// replaces the affected keys in a single assignment (see
/// [`crate::rotation`]).
#[derive(Debug, Clone)]
pub struct KeySet {
    /// Inner layer of the chat double-wrap.
    pub chat: SymmetricKey,
    /// Signaling envelope encryption.
    pub signal: SymmetricKey,
    /// Metadata and admin action encryption.
    pub meta: SymmetricKey,
    /// Outer layer of the chat double-wrap.
    pub auth: SymmetricKey,
    /// File chunk encryption.
    pub file: SymmetricKey,
}

/// Paired AES/HMAC keys expanded from a single primary key.
///
/// Used by simplified single-key flows where the signaling channel
/// wants a distinct signing and encryption key without carrying the
/// full [`KeySet`].
#[derive(Debug, Clone)]
pub struct SignalingKeys {
    /// AEAD encryption key.
    pub aes: SymmetricKey,
    /// HMAC signing key.
    pub hmac: SymmetricKey,
}

/// Derive the relay-visible storage id for a room.
///
/// One-way: the relay stores rows under this id but cannot recover the
/// room code. Deterministic: identical `(room_code, pepper)` inputs
/// always produce the identical 64-character hex string.
pub fn derive_storage_id(room_code: &str, pepper: &str) -> StorageId {
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(room_code.as_bytes());
    hasher.update(STORAGE_ID_SEPARATOR.as_bytes());
    hasher.update(pepper.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(64);
    for byte in digest {
        let Ok(()) = write!(hex, "{byte:02x}") else {
            unreachable!("writing to a String cannot fail");
        };
    }

    StorageId(hex)
}

/// Derive the master key from the room code via Argon2id.
///
/// The storage id doubles as the salt, binding the master key to the
/// exact `(room_code, pepper)` pair. Deliberately expensive; callers
/// must not run this on a latency-sensitive path.
///
/// # Errors
///
/// [`KeyDerivationError`] if the cost parameters are rejected or the
/// hash computation fails. There is no fallback to a weaker KDF.
pub fn derive_master_key(
    room_code: &str,
    storage_id: &StorageId,
    config: &KdfConfig,
) -> Result<MasterKey, KeyDerivationError> {
    let params = argon2::Params::new(
        config.memory_kib,
        config.time_cost,
        config.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| KeyDerivationError::InvalidParams { reason: e.to_string() })?;

    let argon = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut out = [0u8; KEY_SIZE];
    argon
        .hash_password_into(room_code.as_bytes(), storage_id.as_str().as_bytes(), &mut out)
        .map_err(|e| KeyDerivationError::DerivationFailed { reason: e.to_string() })?;

    Ok(MasterKey(out))
}

/// Expand the master key into the five purpose-scoped subkeys.
///
/// Each subkey is an independent HKDF-SHA-256 expansion with a fixed
/// textual info label. Invariant across runs for a fixed room code:
/// this is the mechanism by which peers agree on keys without
/// exchanging them.
pub fn derive_subkeys(master: &MasterKey) -> KeySet {
    let hkdf = Hkdf::<Sha256>::new(None, master.as_bytes());

    KeySet {
        chat: expand(&hkdf, CHAT_LABEL),
        signal: expand(&hkdf, SIGNAL_LABEL),
        meta: expand(&hkdf, META_LABEL),
        auth: expand(&hkdf, AUTH_LABEL),
        file: expand(&hkdf, FILE_LABEL),
    }
}

/// Expand a single primary key into a distinct AES/HMAC pair for the
/// signaling channel.
///
/// Same determinism requirement as [`derive_subkeys`]: both sides of a
/// single-key flow derive the identical pair from the identical
/// primary key.
pub fn derive_signaling_keys(primary: &SymmetricKey) -> SignalingKeys {
    let hkdf = Hkdf::<Sha256>::new(None, primary.as_bytes());

    SignalingKeys {
        aes: expand(&hkdf, SIGNALING_AES_LABEL),
        hmac: expand(&hkdf, SIGNALING_HMAC_LABEL),
    }
}

/// Single HKDF expansion with the given info label.
fn expand(hkdf: &Hkdf<Sha256>, info: &[u8]) -> SymmetricKey {
    let mut out = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(info, &mut out) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    SymmetricKey(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Cheap parameters so tests don't burn 64 MiB per derivation.
    fn test_kdf_config() -> KdfConfig {
        KdfConfig { time_cost: 1, memory_kib: 8, parallelism: 1 }
    }

    #[test]
    fn storage_id_is_stable_hex() {
        let id = derive_storage_id("alpha-room", "");
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let again = derive_storage_id("alpha-room", "");
        assert_eq!(id, again, "same inputs must produce the same id");
    }

    #[test]
    fn storage_id_depends_on_pepper() {
        let without = derive_storage_id("alpha-room", "");
        let with = derive_storage_id("alpha-room", "spice");
        assert_ne!(without, with);
    }

    #[test]
    fn pepper_separator_prevents_ambiguity() {
        // "ab" + "c" must not collide with "a" + "bc"
        let left = derive_storage_id("ab", "c");
        let right = derive_storage_id("a", "bc");
        assert_ne!(left, right);
    }

    #[test]
    fn master_key_is_deterministic() {
        let id = derive_storage_id("alpha-room", "");
        let config = test_kdf_config();

        let a = derive_master_key("alpha-room", &id, &config).unwrap();
        let b = derive_master_key("alpha-room", &id, &config).unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn master_key_rejects_zero_memory() {
        let id = derive_storage_id("alpha-room", "");
        let config = KdfConfig { time_cost: 1, memory_kib: 0, parallelism: 1 };

        let result = derive_master_key("alpha-room", &id, &config);
        assert!(matches!(result, Err(KeyDerivationError::InvalidParams { .. })));
    }

    #[test]
    fn subkeys_are_pairwise_distinct() {
        let id = derive_storage_id("alpha-room", "");
        let master = derive_master_key("alpha-room", &id, &test_kdf_config()).unwrap();
        let keys = derive_subkeys(&master);

        let all = [&keys.chat, &keys.signal, &keys.meta, &keys.auth, &keys.file];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.as_bytes(), b.as_bytes(), "subkeys must be independent");
            }
        }
    }

    #[test]
    fn two_joins_converge_on_identical_chat_key() {
        // Simulates two participants joining with the same code and no
        // key exchange.
        let config = test_kdf_config();

        let id_a = derive_storage_id("alpha-room", "");
        let keys_a = derive_subkeys(&derive_master_key("alpha-room", &id_a, &config).unwrap());

        let id_b = derive_storage_id("alpha-room", "");
        let keys_b = derive_subkeys(&derive_master_key("alpha-room", &id_b, &config).unwrap());

        assert_eq!(keys_a.chat.as_bytes(), keys_b.chat.as_bytes());
    }

    #[test]
    fn signaling_keys_differ_from_primary_and_each_other() {
        let primary = SymmetricKey::from_bytes([7u8; KEY_SIZE]);
        let pair = derive_signaling_keys(&primary);

        assert_ne!(pair.aes.as_bytes(), primary.as_bytes());
        assert_ne!(pair.hmac.as_bytes(), primary.as_bytes());
        assert_ne!(pair.aes.as_bytes(), pair.hmac.as_bytes());
    }

    #[test]
    fn signaling_keys_are_deterministic() {
        let primary = SymmetricKey::from_bytes([9u8; KEY_SIZE]);
        let a = derive_signaling_keys(&primary);
        let b = derive_signaling_keys(&primary);

        assert_eq!(a.aes.as_bytes(), b.aes.as_bytes());
        assert_eq!(a.hmac.as_bytes(), b.hmac.as_bytes());
    }
}
