//! Authenticated envelope encryption using AES-256-GCM.
//!
//! An envelope wraps one payload under one subkey: a 96-bit IV plus
//! ciphertext with the GCM tag appended. Channels that cross the
//! untrusted relay additionally carry an HMAC-SHA-256 signature over
//! `iv ‖ ciphertext ‖ sequence`, so a multi-writer store can neither
//! forge nor reorder rows undetected.
//!
//! # Security
//!
//! - IVs are never reused under a key: callers supply a fresh random
//!   IV per seal (media frames use a counter instead, see
//!   [`crate::frame`])
//! - Signed envelopes verify the HMAC in constant time BEFORE the AEAD
//!   open, so forged rows are rejected without reaching the cipher
//!   (defense against padding/timing oracles)
//! - Failure never yields partial plaintext

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{IV_SIZE, SIG_SIZE, error::AuthenticationError, keys::SymmetricKey};

type HmacSha256 = Hmac<Sha256>;

/// A 96-bit AES-GCM initialization vector.
///
/// Callers draw the bytes from their environment's CSPRNG; the crypto
/// layer never generates randomness itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_SIZE]);

impl Iv {
    /// Wrap raw IV bytes.
    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw IV bytes.
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

/// A sealed payload: IV plus ciphertext (GCM tag appended).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The 96-bit IV this payload was sealed under.
    pub iv: [u8; IV_SIZE],
    /// Ciphertext including the 16-byte GCM tag.
    pub ct: Vec<u8>,
}

/// An envelope plus an HMAC signature binding it to a sequence number.
///
/// Used wherever the relay must not be able to forge or reorder rows:
/// the signature covers `iv ‖ ciphertext ‖ sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// The sealed payload.
    pub envelope: Envelope,
    /// Sender-local monotonic sequence number.
    pub seq: u32,
    /// HMAC-SHA-256 over `iv ‖ ciphertext ‖ seq_be`.
    pub sig: [u8; SIG_SIZE],
}

/// Seal a plaintext under a key with the given fresh IV.
///
/// No side effects beyond consuming the caller-supplied randomness.
pub fn seal(key: &SymmetricKey, plaintext: &[u8], iv: Iv) -> Envelope {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let Ok(ct) = cipher.encrypt(Nonce::from_slice(&iv.0), plaintext) else {
        unreachable!("AES-256-GCM encryption cannot fail with valid inputs");
    };

    Envelope { iv: iv.0, ct }
}

/// Open an envelope.
///
/// # Errors
///
/// [`AuthenticationError::TagMismatch`] on any tag failure (tampered
/// IV or ciphertext, wrong key). Never returns partial plaintext.
pub fn open(key: &SymmetricKey, envelope: &Envelope) -> Result<Vec<u8>, AuthenticationError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(&envelope.iv), envelope.ct.as_slice())
        .map_err(|_| AuthenticationError::TagMismatch)
}

/// Seal and sign: envelope plus HMAC over `iv ‖ ciphertext ‖ seq`.
pub fn seal_signed(
    key: &SymmetricKey,
    hmac_key: &SymmetricKey,
    plaintext: &[u8],
    seq: u32,
    iv: Iv,
) -> SignedEnvelope {
    let envelope = seal(key, plaintext, iv);
    let sig = compute_sig(hmac_key, &envelope, seq);

    SignedEnvelope { envelope, seq, sig }
}

/// Verify and open a signed envelope.
///
/// Verification order is fixed: signature first (constant-time
/// compare), then the expected sequence, and only then the AEAD open.
/// A wrongly-sequenced but correctly signed envelope is rejected
/// before any decryption work happens.
///
/// # Errors
///
/// - [`AuthenticationError::SignatureMismatch`] if the HMAC fails
/// - [`AuthenticationError::SequenceMismatch`] on a replayed sequence
/// - [`AuthenticationError::TagMismatch`] if the AEAD open fails
pub fn open_signed(
    key: &SymmetricKey,
    hmac_key: &SymmetricKey,
    signed: &SignedEnvelope,
    expected_seq: Option<u32>,
) -> Result<Vec<u8>, AuthenticationError> {
    let mut mac = new_mac(hmac_key);
    update_sig_input(&mut mac, &signed.envelope, signed.seq);
    mac.verify_slice(&signed.sig).map_err(|_| AuthenticationError::SignatureMismatch)?;

    if let Some(expected) = expected_seq
        && expected != signed.seq
    {
        return Err(AuthenticationError::SequenceMismatch { expected, actual: signed.seq });
    }

    open(key, &signed.envelope)
}

/// Compute the HMAC over `iv ‖ ciphertext ‖ seq_be`.
fn compute_sig(hmac_key: &SymmetricKey, envelope: &Envelope, seq: u32) -> [u8; SIG_SIZE] {
    let mut mac = new_mac(hmac_key);
    update_sig_input(&mut mac, envelope, seq);
    let out = mac.finalize().into_bytes();

    let mut sig = [0u8; SIG_SIZE];
    sig.copy_from_slice(&out);
    sig
}

fn new_mac(hmac_key: &SymmetricKey) -> HmacSha256 {
    let Ok(mac) = <HmacSha256 as Mac>::new_from_slice(hmac_key.as_bytes()) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac
}

fn update_sig_input(mac: &mut HmacSha256, envelope: &Envelope, seq: u32) {
    mac.update(&envelope.iv);
    mac.update(&envelope.ct);
    mac.update(&seq.to_be_bytes());
}
