//! Per-media-frame encryption with counter-based IVs.
//!
//! Media frames arrive at a cadence where fresh-random IVs would risk
//! birthday collisions cheaply, so each track's encryptor packs a
//! strictly monotonic 32-bit counter into the IV instead. The counter
//! advances on every seal attempt, guaranteeing forward-moving IV
//! space even across failures.
//!
//! Decryption policy is a deliberate, selectable trade-off:
//!
//! - [`FramePolicy::Passthrough`] (default): an unauthenticated frame
//!   is emitted as its original ciphertext, prioritizing media
//!   continuity over integrity at this layer (glitched frames instead
//!   of frozen video on tamper or loss)
//! - [`FramePolicy::Reject`] (hardened): each frame carries an HMAC
//!   over `iv ‖ ciphertext ‖ sequence`, verified before decryption;
//!   failures are dropped, never passed through
//!
//! This asymmetry with the control/chat paths (which always reject) is
//! intentional and must be preserved.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::{IV_SIZE, SIG_SIZE, keys::SymmetricKey};

type HmacSha256 = Hmac<Sha256>;

/// Byte offset of the sequence counter within the 12-byte frame IV.
const IV_COUNTER_OFFSET: usize = 8;

/// The per-track IV counter ran out.
///
/// A track that has sealed `u32::MAX` frames must be re-keyed; reusing
/// the counter space would repeat IVs under the same key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("frame counter exhausted at {counter}")]
pub struct FrameCounterExhausted {
    /// The exhausted counter value.
    pub counter: u32,
}

/// Decryption policy for unauthenticated frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePolicy {
    /// Emit the original ciphertext unchanged when authentication
    /// fails. Availability over integrity for live media.
    #[default]
    Passthrough,
    /// Verify the per-frame HMAC before decrypting and drop frames
    /// that fail. Integrity over availability.
    Reject,
}

/// A sealed media frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFrame {
    /// Counter-derived 96-bit IV (counter in the last four bytes).
    pub iv: [u8; IV_SIZE],
    /// Ciphertext including the GCM tag.
    pub ct: Vec<u8>,
    /// The sequence counter this frame was sealed at.
    pub seq: u32,
    /// HMAC over `iv ‖ ct ‖ seq`, present only on the hardened path.
    pub sig: Option<[u8; SIG_SIZE]>,
}

/// Outcome of opening a sealed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Authentication succeeded; the decrypted frame bytes.
    Plain(Vec<u8>),
    /// Authentication failed under [`FramePolicy::Passthrough`]; the
    /// original ciphertext, emitted unchanged for media continuity.
    Passthrough(Vec<u8>),
    /// Authentication failed under [`FramePolicy::Reject`]; the frame
    /// is dropped.
    Rejected,
}

/// Per-track frame encryptor with a monotonic IV counter.
///
/// One encryptor per outgoing track; tracks for different media kinds
/// are independent counter spaces.
#[derive(Debug)]
pub struct FrameEncryptor {
    key: SymmetricKey,
    hmac_key: Option<SymmetricKey>,
    counter: u32,
}

impl FrameEncryptor {
    /// Encryptor for the default (unsigned) frame path.
    pub fn new(key: SymmetricKey) -> Self {
        Self { key, hmac_key: None, counter: 0 }
    }

    /// Encryptor for the hardened path: every frame carries an HMAC.
    pub fn new_signed(key: SymmetricKey, hmac_key: SymmetricKey) -> Self {
        Self { key, hmac_key: Some(hmac_key), counter: 0 }
    }

    /// Next sequence counter value.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Seal one frame, advancing the counter.
    ///
    /// # Errors
    ///
    /// [`FrameCounterExhausted`] once the 32-bit counter space is used
    /// up; the track must be re-keyed.
    pub fn seal_frame(&mut self, frame: &[u8]) -> Result<SealedFrame, FrameCounterExhausted> {
        if self.counter == u32::MAX {
            return Err(FrameCounterExhausted { counter: self.counter });
        }

        let seq = self.counter;
        // Advance before encrypting: the IV space moves forward no
        // matter what happens to this frame.
        self.counter += 1;

        let iv = frame_iv(seq);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));

        let Ok(ct) = cipher.encrypt(Nonce::from_slice(&iv), frame) else {
            unreachable!("AES-256-GCM encryption cannot fail with valid inputs");
        };

        let sig = self.hmac_key.as_ref().map(|hk| frame_sig(hk, &iv, &ct, seq));

        Ok(SealedFrame { iv, ct, seq, sig })
    }
}

/// Per-track frame decryptor.
#[derive(Debug)]
pub struct FrameDecryptor {
    key: SymmetricKey,
    hmac_key: Option<SymmetricKey>,
    policy: FramePolicy,
}

impl FrameDecryptor {
    /// Decryptor with the default passthrough policy.
    pub fn new(key: SymmetricKey) -> Self {
        Self { key, hmac_key: None, policy: FramePolicy::Passthrough }
    }

    /// Hardened decryptor: verifies the per-frame HMAC before
    /// decrypting and rejects failures.
    pub fn new_verifying(key: SymmetricKey, hmac_key: SymmetricKey) -> Self {
        Self { key, hmac_key: Some(hmac_key), policy: FramePolicy::Reject }
    }

    /// Active policy.
    pub fn policy(&self) -> FramePolicy {
        self.policy
    }

    /// Open one sealed frame according to the active policy.
    pub fn open_frame(&self, sealed: &SealedFrame) -> FrameOutcome {
        if self.policy == FramePolicy::Reject && !self.verify_sig(sealed) {
            return FrameOutcome::Rejected;
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));

        match cipher.decrypt(Nonce::from_slice(&sealed.iv), sealed.ct.as_slice()) {
            Ok(plain) => FrameOutcome::Plain(plain),
            Err(_) => match self.policy {
                FramePolicy::Passthrough => FrameOutcome::Passthrough(sealed.ct.clone()),
                FramePolicy::Reject => FrameOutcome::Rejected,
            },
        }
    }

    /// Verify the per-frame HMAC. Missing keys or signatures fail.
    fn verify_sig(&self, sealed: &SealedFrame) -> bool {
        let (Some(hmac_key), Some(sig)) = (self.hmac_key.as_ref(), sealed.sig.as_ref()) else {
            return false;
        };

        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(hmac_key.as_bytes()) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(&sealed.iv);
        mac.update(&sealed.ct);
        mac.update(&sealed.seq.to_be_bytes());
        mac.verify_slice(sig).is_ok()
    }
}

/// Build the deterministic IV for a frame sequence number.
///
/// Bytes 0..8 are zero; the counter occupies the last four bytes in
/// big-endian order. Uniqueness follows from counter monotonicity.
fn frame_iv(seq: u32) -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    iv[IV_COUNTER_OFFSET..].copy_from_slice(&seq.to_be_bytes());
    iv
}

/// HMAC over `iv ‖ ct ‖ seq_be` for the hardened frame path.
fn frame_sig(hmac_key: &SymmetricKey, iv: &[u8], ct: &[u8], seq: u32) -> [u8; SIG_SIZE] {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(hmac_key.as_bytes()) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(iv);
    mac.update(ct);
    mac.update(&seq.to_be_bytes());

    let out = mac.finalize().into_bytes();
    let mut sig = [0u8; SIG_SIZE];
    sig.copy_from_slice(&out);
    sig
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn frame_round_trip() {
        let mut enc = FrameEncryptor::new(key(1));
        let dec = FrameDecryptor::new(key(1));

        let sealed = enc.seal_frame(b"video frame payload").unwrap();
        assert_eq!(dec.open_frame(&sealed), FrameOutcome::Plain(b"video frame payload".to_vec()));
    }

    #[test]
    fn counter_advances_per_frame() {
        let mut enc = FrameEncryptor::new(key(1));

        let first = enc.seal_frame(b"a").unwrap();
        let second = enc.seal_frame(b"b").unwrap();

        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert_ne!(first.iv, second.iv, "each frame must get a fresh IV");
    }

    #[test]
    fn iv_carries_counter_in_last_four_bytes() {
        let iv = frame_iv(0x0102_0304);
        assert_eq!(&iv[..8], &[0u8; 8]);
        assert_eq!(&iv[8..], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn tampered_frame_passes_through_by_default() {
        let mut enc = FrameEncryptor::new(key(1));
        let dec = FrameDecryptor::new(key(1));

        let mut sealed = enc.seal_frame(b"frame").unwrap();
        sealed.ct[0] ^= 0x01;

        // Media continuity: the original ciphertext comes back
        // unchanged rather than the frame being dropped.
        assert_eq!(dec.open_frame(&sealed), FrameOutcome::Passthrough(sealed.ct.clone()));
    }

    #[test]
    fn hardened_path_rejects_tampered_frame() {
        let mut enc = FrameEncryptor::new_signed(key(1), key(2));
        let dec = FrameDecryptor::new_verifying(key(1), key(2));

        let mut sealed = enc.seal_frame(b"frame").unwrap();
        sealed.ct[0] ^= 0x01;

        assert_eq!(dec.open_frame(&sealed), FrameOutcome::Rejected);
    }

    #[test]
    fn hardened_path_rejects_missing_signature() {
        let mut enc = FrameEncryptor::new(key(1));
        let dec = FrameDecryptor::new_verifying(key(1), key(2));

        let sealed = enc.seal_frame(b"frame").unwrap();
        assert_eq!(dec.open_frame(&sealed), FrameOutcome::Rejected);
    }

    #[test]
    fn hardened_path_rejects_relabelled_sequence() {
        let mut enc = FrameEncryptor::new_signed(key(1), key(2));
        let dec = FrameDecryptor::new_verifying(key(1), key(2));

        let mut sealed = enc.seal_frame(b"frame").unwrap();
        sealed.seq = sealed.seq.wrapping_add(1);

        assert_eq!(dec.open_frame(&sealed), FrameOutcome::Rejected);
    }

    #[test]
    fn hardened_round_trip() {
        let mut enc = FrameEncryptor::new_signed(key(1), key(2));
        let dec = FrameDecryptor::new_verifying(key(1), key(2));

        let sealed = enc.seal_frame(b"frame").unwrap();
        assert!(sealed.sig.is_some());
        assert_eq!(dec.open_frame(&sealed), FrameOutcome::Plain(b"frame".to_vec()));
    }

    #[test]
    fn counter_exhaustion_is_an_error() {
        let mut enc = FrameEncryptor::new(key(1));
        enc.counter = u32::MAX;

        let result = enc.seal_frame(b"frame");
        assert_eq!(result, Err(FrameCounterExhausted { counter: u32::MAX }));
    }

    #[test]
    fn tracks_are_independent_counter_spaces() {
        let mut audio = FrameEncryptor::new(key(1));
        let mut video = FrameEncryptor::new(key(2));

        audio.seal_frame(b"a").unwrap();
        audio.seal_frame(b"a").unwrap();
        let v = video.seal_frame(b"v").unwrap();

        assert_eq!(v.seq, 0, "tracks must not share a counter");
        assert_eq!(audio.counter(), 2);
    }
}
