//! Fuzz target for envelope opening
//!
//! Attacker-controlled ciphertext, IVs, signatures, and sequence
//! numbers against a fixed key. Covers:
//! - Truncated and oversized ciphertexts (below the GCM tag size)
//! - Bit-flipped tags and IVs
//! - Signature and sequence confusion on signed envelopes
//!
//! Opening must never panic and must never succeed on mutated input.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sotto_crypto::{
    Envelope, Iv, SIG_SIZE, SignedEnvelope, SymmetricKey, open, open_signed, seal,
};

#[derive(Debug, Arbitrary)]
struct OpenInput {
    iv: [u8; 12],
    ct: Vec<u8>,
    sig: [u8; SIG_SIZE],
    seq: u32,
}

fuzz_target!(|input: OpenInput| {
    let aes = SymmetricKey::from_bytes([7; 32]);
    let hmac = SymmetricKey::from_bytes([9; 32]);

    let envelope = Envelope {
        iv: input.iv,
        ct: input.ct.clone(),
    };
    let _ = open(&aes, &envelope);

    let signed = SignedEnvelope {
        envelope,
        seq: input.seq,
        sig: input.sig,
    };
    let _ = open_signed(&aes, &hmac, &signed, Some(input.seq));

    // A genuine envelope with one ciphertext byte flipped must fail.
    let genuine = seal(&aes, &input.ct, Iv::from_bytes(input.iv));
    let mut forged = genuine.ct.clone();
    forged[0] ^= 0x01;
    let tampered = Envelope {
        iv: genuine.iv,
        ct: forged,
    };
    assert!(open(&aes, &tampered).is_err());
});
