//! Fuzz target for wire-model decoding
//!
//! This fuzzer tests JSON deserialization of every record shape that
//! crosses the relay or the data channel:
//! - Malformed JSON
//! - Type confusion (valid JSON with the wrong tag or field types)
//! - Oversized strings and byte arrays
//! - IV and signature length violations in envelope conversion
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an
//! error from `decode` or from the wire-to-crypto conversion.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sotto_proto::{FileChunk, MessageRecord, PeerFrame, RelayRecord, SignalMessage};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(RelayRecord::Signal { body, .. }) = RelayRecord::decode(text) {
            // A decoded signal row must survive conversion to the
            // crypto types or reject cleanly on length violations.
            let _ = body.into_signed_envelope();
        }
    }

    let _ = SignalMessage::decode(data);
    let _ = PeerFrame::decode(data);
    let _ = FileChunk::decode(data);

    if let Ok(record) = MessageRecord::decode(data) {
        let _ = record.enc.into_envelope();
    }
});
