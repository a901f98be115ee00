//! Chunked file transfer over peer data channels.
//!
//! Files are split into fixed-size chunks, each sealed independently
//! under the `file` subkey, and reassembled in sequence order on the
//! receiving side. Chunks may arrive out of order or duplicated; the
//! assembler is idempotent and releases the file exactly once, when
//! every chunk up to the one marked `last` is present.

use std::collections::{BTreeMap, HashMap};

use sotto_proto::{FILE_CHUNK_SIZE, FileChunk};

/// Upper bound on chunk indices per transfer (256 MiB of payload at
/// [`FILE_CHUNK_SIZE`]). Caps the memory a partial transfer can hold;
/// a sender that exceeds it forfeits the whole transfer.
pub const MAX_TRANSFER_CHUNKS: usize = 4096;

/// Split a file into sealed-ready chunks.
///
/// Always produces at least one chunk (an empty file is a single
/// empty chunk marked `last`), so the receiver learns about every
/// transfer.
pub fn chunk_file(file_id: &str, data: &[u8]) -> Vec<FileChunk> {
    if data.is_empty() {
        return vec![FileChunk {
            file_id: file_id.to_owned(),
            seq: 0,
            data: Vec::new(),
            last: true,
        }];
    }

    let pieces: Vec<&[u8]> = data.chunks(FILE_CHUNK_SIZE).collect();
    let final_index = pieces.len() - 1;

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| FileChunk {
            file_id: file_id.to_owned(),
            seq: i as u32,
            data: piece.to_vec(),
            last: i == final_index,
        })
        .collect()
}

#[derive(Debug, Default)]
struct Transfer {
    chunks: BTreeMap<u32, Vec<u8>>,
    last_seq: Option<u32>,
}

impl Transfer {
    fn is_complete(&self) -> bool {
        let Some(last) = self.last_seq else {
            return false;
        };
        // BTreeMap keys are unique, so a full prefix 0..=last means
        // exactly last+1 entries.
        self.chunks.len() as u64 == u64::from(last) + 1
    }

    fn assemble(self) -> Vec<u8> {
        self.chunks.into_values().flatten().collect()
    }
}

/// Reassembles inbound file chunks per `(peer, file_id)`.
#[derive(Debug, Default)]
pub struct FileAssembler {
    transfers: HashMap<(String, String), Transfer>,
}

impl FileAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of in-progress transfers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.transfers.len()
    }

    /// Accept one decrypted chunk.
    ///
    /// Returns the complete file once the final missing chunk arrives,
    /// `None` otherwise. Duplicate chunks are overwritten in place, so
    /// a relayed retransmission cannot corrupt the assembly.
    pub fn insert(&mut self, peer: &str, chunk: FileChunk) -> Option<Vec<u8>> {
        let key = (peer.to_owned(), chunk.file_id.clone());

        // Every retained index is below the bound, so no transfer
        // holds more than MAX_TRANSFER_CHUNKS chunks.
        if chunk.seq as usize >= MAX_TRANSFER_CHUNKS {
            tracing::warn!(%peer, file_id = %chunk.file_id, seq = chunk.seq, "transfer exceeds chunk bound, discarded");
            self.transfers.remove(&key);
            return None;
        }

        let transfer = self.transfers.entry(key.clone()).or_default();

        if chunk.last {
            transfer.last_seq = Some(chunk.seq);
        }
        transfer.chunks.insert(chunk.seq, chunk.data);

        if transfer.is_complete() {
            return self.transfers.remove(&key).map(Transfer::assemble);
        }
        None
    }

    /// Drop all in-progress transfers from one peer (teardown).
    pub fn drop_peer(&mut self, peer: &str) {
        self.transfers.retain(|(owner, _), _| owner != peer);
    }

    /// Drop everything (room teardown).
    pub fn clear(&mut self) {
        self.transfers.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn small_file_is_a_single_final_chunk() {
        let chunks = chunk_file("f", b"hello");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].seq, 0);
        assert!(chunks[0].last);
        assert_eq!(chunks[0].data, b"hello");
    }

    #[test]
    fn large_file_splits_at_chunk_size() {
        let data = vec![0xAB; FILE_CHUNK_SIZE * 2 + 1];
        let chunks = chunk_file("f", &data);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data.len(), FILE_CHUNK_SIZE);
        assert_eq!(chunks[2].data.len(), 1);
        assert!(!chunks[0].last);
        assert!(chunks[2].last);
    }

    #[test]
    fn empty_file_still_produces_one_chunk() {
        let chunks = chunk_file("f", b"");

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].last);
        assert!(chunks[0].data.is_empty());
    }

    #[test]
    fn in_order_assembly_round_trips() {
        let data: Vec<u8> = (0..=255).cycle().take(FILE_CHUNK_SIZE + 100).map(|b: u16| b as u8).collect();
        let mut assembler = FileAssembler::new();

        let mut result = None;
        for chunk in chunk_file("f", &data) {
            result = assembler.insert("alice", chunk);
        }

        assert_eq!(result.unwrap(), data);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn out_of_order_chunks_assemble_correctly() {
        let data = vec![7u8; FILE_CHUNK_SIZE * 3];
        let mut chunks = chunk_file("f", &data);
        chunks.reverse();

        let mut assembler = FileAssembler::new();
        let mut result = None;
        for chunk in chunks {
            assert!(result.is_none(), "file released before all chunks arrived");
            result = assembler.insert("alice", chunk);
        }

        assert_eq!(result.unwrap(), data);
    }

    #[test]
    fn duplicate_chunks_are_idempotent() {
        let data = vec![1u8; FILE_CHUNK_SIZE + 1];
        let chunks = chunk_file("f", &data);
        let mut assembler = FileAssembler::new();

        assert!(assembler.insert("alice", chunks[0].clone()).is_none());
        assert!(assembler.insert("alice", chunks[0].clone()).is_none());
        assert_eq!(assembler.insert("alice", chunks[1].clone()).unwrap(), data);
    }

    #[test]
    fn transfers_are_isolated_per_peer() {
        let chunks = chunk_file("f", b"data");
        let mut assembler = FileAssembler::new();

        // Same file id from two peers: independent transfers.
        assert!(assembler.insert("alice", chunks[0].clone()).is_some());
        assert!(assembler.insert("bob", chunks[0].clone()).is_some());
    }

    #[test]
    fn chunk_index_past_the_bound_discards_the_transfer() {
        let data = vec![1u8; FILE_CHUNK_SIZE * 2];
        let chunks = chunk_file("f", &data);
        let mut assembler = FileAssembler::new();

        assert!(assembler.insert("alice", chunks[0].clone()).is_none());
        assert_eq!(assembler.pending(), 1);

        let runaway = FileChunk {
            file_id: "f".to_owned(),
            seq: MAX_TRANSFER_CHUNKS as u32,
            data: vec![0; 8],
            last: false,
        };
        assert!(assembler.insert("alice", runaway).is_none());
        assert_eq!(assembler.pending(), 0, "partial assembly is released, not retained");

        // The legitimate final chunk alone no longer completes anything.
        assert!(assembler.insert("alice", chunks[1].clone()).is_none());
    }

    #[test]
    fn drop_peer_discards_partial_transfers() {
        let data = vec![1u8; FILE_CHUNK_SIZE * 2];
        let chunks = chunk_file("f", &data);
        let mut assembler = FileAssembler::new();

        assembler.insert("alice", chunks[0].clone());
        assembler.drop_peer("alice");
        assert_eq!(assembler.pending(), 0);

        // The final chunk alone no longer completes anything.
        assert!(assembler.insert("alice", chunks[1].clone()).is_none());
    }
}
