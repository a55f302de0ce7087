//! Snapshot and restore of a retriever's stores.
//!
//! A snapshot holds every live binary code with its embedding, text and
//! metadata in insertion order, plus the partition layout, so a restart does
//! not need to re-embed the corpus.
//!
//! # On-Disk Format
//!
//! | Offset | Size | Content |
//! |--------|------|---------|
//! | 0 | 8 | magic `BRSNAP01` |
//! | 8 | 4 | format version, u32 LE |
//! | 12 | 32 | SHA-256 of the payload |
//! | 44 | .. | bincode payload ([`Snapshot`]) |
//!
//! The format is an internal contract, not a wire protocol.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bincode::Options;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chunk::{ChunkId, ChunkMetadata};
use crate::config::PartitionParams;
use crate::error::{Error, Result};
use crate::index::PartitionState;
use crate::quantization::BinaryQuantizer;

/// File magic.
pub const MAGIC: &[u8; 8] = b"BRSNAP01";
/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = MAGIC.len() + 4 + 32;

/// Fixed-width little-endian integers, matching `bincode::serialize`.
fn payload_options() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

/// One stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Chunk id.
    pub chunk_id: ChunkId,
    /// Packed binary code.
    pub code: Vec<u8>,
    /// Full-precision embedding, absent if the float store lacked it.
    pub embedding: Option<Vec<f32>>,
    /// Chunk text, absent if the registry lacked it.
    pub text: Option<String>,
    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

/// Index layout stored with a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotIndex {
    /// Flat index.
    Flat,
    /// Partitioned index and its layout.
    Partitioned {
        /// Partition parameters.
        params: PartitionParams,
        /// Centroids and assignments.
        state: PartitionState,
    },
}

/// Complete retriever state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Embedding dimension.
    pub dimension: usize,
    /// Index layout.
    pub index: SnapshotIndex,
    /// Entries in insertion order.
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    /// Checks internal consistency: code lengths, embedding dimensions,
    /// unique ids, and that each code is the quantization of its embedding.
    pub fn validate(&self) -> Result<()> {
        let quantizer = BinaryQuantizer::new(self.dimension)?;
        let mut seen = HashSet::with_capacity(self.entries.len());

        for entry in &self.entries {
            if !seen.insert(entry.chunk_id) {
                return Err(Error::Snapshot(format!(
                    "chunk {} appears twice",
                    entry.chunk_id
                )));
            }
            if entry.code.len() != quantizer.code_len() {
                return Err(Error::CodeLengthMismatch {
                    expected: quantizer.code_len(),
                    actual: entry.code.len(),
                });
            }
            if let Some(embedding) = &entry.embedding {
                let code = quantizer.quantize(embedding)?;
                if code.as_bytes() != entry.code.as_slice() {
                    return Err(Error::Snapshot(format!(
                        "code of chunk {} does not match its embedding",
                        entry.chunk_id
                    )));
                }
            }
        }

        if let SnapshotIndex::Partitioned { state, .. } = &self.index {
            if state.assignment.len() != self.entries.len() {
                return Err(Error::Snapshot(format!(
                    "partition assignment covers {} entries, snapshot holds {}",
                    state.assignment.len(),
                    self.entries.len()
                )));
            }
        }
        Ok(())
    }

    /// Encodes the snapshot with header and checksum.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = payload_options().serialize(self)?;
        let digest = Sha256::digest(&payload);

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&digest);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decodes and validates a snapshot.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Snapshot(format!(
                "truncated header: {} bytes",
                bytes.len()
            )));
        }
        let (magic, rest) = bytes.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(Error::Snapshot("bad magic".to_string()));
        }
        let (version, rest) = rest.split_at(4);
        let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
        if version != FORMAT_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported format version {version}"
            )));
        }
        let (checksum, payload) = rest.split_at(32);
        if Sha256::digest(payload).as_slice() != checksum {
            return Err(Error::Snapshot("checksum mismatch".to_string()));
        }

        // Length prefixes can never claim more than the payload holds.
        let snapshot: Self = payload_options()
            .with_limit(payload.len() as u64)
            .deserialize(payload)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Writes the snapshot atomically: to a sibling temp file, then renamed.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        let tmp = temp_path(path);
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        tracing::info!(
            path = %path.display(),
            entries = self.entries.len(),
            bytes = bytes.len(),
            "snapshot written"
        );
        Ok(())
    }

    /// Reads and validates a snapshot file.
    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let snapshot = Self::decode(&bytes)?;
        tracing::info!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            "snapshot read"
        );
        Ok(snapshot)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
