//! Write-ahead log
//!
//! Append-only record stream. Every mutation appends a record before the
//! caller sees success; the commit point is the WAL fsync. Records are
//! framed `{len, kind, payload, crc32}` with a bincode payload. Replay
//! walks records in order and truncates at the first bad frame; everything
//! after a torn or corrupt record is discarded. The log is truncated after
//! a successful snapshot.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;
use crate::memory::{Confidence, Edge, Node};
use crate::primitives::{NodeId, QuantizedVector};

/// Frame overhead: len u32 + kind u8 + crc32 u32
const FRAME_OVERHEAD: usize = 9;

// ============================================================================
// RECORDS
// ============================================================================

/// One logged mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalRecord {
    /// Full serialized node; written on insert and structural replacement
    FullNode(Node),
    /// Access-time touch
    TouchDelta { id: NodeId, accessed_at: i64 },
    /// Confidence tuple replacement
    ConfidenceDelta { id: NodeId, confidence: Confidence },
    /// Edge added or removed
    EdgeDelta { id: NodeId, edge: Edge, add: bool },
    /// Tag added or removed
    TagDelta { id: NodeId, tag: String, add: bool },
    /// Node removal
    RemoveNode { id: NodeId },
    /// Vector replacement (attractor drift is logged through this)
    VectorDelta { id: NodeId, vector: QuantizedVector },
}

impl WalRecord {
    /// Frame kind byte
    pub fn kind(&self) -> u8 {
        match self {
            WalRecord::FullNode(_) => 0,
            WalRecord::TouchDelta { .. } => 1,
            WalRecord::ConfidenceDelta { .. } => 2,
            WalRecord::EdgeDelta { .. } => 3,
            WalRecord::TagDelta { .. } => 4,
            WalRecord::RemoveNode { .. } => 5,
            WalRecord::VectorDelta { .. } => 6,
        }
    }
}

// ============================================================================
// LOG
// ============================================================================

/// Append-only write-ahead log
pub struct WriteAheadLog {
    file: File,
    path: PathBuf,
    len: u64,
}

impl WriteAheadLog {
    /// Open (or create) the log for appending
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            len,
        })
    }

    /// Append one record. Durable only after [`WriteAheadLog::sync`].
    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        let payload = bincode::serialize(record)
            .map_err(|e| std::io::Error::other(format!("wal encode: {e}")))?;
        let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.push(record.kind());
        frame.extend_from_slice(&payload);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[record.kind()]);
        hasher.update(&payload);
        frame.extend_from_slice(&hasher.finalize().to_le_bytes());
        self.file.write_all(&frame)?;
        self.len += frame.len() as u64;
        Ok(())
    }

    /// fsync the log; the commit point for every mutation since the last sync
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Bytes currently in the log
    pub fn len_bytes(&self) -> u64 {
        self.len
    }

    /// Discard every record; called after a successful snapshot
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_data()?;
        self.len = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Walk records in order, applying each. Stops at the first short or
    /// checksum-failing frame and truncates the file there; returns the
    /// number of records applied.
    pub fn replay(path: &Path, mut apply: impl FnMut(WalRecord) -> Result<()>) -> Result<u64> {
        if !path.exists() {
            return Ok(0);
        }
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;

        let mut offset = 0usize;
        let mut applied = 0u64;
        let valid_end = loop {
            if offset + FRAME_OVERHEAD > bytes.len() {
                break offset;
            }
            let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            let kind = bytes[offset + 4];
            let end = offset + FRAME_OVERHEAD + len;
            if end > bytes.len() {
                break offset;
            }
            let payload = &bytes[offset + 5..offset + 5 + len];
            let stored_crc =
                u32::from_le_bytes(bytes[offset + 5 + len..end].try_into().unwrap());
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&[kind]);
            hasher.update(payload);
            if hasher.finalize() != stored_crc {
                break offset;
            }
            let record: WalRecord = match bincode::deserialize(payload) {
                Ok(r) => r,
                Err(_) => break offset,
            };
            apply(record)?;
            applied += 1;
            offset = end;
        };

        if valid_end < bytes.len() {
            warn!(
                discarded = bytes.len() - valid_end,
                "truncating torn tail of write-ahead log"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_end as u64)?;
            file.sync_data()?;
        }
        Ok(applied)
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(id: NodeId, at: i64) -> WalRecord {
        WalRecord::TouchDelta { id, accessed_at: at }
    }

    #[test]
    fn test_append_replay_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.wal");
        let ids: Vec<NodeId> = (0..5).map(|_| NodeId::generate()).collect();

        {
            let mut wal = WriteAheadLog::open(&path).unwrap();
            for (i, id) in ids.iter().enumerate() {
                wal.append(&touch(*id, i as i64)).unwrap();
            }
            wal.sync().unwrap();
        }

        let mut seen = Vec::new();
        let applied = WriteAheadLog::replay(&path, |r| {
            if let WalRecord::TouchDelta { id, accessed_at } = r {
                seen.push((id, accessed_at));
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(applied, 5);
        assert_eq!(seen.len(), 5);
        for (i, (id, at)) in seen.iter().enumerate() {
            assert_eq!(*id, ids[i]);
            assert_eq!(*at, i as i64);
        }
    }

    #[test]
    fn test_corrupt_tail_truncates_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("torn.wal");

        {
            let mut wal = WriteAheadLog::open(&path).unwrap();
            wal.append(&touch(NodeId::generate(), 1)).unwrap();
            wal.append(&touch(NodeId::generate(), 2)).unwrap();
            wal.sync().unwrap();
        }

        // flip a byte inside the second frame's payload
        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() - 6;
        bytes[mid] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let applied = WriteAheadLog::replay(&path, |_| Ok(())).unwrap();
        assert_eq!(applied, 1);

        // the torn tail is gone; a second replay sees a clean one-record log
        let applied = WriteAheadLog::replay(&path, |_| Ok(())).unwrap();
        assert_eq!(applied, 1);
    }

    #[test]
    fn test_truncate_clears_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.wal");
        let mut wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&touch(NodeId::generate(), 1)).unwrap();
        assert!(wal.len_bytes() > 0);
        wal.truncate().unwrap();
        assert_eq!(wal.len_bytes(), 0);
        assert_eq!(WriteAheadLog::replay(&path, |_| Ok(())).unwrap(), 0);
    }

    #[test]
    fn test_replay_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let applied =
            WriteAheadLog::replay(&dir.path().join("nope.wal"), |_| Ok(())).unwrap();
        assert_eq!(applied, 0);
    }
}
