//! Payload blob store
//!
//! Append-only sibling file holding payload bytes that do not live in the
//! hot cache. Each record is framed `{crc32, bytes}`; the length and offset
//! live in the owning node's meta. Superseded records are left behind until
//! a snapshot rewrite.
//!
//! TODO: reclaim superseded payload records when writing a snapshot.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::error::{ChittaError, Result};

const FRAME_OVERHEAD: u64 = 4;

/// Append-only payload byte store (the warm tier)
pub struct PayloadStore {
    file: File,
    path: PathBuf,
    len: u64,
}

impl PayloadStore {
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

    /// Append payload bytes; returns the record offset to store in NodeMeta
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let offset = self.len;
        let crc = crc32fast::hash(bytes);
        self.file.write_all(&crc.to_le_bytes())?;
        self.file.write_all(bytes)?;
        self.len += FRAME_OVERHEAD + bytes.len() as u64;
        Ok(offset)
    }

    /// Read a record written by [`PayloadStore::append`], verifying its checksum
    pub fn read(&self, offset: u64, len: u32) -> Result<Vec<u8>> {
        let mut crc_buf = [0u8; 4];
        self.file.read_exact_at(&mut crc_buf, offset)?;
        let mut bytes = vec![0u8; len as usize];
        self.file.read_exact_at(&mut bytes, offset + FRAME_OVERHEAD)?;
        if crc32fast::hash(&bytes) != u32::from_le_bytes(crc_buf) {
            return Err(ChittaError::CorruptHeader(format!(
                "{}: payload checksum mismatch at offset {offset}",
                self.path.display()
            )));
        }
        Ok(bytes)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    pub fn len_bytes(&self) -> u64 {
        self.len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut store = PayloadStore::open(&dir.path().join("p.blob")).unwrap();

        let a = store.append(b"first payload").unwrap();
        let b = store.append(b"second").unwrap();

        assert_eq!(store.read(a, 13).unwrap(), b"first payload");
        assert_eq!(store.read(b, 6).unwrap(), b"second");
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.blob");
        let off = {
            let mut store = PayloadStore::open(&path).unwrap();
            let off = store.append(b"payload bytes").unwrap();
            store.sync().unwrap();
            off
        };

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        let store = PayloadStore::open(&path).unwrap();
        assert!(store.read(off, 13).is_err());
    }
}
