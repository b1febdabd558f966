//! Tiered payload storage
//!
//! Three logical tiers for a node's bytes: hot (recent, in memory), warm
//! (the append-only blob), cold (lz4-compressed archive). The unified index
//! is unchanged by migration; only the payload reference and residency flag
//! in NodeMeta move. Migration decisions run during a tick, never during a
//! query; `fetch` is the only read path and it works for every tier.

use lru::LruCache;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::num::NonZeroUsize;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::error::{ChittaError, Result};
use crate::primitives::NodeId;
use crate::storage::payloads::PayloadStore;

/// Default hot-cache entries
pub const DEFAULT_HOT_CAPACITY: usize = 4096;

// ============================================================================
// COLD STORE
// ============================================================================

/// Append-only lz4 archive. Frames are `{comp_len, crc32, compressed}` with
/// the raw length prepended inside the compressed stream.
struct ColdStore {
    file: File,
    path: PathBuf,
    len: u64,
    records: u64,
}

impl ColdStore {
    fn open(path: &Path) -> Result<Self> {
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
            records: 0,
        })
    }

    fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let compressed = lz4_flex::compress_prepend_size(bytes);
        let offset = self.len;
        self.file
            .write_all(&(compressed.len() as u32).to_le_bytes())?;
        self.file
            .write_all(&crc32fast::hash(&compressed).to_le_bytes())?;
        self.file.write_all(&compressed)?;
        self.len += 8 + compressed.len() as u64;
        self.records += 1;
        Ok(offset)
    }

    fn read(&self, offset: u64) -> Result<Vec<u8>> {
        let mut head = [0u8; 8];
        self.file.read_exact_at(&mut head, offset)?;
        let comp_len = u32::from_le_bytes(head[0..4].try_into().unwrap());
        let crc = u32::from_le_bytes(head[4..8].try_into().unwrap());
        let mut compressed = vec![0u8; comp_len as usize];
        self.file.read_exact_at(&mut compressed, offset + 8)?;
        if crc32fast::hash(&compressed) != crc {
            return Err(ChittaError::CorruptHeader(format!(
                "{}: cold record checksum mismatch at offset {offset}",
                self.path.display()
            )));
        }
        lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| ChittaError::CorruptHeader(format!("cold record decompress: {e}")))
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

// ============================================================================
// TIERED STORE
// ============================================================================

/// Payload residency across hot / warm / cold
pub struct TieredStore {
    warm: PayloadStore,
    cold: ColdStore,
    hot: LruCache<NodeId, Vec<u8>>,
}

impl TieredStore {
    /// Open the warm blob and cold archive next to the base path
    pub fn open(base: &Path, hot_capacity: usize) -> Result<Self> {
        let warm = PayloadStore::open(&sibling(base, "payloads"))?;
        let cold = ColdStore::open(&sibling(base, "cold"))?;
        let capacity = NonZeroUsize::new(hot_capacity.max(1)).unwrap();
        Ok(Self {
            warm,
            cold,
            hot: LruCache::new(capacity),
        })
    }

    /// Store freshly inserted payload bytes: written warm, cached hot.
    /// Returns the warm offset for NodeMeta.
    pub fn store(&mut self, id: NodeId, bytes: &[u8]) -> Result<u64> {
        let offset = self.warm.append(bytes)?;
        self.hot.put(id, bytes.to_vec());
        Ok(offset)
    }

    /// Fetch a payload from whichever tier holds it, promoting it hot
    pub fn fetch(&mut self, id: NodeId, offset: u64, len: u32, cold: bool) -> Result<Vec<u8>> {
        if let Some(bytes) = self.hot.get(&id) {
            return Ok(bytes.clone());
        }
        let bytes = if cold {
            self.cold.read(offset)?
        } else {
            self.warm.read(offset, len)?
        };
        self.hot.put(id, bytes.clone());
        Ok(bytes)
    }

    /// Migrate warm bytes into the cold archive; returns the cold offset.
    /// The caller flips the residency flag in NodeMeta.
    pub fn demote(&mut self, id: NodeId, offset: u64, len: u32) -> Result<u64> {
        let bytes = match self.hot.peek(&id) {
            Some(b) => b.clone(),
            None => self.warm.read(offset, len)?,
        };
        self.hot.pop(&id);
        self.cold.append(&bytes)
    }

    /// Forget a payload's hot entry (node removal)
    pub fn evict(&mut self, id: NodeId) {
        self.hot.pop(&id);
    }

    pub fn hot_len(&self) -> usize {
        self.hot.len()
    }

    pub fn cold_records(&self) -> u64 {
        self.cold.records
    }

    pub fn sync(&mut self) -> Result<()> {
        self.warm.sync()?;
        self.cold.sync()
    }

    pub fn warm_path(&self) -> &Path {
        self.warm.path()
    }

    pub fn cold_path(&self) -> &Path {
        &self.cold.path
    }
}

/// `<base>.<ext>` sibling naming shared by every on-disk file
pub fn sibling(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

// ============================================================================
// TESTS
// ============================================================================
