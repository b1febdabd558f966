//! Mapped regions
//!
//! A mapped region is a read/write memory-mapped file with a fixed header at
//! byte 0 (magic, format version, capacity, snapshot counter) and a payload
//! area after it. Resizing unmaps, grows the file, and remaps; anything that
//! cached an interior pointer must recompute it from offsets afterwards.

use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{ChittaError, Result};

/// Region header length in bytes.
/// Layout: magic [u8;4] | version u32 | capacity u64 | snapshot_counter u64 |
/// reserved to 64.
pub const REGION_HEADER_LEN: usize = 64;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_CAPACITY: usize = 8;
const OFF_SNAPSHOT: usize = 16;

/// Header fields read without mapping the whole file
#[derive(Debug, Clone, Copy)]
pub struct RegionHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub capacity: u64,
    pub snapshot_counter: u64,
}

/// A fixed-length memory-mapped file
pub struct MappedRegion {
    file: File,
    map: MmapMut,
    path: PathBuf,
    capacity: u64,
}

impl MappedRegion {
    /// Create a fresh region with the given payload capacity, truncating any
    /// existing file.
    pub fn create(path: &Path, magic: [u8; 4], version: u32, capacity: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(REGION_HEADER_LEN as u64 + capacity)?;
        // Safety: the file stays open for the lifetime of the map and no
        // other process writes it (daemon holds the advisory lock).
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        map[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(&magic);
        map[OFF_VERSION..OFF_VERSION + 4].copy_from_slice(&version.to_le_bytes());
        map[OFF_CAPACITY..OFF_CAPACITY + 8].copy_from_slice(&capacity.to_le_bytes());
        map[OFF_SNAPSHOT..OFF_SNAPSHOT + 8].copy_from_slice(&0u64.to_le_bytes());
        map.flush()?;
        Ok(Self {
            file,
            map,
            path: path.to_path_buf(),
            capacity,
        })
    }

    /// Open an existing region, validating magic and version.
    ///
    /// An empty or truncated file is a [`ChittaError::CorruptHeader`]; a
    /// magic or version mismatch is [`ChittaError::IncompatibleVersion`],
    /// the signal to invoke the migration path.
    pub fn open(path: &Path, magic: [u8; 4], version: u32) -> Result<Self> {
        let header = Self::read_header(path)?;
        if header.magic != magic || header.version != version {
            return Err(ChittaError::IncompatibleVersion {
                found: header.version,
                current: version,
            });
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let actual = file.metadata()?.len();
        let expected = REGION_HEADER_LEN as u64 + header.capacity;
        if actual < expected {
            return Err(ChittaError::CorruptHeader(format!(
                "{}: file is {actual} bytes, header claims {expected}",
                path.display()
            )));
        }
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            map,
            path: path.to_path_buf(),
            capacity: header.capacity,
        })
    }

    /// Read just the header of a region file
    pub fn read_header(path: &Path) -> Result<RegionHeader> {
        let len = std::fs::metadata(path)?.len();
        if len < REGION_HEADER_LEN as u64 {
            return Err(ChittaError::CorruptHeader(format!(
                "{}: {len} bytes is shorter than a header",
                path.display()
            )));
        }
        let bytes = {
            use std::io::Read;
            let mut f = File::open(path)?;
            let mut buf = [0u8; REGION_HEADER_LEN];
            f.read_exact(&mut buf)?;
            buf
        };
        Ok(RegionHeader {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            version: u32::from_le_bytes(bytes[OFF_VERSION..OFF_VERSION + 4].try_into().unwrap()),
            capacity: u64::from_le_bytes(bytes[OFF_CAPACITY..OFF_CAPACITY + 8].try_into().unwrap()),
            snapshot_counter: u64::from_le_bytes(
                bytes[OFF_SNAPSHOT..OFF_SNAPSHOT + 8].try_into().unwrap(),
            ),
        })
    }

    /// Grow the payload area. Unmaps, extends the file, remaps; every cached
    /// interior pointer is invalid after this returns.
    pub fn resize(&mut self, new_capacity: u64) -> Result<()> {
        if new_capacity <= self.capacity {
            return Ok(());
        }
        self.map.flush()?;
        self.file.set_len(REGION_HEADER_LEN as u64 + new_capacity)?;
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        self.capacity = new_capacity;
        self.map[OFF_CAPACITY..OFF_CAPACITY + 8].copy_from_slice(&new_capacity.to_le_bytes());
        Ok(())
    }

    /// Flush dirty pages to disk
    pub fn sync(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        u32::from_le_bytes(self.map[OFF_VERSION..OFF_VERSION + 4].try_into().unwrap())
    }

    pub fn snapshot_counter(&self) -> u64 {
        u64::from_le_bytes(self.map[OFF_SNAPSHOT..OFF_SNAPSHOT + 8].try_into().unwrap())
    }

    /// Bump the snapshot counter in the header; returns the new value
    pub fn bump_snapshot_counter(&mut self) -> u64 {
        let next = self.snapshot_counter() + 1;
        self.map[OFF_SNAPSHOT..OFF_SNAPSHOT + 8].copy_from_slice(&next.to_le_bytes());
        next
    }

    /// Carry a snapshot counter forward (capacity-growth rebuilds)
    pub fn set_snapshot_counter(&mut self, value: u64) {
        self.map[OFF_SNAPSHOT..OFF_SNAPSHOT + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Payload bytes after the header
    pub fn bytes(&self) -> &[u8] {
        &self.map[REGION_HEADER_LEN..]
    }

    /// Mutable payload bytes after the header
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map[REGION_HEADER_LEN..]
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
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

    const MAGIC: [u8; 4] = *b"TEST";

    #[test]
    fn test_create_open_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.bin");

        {
            let mut region = MappedRegion::create(&path, MAGIC, 3, 4096).unwrap();
            region.bytes_mut()[0..4].copy_from_slice(b"data");
            region.sync().unwrap();
        }

        let region = MappedRegion::open(&path, MAGIC, 3).unwrap();
        assert_eq!(&region.bytes()[0..4], b"data");
        assert_eq!(region.capacity(), 4096);
        assert_eq!(region.snapshot_counter(), 0);
    }

    #[test]
    fn test_empty_file_is_corrupt_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        File::create(&path).unwrap();

        match MappedRegion::open(&path, MAGIC, 3) {
            Err(ChittaError::CorruptHeader(_)) => {}
            other => panic!("expected CorruptHeader, got {other:?}"),
        }
    }

    #[test]
    fn test_version_mismatch_is_incompatible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.bin");
        MappedRegion::create(&path, MAGIC, 2, 128).unwrap();

        match MappedRegion::open(&path, MAGIC, 3) {
            Err(ChittaError::IncompatibleVersion { found: 2, current: 3 }) => {}
            other => panic!("expected IncompatibleVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_resize_preserves_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grow.bin");
        let mut region = MappedRegion::create(&path, MAGIC, 3, 64).unwrap();
        region.bytes_mut()[0..5].copy_from_slice(b"hello");
        region.resize(1024).unwrap();
        assert_eq!(region.capacity(), 1024);
        assert_eq!(&region.bytes()[0..5], b"hello");
    }

    #[test]
    fn test_snapshot_counter_bumps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.bin");
        let mut region = MappedRegion::create(&path, MAGIC, 3, 64).unwrap();
        assert_eq!(region.bump_snapshot_counter(), 1);
        assert_eq!(region.bump_snapshot_counter(), 2);
        region.sync().unwrap();
        drop(region);
        assert_eq!(MappedRegion::read_header(&path).unwrap().snapshot_counter, 2);
    }
}
