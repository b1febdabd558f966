//! On-disk format migrations
//!
//! Every unified file header carries an explicit version. Opening a file
//! with a lower version walks the fixed upgrade chain one step at a time,
//! after writing a `.backup` sibling of the original. A higher version
//! refuses to open.
//!
//! Chain:
//! - v2 → v3: v3 defined the previously-reserved index-header words
//!   (entry level, arena alignment bookkeeping). v2 files carry zeros
//!   there, which are exactly v3's empty values, so the step stamps the
//!   version field and nothing else.

use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ChittaError, Result};
use crate::storage::region::MappedRegion;
use crate::storage::unified::{FORMAT_VERSION, UNIFIED_MAGIC};

/// Version field offset inside the region header
const VERSION_OFFSET: u64 = 4;

/// Path of the pre-migration backup for a unified file
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".backup");
    PathBuf::from(name)
}

/// Upgrade a unified file to the current format version.
///
/// Returns the version the file started at. No-op when already current;
/// [`ChittaError::IncompatibleVersion`] when the file is newer than this
/// engine.
pub fn upgrade_to_current(path: &Path) -> Result<u32> {
    let header = MappedRegion::read_header(path)?;
    if header.magic != UNIFIED_MAGIC {
        return Err(ChittaError::IncompatibleVersion {
            found: header.version,
            current: FORMAT_VERSION,
        });
    }
    if header.version > FORMAT_VERSION {
        return Err(ChittaError::IncompatibleVersion {
            found: header.version,
            current: FORMAT_VERSION,
        });
    }
    if header.version == FORMAT_VERSION {
        return Ok(header.version);
    }

    let backup = backup_path(path);
    std::fs::copy(path, &backup)?;
    info!(
        from = header.version,
        to = FORMAT_VERSION,
        backup = %backup.display(),
        "upgrading unified file format"
    );

    let mut version = header.version;
    while version < FORMAT_VERSION {
        match version {
            2 => stamp_version(path, 3)?,
            v => {
                return Err(ChittaError::IncompatibleVersion {
                    found: v,
                    current: FORMAT_VERSION,
                });
            }
        }
        version += 1;
    }
    Ok(header.version)
}

fn stamp_version(path: &Path, version: u32) -> Result<()> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    file.write_all_at(&version.to_le_bytes(), VERSION_OFFSET)?;
    file.sync_data()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::unified::UnifiedIndex;
    use tempfile::TempDir;

    #[test]
    fn test_current_version_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.unified");
        UnifiedIndex::create(&path, 32).unwrap();

        assert_eq!(upgrade_to_current(&path).unwrap(), FORMAT_VERSION);
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_v2_upgrades_with_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.unified");
        UnifiedIndex::create(&path, 32).unwrap();

        // age the file back to v2
        stamp_version(&path, 2).unwrap();
        assert_eq!(MappedRegion::read_header(&path).unwrap().version, 2);

        assert_eq!(upgrade_to_current(&path).unwrap(), 2);
        assert_eq!(MappedRegion::read_header(&path).unwrap().version, FORMAT_VERSION);
        assert!(backup_path(&path).exists());
        assert_eq!(MappedRegion::read_header(&backup_path(&path)).unwrap().version, 2);

        // the upgraded file opens cleanly
        UnifiedIndex::open(&path).unwrap();
    }

    #[test]
    fn test_newer_version_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.unified");
        UnifiedIndex::create(&path, 32).unwrap();
        stamp_version(&path, FORMAT_VERSION + 1).unwrap();

        match upgrade_to_current(&path) {
            Err(ChittaError::IncompatibleVersion { found, current }) => {
                assert_eq!(found, FORMAT_VERSION + 1);
                assert_eq!(current, FORMAT_VERSION);
            }
            other => panic!("expected IncompatibleVersion, got {other:?}"),
        }
    }
}
