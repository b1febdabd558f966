//! Storage module
//!
//! The persistence stack, leaves first:
//! - mapped regions with crash-safe headers
//! - the CRC-framed write-ahead log
//! - the append-only payload blob
//! - the unified index file (hash, meta, vectors, connection arena, ANN)
//! - hot/warm/cold tiering
//! - the on-disk format upgrade chain

pub mod migrations;
mod payloads;
mod region;
mod tiered;
mod unified;
mod wal;

pub use migrations::{backup_path, upgrade_to_current};
pub use payloads::PayloadStore;
pub use region::{MappedRegion, RegionHeader, REGION_HEADER_LEN};
pub use tiered::{sibling, TieredStore, DEFAULT_HOT_CAPACITY};
pub use unified::{
    NodeMeta, UnifiedIndex, ANN_M, ANN_M0, EF_CONSTRUCTION, EF_SEARCH, FORMAT_VERSION,
    UNIFIED_MAGIC,
};
pub use wal::{WalRecord, WriteAheadLog};
