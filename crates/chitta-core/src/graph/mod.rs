//! Graph module
//!
//! The dictionary-encoded triplet store and the realm tree, persisted
//! together in the `.graph` sidecar. The sidecar is written on sync and
//! snapshot and is rebuilt-free at open.

mod realms;
mod triplets;

pub use realms::{RealmSnapshot, RealmTree, ROOT_REALM};
pub use triplets::{Dictionary, TripletSnapshot, TripletStore};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct GraphFile {
    triplets: TripletSnapshot,
    realms: RealmSnapshot,
}

/// Triplet store + realm tree with `.graph` persistence
#[derive(Debug)]
pub struct GraphStore {
    path: PathBuf,
    pub triplets: TripletStore,
    pub realms: RealmTree,
}

impl GraphStore {
    /// Load the sidecar if present, else start empty
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            let bytes = std::fs::read(path)?;
            let file: GraphFile = bincode::deserialize(&bytes)
                .map_err(|e| std::io::Error::other(format!("graph sidecar decode: {e}")))?;
            Ok(Self {
                path: path.to_path_buf(),
                triplets: TripletStore::restore(file.triplets),
                realms: RealmTree::restore(file.realms),
            })
        } else {
            Ok(Self {
                path: path.to_path_buf(),
                triplets: TripletStore::new(),
                realms: RealmTree::new(),
            })
        }
    }

    /// Write the sidecar atomically (tmp + rename)
    pub fn save(&self) -> Result<()> {
        let file = GraphFile {
            triplets: self.triplets.snapshot(),
            realms: self.realms.snapshot(),
        };
        let bytes = bincode::serialize(&file)
            .map_err(|e| std::io::Error::other(format!("graph sidecar encode: {e}")))?;
        let tmp = self.path.with_extension("graph.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
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
    fn test_save_open_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.graph");

        {
            let mut graph = GraphStore::open(&path).unwrap();
            graph.triplets.connect("a", "supports", "b", 0.9);
            graph.realms.define("work", ROOT_REALM).unwrap();
            graph.save().unwrap();
        }

        let graph = GraphStore::open(&path).unwrap();
        assert_eq!(graph.triplets.weight("a", "supports", "b"), Some(0.9));
        assert!(graph.realms.id_of("work").is_some());
    }
}
