//! Tag index
//!
//! Exact-match tag → posting-set index keyed by slot, with a compact
//! bincode sidecar. A corrupt sidecar is discarded and the index rebuilt
//! from node tags by the engine at open.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TagFile {
    postings: HashMap<String, BTreeSet<u64>>,
}

/// Tag → slots index with reverse lookup
#[derive(Debug)]
pub struct TagIndex {
    path: PathBuf,
    postings: HashMap<String, BTreeSet<u64>>,
    by_slot: HashMap<u64, BTreeSet<String>>,
}

impl TagIndex {
    /// Load the sidecar; a missing or corrupt file starts empty (the caller
    /// rebuilds from node tags when the store is non-empty).
    pub fn open(path: &Path) -> Self {
        let postings = if path.exists() {
            match std::fs::read(path)
                .ok()
                .and_then(|bytes| bincode::deserialize::<TagFile>(&bytes).ok())
            {
                Some(file) => file.postings,
                None => {
                    warn!(path = %path.display(), "tag sidecar unreadable, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        let mut by_slot: HashMap<u64, BTreeSet<String>> = HashMap::new();
        for (tag, slots) in &postings {
            for &slot in slots {
                by_slot.entry(slot).or_default().insert(tag.clone());
            }
        }
        Self {
            path: path.to_path_buf(),
            postings,
            by_slot,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn add(&mut self, slot: u64, tag: &str) {
        self.postings.entry(tag.to_string()).or_default().insert(slot);
        self.by_slot.entry(slot).or_default().insert(tag.to_string());
    }

    pub fn remove(&mut self, slot: u64, tag: &str) {
        if let Some(slots) = self.postings.get_mut(tag) {
            slots.remove(&slot);
            if slots.is_empty() {
                self.postings.remove(tag);
            }
        }
        if let Some(tags) = self.by_slot.get_mut(&slot) {
            tags.remove(tag);
            if tags.is_empty() {
                self.by_slot.remove(&slot);
            }
        }
    }

    /// Drop every posting for a slot (node removal)
    pub fn remove_slot(&mut self, slot: u64) {
        if let Some(tags) = self.by_slot.remove(&slot) {
            for tag in tags {
                if let Some(slots) = self.postings.get_mut(&tag) {
                    slots.remove(&slot);
                    if slots.is_empty() {
                        self.postings.remove(&tag);
                    }
                }
            }
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.postings.contains_key(tag)
    }

    /// Slots carrying a tag
    pub fn slots_with_tag(&self, tag: &str) -> BTreeSet<u64> {
        self.postings.get(tag).cloned().unwrap_or_default()
    }

    /// Intersection over every listed tag; empty input matches nothing
    pub fn slots_with_all_tags(&self, tags: &[String]) -> BTreeSet<u64> {
        let mut iter = tags.iter();
        let Some(first) = iter.next() else {
            return BTreeSet::new();
        };
        let mut result = self.slots_with_tag(first);
        for tag in iter {
            let next = self.slots_with_tag(tag);
            result.retain(|slot| next.contains(slot));
            if result.is_empty() {
                break;
            }
        }
        result
    }

    pub fn tags_for_slot(&self, slot: u64) -> Vec<String> {
        self.by_slot
            .get(&slot)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Write the sidecar atomically
    pub fn save(&self) -> Result<()> {
        let bytes = bincode::serialize(&TagFile {
            postings: self.postings.clone(),
        })
        .map_err(|e| std::io::Error::other(format!("tag sidecar encode: {e}")))?;
        let tmp = self.path.with_extension("tags.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_add_query_remove() {
        let dir = TempDir::new().unwrap();
        let mut index = TagIndex::open(&dir.path().join("db.tags"));

        index.add(1, "rust");
        index.add(2, "rust");
        index.add(2, "memory");

        assert_eq!(index.slots_with_tag("rust").len(), 2);
        assert_eq!(index.tags_for_slot(2), vec!["memory".to_string(), "rust".to_string()]);

        let both = index.slots_with_all_tags(&["rust".into(), "memory".into()]);
        assert_eq!(both.into_iter().collect::<Vec<_>>(), vec![2]);

        index.remove(2, "rust");
        assert_eq!(index.slots_with_tag("rust").len(), 1);
    }

    #[test]
    fn test_remove_slot_clears_postings() {
        let dir = TempDir::new().unwrap();
        let mut index = TagIndex::open(&dir.path().join("db.tags"));
        index.add(7, "a");
        index.add(7, "b");
        index.remove_slot(7);
        assert!(index.slots_with_tag("a").is_empty());
        assert!(index.tags_for_slot(7).is_empty());
        assert!(!index.has_tag("b"));
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.tags");
        {
            let mut index = TagIndex::open(&path);
            index.add(3, "persisted");
            index.save().unwrap();
        }
        let index = TagIndex::open(&path);
        assert_eq!(index.slots_with_tag("persisted").into_iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_corrupt_sidecar_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.tags");
        std::fs::write(&path, b"\xFF\xFFnot bincode").unwrap();
        let index = TagIndex::open(&path);
        assert!(index.is_empty());
    }
}
