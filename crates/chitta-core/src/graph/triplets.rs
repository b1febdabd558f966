//! Dictionary-encoded triplet store
//!
//! Subject/predicate/object text triples with weights. Two string
//! dictionaries (entity, predicate) map strings onto dense 32-bit ids;
//! postings indexed by subject, object, and predicate answer wildcard
//! queries without scanning. `connect` is idempotent by (s, p, o): repeated
//! inserts overwrite the weight.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::memory::Triplet;

/// Weight sentinel for removed triplets; compacted out on save
const REMOVED: f32 = -1.0;

// ============================================================================
// DICTIONARY
// ============================================================================

/// String → dense 32-bit id dictionary
#[derive(Debug, Default, Clone)]
pub struct Dictionary {
    names: Vec<String>,
    index: HashMap<String, u32>,
}

impl Dictionary {
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: u32) -> &str {
        &self.names[id as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn from_names(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as u32))
            .collect();
        Self { names, index }
    }
}

// ============================================================================
// TRIPLET STORE
// ============================================================================

/// Serialized image of the store (the `.graph` sidecar payload)
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TripletSnapshot {
    pub entities: Vec<String>,
    pub predicates: Vec<String>,
    pub triplets: Vec<(u32, u32, u32, f32)>,
}

/// In-memory dictionary-encoded triplet store
#[derive(Debug, Default)]
pub struct TripletStore {
    entities: Dictionary,
    predicates: Dictionary,
    triplets: Vec<(u32, u32, u32)>,
    weights: Vec<f32>,
    key_index: HashMap<(u32, u32, u32), u32>,
    by_subject: Vec<Vec<u32>>,
    by_object: Vec<Vec<u32>>,
    by_predicate: Vec<Vec<u32>>,
}

impl TripletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live triplets
    pub fn len(&self) -> usize {
        self.key_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_index.is_empty()
    }

    /// Insert or overwrite a triplet; returns true when it was new
    pub fn connect(&mut self, subject: &str, predicate: &str, object: &str, weight: f32) -> bool {
        let s = self.entities.intern(subject);
        let p = self.predicates.intern(predicate);
        let o = self.entities.intern(object);
        if let Some(&idx) = self.key_index.get(&(s, p, o)) {
            self.weights[idx as usize] = weight;
            return false;
        }
        let idx = self.triplets.len() as u32;
        self.triplets.push((s, p, o));
        self.weights.push(weight);
        self.key_index.insert((s, p, o), idx);
        posting(&mut self.by_subject, s).push(idx);
        posting(&mut self.by_object, o).push(idx);
        posting(&mut self.by_predicate, p).push(idx);
        true
    }

    /// Remove a triplet; returns true when one existed
    pub fn remove(&mut self, subject: &str, predicate: &str, object: &str) -> bool {
        let (Some(s), Some(p), Some(o)) = (
            self.entities.get(subject),
            self.predicates.get(predicate),
            self.entities.get(object),
        ) else {
            return false;
        };
        match self.key_index.remove(&(s, p, o)) {
            Some(idx) => {
                self.weights[idx as usize] = REMOVED;
                true
            }
            None => false,
        }
    }

    /// Weight of a live triplet
    pub fn weight(&self, subject: &str, predicate: &str, object: &str) -> Option<f32> {
        let s = self.entities.get(subject)?;
        let p = self.predicates.get(predicate)?;
        let o = self.entities.get(object)?;
        let idx = *self.key_index.get(&(s, p, o))?;
        Some(self.weights[idx as usize])
    }

    /// Match triplets against any combination of bound positions.
    /// Unbound positions are wildcards.
    pub fn query(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Vec<Triplet> {
        // resolve bound names; an unknown bound name matches nothing
        let s = match subject {
            Some(name) => match self.entities.get(name) {
                Some(id) => Some(id),
                None => return Vec::new(),
            },
            None => None,
        };
        let p = match predicate {
            Some(name) => match self.predicates.get(name) {
                Some(id) => Some(id),
                None => return Vec::new(),
            },
            None => None,
        };
        let o = match object {
            Some(name) => match self.entities.get(name) {
                Some(id) => Some(id),
                None => return Vec::new(),
            },
            None => None,
        };

        let candidates: Vec<u32> = match (s, p, o) {
            (Some(s), _, _) => postings(&self.by_subject, s),
            (None, _, Some(o)) => postings(&self.by_object, o),
            (None, Some(p), None) => postings(&self.by_predicate, p),
            (None, None, None) => (0..self.triplets.len() as u32).collect(),
        };

        candidates
            .into_iter()
            .filter_map(|idx| {
                let weight = self.weights[idx as usize];
                if weight < 0.0 {
                    return None;
                }
                let (ts, tp, to) = self.triplets[idx as usize];
                if s.is_some_and(|v| v != ts)
                    || p.is_some_and(|v| v != tp)
                    || o.is_some_and(|v| v != to)
                {
                    return None;
                }
                Some(Triplet {
                    subject: self.entities.name(ts).to_string(),
                    predicate: self.predicates.name(tp).to_string(),
                    object: self.entities.name(to).to_string(),
                    weight,
                })
            })
            .collect()
    }

    /// Compact image for the sidecar; removed triplets drop out
    pub fn snapshot(&self) -> TripletSnapshot {
        TripletSnapshot {
            entities: self.entities.names.clone(),
            predicates: self.predicates.names.clone(),
            triplets: self
                .triplets
                .iter()
                .zip(self.weights.iter())
                .filter(|&(_, &w)| w >= 0.0)
                .map(|(&(s, p, o), &w)| (s, p, o, w))
                .collect(),
        }
    }

    /// Rebuild from a sidecar image
    pub fn restore(snapshot: TripletSnapshot) -> Self {
        let mut store = Self {
            entities: Dictionary::from_names(snapshot.entities),
            predicates: Dictionary::from_names(snapshot.predicates),
            ..Default::default()
        };
        for (s, p, o, w) in snapshot.triplets {
            let idx = store.triplets.len() as u32;
            store.triplets.push((s, p, o));
            store.weights.push(w);
            store.key_index.insert((s, p, o), idx);
            posting(&mut store.by_subject, s).push(idx);
            posting(&mut store.by_object, o).push(idx);
            posting(&mut store.by_predicate, p).push(idx);
        }
        store
    }
}

fn posting(lists: &mut Vec<Vec<u32>>, id: u32) -> &mut Vec<u32> {
    if lists.len() <= id as usize {
        lists.resize(id as usize + 1, Vec::new());
    }
    &mut lists[id as usize]
}

fn postings(lists: &[Vec<u32>], id: u32) -> Vec<u32> {
    lists.get(id as usize).cloned().unwrap_or_default()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_idempotent_by_key() {
        let mut store = TripletStore::new();
        assert!(store.connect("rust", "rewards", "patience", 0.5));
        assert!(!store.connect("rust", "rewards", "patience", 0.9));
        assert_eq!(store.len(), 1);
        assert_eq!(store.weight("rust", "rewards", "patience"), Some(0.9));
    }

    #[test]
    fn test_query_wildcards() {
        let mut store = TripletStore::new();
        store.connect("a", "supports", "b", 1.0);
        store.connect("a", "supports", "c", 0.8);
        store.connect("d", "contradicts", "b", 0.7);

        assert_eq!(store.query(Some("a"), None, None).len(), 2);
        assert_eq!(store.query(None, Some("supports"), None).len(), 2);
        assert_eq!(store.query(None, None, Some("b")).len(), 2);
        assert_eq!(store.query(Some("a"), Some("supports"), Some("b")).len(), 1);
        assert_eq!(store.query(None, None, None).len(), 3);
        assert!(store.query(Some("nobody"), None, None).is_empty());
    }

    #[test]
    fn test_remove_hides_from_queries() {
        let mut store = TripletStore::new();
        store.connect("a", "supports", "b", 1.0);
        assert!(store.remove("a", "supports", "b"));
        assert!(!store.remove("a", "supports", "b"));
        assert!(store.query(Some("a"), None, None).is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut store = TripletStore::new();
        store.connect("a", "supports", "b", 1.0);
        store.connect("c", "part_of", "d", 0.4);
        store.connect("e", "similar", "f", 0.2);
        store.remove("e", "similar", "f");

        let restored = TripletStore::restore(store.snapshot());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.weight("a", "supports", "b"), Some(1.0));
        assert_eq!(restored.weight("c", "part_of", "d"), Some(0.4));
        assert_eq!(restored.weight("e", "similar", "f"), None);
    }
}
