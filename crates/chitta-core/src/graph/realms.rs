//! Realm tree
//!
//! Realms are named namespaces forming a tree rooted at `brahman`. A node
//! carries at most one realm; visibility at recall time is the queried
//! realm plus all of its ancestors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ChittaError, Result};

/// The well-known root realm
pub const ROOT_REALM: &str = "brahman";

/// Realm tree with dense 16-bit ids (the root is id 0)
#[derive(Debug, Clone)]
pub struct RealmTree {
    names: Vec<String>,
    parents: Vec<u16>,
    index: HashMap<String, u16>,
}

/// Serialized image: (name, parent id) in id order
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RealmSnapshot {
    pub realms: Vec<(String, u16)>,
}

impl Default for RealmTree {
    fn default() -> Self {
        let mut index = HashMap::new();
        index.insert(ROOT_REALM.to_string(), 0);
        Self {
            names: vec![ROOT_REALM.to_string()],
            parents: vec![0],
            index,
        }
    }
}

impl RealmTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a realm under an existing parent; idempotent when the realm
    /// already exists with the same parent.
    pub fn define(&mut self, name: &str, parent: &str) -> Result<u16> {
        let parent_id = self
            .id_of(parent)
            .ok_or_else(|| ChittaError::UnknownRealm(parent.to_string()))?;
        if let Some(&existing) = self.index.get(name) {
            if self.parents[existing as usize] != parent_id {
                return Err(ChittaError::InvalidParams(format!(
                    "realm '{name}' already exists under '{}'",
                    self.names[self.parents[existing as usize] as usize]
                )));
            }
            return Ok(existing);
        }
        let id = self.names.len() as u16;
        self.names.push(name.to_string());
        self.parents.push(parent_id);
        self.index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn id_of(&self, name: &str) -> Option<u16> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: u16) -> &str {
        &self.names[id as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the root always exists
    }

    /// The realm itself plus every ancestor up to the root
    pub fn ancestors(&self, id: u16) -> Vec<u16> {
        let mut chain = vec![id];
        let mut cur = id;
        while cur != 0 {
            cur = self.parents[cur as usize];
            chain.push(cur);
        }
        chain
    }

    /// True when `realm` is `scope` or one of `scope`'s ancestors
    pub fn visible_from(&self, realm: u16, scope: u16) -> bool {
        self.ancestors(scope).contains(&realm)
    }

    pub fn snapshot(&self) -> RealmSnapshot {
        RealmSnapshot {
            realms: self
                .names
                .iter()
                .cloned()
                .zip(self.parents.iter().copied())
                .collect(),
        }
    }

    pub fn restore(snapshot: RealmSnapshot) -> Self {
        if snapshot.realms.is_empty() {
            return Self::default();
        }
        let names: Vec<String> = snapshot.realms.iter().map(|(n, _)| n.clone()).collect();
        let parents: Vec<u16> = snapshot.realms.iter().map(|&(_, p)| p).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as u16))
            .collect();
        Self { names, parents, index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_always_exists() {
        let tree = RealmTree::new();
        assert_eq!(tree.id_of(ROOT_REALM), Some(0));
        assert_eq!(tree.ancestors(0), vec![0]);
    }

    #[test]
    fn test_define_and_visibility() {
        let mut tree = RealmTree::new();
        let work = tree.define("work", ROOT_REALM).unwrap();
        let project = tree.define("project-x", "work").unwrap();

        // querying from project-x sees project-x, work, and brahman
        assert!(tree.visible_from(project, project));
        assert!(tree.visible_from(work, project));
        assert!(tree.visible_from(0, project));
        // querying from work does not see the child
        assert!(!tree.visible_from(project, work));
    }

    #[test]
    fn test_unknown_parent_refused() {
        let mut tree = RealmTree::new();
        assert!(matches!(
            tree.define("orphan", "nowhere"),
            Err(ChittaError::UnknownRealm(_))
        ));
    }

    #[test]
    fn test_redefine_same_parent_is_idempotent() {
        let mut tree = RealmTree::new();
        let a = tree.define("work", ROOT_REALM).unwrap();
        let b = tree.define("work", ROOT_REALM).unwrap();
        assert_eq!(a, b);
        tree.define("other", ROOT_REALM).unwrap();
        assert!(tree.define("work", "other").is_err());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut tree = RealmTree::new();
        tree.define("work", ROOT_REALM).unwrap();
        tree.define("play", ROOT_REALM).unwrap();
        let restored = RealmTree::restore(tree.snapshot());
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.id_of("play"), tree.id_of("play"));
    }
}
