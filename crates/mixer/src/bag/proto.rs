use super::Bag;
use crate::value::Value;
use std::collections::{HashMap, HashSet, hash_map};

/// An immutable attribute bag.
///
/// Holds values plus a set of names marked deleted. A deletion mark has no
/// visible effect on the bag itself; it matters when the bag is applied as a
/// delta over earlier state, where it removes the name.
///
/// `ProtoBag` is `Clone` so cumulative state can be updated copy-on-write
/// behind an [`Arc`](std::sync::Arc) while older snapshots are still being
/// read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProtoBag {
    values: HashMap<String, Value>,
    deleted: HashSet<String>,
}

impl ProtoBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
            deleted: HashSet::new(),
        }
    }

    /// Sets `name`, clearing any deletion mark it carried.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        self.deleted.remove(&name);
        self.values.insert(name, value)
    }

    /// Marks `name` deleted, dropping any value it held.
    pub fn mark_deleted(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.values.remove(&name);
        self.deleted.insert(name);
    }

    pub fn is_deleted(&self, name: &str) -> bool {
        self.deleted.contains(name)
    }

    /// Borrows the value for `name` without cloning it.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.deleted.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    pub fn deleted(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.deleted.clear();
    }

    /// Folds `delta` into this bag: deleted names are removed, set names
    /// overwrite. Deletion marks are consumed, not copied.
    pub fn apply(&mut self, delta: &Self) {
        for name in &delta.deleted {
            self.values.remove(name);
        }
        for (name, value) in &delta.values {
            self.values.insert(name.clone(), value.clone());
        }
    }
}

impl Bag for ProtoBag {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

impl FromIterator<(String, Value)> for ProtoBag {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            deleted: HashSet::new(),
        }
    }
}
