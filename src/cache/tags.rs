//! Tag Index Module
//!
//! Many-to-many mapping from tag to the keys currently carrying it.

use std::collections::{BTreeSet, HashMap, HashSet};

// == Tag Index ==
/// Maps each tag to the set of keys indexed under it.
///
/// Empty tag sets are dropped so the index only names tags that still have members.
#[derive(Debug, Default)]
pub struct TagIndex {
    members: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    // == Constructor ==
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Attach / Detach ==
    /// Registers `key` under every tag in `tags`.
    pub fn attach<'a>(&mut self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            self.members
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Unregisters `key` from every tag in `tags`.
    pub fn detach<'a>(&mut self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            if let Some(keys) = self.members.get_mut(tag.as_str()) {
                keys.remove(key);
                if keys.is_empty() {
                    self.members.remove(tag.as_str());
                }
            }
        }
    }

    // == Lookup ==
    /// Removes `tag` from the index, returning the keys it carried.
    pub fn take(&mut self, tag: &str) -> HashSet<String> {
        self.members.remove(tag).unwrap_or_default()
    }

    /// Keys currently indexed under `tag`, sorted.
    pub fn keys(&self, tag: &str) -> BTreeSet<String> {
        self.members
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    // == Clear ==
    /// Drops every tag.
    pub fn clear(&mut self) {
        self.members.clear();
    }
}

#[cfg(test)]
impl TagIndex {
    fn contains(&self, tag: &str, key: &str) -> bool {
        self.members
            .get(tag)
            .is_some_and(|keys| keys.contains(key))
    }

    fn tag_count(&self) -> usize {
        self.members.len()
    }
}
