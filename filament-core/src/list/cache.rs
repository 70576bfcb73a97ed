//! Keyed node cache shared by both reconcilers.
//!
//! Every occurrence of a key owns its own entry. Entries of one key are kept
//! in occurrence order and handed out first in, first out, so duplicate keys
//! never alias one node.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::key::Key;
use crate::dom::Node;
use crate::reactive::Observable;

/// A rendered item.
#[derive(Clone)]
pub(crate) struct Entry {
    pub node: Node,
    pub index: Option<Observable<usize>>,
}

impl Entry {
    /// Point the index cell at `position`. Unchanged positions notify nobody.
    pub fn move_to(&self, position: usize) {
        if let Some(index) = &self.index {
            index.set(position);
        }
    }

    /// Detach the node and retire the index cell.
    pub fn release(self) {
        self.node.remove();
        if let Some(index) = self.index {
            index.cleanup();
        }
    }
}

#[derive(Default)]
pub(crate) struct KeyedCache {
    entries: HashMap<Key, SmallVec<[Entry; 1]>>,
    len: usize,
}

impl KeyedCache {
    pub fn insert(&mut self, key: Key, entry: Entry) {
        self.entries.entry(key).or_default().push(entry);
        self.len += 1;
    }

    /// Take the oldest entry for `key`.
    pub fn take(&mut self, key: &Key) -> Option<Entry> {
        let slot = self.entries.get_mut(key)?;
        let entry = (!slot.is_empty()).then(|| slot.remove(0));
        if slot.is_empty() {
            self.entries.remove(key);
        }
        if entry.is_some() {
            self.len -= 1;
        }
        entry
    }

    /// Node of the oldest entry for `key`.
    pub fn node(&self, key: &Key) -> Option<Node> {
        self.entries
            .get(key)
            .and_then(|slot| slot.first())
            .map(|entry| entry.node.clone())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (Key, Entry)> + '_ {
        self.len = 0;
        self.entries
            .drain()
            .flat_map(|(key, slot)| slot.into_iter().map(move |entry| (key.clone(), entry)))
    }

    /// Move every entry of `other` behind the entries already held.
    pub fn absorb(&mut self, mut other: KeyedCache) {
        for (key, entry) in other.drain() {
            self.insert(key, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> Entry {
        Entry {
            node: Node::text(text),
            index: None,
        }
    }

    #[test]
    fn duplicates_are_first_in_first_out() {
        let mut cache = KeyedCache::default();
        cache.insert(Key::from("a"), entry("first"));
        cache.insert(Key::from("a"), entry("second"));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.take(&Key::from("a")).unwrap().node.text_content(), "first");
        assert_eq!(cache.node(&Key::from("a")).unwrap().text_content(), "second");
        assert_eq!(cache.take(&Key::from("a")).unwrap().node.text_content(), "second");
        assert!(cache.take(&Key::from("a")).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn release_retires_index_cell() {
        let index = Observable::new(0usize);
        let held = Entry {
            node: Node::text("x"),
            index: Some(index.clone()),
        };
        held.release();
        assert!(index.is_cleaned_up());
    }
}
