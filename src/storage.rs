use std::collections::HashMap;
use std::mem;

use crate::key::Key;

/// A key-value map held by a node, either its primary set or its backup of the predecessor.
#[derive(Default, Debug)]
pub struct Storage {
    data: HashMap<String, String>,
}

impl Storage {
    pub fn new() -> Self {
        Storage {
            data: HashMap::new(),
        }
    }

    /// Inserts a pair, replacing any previous value.
    pub fn insert(&mut self, key: String, value: String) {
        self.data.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.data.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.data.remove(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Returns a copy of every pair.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.data.clone()
    }

    /// Replaces the content with `data`.
    pub fn replace(&mut self, data: HashMap<String, String>) {
        self.data = data;
    }

    /// Removes and returns every pair.
    pub fn drain(&mut self) -> HashMap<String, String> {
        mem::replace(&mut self.data, HashMap::new())
    }

    /// Inserts every pair of `data`, overwriting existing keys.
    pub fn extend(&mut self, data: HashMap<String, String>) {
        self.data.extend(data);
    }

    /// Removes every key present in `data`.
    pub fn subtract(&mut self, data: &HashMap<String, String>) {
        for key in data.keys() {
            self.data.remove(key);
        }
    }

    /// Removes and returns the pairs whose key hash lies outside `(left, right]`.
    pub fn split_off_outside(&mut self, left: &Key, right: &Key) -> HashMap<String, String> {
        let (kept, moved): (HashMap<_, _>, HashMap<_, _>) = mem::replace(&mut self.data, HashMap::new())
            .into_iter()
            .partition(|(key, _)| Key::hash(key).in_interval(left, right, true));
        self.data = kept;
        moved
    }
}
