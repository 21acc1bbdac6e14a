//! Unique key index.

use crate::IndexError;
use hashbrown::HashMap;
use tabula_core::Key;

/// A unique index mapping each key to exactly one row reference.
///
/// The reference type `R` is typically the row's primary key or an internal
/// row handle; the index does not interpret it.
#[derive(Debug)]
pub struct UniqueKeyIndex<R> {
    /// Index name, used for error reporting.
    name: String,
    /// The underlying map.
    map: HashMap<Key, R>,
}

impl<R> UniqueKeyIndex<R> {
    /// Creates a new empty unique index.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: HashMap::new(),
        }
    }

    /// Returns the index name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts a key, rejecting duplicates.
    pub fn insert(&mut self, key: Key, row: R) -> Result<(), IndexError> {
        if self.map.contains_key(&key) {
            return Err(IndexError::DuplicateKey {
                index: self.name.clone(),
                key,
            });
        }
        self.map.insert(key, row);
        Ok(())
    }

    /// Point lookup. Absence is not an error.
    pub fn get(&self, key: &Key) -> Option<&R> {
        self.map.get(key)
    }

    /// Returns whether the index holds the key.
    pub fn contains_key(&self, key: &Key) -> bool {
        self.map.contains_key(key)
    }

    /// Removes a key, returning the row reference it mapped to.
    pub fn remove(&mut self, key: &Key) -> Option<R> {
        self.map.remove(key)
    }

    /// Returns the number of indexed keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}
