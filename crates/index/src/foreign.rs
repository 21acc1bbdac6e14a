//! Foreign key (parent-to-children) index.

use hashbrown::HashMap;
use tabula_core::Key;

/// An index maintained on the parent side of a foreign key relation, mapping
/// a parent key to the child row references that point at it.
///
/// Children are kept in insertion order. A parent with no children reads as
/// an empty slice, never as an error.
#[derive(Debug)]
pub struct ForeignKeyIndex<R> {
    /// Constraint name, used for error reporting.
    name: String,
    /// Parent key to ordered child references.
    map: HashMap<Key, Vec<R>>,
}

impl<R: PartialEq> ForeignKeyIndex<R> {
    /// Creates a new empty foreign key index.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: HashMap::new(),
        }
    }

    /// Returns the constraint name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records a child reference under a parent key.
    pub fn add_child(&mut self, parent: Key, child: R) {
        self.map.entry(parent).or_default().push(child);
    }

    /// Removes one child reference from a parent key's set.
    pub fn remove_child(&mut self, parent: &Key, child: &R) {
        if let Some(children) = self.map.get_mut(parent) {
            if let Some(pos) = children.iter().position(|c| c == child) {
                children.remove(pos);
            }
            if children.is_empty() {
                self.map.remove(parent);
            }
        }
    }

    /// Returns the children of a parent key in insertion order.
    pub fn children(&self, parent: &Key) -> &[R] {
        self.map.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns whether the parent key has any children.
    pub fn has_children(&self, parent: &Key) -> bool {
        self.map.get(parent).is_some_and(|c| !c.is_empty())
    }

    /// Returns the number of children under a parent key.
    pub fn child_count(&self, parent: &Key) -> usize {
        self.map.get(parent).map(Vec::len).unwrap_or(0)
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}
