//! Versioned row storage.
//!
//! A row keeps a short history of value snapshots and a cursor
//! (`action_index`) into it. Readers always see the snapshot just below the
//! cursor; an open edit appends a working copy at the cursor which stays
//! invisible until `commit_edit` advances past it. When the cursor reaches
//! the end of the history the row compacts back to a single committed
//! snapshot.

use std::sync::Arc;
use tabula_core::Value;

use crate::transaction::TxnId;

/// Lifecycle state of a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowState {
    /// Committed and untouched by any open transaction.
    Unchanged,
    /// Inserted by a transaction that has not committed.
    Added,
    /// Edited by a transaction that has not committed.
    Modified,
    /// Removed from its table; kept only for undo.
    Deleted,
}

/// An immutable snapshot of a row's values. Clones share the backing
/// allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    values: Arc<Vec<Value>>,
}

impl Snapshot {
    /// Wraps a value vector.
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// Returns the value at a column position.
    pub fn get(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    /// Returns all values in column order.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the snapshot has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn make_mut(&mut self) -> &mut Vec<Value> {
        Arc::make_mut(&mut self.values)
    }
}

impl From<Vec<Value>> for Snapshot {
    fn from(values: Vec<Value>) -> Self {
        Snapshot::new(values)
    }
}

/// A versioned row.
#[derive(Clone, Debug)]
pub struct Row {
    /// Snapshot history. `data[action_index - 1]` is the committed view;
    /// `data[action_index]`, when present, is the open working copy.
    data: Vec<Snapshot>,
    /// Cursor separating committed snapshots from the working copy.
    action_index: usize,
    /// Lifecycle state.
    state: RowState,
    /// Version stamp of the committed view.
    version: u64,
    /// Transaction holding the open edit, if any.
    editing: Option<TxnId>,
}

impl Row {
    /// Creates a freshly inserted row.
    pub fn new(snapshot: Snapshot, version: u64) -> Self {
        Self {
            data: vec![snapshot],
            action_index: 1,
            state: RowState::Added,
            version,
            editing: None,
        }
    }

    /// Returns the committed snapshot.
    pub fn current(&self) -> &Snapshot {
        &self.data[self.action_index - 1]
    }

    /// Returns the open working copy, if an edit is in progress.
    pub fn working(&self) -> Option<&Snapshot> {
        self.data.get(self.action_index)
    }

    /// Returns the lifecycle state.
    #[inline]
    pub fn state(&self) -> RowState {
        self.state
    }

    /// Returns the committed version stamp.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the transaction holding an open edit.
    #[inline]
    pub fn editing(&self) -> Option<TxnId> {
        self.editing
    }

    /// Opens an edit: appends a working copy of the committed snapshot.
    ///
    /// The caller must have verified no other edit is open.
    pub fn begin_edit(&mut self, txn: TxnId) {
        let working = self.current().clone();
        self.data.truncate(self.action_index);
        self.data.push(working);
        if self.state == RowState::Unchanged {
            self.state = RowState::Modified;
        }
        self.editing = Some(txn);
    }

    /// Writes a field of the working copy.
    pub fn set(&mut self, position: usize, value: Value) {
        let cursor = self.action_index;
        if let Some(working) = self.data.get_mut(cursor) {
            let values = working.make_mut();
            if position < values.len() {
                values[position] = value;
            }
        }
    }

    /// Returns the sparse diff between the committed snapshot and the working
    /// copy: `(position, new value)` for each changed field.
    pub fn diff(&self) -> Vec<(usize, Value)> {
        let Some(working) = self.working() else {
            return Vec::new();
        };
        let committed = self.current();
        working
            .values()
            .iter()
            .enumerate()
            .filter(|(i, v)| committed.get(*i) != Some(*v))
            .map(|(i, v)| (i, v.clone()))
            .collect()
    }

    /// Promotes the working copy to the committed view and stamps the new
    /// version. When the cursor reaches the end of the history the row
    /// compacts to a single snapshot and returns to `Unchanged`.
    pub fn commit_edit(&mut self, version: u64) {
        let at_end = self.action_index == self.data.len() - 1;
        self.action_index += 1;
        self.version = version;
        if at_end {
            let committed = self.data.swap_remove(self.action_index - 1);
            self.data.clear();
            self.data.push(committed);
            self.action_index = 1;
            self.state = RowState::Unchanged;
            self.editing = None;
        }
    }

    /// Discards the working copy. Safe to call with no open edit; calling it
    /// twice is a no-op.
    pub fn rollback_edit(&mut self) {
        self.data.truncate(self.action_index);
        self.state = RowState::Unchanged;
        self.editing = None;
    }

    /// Replaces the committed image. Used when a transaction's undo restores
    /// the pre-change state. An edit held by another transaction survives:
    /// its working copy is re-seated on top of the restored snapshot.
    pub fn restore(&mut self, snapshot: Snapshot, version: u64) {
        let open_edit = self
            .editing
            .and_then(|txn| self.working().cloned().map(|w| (txn, w)));
        self.data.clear();
        self.data.push(snapshot);
        self.action_index = 1;
        self.version = version;
        match open_edit {
            Some((txn, working)) => {
                self.data.push(working);
                self.state = RowState::Modified;
                self.editing = Some(txn);
            }
            None => {
                self.state = RowState::Unchanged;
                self.editing = None;
            }
        }
    }

    /// Marks the row committed without changing its values. Used when a
    /// transaction that inserted the row commits. An edit held by another
    /// transaction on the optimistically visible row stays open.
    pub fn mark_committed(&mut self) {
        self.state = if self.editing.is_some() {
            RowState::Modified
        } else {
            RowState::Unchanged
        };
    }

    /// Marks the row deleted.
    pub fn mark_deleted(&mut self) {
        self.state = RowState::Deleted;
        self.editing = None;
    }
}
