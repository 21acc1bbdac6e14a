//! Transaction log entries.
//!
//! Every mutation appends one sparse record to its transaction's log. A
//! record carries only what replication or persistence needs to replay the
//! change: which table, what kind of change, the pre-change primary key, and
//! the changed fields. The row version column always appears in the change
//! list of an insert or update.

use tabula_core::Value;

/// Kind of change a log entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordState {
    /// Row inserted.
    Added,
    /// Row updated in place.
    Modified,
    /// Row deleted.
    Deleted,
}

/// One sparse change record.
#[derive(Clone, Debug)]
pub struct LogEntry {
    /// Position of the table in the data model's declaration order.
    pub table_index: usize,
    /// Kind of change.
    pub state: RecordState,
    /// Primary key values as they were before the change. For an update that
    /// rewrites the primary key this is the old key.
    pub primary_key: Vec<Value>,
    /// Changed fields as `(column position, new value)`. Empty for deletes;
    /// the full row for inserts.
    pub changes: Vec<(usize, Value)>,
}

impl LogEntry {
    /// Creates a log entry.
    pub fn new(
        table_index: usize,
        state: RecordState,
        primary_key: Vec<Value>,
        changes: Vec<(usize, Value)>,
    ) -> Self {
        Self {
            table_index,
            state,
            primary_key,
            changes,
        }
    }

    /// Returns the recorded new value for a column, if it changed.
    pub fn change_for(&self, position: usize) -> Option<&Value> {
        self.changes
            .iter()
            .find(|(p, _)| *p == position)
            .map(|(_, v)| v)
    }

    /// Returns whether the entry records a change for a column.
    pub fn has_change(&self, position: usize) -> bool {
        self.change_for(position).is_some()
    }
}
