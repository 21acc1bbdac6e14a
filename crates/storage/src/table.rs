//! Tables: a primary row store plus the indices maintained on it.
//!
//! A table owns its rows keyed by primary key, one `UniqueKeyIndex` per
//! secondary unique key, and one `ForeignKeyIndex` for each relation in which
//! it is the parent. All of that sits behind the table's `TableLock`; the
//! data model reaches it through the `read`/`write` closure helpers, which
//! must never be nested for the same table on one thread.

use std::cell::UnsafeCell;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tabula_core::schema::TableSchema;
use tabula_core::{Error, Key, Result, Value};
use tabula_index::{ForeignKeyIndex, UniqueKeyIndex};

use crate::lock::TableLock;
use crate::observer::{DataAction, RowObserver};
use crate::row::{Row, Snapshot};

/// One foreign key relation seen from the parent side.
pub(crate) struct ChildIndex {
    /// Constraint name (as declared on the child table).
    pub name: String,
    /// Position of the child table in the data model.
    pub child_table: usize,
    /// Positions of the referenced columns in this (parent) table.
    pub parent_positions: Vec<usize>,
    /// Parent key to child primary keys.
    pub index: ForeignKeyIndex<Key>,
}

impl ChildIndex {
    /// Extracts the referenced parent key from a parent row's values.
    pub fn parent_key_of(&self, values: &[Value]) -> Key {
        Key::from_values(
            self.parent_positions
                .iter()
                .map(|&p| values.get(p).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

/// One foreign key relation seen from the child side, resolved to table and
/// index slots at build time.
pub(crate) struct OutboundFk {
    /// Slot into the child schema's foreign key list.
    pub fk_slot: usize,
    /// Position of the parent table in the data model.
    pub parent_table: usize,
    /// Slot into the parent table's `inbound` list.
    pub inbound_slot: usize,
    /// Referenced parent unique key: `None` for the primary key, otherwise a
    /// slot into the parent schema's secondary unique keys.
    pub parent_key_slot: Option<usize>,
}

/// Lock-guarded mutable state of a table.
pub(crate) struct TableState {
    /// Rows keyed by primary key. Doubles as the primary key index.
    pub rows: HashMap<Key, Row>,
    /// Secondary unique indices, parallel to the schema's unique keys.
    pub unique: Vec<UniqueKeyIndex<Key>>,
    /// Child indices for relations where this table is the parent.
    pub inbound: Vec<ChildIndex>,
}

/// A table of versioned rows with incrementally maintained key indices.
pub struct Table {
    schema: TableSchema,
    table_index: usize,
    lock: TableLock,
    state: UnsafeCell<TableState>,
    /// Child-side relations of this table, fixed at build time.
    outbound: Vec<OutboundFk>,
    observers: Mutex<Vec<Arc<dyn RowObserver>>>,
}

// State behind the UnsafeCell is only reached through read()/write(), which
// hold the table lock.
unsafe impl Send for Table {}
unsafe impl Sync for Table {}

impl Table {
    pub(crate) fn new(schema: TableSchema, table_index: usize) -> Self {
        let unique = schema
            .unique_keys()
            .iter()
            .map(|uk| UniqueKeyIndex::new(uk.name()))
            .collect();
        Self {
            schema,
            table_index,
            lock: TableLock::new(),
            state: UnsafeCell::new(TableState {
                rows: HashMap::new(),
                unique,
                inbound: Vec::new(),
            }),
            outbound: Vec::new(),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Returns the table schema.
    #[inline]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the table's position in the data model.
    #[inline]
    pub fn table_index(&self) -> usize {
        self.table_index
    }

    pub(crate) fn outbound(&self) -> &[OutboundFk] {
        &self.outbound
    }

    pub(crate) fn push_outbound(&mut self, fk: OutboundFk) {
        self.outbound.push(fk);
    }

    pub(crate) fn push_inbound(&mut self, child: ChildIndex) -> usize {
        let state = self.state.get_mut();
        state.inbound.push(child);
        state.inbound.len() - 1
    }

    /// Runs a closure under the table's read lock.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&TableState) -> R) -> R {
        let _guard = self.lock.read();
        // Safety: the read lock excludes writers; see the struct invariant.
        let state = unsafe { &*self.state.get() };
        f(state)
    }

    /// Runs a closure under the table's write lock.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut TableState) -> R) -> R {
        let _guard = self.lock.write();
        // Safety: the write lock is exclusive; see the struct invariant.
        let state = unsafe { &mut *self.state.get() };
        f(state)
    }

    /// Looks up the committed snapshot of a row by primary key.
    pub fn find(&self, key: &Key) -> Option<Snapshot> {
        self.read(|st| st.rows.get(key).map(|row| row.current().clone()))
    }

    /// Looks up a row through a named unique key. The primary key's name is
    /// accepted too.
    pub fn find_by(&self, unique_key: &str, key: &Key) -> Result<Option<Snapshot>> {
        if unique_key == self.schema.primary_key().name() {
            return Ok(self.find(key));
        }
        let (slot, _) = self
            .schema
            .unique_key(unique_key)
            .ok_or_else(|| Error::index_not_found(self.schema.name(), unique_key))?;
        Ok(self.read(|st| {
            st.unique[slot]
                .get(key)
                .and_then(|pk| st.rows.get(pk))
                .map(|row| row.current().clone())
        }))
    }

    /// Returns whether a row with the given primary key exists.
    pub fn contains(&self, key: &Key) -> bool {
        self.read(|st| st.rows.contains_key(key))
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.read(|st| st.rows.len())
    }

    /// Returns whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a row observer. Observers run in registration order.
    pub fn register_observer(&self, observer: Arc<dyn RowObserver>) {
        self.observers.lock().push(observer);
    }

    /// Delivers a row change to all observers. Observer errors are logged
    /// and do not propagate.
    pub(crate) fn notify(&self, action: DataAction, key: &Key, row: &Snapshot) {
        let observers = self.observers.lock().clone();
        for observer in observers {
            if let Err(err) = observer.on_row_changed(action, self.schema.name(), key, row) {
                tracing::warn!(
                    table = self.schema.name(),
                    error = %err,
                    "row observer failed"
                );
            }
        }
    }
}
