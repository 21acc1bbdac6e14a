//! The data model: schema-wired tables plus transaction coordination.
//!
//! All mutation flows through explicit transaction contexts. Each operation
//! takes the locks of the tables it touches internally; an operation on a
//! child table may additionally take its parent tables' locks to maintain
//! the foreign key indices. Lock ordering across tables is the caller's
//! responsibility when transactions span tables in both directions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tabula_core::schema::{Column, TableSchema};
use tabula_core::{Error, Key, Result, Value};
use tabula_index::ForeignKeyIndex;

use crate::log::{LogEntry, RecordState};
use crate::observer::{DataAction, RowObserver};
use crate::row::{Row, Snapshot};
use crate::table::{ChildIndex, OutboundFk, Table, TableState};
use crate::transaction::{TransactionContext, TxnId, TxnState, TxnStatus, UndoAction};

/// Builder wiring table schemas into a data model.
pub struct DataModelBuilder {
    schemas: Vec<TableSchema>,
}

impl DataModelBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            schemas: Vec::new(),
        }
    }

    /// Adds a table. Declaration order fixes each table's index.
    pub fn add_table(mut self, schema: TableSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Resolves foreign keys across tables and builds the model.
    pub fn build(self) -> Result<DataModel> {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for (i, schema) in self.schemas.iter().enumerate() {
            if by_name.insert(schema.name().to_string(), i).is_some() {
                return Err(Error::invalid_schema(format!(
                    "Duplicate table: {}",
                    schema.name()
                )));
            }
        }

        let mut tables: Vec<Table> = self
            .schemas
            .into_iter()
            .enumerate()
            .map(|(i, s)| Table::new(s, i))
            .collect();

        for ci in 0..tables.len() {
            let fks = tables[ci].schema().foreign_keys().to_vec();
            for (slot, fk) in fks.iter().enumerate() {
                let pi = *by_name.get(fk.parent_table()).ok_or_else(|| {
                    Error::invalid_schema(format!(
                        "Foreign key {} references unknown table {}",
                        fk.name(),
                        fk.parent_table()
                    ))
                })?;

                let (parent_positions, parent_key_slot) = {
                    let parent_schema = tables[pi].schema();
                    match fk.parent_key() {
                        None => (parent_schema.primary_key().positions().to_vec(), None),
                        Some(name) if name == parent_schema.primary_key().name() => {
                            (parent_schema.primary_key().positions().to_vec(), None)
                        }
                        Some(name) => {
                            let (uslot, uk) =
                                parent_schema.unique_key(name).ok_or_else(|| {
                                    Error::invalid_schema(format!(
                                        "Foreign key {} references unknown key {} on table {}",
                                        fk.name(),
                                        name,
                                        fk.parent_table()
                                    ))
                                })?;
                            (uk.positions().to_vec(), Some(uslot))
                        }
                    }
                };

                if parent_positions.len() != fk.positions().len() {
                    return Err(Error::invalid_schema(format!(
                        "Foreign key {} arity mismatch",
                        fk.name()
                    )));
                }
                for (cp, pp) in fk.positions().iter().zip(parent_positions.iter()) {
                    let child_dt = tables[ci].schema().columns()[*cp].data_type();
                    let parent_dt = tables[pi].schema().columns()[*pp].data_type();
                    if child_dt != parent_dt {
                        return Err(Error::invalid_schema(format!(
                            "Foreign key {} column type mismatch",
                            fk.name()
                        )));
                    }
                }

                let inbound_slot = tables[pi].push_inbound(ChildIndex {
                    name: fk.name().to_string(),
                    child_table: ci,
                    parent_positions,
                    index: ForeignKeyIndex::new(fk.name()),
                });
                tables[ci].push_outbound(OutboundFk {
                    fk_slot: slot,
                    parent_table: pi,
                    inbound_slot,
                    parent_key_slot,
                });
            }
        }

        Ok(DataModel {
            tables: tables.into_iter().map(Arc::new).collect(),
            by_name,
            txns: Mutex::new(HashMap::new()),
            next_txn: AtomicU64::new(0),
            next_version: AtomicU64::new(0),
        })
    }
}

impl Default for DataModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory transactional data model.
pub struct DataModel {
    tables: Vec<Arc<Table>>,
    by_name: HashMap<String, usize>,
    txns: Mutex<HashMap<TxnId, TxnState>>,
    next_txn: AtomicU64,
    next_version: AtomicU64,
}

impl DataModel {
    /// Returns a builder.
    pub fn builder() -> DataModelBuilder {
        DataModelBuilder::new()
    }

    /// Returns a table by name.
    pub fn table(&self, name: &str) -> Option<&Arc<Table>> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    /// Returns the number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Returns the last allocated row version.
    pub fn version(&self) -> u64 {
        self.next_version.load(Ordering::SeqCst)
    }

    /// Registers an observer on every table.
    pub fn register_observer(&self, observer: Arc<dyn RowObserver>) {
        for table in &self.tables {
            table.register_observer(Arc::clone(&observer));
        }
    }

    /// Starts a transaction.
    pub fn begin(&self) -> TransactionContext {
        let id = self.next_txn.fetch_add(1, Ordering::SeqCst) + 1;
        self.txns.lock().insert(id, TxnState::new());
        tracing::debug!(txn = id, "transaction started");
        TransactionContext::new(id)
    }

    /// Looks up the committed snapshot of a row by primary key.
    pub fn find(&self, table: &str, key: &Key) -> Result<Option<Snapshot>> {
        let ti = self.table_index(table)?;
        Ok(self.tables[ti].find(key))
    }

    /// Looks up a row through a named unique key.
    pub fn find_by(&self, table: &str, unique_key: &str, key: &Key) -> Result<Option<Snapshot>> {
        let ti = self.table_index(table)?;
        self.tables[ti].find_by(unique_key, key)
    }

    /// Returns the committed snapshots of the children referencing a parent
    /// key through a named foreign key, in insertion order.
    pub fn children_of(&self, table: &str, foreign_key: &str, parent: &Key) -> Result<Vec<Snapshot>> {
        let ti = self.table_index(table)?;
        let t = &self.tables[ti];
        let (child_table, child_keys) = t.read(|st| {
            let ci = st
                .inbound
                .iter()
                .find(|c| c.name == foreign_key)
                .ok_or_else(|| Error::index_not_found(table, foreign_key))?;
            Ok::<_, Error>((ci.child_table, ci.index.children(parent).to_vec()))
        })?;
        let child = &self.tables[child_table];
        Ok(child.read(|st| {
            child_keys
                .iter()
                .filter_map(|k| st.rows.get(k))
                .map(|row| row.current().clone())
                .collect()
        }))
    }

    /// Inserts a row. The row version column is stamped by the model; the
    /// caller's value for it is ignored.
    pub fn insert(&self, txn: &TransactionContext, table: &str, mut values: Vec<Value>) -> Result<()> {
        self.check_open(txn.id())?;
        let ti = self.table_index(table)?;
        let t = &self.tables[ti];
        let schema = t.schema();

        if values.len() != schema.columns().len() {
            return Err(Error::invalid_operation(format!(
                "table {} has {} columns, got {} values",
                table,
                schema.columns().len(),
                values.len()
            )));
        }
        for (col, value) in schema.columns().iter().zip(values.iter()) {
            if col.is_row_version() {
                continue;
            }
            check_field(col, value)?;
        }

        let version = self.allocate_version();
        values[schema.row_version_position()] = Value::Int64(version as i64);
        let snapshot = Snapshot::new(values);
        let pk = schema.primary_key().extract(snapshot.values());

        let entry = t.write(|st| -> Result<LogEntry> {
            if st.rows.contains_key(&pk) {
                return Err(Error::duplicate_key(schema.primary_key().name(), pk.clone()));
            }
            for (slot, uk) in schema.unique_keys().iter().enumerate() {
                let key = uk.extract(snapshot.values());
                if st.unique[slot].contains_key(&key) {
                    return Err(Error::duplicate_key(uk.name(), key));
                }
            }
            self.link_parents(ti, st, snapshot.values(), &pk)?;
            for (slot, uk) in schema.unique_keys().iter().enumerate() {
                let _ = st.unique[slot].insert(uk.extract(snapshot.values()), pk.clone());
            }
            st.rows.insert(pk.clone(), Row::new(snapshot.clone(), version));

            let changes = snapshot.values().iter().cloned().enumerate().collect();
            Ok(LogEntry::new(
                ti,
                RecordState::Added,
                pk.values().to_vec(),
                changes,
            ))
        })?;

        self.with_txn(txn.id(), |state| {
            state.record_insert(ti, &pk);
            state.log.push(entry);
        })?;
        tracing::trace!(table, txn = txn.id(), "row inserted");
        t.notify(DataAction::Insert, &pk, &snapshot);
        Ok(())
    }

    /// Opens an edit on a row. The working copy stays invisible to readers
    /// until `commit_update`.
    pub fn begin_edit(&self, txn: &TransactionContext, table: &str, key: &Key) -> Result<()> {
        self.check_open(txn.id())?;
        let ti = self.table_index(table)?;
        let t = &self.tables[ti];

        t.write(|st| {
            let row = st
                .rows
                .get_mut(key)
                .ok_or_else(|| no_such_row(table, key))?;
            match row.editing() {
                // An open edit rejects a second one even from the same
                // transaction; edits never merge.
                Some(_) => Err(Error::concurrent_edit(table, key.clone())),
                None => {
                    row.begin_edit(txn.id());
                    Ok(())
                }
            }
        })?;

        self.with_txn(txn.id(), |state| state.enlist_edit(ti, key))?;
        Ok(())
    }

    /// Writes a field of a row's open working copy.
    pub fn set_field(
        &self,
        txn: &TransactionContext,
        table: &str,
        key: &Key,
        column: &str,
        value: Value,
    ) -> Result<()> {
        self.check_open(txn.id())?;
        let ti = self.table_index(table)?;
        let t = &self.tables[ti];
        let schema = t.schema();

        let col = schema
            .column(column)
            .ok_or_else(|| Error::column_not_found(table, column))?;
        if col.is_row_version() {
            return Err(Error::invalid_operation(
                "row version column is managed by the data model",
            ));
        }
        check_field(col, &value)?;
        let position = col.position();

        t.write(|st| {
            let row = st
                .rows
                .get_mut(key)
                .ok_or_else(|| no_such_row(table, key))?;
            match row.editing() {
                Some(holder) if holder == txn.id() => {
                    row.set(position, value);
                    Ok(())
                }
                Some(_) => Err(Error::concurrent_edit(table, key.clone())),
                None => Err(Error::invalid_operation("no open edit for this row")),
            }
        })
    }

    /// Commits an open edit: validates key moves, makes the working copy the
    /// committed view, stamps a fresh version, and logs the sparse diff.
    pub fn commit_update(&self, txn: &TransactionContext, table: &str, key: &Key) -> Result<()> {
        self.check_open(txn.id())?;
        let ti = self.table_index(table)?;
        let t = &self.tables[ti];
        let schema = t.schema();
        let version = self.allocate_version();

        let (entry, pre, pre_version, new_pk, committed, pk_changed) =
            t.write(|st| -> Result<(LogEntry, Snapshot, u64, Key, Snapshot, bool)> {
                let row = st
                    .rows
                    .get_mut(key)
                    .ok_or_else(|| no_such_row(table, key))?;
                match row.editing() {
                    Some(holder) if holder == txn.id() => {}
                    Some(_) => return Err(Error::concurrent_edit(table, key.clone())),
                    None => {
                        return Err(Error::invalid_operation("no open edit for this row"))
                    }
                }
                row.set(schema.row_version_position(), Value::Int64(version as i64));

                let pre = row.current().clone();
                let pre_version = row.version();
                let working = row
                    .working()
                    .cloned()
                    .ok_or_else(|| Error::invalid_operation("no open edit for this row"))?;
                let changes = row.diff();

                let new_pk = schema.primary_key().extract(working.values());
                let pk_changed = new_pk != *key;
                if pk_changed && st.rows.contains_key(&new_pk) {
                    return Err(Error::duplicate_key(
                        schema.primary_key().name(),
                        new_pk,
                    ));
                }

                // A referenced key cannot move while children point at it.
                for ci in &st.inbound {
                    let old_k = ci.parent_key_of(pre.values());
                    let new_k = ci.parent_key_of(working.values());
                    if old_k != new_k && ci.index.has_children(&old_k) {
                        return Err(Error::referential_integrity(
                            ci.name.clone(),
                            format!("children still reference key {:?}", old_k),
                        ));
                    }
                }

                for (slot, uk) in schema.unique_keys().iter().enumerate() {
                    let old_k = uk.extract(pre.values());
                    let new_k = uk.extract(working.values());
                    if old_k != new_k && st.unique[slot].contains_key(&new_k) {
                        return Err(Error::duplicate_key(uk.name(), new_k));
                    }
                }

                for ob in t.outbound() {
                    let fk = &schema.foreign_keys()[ob.fk_slot];
                    let old_k = fk.extract(pre.values());
                    let new_k = fk.extract(working.values());
                    if new_k == old_k || new_k.has_null() {
                        continue;
                    }
                    let exists = if ob.parent_table == ti {
                        parent_exists(st, ob, &new_k)
                    } else {
                        self.tables[ob.parent_table].read(|ps| parent_exists(ps, ob, &new_k))
                    };
                    if !exists {
                        return Err(Error::referential_integrity(
                            fk.name(),
                            format!(
                                "no parent row {:?} in table {}",
                                new_k,
                                fk.parent_table()
                            ),
                        ));
                    }
                }

                // Validation passed; apply.
                if let Some(row) = st.rows.get_mut(key) {
                    row.commit_edit(version);
                }
                if pk_changed {
                    if let Some(row) = st.rows.remove(key) {
                        st.rows.insert(new_pk.clone(), row);
                    }
                }
                for (slot, uk) in schema.unique_keys().iter().enumerate() {
                    let old_k = uk.extract(pre.values());
                    let new_k = uk.extract(working.values());
                    if old_k == new_k && !pk_changed {
                        continue;
                    }
                    st.unique[slot].remove(&old_k);
                    let _ = st.unique[slot].insert(new_k, new_pk.clone());
                }
                for ob in t.outbound() {
                    let fk = &schema.foreign_keys()[ob.fk_slot];
                    let old_k = fk.extract(pre.values());
                    let new_k = fk.extract(working.values());
                    if old_k == new_k && !pk_changed {
                        continue;
                    }
                    if !old_k.has_null() {
                        self.unlink_one(ti, st, ob, &old_k, key);
                    }
                    if !new_k.has_null() {
                        self.link_one(ti, st, ob, new_k, &new_pk);
                    }
                }

                let entry = LogEntry::new(
                    ti,
                    RecordState::Modified,
                    key.values().to_vec(),
                    changes,
                );
                Ok((entry, pre, pre_version, new_pk, working, pk_changed))
            })?;

        self.with_txn(txn.id(), |state| {
            state.record_update(ti, key, pre, pre_version);
            if pk_changed {
                state.rekey(ti, key, new_pk.clone());
            }
            state.log.push(entry);
        })?;
        tracing::trace!(table, txn = txn.id(), "row updated");
        t.notify(DataAction::Update, &new_pk, &committed);
        Ok(())
    }

    /// Deletes a row. Fails while children reference it or an edit is open.
    pub fn delete(&self, txn: &TransactionContext, table: &str, key: &Key) -> Result<()> {
        self.check_open(txn.id())?;
        let ti = self.table_index(table)?;
        let t = &self.tables[ti];
        let schema = t.schema();

        let (entry, last, last_version) = t.write(|st| -> Result<(LogEntry, Snapshot, u64)> {
            let row = st.rows.get(key).ok_or_else(|| no_such_row(table, key))?;
            if row.editing().is_some() {
                return Err(Error::concurrent_edit(table, key.clone()));
            }
            let last = row.current().clone();
            let last_version = row.version();

            for ci in &st.inbound {
                let parent_key = ci.parent_key_of(last.values());
                if ci.index.has_children(&parent_key) {
                    return Err(Error::referential_integrity(
                        ci.name.clone(),
                        format!("children still reference key {:?}", parent_key),
                    ));
                }
            }

            if let Some(mut row) = st.rows.remove(key) {
                row.mark_deleted();
            }
            for (slot, uk) in schema.unique_keys().iter().enumerate() {
                st.unique[slot].remove(&uk.extract(last.values()));
            }
            self.unlink_parents(ti, st, last.values(), key);

            Ok((
                LogEntry::new(ti, RecordState::Deleted, key.values().to_vec(), Vec::new()),
                last,
                last_version,
            ))
        })?;

        self.with_txn(txn.id(), |state| {
            state.record_delete(ti, key, last.clone(), last_version);
            state.log.push(entry);
        })?;
        tracing::trace!(table, txn = txn.id(), "row deleted");
        t.notify(DataAction::Delete, key, &last);
        Ok(())
    }

    /// Appends a caller-built record to the transaction log without touching
    /// any table. Used for changes that originate outside the model but must
    /// replicate with it.
    pub fn add_transaction(&self, txn: &TransactionContext, entry: LogEntry) -> Result<()> {
        let mut txns = self.txns.lock();
        let state = txns
            .get_mut(&txn.id())
            .ok_or_else(|| Error::invalid_operation("transaction is not active"))?;
        if state.status != TxnStatus::Open {
            return Err(Error::invalid_operation("transaction is preparing"));
        }
        state.log.push(entry);
        Ok(())
    }

    /// First phase of commit: validates every enlisted row. On error the
    /// transaction stays open and must be rolled back.
    pub fn prepare(&self, txn: &TransactionContext) -> Result<()> {
        let enlisted = {
            let txns = self.txns.lock();
            let state = txns
                .get(&txn.id())
                .ok_or_else(|| Error::invalid_operation("transaction is not active"))?;
            if state.status != TxnStatus::Open {
                return Err(Error::invalid_operation("transaction is already prepared"));
            }
            state.enlisted.clone()
        };

        for e in &enlisted {
            let t = &self.tables[e.table];
            let vote = t.read(|st| -> Result<&'static str> {
                match &e.undo {
                    UndoAction::Reinsert { .. } => {
                        if st.rows.contains_key(&e.key) {
                            Err(Error::invalid_operation(
                                "deleted row reappeared before prepare",
                            ))
                        } else {
                            Ok("prepared")
                        }
                    }
                    undo => {
                        let row = st.rows.get(&e.key).ok_or_else(|| {
                            Error::invalid_operation("enlisted row missing at prepare")
                        })?;
                        if row.editing() == Some(txn.id()) {
                            return Err(Error::invalid_operation(
                                "open edit at prepare; commit or discard it first",
                            ));
                        }
                        Ok(match undo {
                            UndoAction::None => "done",
                            _ => "prepared",
                        })
                    }
                }
            })?;
            tracing::trace!(txn = txn.id(), table = e.table, vote, "prepare vote");
        }

        let mut txns = self.txns.lock();
        if let Some(state) = txns.get_mut(&txn.id()) {
            state.status = TxnStatus::Preparing;
        }
        Ok(())
    }

    /// Second phase of commit. Only valid after a successful `prepare`.
    /// Returns the drained change log for persistence or replication.
    pub fn commit(&self, txn: TransactionContext) -> Result<Vec<LogEntry>> {
        let (enlisted, log) = {
            let mut txns = self.txns.lock();
            let state = txns
                .get_mut(&txn.id())
                .ok_or_else(|| Error::invalid_operation("transaction is not active"))?;
            if state.status != TxnStatus::Preparing {
                return Err(Error::invalid_operation("commit before prepare"));
            }
            (
                std::mem::take(&mut state.enlisted),
                std::mem::take(&mut state.log),
            )
        };

        for e in &enlisted {
            self.tables[e.table].write(|st| {
                if let Some(row) = st.rows.get_mut(&e.key) {
                    row.mark_committed();
                }
            });
        }

        self.txns.lock().remove(&txn.id());
        tracing::debug!(txn = txn.id(), entries = log.len(), "transaction committed");
        Ok(log)
    }

    /// Rolls the transaction back, replaying enlistment undo actions in
    /// reverse order. Safe after a failed `prepare`; a transaction that
    /// already finished is a no-op.
    pub fn rollback(&self, txn: TransactionContext) -> Result<()> {
        let enlisted = {
            let mut txns = self.txns.lock();
            match txns.remove(&txn.id()) {
                Some(state) => state.enlisted,
                None => return Ok(()),
            }
        };

        for e in enlisted.iter().rev() {
            let ti = e.table;
            let t = &self.tables[ti];
            let schema = t.schema();
            // Each undo emits the compensating observer event so that
            // persistence and replication views converge after rollback.
            let undone = t.write(|st| match &e.undo {
                UndoAction::None => {
                    if let Some(row) = st.rows.get_mut(&e.key) {
                        if row.editing() == Some(txn.id()) {
                            row.rollback_edit();
                        }
                    }
                    None
                }
                UndoAction::Remove => st.rows.remove(&e.key).map(|row| {
                    let values = row.current().clone();
                    for (slot, uk) in schema.unique_keys().iter().enumerate() {
                        st.unique[slot].remove(&uk.extract(values.values()));
                    }
                    self.unlink_parents(ti, st, values.values(), &e.key);
                    (DataAction::Delete, e.key.clone(), values)
                }),
                UndoAction::Restore { snapshot, version } => {
                    st.rows.remove(&e.key).map(|mut row| {
                        // The transaction's own dangling edit is discarded;
                        // an edit held by another transaction survives the
                        // restore.
                        if row.editing() == Some(txn.id()) {
                            row.rollback_edit();
                        }
                        let current = row.current().clone();
                        for (slot, uk) in schema.unique_keys().iter().enumerate() {
                            st.unique[slot].remove(&uk.extract(current.values()));
                        }
                        self.unlink_parents(ti, st, current.values(), &e.key);

                        row.restore(snapshot.clone(), *version);
                        let restored_pk = schema.primary_key().extract(snapshot.values());
                        for (slot, uk) in schema.unique_keys().iter().enumerate() {
                            let _ = st.unique[slot]
                                .insert(uk.extract(snapshot.values()), restored_pk.clone());
                        }
                        self.relink_parents(ti, st, snapshot.values(), &restored_pk);
                        st.rows.insert(restored_pk.clone(), row);
                        (DataAction::Update, restored_pk, snapshot.clone())
                    })
                }
                UndoAction::Reinsert { snapshot, version } => {
                    if st.rows.contains_key(&e.key) {
                        return None;
                    }
                    let mut row = Row::new(snapshot.clone(), *version);
                    row.mark_committed();
                    st.rows.insert(e.key.clone(), row);
                    for (slot, uk) in schema.unique_keys().iter().enumerate() {
                        let _ = st.unique[slot]
                            .insert(uk.extract(snapshot.values()), e.key.clone());
                    }
                    self.relink_parents(ti, st, snapshot.values(), &e.key);
                    Some((DataAction::Insert, e.key.clone(), snapshot.clone()))
                }
            });
            if let Some((action, key, snapshot)) = undone {
                t.notify(action, &key, &snapshot);
            }
        }

        tracing::debug!(txn = txn.id(), "transaction rolled back");
        Ok(())
    }

    fn table_index(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::table_not_found(name))
    }

    fn allocate_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_open(&self, id: TxnId) -> Result<()> {
        let txns = self.txns.lock();
        match txns.get(&id) {
            Some(state) if state.status == TxnStatus::Open => Ok(()),
            Some(_) => Err(Error::invalid_operation("transaction is preparing")),
            None => Err(Error::invalid_operation("transaction is not active")),
        }
    }

    fn with_txn<R>(&self, id: TxnId, f: impl FnOnce(&mut TxnState) -> R) -> Result<R> {
        let mut txns = self.txns.lock();
        let state = txns
            .get_mut(&id)
            .ok_or_else(|| Error::invalid_operation("transaction is not active"))?;
        Ok(f(state))
    }

    /// Checks each non-null parent key of a child row and records the child's
    /// membership. On a missing parent, memberships added so far are removed
    /// again and the whole operation fails.
    fn link_parents(
        &self,
        ti: usize,
        st: &mut TableState,
        values: &[Value],
        child_pk: &Key,
    ) -> Result<()> {
        let table = &self.tables[ti];
        let schema = table.schema();
        let mut linked: Vec<(usize, Key)> = Vec::new();

        for (i, ob) in table.outbound().iter().enumerate() {
            let fk = &schema.foreign_keys()[ob.fk_slot];
            let parent_key = fk.extract(values);
            if parent_key.has_null() {
                continue;
            }
            let ok = if ob.parent_table == ti {
                if parent_exists(st, ob, &parent_key) {
                    st.inbound[ob.inbound_slot]
                        .index
                        .add_child(parent_key.clone(), child_pk.clone());
                    true
                } else {
                    false
                }
            } else {
                self.tables[ob.parent_table].write(|ps| {
                    if parent_exists(ps, ob, &parent_key) {
                        ps.inbound[ob.inbound_slot]
                            .index
                            .add_child(parent_key.clone(), child_pk.clone());
                        true
                    } else {
                        false
                    }
                })
            };
            if !ok {
                for (j, k) in &linked {
                    self.unlink_one(ti, st, &table.outbound()[*j], k, child_pk);
                }
                return Err(Error::referential_integrity(
                    fk.name(),
                    format!("no parent row {:?} in table {}", parent_key, fk.parent_table()),
                ));
            }
            linked.push((i, parent_key));
        }
        Ok(())
    }

    /// Removes a child row's memberships from all its parents' indices.
    fn unlink_parents(&self, ti: usize, st: &mut TableState, values: &[Value], child_pk: &Key) {
        let table = &self.tables[ti];
        let schema = table.schema();
        for ob in table.outbound() {
            let parent_key = schema.foreign_keys()[ob.fk_slot].extract(values);
            if parent_key.has_null() {
                continue;
            }
            self.unlink_one(ti, st, ob, &parent_key, child_pk);
        }
    }

    /// Re-adds a child row's memberships without existence checks. Used by
    /// rollback, which restores states that were valid when captured.
    fn relink_parents(&self, ti: usize, st: &mut TableState, values: &[Value], child_pk: &Key) {
        let table = &self.tables[ti];
        let schema = table.schema();
        for ob in table.outbound() {
            let parent_key = schema.foreign_keys()[ob.fk_slot].extract(values);
            if parent_key.has_null() {
                continue;
            }
            self.link_one(ti, st, ob, parent_key, child_pk);
        }
    }

    fn link_one(
        &self,
        ti: usize,
        st: &mut TableState,
        ob: &OutboundFk,
        parent_key: Key,
        child_pk: &Key,
    ) {
        if ob.parent_table == ti {
            st.inbound[ob.inbound_slot]
                .index
                .add_child(parent_key, child_pk.clone());
        } else {
            self.tables[ob.parent_table].write(|ps| {
                ps.inbound[ob.inbound_slot]
                    .index
                    .add_child(parent_key, child_pk.clone())
            });
        }
    }

    fn unlink_one(
        &self,
        ti: usize,
        st: &mut TableState,
        ob: &OutboundFk,
        parent_key: &Key,
        child_pk: &Key,
    ) {
        if ob.parent_table == ti {
            st.inbound[ob.inbound_slot]
                .index
                .remove_child(parent_key, child_pk);
        } else {
            self.tables[ob.parent_table].write(|ps| {
                ps.inbound[ob.inbound_slot]
                    .index
                    .remove_child(parent_key, child_pk)
            });
        }
    }
}

fn parent_exists(ps: &TableState, ob: &OutboundFk, key: &Key) -> bool {
    match ob.parent_key_slot {
        None => ps.rows.contains_key(key),
        Some(slot) => ps.unique[slot].contains_key(key),
    }
}

fn no_such_row(table: &str, key: &Key) -> Error {
    Error::invalid_operation(format!("no row {:?} in table {}", key, table))
}

/// Validates a value against a column's type and nullability.
fn check_field(col: &Column, value: &Value) -> Result<()> {
    match value.data_type() {
        None => {
            if !col.is_nullable() {
                return Err(Error::null_constraint(col.name()));
            }
        }
        Some(dt) => {
            if dt != col.data_type() {
                return Err(Error::type_mismatch(col.name(), col.data_type(), Some(dt)));
            }
        }
    }
    Ok(())
}
