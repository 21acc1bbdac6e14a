//! Transaction contexts and per-transaction bookkeeping.
//!
//! A transaction's footprint is two lists: the append-only change log that
//! commit hands to the caller, and the enlistments that rollback replays in
//! reverse. Each enlisted row keeps at most one undo action, fixed at the
//! first change the transaction made to it; later changes to the same row
//! merge into that action instead of stacking.

use crate::log::LogEntry;
use crate::row::Snapshot;
use tabula_core::Key;

/// Transaction identifier.
pub type TxnId = u64;

/// Lifecycle of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnStatus {
    /// Accepting mutations.
    Open,
    /// Validated by `prepare`; only commit or rollback may follow.
    Preparing,
}

/// Handle to an open transaction. Obtained from `DataModel::begin`; consumed
/// by `commit` and `rollback`, so a finished transaction cannot be reused.
#[derive(Debug)]
pub struct TransactionContext {
    id: TxnId,
}

impl TransactionContext {
    pub(crate) fn new(id: TxnId) -> Self {
        Self { id }
    }

    /// Returns the transaction id.
    #[inline]
    pub fn id(&self) -> TxnId {
        self.id
    }
}

/// What rollback must do to put an enlisted row back.
#[derive(Clone, Debug)]
pub(crate) enum UndoAction {
    /// An edit is open but nothing has been committed; discard the working
    /// copy.
    None,
    /// The row was inserted by this transaction; remove it.
    Remove,
    /// The row existed before this transaction; restore its first pre-image.
    Restore { snapshot: Snapshot, version: u64 },
    /// The row was deleted by this transaction; put it back.
    Reinsert { snapshot: Snapshot, version: u64 },
}

/// One row touched by a transaction.
#[derive(Clone, Debug)]
pub(crate) struct Enlistment {
    /// Table position in the data model.
    pub table: usize,
    /// The row's current primary key. Updated if a commit rewrites the key.
    pub key: Key,
    /// How to undo this row.
    pub undo: UndoAction,
}

/// Mutable per-transaction state held by the data model.
#[derive(Debug)]
pub(crate) struct TxnState {
    pub status: TxnStatus,
    pub log: Vec<LogEntry>,
    pub enlisted: Vec<Enlistment>,
}

impl TxnState {
    pub fn new() -> Self {
        Self {
            status: TxnStatus::Open,
            log: Vec::new(),
            enlisted: Vec::new(),
        }
    }

    fn find(&mut self, table: usize, key: &Key) -> Option<&mut Enlistment> {
        self.enlisted
            .iter_mut()
            .find(|e| e.table == table && e.key == *key)
    }

    /// Enlists a row at edit time without fixing an undo action yet. Keeps
    /// any stronger action already recorded.
    pub fn enlist_edit(&mut self, table: usize, key: &Key) {
        if self.find(table, key).is_none() {
            self.enlisted.push(Enlistment {
                table,
                key: key.clone(),
                undo: UndoAction::None,
            });
        }
    }

    /// Records an insert. Re-inserting a key this transaction deleted merges
    /// into a restore of the original image.
    pub fn record_insert(&mut self, table: usize, key: &Key) {
        if let Some(e) = self.find(table, key) {
            if let UndoAction::Reinsert { snapshot, version } = e.undo.clone() {
                e.undo = UndoAction::Restore { snapshot, version };
            }
            return;
        }
        self.enlisted.push(Enlistment {
            table,
            key: key.clone(),
            undo: UndoAction::Remove,
        });
    }

    /// Records a committed update with the row's pre-change image. Only the
    /// first update fixes the image; a row this transaction inserted stays a
    /// removal.
    pub fn record_update(&mut self, table: usize, key: &Key, pre: Snapshot, pre_version: u64) {
        match self.find(table, key) {
            Some(e) => {
                if matches!(e.undo, UndoAction::None) {
                    e.undo = UndoAction::Restore {
                        snapshot: pre,
                        version: pre_version,
                    };
                }
            }
            None => self.enlisted.push(Enlistment {
                table,
                key: key.clone(),
                undo: UndoAction::Restore {
                    snapshot: pre,
                    version: pre_version,
                },
            }),
        }
    }

    /// Records a delete with the row's last committed image. Deleting a row
    /// this transaction inserted cancels the enlistment; deleting a row it
    /// modified keeps the original image for reinsertion.
    pub fn record_delete(&mut self, table: usize, key: &Key, last: Snapshot, last_version: u64) {
        if let Some(pos) = self
            .enlisted
            .iter()
            .position(|e| e.table == table && e.key == *key)
        {
            match self.enlisted[pos].undo.clone() {
                UndoAction::Remove => {
                    self.enlisted.remove(pos);
                }
                UndoAction::Restore { snapshot, version } => {
                    self.enlisted[pos].undo = UndoAction::Reinsert { snapshot, version };
                }
                UndoAction::None | UndoAction::Reinsert { .. } => {
                    self.enlisted[pos].undo = UndoAction::Reinsert {
                        snapshot: last,
                        version: last_version,
                    };
                }
            }
            return;
        }
        self.enlisted.push(Enlistment {
            table,
            key: key.clone(),
            undo: UndoAction::Reinsert {
                snapshot: last,
                version: last_version,
            },
        });
    }

    /// Re-keys an enlistment after a commit rewrote the row's primary key.
    pub fn rekey(&mut self, table: usize, old: &Key, new: Key) {
        if let Some(e) = self.find(table, old) {
            e.key = new;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::Value;

    fn snap(v: i64) -> Snapshot {
        Snapshot::new(vec![Value::Int64(v)])
    }

    #[test]
    fn test_delete_after_insert_cancels() {
        let mut txn = TxnState::new();
        let key = Key::from(1i64);
        txn.record_insert(0, &key);
        txn.record_delete(0, &key, snap(1), 1);
        assert!(txn.enlisted.is_empty());
    }

    #[test]
    fn test_insert_after_delete_becomes_restore() {
        let mut txn = TxnState::new();
        let key = Key::from(1i64);
        txn.record_delete(0, &key, snap(1), 7);
        txn.record_insert(0, &key);

        assert_eq!(txn.enlisted.len(), 1);
        match &txn.enlisted[0].undo {
            UndoAction::Restore { version, .. } => assert_eq!(*version, 7),
            other => panic!("expected Restore, got {:?}", other),
        }
    }

    #[test]
    fn test_first_update_fixes_pre_image() {
        let mut txn = TxnState::new();
        let key = Key::from(1i64);
        txn.enlist_edit(0, &key);
        txn.record_update(0, &key, snap(10), 3);
        // A second update must not overwrite the original image
        txn.record_update(0, &key, snap(20), 4);

        match &txn.enlisted[0].undo {
            UndoAction::Restore { snapshot, version } => {
                assert_eq!(snapshot.get(0), Some(&Value::Int64(10)));
                assert_eq!(*version, 3);
            }
            other => panic!("expected Restore, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_after_update_reinserts_original() {
        let mut txn = TxnState::new();
        let key = Key::from(1i64);
        txn.record_update(0, &key, snap(10), 3);
        txn.record_delete(0, &key, snap(20), 4);

        match &txn.enlisted[0].undo {
            UndoAction::Reinsert { snapshot, version } => {
                assert_eq!(snapshot.get(0), Some(&Value::Int64(10)));
                assert_eq!(*version, 3);
            }
            other => panic!("expected Reinsert, got {:?}", other),
        }
    }

    #[test]
    fn test_update_on_inserted_row_stays_remove() {
        let mut txn = TxnState::new();
        let key = Key::from(1i64);
        txn.record_insert(0, &key);
        txn.record_update(0, &key, snap(10), 2);

        assert!(matches!(txn.enlisted[0].undo, UndoAction::Remove));
    }

    #[test]
    fn test_rekey() {
        let mut txn = TxnState::new();
        let old = Key::from(1i64);
        txn.record_update(0, &old, snap(1), 1);
        txn.rekey(0, &old, Key::from(2i64));

        assert_eq!(txn.enlisted[0].key, Key::from(2i64));
    }
}
