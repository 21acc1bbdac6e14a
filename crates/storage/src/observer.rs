//! Row change notification.

use crate::row::Snapshot;
use tabula_core::{Key, Result};

/// The kind of change an observer is told about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataAction {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted; the snapshot is the last committed view.
    Delete,
}

/// A capability for reacting to row changes.
///
/// Observers are composed as a list per table and invoked in registration
/// order after the change is applied. Rolling a transaction back emits the
/// compensating event for each undone change, so an observer that replays
/// the stream converges with the model. An observer error is reported
/// through the log and never unwinds into the mutation that triggered it.
pub trait RowObserver: Send + Sync {
    /// Called after a row change is applied.
    fn on_row_changed(
        &self,
        action: DataAction,
        table: &str,
        key: &Key,
        row: &Snapshot,
    ) -> Result<()>;
}
