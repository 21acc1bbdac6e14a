//! Unique and foreign key definitions.

use crate::key::Key;
use crate::value::Value;

/// A unique key over one or more columns of a table.
///
/// Column positions are resolved when the key is declared, so key extraction
/// from a row is a plain positional gather.
#[derive(Clone, Debug)]
pub struct UniqueKeyDef {
    name: String,
    columns: Vec<String>,
    positions: Vec<usize>,
}

impl UniqueKeyDef {
    pub(crate) fn new(name: String, columns: Vec<String>, positions: Vec<usize>) -> Self {
        Self {
            name,
            columns,
            positions,
        }
    }

    /// Returns the key name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key columns in declaration order.
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the resolved column positions.
    #[inline]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Extracts this key from a full row value slice.
    pub fn extract(&self, values: &[Value]) -> Key {
        Key::from_values(
            self.positions
                .iter()
                .map(|&p| values.get(p).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

/// A foreign key declared on a child table, referencing a unique key of a
/// parent table.
///
/// `parent_key` of `None` references the parent's primary key.
#[derive(Clone, Debug)]
pub struct ForeignKeyDef {
    name: String,
    columns: Vec<String>,
    positions: Vec<usize>,
    parent_table: String,
    parent_key: Option<String>,
}

impl ForeignKeyDef {
    pub(crate) fn new(
        name: String,
        columns: Vec<String>,
        positions: Vec<usize>,
        parent_table: String,
        parent_key: Option<String>,
    ) -> Self {
        Self {
            name,
            columns,
            positions,
            parent_table,
            parent_key,
        }
    }

    /// Returns the constraint name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the child columns in declaration order.
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the resolved child column positions.
    #[inline]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Returns the referenced parent table name.
    #[inline]
    pub fn parent_table(&self) -> &str {
        &self.parent_table
    }

    /// Returns the referenced parent unique key, or None for the primary key.
    #[inline]
    pub fn parent_key(&self) -> Option<&str> {
        self.parent_key.as_deref()
    }

    /// Extracts the referencing key from a child row value slice.
    pub fn extract(&self, values: &[Value]) -> Key {
        Key::from_values(
            self.positions
                .iter()
                .map(|&p| values.get(p).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}
