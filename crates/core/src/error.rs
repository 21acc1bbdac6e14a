//! Error types for the Tabula data model.

use crate::key::Key;
use crate::types::DataType;
use thiserror::Error;

/// Result type alias for data model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for data model operations.
///
/// A missing row is not an error: `find` returns `Option`. These variants
/// cover constraint violations, schema problems, and protocol misuse.
#[derive(Debug, Error)]
pub enum Error {
    /// A unique key index already holds the candidate key.
    #[error("duplicate key in index {index}: {key:?}")]
    DuplicateKey { index: String, key: Key },

    /// A foreign key check failed: missing parent, or a delete/update would
    /// orphan children.
    #[error("referential integrity violation ({constraint}): {message}")]
    ReferentialIntegrity { constraint: String, message: String },

    /// Two transactions tried to edit the same row.
    #[error("row in table {table} is already being edited: {key:?}")]
    ConcurrentEdit { table: String, key: Key },

    /// Type mismatch between a column and an assigned value.
    #[error("type mismatch on column {column}: expected {expected:?}, got {got:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        got: Option<DataType>,
    },

    /// Null assigned to a non-nullable column.
    #[error("null constraint violation on column: {column}")]
    NullConstraint { column: String },

    /// Invalid schema definition.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// Table not found.
    #[error("table not found: {name}")]
    TableNotFound { name: String },

    /// Column not found.
    #[error("column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    /// Named unique or foreign key not found on a table.
    #[error("key {index} not defined on table {table}")]
    IndexNotFound { table: String, index: String },

    /// Operation invoked out of protocol order.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a duplicate key error.
    pub fn duplicate_key(index: impl Into<String>, key: Key) -> Self {
        Error::DuplicateKey {
            index: index.into(),
            key,
        }
    }

    /// Creates a referential integrity error.
    pub fn referential_integrity(
        constraint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::ReferentialIntegrity {
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    /// Creates a concurrent edit error.
    pub fn concurrent_edit(table: impl Into<String>, key: Key) -> Self {
        Error::ConcurrentEdit {
            table: table.into(),
            key,
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: DataType,
        got: Option<DataType>,
    ) -> Self {
        Error::TypeMismatch {
            column: column.into(),
            expected,
            got,
        }
    }

    /// Creates a null constraint error.
    pub fn null_constraint(column: impl Into<String>) -> Self {
        Error::NullConstraint {
            column: column.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an index not found error.
    pub fn index_not_found(table: impl Into<String>, index: impl Into<String>) -> Self {
        Error::IndexNotFound {
            table: table.into(),
            index: index.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_error_display() {
        let err = Error::duplicate_key("pk_country", Key::from("US"));
        assert!(err.to_string().contains("pk_country"));

        let err = Error::null_constraint("name");
        assert!(err.to_string().contains("name"));

        let err = Error::table_not_found("province");
        assert!(err.to_string().contains("province"));
    }

    #[test]
    fn test_error_constructors() {
        let err = Error::concurrent_edit("country", Key::Scalar(Value::String("US".into())));
        match err {
            Error::ConcurrentEdit { table, .. } => assert_eq!(table, "country"),
            _ => panic!("Wrong error type"),
        }
    }
}
