//! Tabula Core - Core types and schema definitions for the Tabula data model.
//!
//! This crate provides the foundational types for the Tabula in-memory
//! transactional data model:
//!
//! - `DataType`: Supported data types (Boolean, Int32, Int64, Float64, String, DateTime, Bytes)
//! - `Value`: Runtime values that can be stored in a row
//! - `Key`: An index key extracted from one or more row values
//! - `schema`: Schema definitions (Column, TableSchema, unique and foreign keys)
//! - `Error`: Error types for data model operations
//!
//! # Example
//!
//! ```rust
//! use tabula_core::{DataType, Key, Value};
//! use tabula_core::schema::TableBuilder;
//!
//! let schema = TableBuilder::new("country")
//!     .unwrap()
//!     .add_column("country_id", DataType::String)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_column("row_version", DataType::Int64)
//!     .unwrap()
//!     .row_version("row_version")
//!     .unwrap()
//!     .primary_key(&["country_id"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.name(), "country");
//! let key = Key::from_values(vec![Value::String("US".into())]);
//! assert_eq!(key.arity(), 1);
//! ```

mod error;
mod key;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use key::Key;
pub use types::DataType;
pub use value::Value;
