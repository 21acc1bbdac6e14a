//! Schema module for the Tabula data model.
//!
//! Contains column definitions, unique and foreign key definitions, and the
//! table schema builder.

mod column;
mod keys;
mod table;

pub use column::Column;
pub use keys::{ForeignKeyDef, UniqueKeyDef};
pub use table::{TableBuilder, TableSchema};
