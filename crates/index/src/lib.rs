//! Tabula Index - Key index implementations for the Tabula data model.
//!
//! This crate provides the two index shapes the data model maintains:
//!
//! - `UniqueKeyIndex`: maps each key to exactly one row reference
//! - `ForeignKeyIndex`: maps a parent key to the ordered set of child row
//!   references pointing at it
//!
//! Both are point-lookup hash indexes; neither supports range queries.
//!
//! # Example
//!
//! ```rust
//! use tabula_core::Key;
//! use tabula_index::{ForeignKeyIndex, UniqueKeyIndex};
//!
//! let mut unique: UniqueKeyIndex<u64> = UniqueKeyIndex::new("pk_country");
//! unique.insert(Key::from("US"), 1).unwrap();
//! assert_eq!(unique.get(&Key::from("US")), Some(&1));
//! assert!(unique.insert(Key::from("US"), 2).is_err());
//!
//! let mut children: ForeignKeyIndex<u64> = ForeignKeyIndex::new("fk_province_country");
//! children.add_child(Key::from("US"), 10);
//! children.add_child(Key::from("US"), 11);
//! assert_eq!(children.children(&Key::from("US")), &[10, 11]);
//! assert_eq!(children.children(&Key::from("FR")), &[] as &[u64]);
//! ```

mod foreign;
mod unique;

pub use foreign::ForeignKeyIndex;
pub use unique::UniqueKeyIndex;

use tabula_core::Key;
use thiserror::Error;

/// Errors raised by index mutation.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A unique index already holds the candidate key.
    #[error("duplicate key in index {index}: {key:?}")]
    DuplicateKey { index: String, key: Key },
}
