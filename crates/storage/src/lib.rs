//! In-memory transactional storage for tabula.
//!
//! A [`DataModel`] holds a set of schema-wired [`Table`]s. Rows are versioned:
//! every committed change allocates a monotonically increasing version that is
//! stamped into the row's version column. Mutations run inside explicit
//! transactions with a two phase commit protocol and produce a sparse change
//! log suitable for persistence or replication.
//!
//! ```
//! use tabula_core::schema::TableBuilder;
//! use tabula_core::{DataType, Key, Value};
//! use tabula_storage::DataModel;
//!
//! let schema = TableBuilder::new("country")?
//!     .add_column("country_id", DataType::String)?
//!     .add_column("name", DataType::String)?
//!     .add_column("row_version", DataType::Int64)?
//!     .row_version("row_version")?
//!     .primary_key(&["country_id"])?
//!     .build()?;
//!
//! let model = DataModel::builder().add_table(schema).build()?;
//!
//! let txn = model.begin();
//! model.insert(&txn, "country", vec![
//!     Value::String("US".into()),
//!     Value::String("United States".into()),
//!     Value::Int64(0),
//! ])?;
//! model.prepare(&txn)?;
//! let log = model.commit(txn)?;
//! assert_eq!(log.len(), 1);
//!
//! let row = model.find("country", &Key::from("US"))?.unwrap();
//! assert_eq!(row.get(1), Some(&Value::String("United States".into())));
//! # Ok::<(), tabula_core::Error>(())
//! ```

mod data_model;
mod lock;
mod log;
mod observer;
mod row;
mod table;
mod transaction;

pub use data_model::{DataModel, DataModelBuilder};
pub use lock::{ReadGuard, TableLock, WriteGuard};
pub use log::{LogEntry, RecordState};
pub use observer::{DataAction, RowObserver};
pub use row::{Row, RowState, Snapshot};
pub use table::Table;
pub use transaction::{TransactionContext, TxnId, TxnStatus};
