//! Table schema definition and builder.

use super::column::Column;
use super::keys::{ForeignKeyDef, UniqueKeyDef};
use crate::error::{Error, Result};
use crate::types::DataType;

/// An immutable table schema: columns, a mandatory primary key, secondary
/// unique keys, outbound foreign keys, and the row version column.
#[derive(Clone, Debug)]
pub struct TableSchema {
    /// Table name.
    name: String,
    /// Column definitions in declaration order.
    columns: Vec<Column>,
    /// The primary key.
    primary_key: UniqueKeyDef,
    /// Secondary unique keys (not including the primary key).
    unique_keys: Vec<UniqueKeyDef>,
    /// Foreign keys declared on this table (child side).
    foreign_keys: Vec<ForeignKeyDef>,
    /// Position of the row version column.
    row_version: usize,
}

impl TableSchema {
    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Gets a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a column position by name.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Returns the primary key.
    #[inline]
    pub fn primary_key(&self) -> &UniqueKeyDef {
        &self.primary_key
    }

    /// Returns the secondary unique keys.
    #[inline]
    pub fn unique_keys(&self) -> &[UniqueKeyDef] {
        &self.unique_keys
    }

    /// Gets a secondary unique key and its slot by name.
    pub fn unique_key(&self, name: &str) -> Option<(usize, &UniqueKeyDef)> {
        self.unique_keys
            .iter()
            .enumerate()
            .find(|(_, uk)| uk.name() == name)
    }

    /// Returns the foreign keys declared on this table.
    #[inline]
    pub fn foreign_keys(&self) -> &[ForeignKeyDef] {
        &self.foreign_keys
    }

    /// Gets a foreign key by name.
    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKeyDef> {
        self.foreign_keys.iter().find(|fk| fk.name() == name)
    }

    /// Returns the position of the row version column.
    #[inline]
    pub fn row_version_position(&self) -> usize {
        self.row_version
    }
}

/// Builder for table schemas.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    pk_columns: Vec<String>,
    unique_keys: Vec<UniqueKeyDef>,
    foreign_keys: Vec<ForeignKeyDef>,
    row_version: Option<String>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            pk_columns: Vec::new(),
            unique_keys: Vec::new(),
            foreign_keys: Vec::new(),
            row_version: None,
        })
    }

    /// Adds a column to the table.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        if self.columns.iter().any(|c| c.name() == name) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                name
            )));
        }
        self.columns.push(Column::new(name, data_type));
        Ok(self)
    }

    /// Marks columns as nullable.
    pub fn nullable(mut self, columns: &[&str]) -> Self {
        for name in columns {
            if let Some(col) = self.columns.iter_mut().find(|c| c.name() == *name) {
                *col = col.clone().nullable(true);
            }
        }
        self
    }

    /// Designates an Int64 column as the row version column.
    pub fn row_version(mut self, column: &str) -> Result<Self> {
        let col = self
            .columns
            .iter()
            .find(|c| c.name() == column)
            .ok_or_else(|| Error::invalid_schema(format!("Column not found: {}", column)))?;
        if col.data_type() != DataType::Int64 {
            return Err(Error::invalid_schema(format!(
                "Row version column must be Int64: {}",
                column
            )));
        }
        self.row_version = Some(column.to_string());
        Ok(self)
    }

    /// Sets the primary key.
    pub fn primary_key(mut self, columns: &[&str]) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::invalid_schema("Primary key needs at least one column"));
        }
        self.check_key_columns(columns)?;
        self.pk_columns = columns.iter().map(|c| c.to_string()).collect();
        Ok(self)
    }

    /// Adds a secondary unique key.
    pub fn unique_key(mut self, name: impl Into<String>, columns: &[&str]) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        if self.unique_keys.iter().any(|uk| uk.name() == name) {
            return Err(Error::invalid_schema(format!(
                "Key already exists: {}",
                name
            )));
        }
        let positions = self.check_key_columns(columns)?;
        self.unique_keys.push(UniqueKeyDef::new(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
            positions,
        ));
        Ok(self)
    }

    /// Adds a foreign key referencing a unique key of a parent table.
    ///
    /// `parent_key` of `None` references the parent's primary key. Resolution
    /// against the parent schema happens when the data model is built; only
    /// the child side is validated here.
    pub fn foreign_key(
        mut self,
        name: impl Into<String>,
        columns: &[&str],
        parent_table: &str,
        parent_key: Option<&str>,
    ) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        if self.foreign_keys.iter().any(|fk| fk.name() == name) {
            return Err(Error::invalid_schema(format!(
                "Key already exists: {}",
                name
            )));
        }
        let positions = self.check_key_columns(columns)?;
        self.foreign_keys.push(ForeignKeyDef::new(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
            positions,
            parent_table.to_string(),
            parent_key.map(|k| k.to_string()),
        ));
        Ok(self)
    }

    /// Resolves key column names to positions, rejecting unknown or
    /// non-indexable columns.
    fn check_key_columns(&self, columns: &[&str]) -> Result<Vec<usize>> {
        let mut positions = Vec::with_capacity(columns.len());
        for name in columns {
            let pos = self
                .columns
                .iter()
                .position(|c| c.name() == *name)
                .ok_or_else(|| Error::invalid_schema(format!("Column not found: {}", name)))?;
            if !self.columns[pos].is_indexable() {
                return Err(Error::invalid_schema(format!(
                    "Column is not indexable: {}",
                    name
                )));
            }
            positions.push(pos);
        }
        Ok(positions)
    }

    /// Builds the table schema.
    pub fn build(self) -> Result<TableSchema> {
        if self.pk_columns.is_empty() {
            return Err(Error::invalid_schema(format!(
                "Table has no primary key: {}",
                self.name
            )));
        }
        let rv_name = self.row_version.ok_or_else(|| {
            Error::invalid_schema(format!("Table has no row version column: {}", self.name))
        })?;

        let columns: Vec<Column> = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let is_rv = c.name() == rv_name;
                c.row_version(is_rv).with_position(i)
            })
            .collect();

        let rv_position = columns
            .iter()
            .position(Column::is_row_version)
            .unwrap_or(0);

        // Primary key columns must not be nullable or the version column.
        let mut pk_positions = Vec::with_capacity(self.pk_columns.len());
        for name in &self.pk_columns {
            let pos = columns
                .iter()
                .position(|c| c.name() == *name)
                .unwrap_or(0);
            if columns[pos].is_nullable() {
                return Err(Error::invalid_schema(format!(
                    "Primary key column cannot be nullable: {}",
                    name
                )));
            }
            if pos == rv_position {
                return Err(Error::invalid_schema(
                    "Row version column cannot be part of the primary key",
                ));
            }
            pk_positions.push(pos);
        }
        let pk_name = format!("pk_{}", self.name);
        let primary_key = UniqueKeyDef::new(pk_name, self.pk_columns, pk_positions);

        for uk in &self.unique_keys {
            if uk.positions().contains(&rv_position) {
                return Err(Error::invalid_schema(format!(
                    "Row version column cannot be part of key: {}",
                    uk.name()
                )));
            }
        }
        for fk in &self.foreign_keys {
            if fk.positions().contains(&rv_position) {
                return Err(Error::invalid_schema(format!(
                    "Row version column cannot be part of key: {}",
                    fk.name()
                )));
            }
        }

        Ok(TableSchema {
            name: self.name,
            columns,
            primary_key,
            unique_keys: self.unique_keys,
            foreign_keys: self.foreign_keys,
            row_version: rv_position,
        })
    }
}

/// Validates a table, column, or key name.
fn check_naming_rules(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_schema("Name cannot be empty"));
    }
    let first = name.chars().next().unwrap_or('0');
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::invalid_schema(format!(
            "Name must start with letter or underscore: {}",
            name
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::invalid_schema(format!(
            "Name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use crate::value::Value;

    fn country() -> TableSchema {
        TableBuilder::new("country")
            .unwrap()
            .add_column("country_id", DataType::String)
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .add_column("row_version", DataType::Int64)
            .unwrap()
            .row_version("row_version")
            .unwrap()
            .primary_key(&["country_id"])
            .unwrap()
            .unique_key("uk_country_name", &["name"])
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_table_builder() {
        let schema = country();
        assert_eq!(schema.name(), "country");
        assert_eq!(schema.columns().len(), 3);
        assert_eq!(schema.primary_key().name(), "pk_country");
        assert_eq!(schema.unique_keys().len(), 1);
        assert_eq!(schema.row_version_position(), 2);
    }

    #[test]
    fn test_primary_key_extract() {
        let schema = country();
        let key = schema.primary_key().extract(&[
            Value::String("US".into()),
            Value::String("United States".into()),
            Value::Int64(1),
        ]);
        assert_eq!(key, Key::from("US"));
    }

    #[test]
    fn test_missing_primary_key() {
        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("row_version", DataType::Int64)
            .unwrap()
            .row_version("row_version")
            .unwrap()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_row_version() {
        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .primary_key(&["id"])
            .unwrap()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_row_version_must_be_int64() {
        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("row_version", DataType::Int32)
            .unwrap()
            .row_version("row_version");
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_column() {
        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("id", DataType::Int64);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_column_name() {
        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("123invalid", DataType::Int32);
        assert!(result.is_err());
    }

    #[test]
    fn test_key_on_unknown_column() {
        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .unique_key("uk_missing", &["missing"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_foreign_key_child_side() {
        let schema = TableBuilder::new("province")
            .unwrap()
            .add_column("province_id", DataType::String)
            .unwrap()
            .add_column("country_id", DataType::String)
            .unwrap()
            .add_column("row_version", DataType::Int64)
            .unwrap()
            .row_version("row_version")
            .unwrap()
            .primary_key(&["province_id"])
            .unwrap()
            .foreign_key("fk_province_country", &["country_id"], "country", None)
            .unwrap()
            .build()
            .unwrap();

        let fk = schema.foreign_key("fk_province_country").unwrap();
        assert_eq!(fk.parent_table(), "country");
        assert_eq!(fk.parent_key(), None);
        assert_eq!(fk.positions(), &[1]);
    }

    #[test]
    fn test_nullable_primary_key_rejected() {
        let result = TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("row_version", DataType::Int64)
            .unwrap()
            .nullable(&["id"])
            .row_version("row_version")
            .unwrap()
            .primary_key(&["id"])
            .unwrap()
            .build();
        assert!(result.is_err());
    }
}
