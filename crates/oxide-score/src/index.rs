//! Table indices.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::{ErrorKind, Result, ScoreError};
use crate::identifier::check_identifier;
use crate::table::Table;

/// An index on one table of the same grain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    grain: String,
    name: String,
    table: String,
    columns: Vec<String>,
}

impl Index {
    /// Creates an index on `columns` of `table`.
    ///
    /// BLOB and unbounded text columns cannot be indexed. Nullable columns are
    /// accepted with a warning.
    pub fn new(table: &Table, name: &str, columns: &[String]) -> Result<Self> {
        let grain = table.grain();
        check_identifier(grain, name)?;
        let fail = |kind, message: String| ScoreError::element(kind, grain, name, message);

        if columns.is_empty() {
            return Err(fail(
                ErrorKind::IllegalKey,
                format!("Index '{name}' must have at least one column."),
            ));
        }
        for (i, column_name) in columns.iter().enumerate() {
            let column = table.column(column_name).ok_or_else(|| {
                fail(
                    ErrorKind::Unresolved,
                    format!(
                        "Column '{column_name}' is not defined in table '{}'.",
                        table.name()
                    ),
                )
            })?;
            if !column.ty.is_indexable() {
                return Err(fail(
                    ErrorKind::IllegalKey,
                    format!(
                        "Column {column_name} is of {} type and therefore cannot be a part of an index.",
                        column.ty
                    ),
                ));
            }
            if columns[..i].contains(column_name) {
                return Err(fail(
                    ErrorKind::DuplicateName,
                    format!("Column '{column_name}' is already defined in index '{name}'."),
                ));
            }
            if column.nullable {
                warn!(
                    grain = %grain,
                    index = %name,
                    column = %column_name,
                    "Index contains a nullable column"
                );
            }
        }

        Ok(Self {
            grain: grain.to_string(),
            name: name.to_string(),
            table: table.name().to_string(),
            columns: columns.to_vec(),
        })
    }

    /// Checks the index against the table's primary key and the other indices of the grain.
    ///
    /// An index repeating the primary key (same columns, same order) is rejected,
    /// as is one with the same column set as another index on the same table.
    pub fn finalize_index<'a>(
        &self,
        table: &Table,
        others: impl IntoIterator<Item = &'a Self>,
    ) -> Result<()> {
        if self.columns == table.primary_key() {
            return Err(ScoreError::element(
                ErrorKind::IllegalKey,
                &self.grain,
                &self.name,
                format!(
                    "Primary key with same columns and order already exists in table '{}'.",
                    self.table
                ),
            ));
        }
        let own: BTreeSet<&String> = self.columns.iter().collect();
        for other in others {
            if other.name == self.name
                || other.table != self.table
                || other.columns.len() != self.columns.len()
            {
                continue;
            }
            if other.columns.iter().collect::<BTreeSet<_>>() == own {
                return Err(ScoreError::element(
                    ErrorKind::DuplicateName,
                    &self.grain,
                    &self.name,
                    format!(
                        "Index '{}' on table '{}' duplicates index '{}'.",
                        self.name, self.table, other.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning grain name.
    #[must_use]
    pub fn grain(&self) -> &str {
        &self.grain
    }

    /// Returns the indexed table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the indexed columns in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}
