//! Tables and their primary keys.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::column::{Column, REC_VERSION};
use crate::error::{ErrorKind, Result, ScoreError};
use crate::foreign_key::ForeignKey;
use crate::identifier::{check_identifier, limit_name};

/// Per-table options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// Adds the `recversion` column and its maintenance trigger.
    pub with_version_check: bool,
    /// The table is never written through the data layer; it may lack a primary key.
    pub read_only: bool,
    /// The reconciliation engine keeps the table structure in sync.
    pub auto_update: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            with_version_check: true,
            read_only: false,
            auto_update: true,
        }
    }
}

/// A table declared in a grain.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    grain: String,
    name: String,
    columns: IndexMap<String, Column>,
    primary_key: Vec<String>,
    pk_name: String,
    pk_finalized: bool,
    foreign_keys: Vec<ForeignKey>,
    options: TableOptions,
}

impl Table {
    /// Creates an empty table.
    pub fn new(grain: &str, name: &str, options: TableOptions) -> Result<Self> {
        check_identifier(grain, name)?;
        if options.read_only && options.with_version_check {
            return Err(ScoreError::element(
                ErrorKind::IllegalDefinition,
                grain,
                name,
                "Options 'WITH READ ONLY' and 'WITH VERSION CHECK' are mutually exclusive.",
            ));
        }
        Ok(Self {
            grain: grain.to_string(),
            name: name.to_string(),
            columns: IndexMap::new(),
            primary_key: Vec::new(),
            pk_name: limit_name(&format!("pk_{name}")),
            pk_finalized: false,
            foreign_keys: Vec::new(),
            options,
        })
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning grain name.
    #[must_use]
    pub fn grain(&self) -> &str {
        &self.grain
    }

    /// Returns the table options.
    #[must_use]
    pub const fn options(&self) -> TableOptions {
        self.options
    }

    /// Returns whether rows carry a `recversion` column.
    #[must_use]
    pub const fn is_versioned(&self) -> bool {
        self.options.with_version_check && !self.options.read_only
    }

    /// Returns whether the reconciliation engine manages this table.
    #[must_use]
    pub const fn auto_update(&self) -> bool {
        self.options.auto_update
    }

    fn error(&self, kind: ErrorKind, message: String) -> ScoreError {
        ScoreError::element(kind, &self.grain, &self.name, message)
    }

    /// Adds a user column.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        check_identifier(&self.grain, &column.name)?;
        if column.name == REC_VERSION {
            return Err(self.error(
                ErrorKind::IllegalDefinition,
                format!("Column name '{REC_VERSION}' is reserved for system needs."),
            ));
        }
        if self.columns.contains_key(&column.name) {
            return Err(self.error(
                ErrorKind::DuplicateName,
                format!(
                    "Column '{}' is defined more than once in table '{}'.",
                    column.name, self.name
                ),
            ));
        }
        self.columns.insert(column.name.clone(), column);
        Ok(())
    }

    /// Returns a user column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Returns user columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    /// Returns the row-version column for versioned tables.
    #[must_use]
    pub fn rec_version_column(&self) -> Option<Column> {
        self.is_versioned().then(Column::rec_version)
    }

    /// Appends a column to the primary key.
    pub fn add_pk_column(&mut self, name: &str) -> Result<()> {
        if self.pk_finalized {
            return Err(self.error(
                ErrorKind::IllegalKey,
                format!("More than one PRIMARY KEY definition in table '{}'.", self.name),
            ));
        }
        self.validate_pk_column(name)?;
        if self.primary_key.iter().any(|c| c == name) {
            return Err(self.error(
                ErrorKind::DuplicateName,
                format!(
                    "Column '{name}' defined more than once for primary key in table '{}'.",
                    self.name
                ),
            ));
        }
        self.primary_key.push(name.to_string());
        Ok(())
    }

    fn validate_pk_column(&self, name: &str) -> Result<()> {
        if name == REC_VERSION {
            return Err(self.error(
                ErrorKind::IllegalKey,
                format!("Column '{name}' is not allowed for primary key."),
            ));
        }
        let column = self.columns.get(name).ok_or_else(|| {
            self.error(
                ErrorKind::Unresolved,
                format!("Column {name} is not defined in table '{}'.", self.name),
            )
        })?;
        if column.nullable {
            return Err(self.error(
                ErrorKind::IllegalKey,
                format!(
                    "Column {name} is nullable and therefore it cannot be a part of a primary key in table {}.",
                    self.name
                ),
            ));
        }
        if !column.ty.is_indexable() {
            return Err(self.error(
                ErrorKind::IllegalKey,
                format!(
                    "Column {name} is of {} type and therefore it cannot be a part of a primary key in table {}.",
                    column.ty, self.name
                ),
            ));
        }
        Ok(())
    }

    /// Overrides the default primary key constraint name.
    pub fn set_pk_name(&mut self, name: &str) -> Result<()> {
        check_identifier(&self.grain, name)?;
        self.pk_name = name.to_string();
        Ok(())
    }

    /// Completes the primary key definition. Calling it again is a no-op.
    pub fn finalize_pk(&mut self) -> Result<()> {
        if self.primary_key.is_empty() && !self.options.read_only {
            return Err(self.error(
                ErrorKind::IllegalKey,
                format!("No primary key defined for table {}!", self.name),
            ));
        }
        self.pk_finalized = true;
        Ok(())
    }

    /// Clears the primary key so that it can be declared again.
    pub fn reset_pk(&mut self) {
        self.primary_key.clear();
        self.pk_finalized = false;
    }

    /// Returns whether the primary key has been finalized.
    #[must_use]
    pub const fn is_pk_finalized(&self) -> bool {
        self.pk_finalized
    }

    /// Returns the primary key column names in key order.
    #[must_use]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Returns the primary key columns in key order.
    pub fn pk_columns(&self) -> impl Iterator<Item = &Column> {
        self.primary_key.iter().filter_map(|c| self.columns.get(c))
    }

    /// Returns the primary key constraint name.
    #[must_use]
    pub fn pk_name(&self) -> &str {
        &self.pk_name
    }

    /// Returns the resolved foreign keys owned by this table.
    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Returns the foreign key defined on exactly these columns, if any.
    #[must_use]
    pub fn foreign_key_on(&self, columns: &[String]) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.columns() == columns)
    }

    /// Attaches a resolved foreign key.
    pub fn add_foreign_key(&mut self, fk: ForeignKey) -> Result<()> {
        if self.foreign_key_on(fk.columns()).is_some() {
            return Err(self.error(
                ErrorKind::IllegalKey,
                format!(
                    "Foreign key with columns {} is already defined in table '{}'.",
                    fk.columns().join(", "),
                    self.name
                ),
            ));
        }
        self.foreign_keys.push(fk);
        Ok(())
    }
}
