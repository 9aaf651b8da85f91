//! Foreign keys and their late resolution against a referenced primary key.

use std::fmt;

use crate::column::ColumnType;
use crate::error::{ErrorKind, Result, ScoreError};
use crate::identifier::{check_identifier, limit_name};
use crate::table::Table;

/// Referential action for ON DELETE / ON UPDATE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FkRule {
    /// Reject the change.
    #[default]
    NoAction,
    /// Propagate the change.
    Cascade,
    /// Set referencing columns to NULL.
    SetNull,
}

impl FkRule {
    /// Returns the SQL spelling of the rule.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
        }
    }

    /// Parses the SQL spelling of a rule (`RESTRICT` is treated as `NO ACTION`).
    #[must_use]
    pub fn from_sql(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "NO ACTION" | "RESTRICT" => Some(Self::NoAction),
            "CASCADE" => Some(Self::Cascade),
            "SET NULL" => Some(Self::SetNull),
            _ => None,
        }
    }
}

impl fmt::Display for FkRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A foreign key from a table to the primary key of another (or the same) table.
///
/// A key starts out untargeted with only its owning columns; the referenced
/// table is attached later by [`ForeignKey::set_referenced_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    name: Option<String>,
    grain: String,
    table: String,
    columns: Vec<String>,
    referenced_grain: String,
    referenced_table: String,
    referenced_columns: Vec<String>,
    on_delete: FkRule,
    on_update: FkRule,
}

impl ForeignKey {
    /// Creates an untargeted foreign key on `columns` of `parent`.
    pub fn new(parent: &Table, columns: &[String]) -> Result<Self> {
        let fail = |kind, message: String| {
            ScoreError::element(kind, parent.grain(), parent.name(), message)
        };
        if columns.is_empty() {
            return Err(fail(
                ErrorKind::IllegalKey,
                "Foreign key must have at least one column.".to_string(),
            ));
        }
        for (i, column) in columns.iter().enumerate() {
            if parent.column(column).is_none() {
                return Err(fail(
                    ErrorKind::Unresolved,
                    format!(
                        "Column '{column}' is not defined in table '{}'.",
                        parent.name()
                    ),
                ));
            }
            if columns[..i].contains(column) {
                return Err(fail(
                    ErrorKind::DuplicateName,
                    format!("Column '{column}' defined more than once in foreign key."),
                ));
            }
        }
        Ok(Self {
            name: None,
            grain: parent.grain().to_string(),
            table: parent.name().to_string(),
            columns: columns.to_vec(),
            referenced_grain: String::new(),
            referenced_table: String::new(),
            referenced_columns: Vec::new(),
            on_delete: FkRule::NoAction,
            on_update: FkRule::NoAction,
        })
    }

    /// Sets an explicit constraint name.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        check_identifier(&self.grain, name)?;
        self.name = Some(name.to_string());
        Ok(())
    }

    /// Sets the referential rules. `SET NULL` requires nullable columns.
    pub fn set_rules(&mut self, parent: &Table, on_delete: FkRule, on_update: FkRule) -> Result<()> {
        if on_delete == FkRule::SetNull || on_update == FkRule::SetNull {
            if let Some(column) = self
                .columns
                .iter()
                .filter_map(|c| parent.column(c))
                .find(|c| !c.nullable)
            {
                return Err(ScoreError::element(
                    ErrorKind::IllegalKey,
                    &self.grain,
                    &self.table,
                    format!(
                        "Column '{}' is not nullable and therefore 'SET NULL' behaviour cannot be applied.",
                        column.name
                    ),
                ));
            }
        }
        self.on_delete = on_delete;
        self.on_update = on_update;
        Ok(())
    }

    /// Points this key at the primary key of `target`.
    ///
    /// `referenced_columns`, when not empty, must name the target's primary key
    /// columns in order. Count, column class and string length must match
    /// position by position. A key with the same owning columns already present
    /// on `parent` is rejected here, not when columns are added.
    pub fn set_referenced_table(
        &mut self,
        parent: &Table,
        target: &Table,
        referenced_columns: &[String],
    ) -> Result<()> {
        let fail = |kind, message: String| {
            ScoreError::element(kind, &self.grain, parent.name(), message)
        };
        let pk = target.primary_key();
        if pk.is_empty() {
            return Err(fail(
                ErrorKind::IllegalKey,
                format!(
                    "Table '{}.{}' has no primary key to reference.",
                    target.grain(),
                    target.name()
                ),
            ));
        }
        if !referenced_columns.is_empty() && referenced_columns != pk {
            return Err(fail(
                ErrorKind::IllegalKey,
                format!(
                    "Referenced columns ({}) do not match primary key ({}) of table '{}.{}'.",
                    referenced_columns.join(", "),
                    pk.join(", "),
                    target.grain(),
                    target.name()
                ),
            ));
        }
        if pk.len() != self.columns.len() {
            return Err(fail(
                ErrorKind::IllegalKey,
                format!(
                    "Foreign key with columns ({}) has {} column(s), but primary key of table '{}.{}' has {}.",
                    self.columns.join(", "),
                    self.columns.len(),
                    target.grain(),
                    target.name(),
                    pk.len()
                ),
            ));
        }
        for (own, referenced) in self
            .columns
            .iter()
            .filter_map(|c| parent.column(c))
            .zip(target.pk_columns())
        {
            if own.ty.class() != referenced.ty.class() {
                return Err(fail(
                    ErrorKind::TypeMismatch,
                    format!(
                        "Column '{}' of type {} cannot reference column '{}' of type {}.",
                        own.name, own.ty, referenced.name, referenced.ty
                    ),
                ));
            }
            let lengths_match = match (own.ty, referenced.ty) {
                (ColumnType::Varchar { length: a }, ColumnType::Varchar { length: b }) => a == b,
                (ColumnType::Text, ColumnType::Text) => true,
                (ColumnType::Varchar { .. }, _) | (ColumnType::Text, _) => false,
                _ => true,
            };
            if !lengths_match {
                return Err(fail(
                    ErrorKind::TypeMismatch,
                    format!(
                        "Column '{}' ({}) must have the same length as referenced column '{}' ({}).",
                        own.name, own.ty, referenced.name, referenced.ty
                    ),
                ));
            }
        }
        if parent.foreign_key_on(&self.columns).is_some() {
            return Err(fail(
                ErrorKind::IllegalKey,
                format!(
                    "Foreign key with columns {} is already defined in table '{}'.",
                    self.columns.join(", "),
                    parent.name()
                ),
            ));
        }

        self.referenced_grain = target.grain().to_string();
        self.referenced_table = target.name().to_string();
        self.referenced_columns = pk.to_vec();
        if self.name.is_none() {
            self.name = Some(limit_name(&format!(
                "fk_{}_{}_{}_{}_{}",
                self.grain, self.table, self.referenced_grain, self.referenced_table, self.columns[0]
            )));
        }
        Ok(())
    }

    /// Returns whether the referenced table has been set.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.referenced_table.is_empty()
    }

    /// Returns the constraint name (derived from the key when not declared).
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Returns the grain of the owning table.
    #[must_use]
    pub fn grain(&self) -> &str {
        &self.grain
    }

    /// Returns the owning table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the owning columns in key order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the referenced grain.
    #[must_use]
    pub fn referenced_grain(&self) -> &str {
        &self.referenced_grain
    }

    /// Returns the referenced table.
    #[must_use]
    pub fn referenced_table(&self) -> &str {
        &self.referenced_table
    }

    /// Returns the referenced primary key columns.
    #[must_use]
    pub fn referenced_columns(&self) -> &[String] {
        &self.referenced_columns
    }

    /// Returns the ON DELETE rule.
    #[must_use]
    pub const fn on_delete(&self) -> FkRule {
        self.on_delete
    }

    /// Returns the ON UPDATE rule.
    #[must_use]
    pub const fn on_update(&self) -> FkRule {
        self.on_update
    }
}
