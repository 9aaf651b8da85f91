//! Live database metadata and comparison against declared elements.
//!
//! Adaptors read the live structure into these `Db*Info` records, already
//! translated into the declaration vocabulary (column types, default
//! lexemes). The updater then asks each record whether it `reflects` the
//! declared element; anything that does not is dropped and recreated.

use oxide_score::column::{Column, ColumnType, DefaultValue};
use oxide_score::foreign_key::{FkRule, ForeignKey};
use oxide_score::index::Index;
use oxide_score::sequence::Sequence;
use oxide_score::table::Table;

/// Dialect behaviours that affect how a live column compares with its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DialectQuirks {
    /// The dialect stores `''` as NULL, so such columns are always nullable.
    pub empty_string_default_forces_nullable: bool,
    /// `NEXTVAL` defaults are expressed in column DDL.
    pub sequence_defaults_in_ddl: bool,
}

/// A live column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbColumnInfo {
    /// Column name.
    pub name: String,
    /// Column type, translated from the dialect type.
    pub ty: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default as a declaration lexeme; empty when there is none.
    pub default_value: String,
}

impl DbColumnInfo {
    /// Returns true when this live column matches `column`.
    #[must_use]
    pub fn reflects(&self, column: &Column, quirks: &DialectQuirks) -> bool {
        if self.ty != column.ty {
            return false;
        }

        let forced_nullable = quirks.empty_string_default_forces_nullable
            && matches!(&column.default, Some(DefaultValue::Text(text)) if text.is_empty());
        if self.nullable != (column.nullable || forced_nullable) {
            return false;
        }

        match &column.default {
            None => self.default_value.is_empty(),
            Some(DefaultValue::NextVal(_)) if !quirks.sequence_defaults_in_ddl => {
                self.default_value.is_empty()
            }
            Some(declared) => {
                if self.default_value.is_empty() {
                    return false;
                }
                DefaultValue::parse(&self.ty, &self.default_value)
                    .is_ok_and(|live| live.lexeme() == declared.lexeme())
            }
        }
    }
}

/// A live primary key. Empty name and columns mean the table has none.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbPkInfo {
    /// Constraint name.
    pub name: String,
    /// Ordered key columns.
    pub columns: Vec<String>,
}

impl DbPkInfo {
    /// Returns true when the table has no primary key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.columns.is_empty()
    }

    /// Returns true when this key matches the declared key of `table`.
    #[must_use]
    pub fn reflects(&self, table: &Table) -> bool {
        self.name == table.pk_name() && self.columns == table.primary_key()
    }
}

/// A live index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbIndexInfo {
    /// Indexed table.
    pub table: String,
    /// Index name.
    pub name: String,
    /// Ordered indexed columns.
    pub columns: Vec<String>,
}

impl DbIndexInfo {
    /// Returns true when this index matches `index`.
    #[must_use]
    pub fn reflects(&self, index: &Index) -> bool {
        self.table == index.table() && self.columns == index.columns()
    }
}

/// A live foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbFkInfo {
    /// Constraint name.
    pub name: String,
    /// Grain of the constrained table.
    pub grain: String,
    /// Constrained table.
    pub table: String,
    /// Ordered constrained columns.
    pub columns: Vec<String>,
    /// Grain of the referenced table.
    pub ref_grain: String,
    /// Referenced table.
    pub ref_table: String,
    /// ON DELETE rule.
    pub on_delete: FkRule,
    /// ON UPDATE rule.
    pub on_update: FkRule,
}

impl DbFkInfo {
    /// Returns true when this key matches `fk`.
    #[must_use]
    pub fn reflects(&self, fk: &ForeignKey) -> bool {
        self.table == fk.table()
            && self.ref_grain == fk.referenced_grain()
            && self.ref_table == fk.referenced_table()
            && self.columns == fk.columns()
            && self.on_delete == fk.on_delete()
            && self.on_update == fk.on_update()
    }

    /// Returns true when this key references `grain.table`.
    #[must_use]
    pub fn references(&self, grain: &str, table: &str) -> bool {
        self.ref_grain == grain && self.ref_table == table
    }
}

/// A live sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSequenceInfo {
    /// Sequence name.
    pub name: String,
    /// Increment.
    pub increment_by: i64,
    /// Lower bound.
    pub min_value: i64,
    /// Upper bound.
    pub max_value: i64,
    /// Whether the sequence wraps around.
    pub cycle: bool,
}

impl DbSequenceInfo {
    /// Returns true when the mutable parameters match `sequence`.
    ///
    /// The start value is only applied on creation.
    #[must_use]
    pub const fn reflects(&self, sequence: &Sequence) -> bool {
        self.increment_by == sequence.increment_by
            && self.min_value == sequence.min_value
            && self.max_value == sequence.max_value
            && self.cycle == sequence.cycle
    }
}
