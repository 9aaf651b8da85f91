//! SQL text for the SQLite adaptor.
//!
//! SQLite has no schemas, no sequences and no ALTER TABLE for constraints.
//! Grain elements therefore live in `<grain>_<element>` tables, primary and
//! foreign keys are kept as named `CONSTRAINT` clauses inside the CREATE
//! TABLE text, and every constraint change uses the "table recreation"
//! strategy: create a new table, copy data, drop the old table, rename the
//! new table. [`LiveTable`] is the structure both sides of that rebuild
//! share.

use std::sync::LazyLock;

use oxide_score::column::{quote, Column, ColumnType, DefaultValue};
use oxide_score::expr::SqlGenerator;
use oxide_score::foreign_key::{FkRule, ForeignKey};
use oxide_score::index::Index;
use oxide_score::sequence::Sequence;
use oxide_score::table::Table;
use oxide_score::view::{MaterializedView, MvColumn, ParameterizedView, View, SURROGATE_COUNT};
use regex::Regex;

use crate::meta::{DbFkInfo, DbPkInfo};

/// Suffix of the temporary table used while recreating a table.
pub const REBUILD_SUFFIX: &str = "__rebuild";

static TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z]+)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*$")
        .expect("Invalid type declaration regex")
});

static PK_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"CONSTRAINT "(\w+)" PRIMARY KEY \(([^)]*)\)"#).expect("Invalid primary key regex")
});

static FK_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"CONSTRAINT "(\w+)" FOREIGN KEY \(([^)]*)\) REFERENCES "(\w+)" \(([^)]*)\) ON DELETE (NO ACTION|CASCADE|SET NULL) ON UPDATE (NO ACTION|CASCADE|SET NULL)"#,
    )
    .expect("Invalid foreign key regex")
});

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^'(\d{4})-(\d{2})-(\d{2})'$").expect("Invalid date literal regex")
});

static BLOB_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[xX]'([0-9a-fA-F]*)'$").expect("Invalid blob literal regex")
});

/// Quotes an identifier.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Returns the physical name of a grain element.
#[must_use]
pub fn physical_name(grain: &str, name: &str) -> String {
    format!("{grain}_{name}")
}

/// Returns the quoted physical name of a grain element.
#[must_use]
pub fn quoted_name(grain: &str, name: &str) -> String {
    quote_identifier(&physical_name(grain, name))
}

/// Splits a physical name into grain and element.
///
/// Grain names never contain underscores, so the first one separates them.
#[must_use]
pub fn split_physical_name(name: &str) -> Option<(&str, &str)> {
    name.split_once('_')
        .filter(|(grain, element)| !grain.is_empty() && !element.is_empty())
}

fn quote_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn unquote_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

// ============================================================================
// Types and defaults
// ============================================================================

/// Returns the declared SQLite type for a column type.
#[must_use]
pub fn type_name(ty: &ColumnType) -> String {
    match ty {
        ColumnType::Int => "INTEGER".to_string(),
        ColumnType::Real => "REAL".to_string(),
        ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
        ColumnType::Varchar { length } => format!("VARCHAR({length})"),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Blob => "BLOB".to_string(),
        ColumnType::DateTime => "DATETIME".to_string(),
        ColumnType::ZonedDateTime => "TIMESTAMPTZ".to_string(),
        ColumnType::Bit => "BOOLEAN".to_string(),
    }
}

/// Parses a declared SQLite type written by [`type_name`].
#[must_use]
pub fn parse_type(decl: &str) -> Option<ColumnType> {
    let caps = TYPE_DECL.captures(decl)?;
    let first = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
    let second = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok());
    let ty = match caps[1].to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" => ColumnType::Int,
        "REAL" => ColumnType::Real,
        "DECIMAL" | "NUMERIC" => ColumnType::Decimal {
            precision: first?,
            scale: second.unwrap_or(0),
        },
        "VARCHAR" => ColumnType::Varchar { length: first? },
        "TEXT" => ColumnType::Text,
        "BLOB" => ColumnType::Blob,
        "DATETIME" => ColumnType::DateTime,
        "TIMESTAMPTZ" => ColumnType::ZonedDateTime,
        "BOOLEAN" => ColumnType::Bit,
        _ => return None,
    };
    Some(ty)
}

/// Renders a default value as SQLite DDL; `None` when it cannot be expressed.
#[must_use]
pub fn default_sql(default: &DefaultValue) -> Option<String> {
    let sql = match default {
        DefaultValue::NextVal(_) => return None,
        DefaultValue::Int(v) => v.to_string(),
        DefaultValue::Real(v) => format!("{v:?}"),
        DefaultValue::Decimal(v) => v.clone(),
        DefaultValue::Text(v) => quote(v),
        DefaultValue::Blob(hex) => format!("X'{hex}'"),
        DefaultValue::GetDate => "CURRENT_TIMESTAMP".to_string(),
        DefaultValue::Date(date) => format!("'{}'", date.format("%Y-%m-%d")),
        DefaultValue::Bit(b) => (if *b { "1" } else { "0" }).to_string(),
    };
    Some(sql)
}

/// Translates a live SQLite default back into a declaration lexeme.
#[must_use]
pub fn default_lexeme(ty: &ColumnType, sql: &str) -> String {
    let sql = sql.trim();
    match ty {
        ColumnType::DateTime => {
            if sql.eq_ignore_ascii_case("CURRENT_TIMESTAMP") {
                return "GETDATE()".to_string();
            }
            ISO_DATE.captures(sql).map_or_else(
                || sql.to_string(),
                |caps| format!("'{}{}{}'", &caps[1], &caps[2], &caps[3]),
            )
        }
        ColumnType::Blob => BLOB_LITERAL.captures(sql).map_or_else(
            || sql.to_string(),
            |caps| format!("0x{}", caps[1].to_ascii_uppercase()),
        ),
        ColumnType::Bit => match sql {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        _ => sql.to_string(),
    }
}

// ============================================================================
// Table structure
// ============================================================================

/// A column as written in CREATE TABLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    /// Column name.
    pub name: String,
    /// Declared SQLite type.
    pub decl_type: String,
    /// Whether NOT NULL is declared.
    pub not_null: bool,
    /// Default expression, as stored.
    pub default: Option<String>,
}

impl LiveColumn {
    /// Builds the definition of a declared column.
    #[must_use]
    pub fn declared(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            decl_type: type_name(&column.ty),
            not_null: !column.nullable,
            default: column.default.as_ref().and_then(default_sql),
        }
    }

    /// Returns whether ALTER TABLE ADD COLUMN accepts this column.
    ///
    /// NOT NULL needs a default, and the default must be a constant.
    #[must_use]
    pub fn can_be_added(&self) -> bool {
        match &self.default {
            Some(default) => !default.eq_ignore_ascii_case("CURRENT_TIMESTAMP"),
            None => !self.not_null,
        }
    }

    /// Renders the column definition.
    #[must_use]
    pub fn definition(&self) -> String {
        let mut sql = format!("{} {}", quote_identifier(&self.name), self.decl_type);
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// A foreign key clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFk {
    /// Constraint name.
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<String>,
    /// Physical name of the referenced table.
    pub ref_table: String,
    /// Referenced columns.
    pub ref_columns: Vec<String>,
    /// ON DELETE rule.
    pub on_delete: FkRule,
    /// ON UPDATE rule.
    pub on_update: FkRule,
}

impl LiveFk {
    /// Builds the clause of a declared foreign key.
    #[must_use]
    pub fn declared(fk: &ForeignKey) -> Self {
        Self {
            name: fk.name().to_string(),
            columns: fk.columns().to_vec(),
            ref_table: physical_name(fk.referenced_grain(), fk.referenced_table()),
            ref_columns: fk.referenced_columns().to_vec(),
            on_delete: fk.on_delete(),
            on_update: fk.on_update(),
        }
    }

    /// Renders the constraint clause.
    #[must_use]
    pub fn clause(&self) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_identifier(&self.name),
            quote_list(&self.columns),
            quote_identifier(&self.ref_table),
            quote_list(&self.ref_columns),
            self.on_delete.as_sql(),
            self.on_update.as_sql()
        )
    }

    /// Describes this clause as live metadata of `grain.table`.
    #[must_use]
    pub fn info(&self, grain: &str, table: &str) -> Option<DbFkInfo> {
        let (ref_grain, ref_table) = split_physical_name(&self.ref_table)?;
        Some(DbFkInfo {
            name: self.name.clone(),
            grain: grain.to_string(),
            table: table.to_string(),
            columns: self.columns.clone(),
            ref_grain: ref_grain.to_string(),
            ref_table: ref_table.to_string(),
            on_delete: self.on_delete,
            on_update: self.on_update,
        })
    }
}

/// Everything CREATE TABLE carries for one table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveTable {
    /// Columns in order.
    pub columns: Vec<LiveColumn>,
    /// Primary key, if any.
    pub primary_key: Option<DbPkInfo>,
    /// Foreign keys.
    pub foreign_keys: Vec<LiveFk>,
}

impl LiveTable {
    /// Builds the structure of a declared table, including its foreign keys.
    #[must_use]
    pub fn declared(table: &Table) -> Self {
        let mut columns: Vec<LiveColumn> = table.columns().map(LiveColumn::declared).collect();
        if let Some(rec_version) = table.rec_version_column() {
            columns.push(LiveColumn::declared(&rec_version));
        }
        let primary_key = (!table.primary_key().is_empty()).then(|| DbPkInfo {
            name: table.pk_name().to_string(),
            columns: table.primary_key().to_vec(),
        });
        Self {
            columns,
            primary_key,
            foreign_keys: table.foreign_keys().iter().map(LiveFk::declared).collect(),
        }
    }

    /// Returns the column named `name`.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut LiveColumn> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Renders CREATE TABLE under the physical name `physical`.
    #[must_use]
    pub fn create_sql(&self, physical: &str) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(LiveColumn::definition).collect();
        if let Some(pk) = &self.primary_key {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                quote_identifier(&pk.name),
                quote_list(&pk.columns)
            ));
        }
        parts.extend(self.foreign_keys.iter().map(LiveFk::clause));

        let mut sql = String::from("CREATE TABLE ");
        sql.push_str(&quote_identifier(physical));
        sql.push_str(" (\n  ");
        sql.push_str(&parts.join(",\n  "));
        sql.push_str("\n)");
        sql
    }
}

/// Reads the named primary key clause from CREATE TABLE text.
#[must_use]
pub fn parse_primary_key(create_sql: &str) -> Option<DbPkInfo> {
    let caps = PK_CLAUSE.captures(create_sql)?;
    Some(DbPkInfo {
        name: caps[1].to_string(),
        columns: unquote_list(&caps[2]),
    })
}

/// Reads the named foreign key clauses from CREATE TABLE text.
#[must_use]
pub fn parse_foreign_keys(create_sql: &str) -> Vec<LiveFk> {
    FK_CLAUSE
        .captures_iter(create_sql)
        .map(|caps| LiveFk {
            name: caps[1].to_string(),
            columns: unquote_list(&caps[2]),
            ref_table: caps[3].to_string(),
            ref_columns: unquote_list(&caps[4]),
            on_delete: FkRule::from_sql(&caps[5]).unwrap_or_default(),
            on_update: FkRule::from_sql(&caps[6]).unwrap_or_default(),
        })
        .collect()
}

// ============================================================================
// Statements
// ============================================================================

/// Renders ALTER TABLE ADD COLUMN.
#[must_use]
pub fn add_column_sql(grain: &str, table: &str, column: &LiveColumn) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quoted_name(grain, table),
        column.definition()
    )
}

/// Renders ALTER TABLE DROP COLUMN.
#[must_use]
pub fn drop_column_sql(grain: &str, table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        quoted_name(grain, table),
        quote_identifier(column)
    )
}

/// Renders CREATE INDEX.
#[must_use]
pub fn create_index_sql(index: &Index) -> String {
    format!(
        "CREATE INDEX {} ON {} ({})",
        quoted_name(index.grain(), index.name()),
        quoted_name(index.grain(), index.table()),
        quote_list(index.columns())
    )
}

/// Returns the name of the row-versioning trigger of a table.
#[must_use]
pub fn versioning_trigger_name(grain: &str, table: &str) -> String {
    format!("{}_ver", physical_name(grain, table))
}

/// Renders the row-versioning trigger.
///
/// Updates must carry the current `recversion`; the trigger then bumps it.
#[must_use]
pub fn versioning_trigger_sql(table: &Table, rec_version: &str) -> String {
    let target = quoted_name(table.grain(), table.name());
    let column = quote_identifier(rec_version);
    format!(
        "CREATE TRIGGER {trigger} AFTER UPDATE ON {target} FOR EACH ROW BEGIN\n  \
         SELECT RAISE(ABORT, 'record version check failure') WHERE NEW.{column} <> OLD.{column};\n  \
         UPDATE {target} SET {column} = OLD.{column} + 1 WHERE rowid = NEW.rowid;\n\
         END",
        trigger = quote_identifier(&versioning_trigger_name(table.grain(), table.name())),
    )
}

/// Renders CREATE VIEW.
#[must_use]
pub fn create_view_sql(view: &View) -> String {
    format!(
        "CREATE VIEW {} AS {}",
        quoted_name(view.grain(), view.name()),
        view.select().to_sql(&SqliteSqlGenerator)
    )
}

/// Renders the stored query of a parameterized view.
#[must_use]
pub fn function_body(view: &ParameterizedView) -> String {
    view.select().to_sql(&SqliteSqlGenerator)
}

/// Renders the insertion of a sequence row into `catalog`.
#[must_use]
pub fn insert_sequence_sql(catalog: &str, sequence: &Sequence) -> String {
    format!(
        "INSERT INTO {catalog} (\"grainid\", \"seqname\", \"seqvalue\", \"increment\", \"minvalue\", \"maxvalue\", \"cycle\") \
         VALUES ({}, {}, {}, {}, {}, {}, {})",
        quote(sequence.grain()),
        quote(sequence.name()),
        sequence.start_with,
        sequence.increment_by,
        sequence.min_value,
        sequence.max_value,
        i32::from(sequence.cycle)
    )
}

/// Renders the parameter update of a sequence row in `catalog`.
#[must_use]
pub fn alter_sequence_sql(catalog: &str, sequence: &Sequence) -> String {
    format!(
        "UPDATE {catalog} SET \"increment\" = {}, \"minvalue\" = {}, \"maxvalue\" = {}, \"cycle\" = {} \
         WHERE \"grainid\" = {} AND \"seqname\" = {}",
        sequence.increment_by,
        sequence.min_value,
        sequence.max_value,
        i32::from(sequence.cycle),
        quote(sequence.grain()),
        quote(sequence.name())
    )
}

// ============================================================================
// Materialized views
// ============================================================================

/// Trigger events maintaining a materialized view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MvTrigger {
    /// AFTER INSERT; carries the checksum comment.
    Insert,
    /// AFTER UPDATE.
    Update,
    /// AFTER DELETE.
    Delete,
}

impl MvTrigger {
    /// All maintenance triggers.
    pub const ALL: [Self; 3] = [Self::Insert, Self::Update, Self::Delete];

    const fn suffix(self) -> &'static str {
        match self {
            Self::Insert => "mvins",
            Self::Update => "mvupd",
            Self::Delete => "mvdel",
        }
    }

    const fn event(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Returns the trigger name for `view`.
    #[must_use]
    pub fn name(self, view: &MaterializedView) -> String {
        format!("{}_{}", physical_name(view.grain(), view.name()), self.suffix())
    }

    /// Renders CREATE TRIGGER for `view`.
    #[must_use]
    pub fn create_sql(self, view: &MaterializedView) -> String {
        let mut body = Vec::new();
        if self == Self::Insert {
            body.push(view.checksum_comment());
        }
        let rows: &[&str] = match self {
            Self::Insert => &["NEW"],
            Self::Update => &["OLD", "NEW"],
            Self::Delete => &["OLD"],
        };
        for row in rows {
            body.push(format!("{};", mv_delete_group_sql(view, row)));
            body.push(format!("{};", mv_fill_sql(view, Some(row))));
        }
        format!(
            "CREATE TRIGGER {} AFTER {} ON {} FOR EACH ROW BEGIN\n  {}\nEND",
            quote_identifier(&self.name(view)),
            self.event(),
            quoted_name(view.grain(), view.source_table()),
            body.join("\n  ")
        )
    }
}

fn group_sources(view: &MaterializedView) -> impl Iterator<Item = (&String, &String)> {
    view.mv_columns().iter().filter_map(|(alias, column)| match column {
        MvColumn::GroupBy { source } => Some((alias, source)),
        _ => None,
    })
}

fn mv_delete_group_sql(view: &MaterializedView, row: &str) -> String {
    let condition = group_sources(view)
        .map(|(alias, source)| {
            format!(
                "{} = {row}.{}",
                quote_identifier(alias),
                quote_identifier(source)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(
        "DELETE FROM {} WHERE {condition}",
        quoted_name(view.grain(), view.name())
    )
}

/// Renders the INSERT ... SELECT that computes view rows, for one group when
/// `row` names the trigger row, or for the whole source table otherwise.
#[must_use]
pub fn mv_fill_sql(view: &MaterializedView, row: Option<&str>) -> String {
    let mut targets = Vec::new();
    let mut values = Vec::new();
    for (alias, column) in view.mv_columns() {
        targets.push(quote_identifier(alias));
        values.push(match column {
            MvColumn::GroupBy { source } => quote_identifier(source),
            MvColumn::Sum { source } => format!("SUM({})", quote_identifier(source)),
            MvColumn::Count => "COUNT(*)".to_string(),
        });
    }
    targets.push(quote_identifier(SURROGATE_COUNT));
    values.push("COUNT(*)".to_string());

    let keys: Vec<String> = group_sources(view)
        .map(|(_, source)| quote_identifier(source))
        .collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        quoted_name(view.grain(), view.name()),
        targets.join(", "),
        values.join(", "),
        quoted_name(view.grain(), view.source_table())
    );
    if let Some(row) = row {
        let condition = keys
            .iter()
            .map(|key| format!("{key} = {row}.{key}"))
            .collect::<Vec<_>>()
            .join(" AND ");
        sql.push_str(" WHERE ");
        sql.push_str(&condition);
    }
    sql.push_str(" GROUP BY ");
    sql.push_str(&keys.join(", "));
    sql
}

// ============================================================================
// Expression rendering
// ============================================================================

/// Renders view expressions for SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSqlGenerator;

impl SqlGenerator for SqliteSqlGenerator {
    fn quote(&self, ident: &str) -> String {
        quote_identifier(ident)
    }

    fn table_name(&self, grain: &str, table: &str) -> String {
        quoted_name(grain, table)
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn current_date(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn param(&self, name: &str) -> String {
        format!(":{name}")
    }
}
