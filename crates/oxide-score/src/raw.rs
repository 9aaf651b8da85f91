//! Raw element declarations as produced by the grain script front end.
//!
//! These types carry no validation. [`crate::score::Score::build`] turns them
//! into the checked object graph. They deserialize from the JSON interchange
//! form:
//!
//! ```json
//! {
//!   "name": "shop",
//!   "version": "1.02",
//!   "elements": [
//!     {"kind": "table", "name": "orders", "columns": [
//!       {"name": "id", "type": "INT", "nullable": false, "primary_key": true}
//!     ]}
//!   ]
//! }
//! ```

use serde::Deserialize;

use crate::checksum::Fingerprint;
use crate::expr::Expr;
use crate::table::TableOptions;
use crate::version::DEFAULT_VERSION;
use crate::view::JoinKind;

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

const fn yes() -> bool {
    true
}

/// A grain as declared, before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawGrain {
    /// Grain name.
    pub name: String,
    /// Version string, `1.00` when omitted.
    #[serde(default = "default_version")]
    pub version: String,
    /// Element declarations in source order.
    #[serde(default)]
    pub elements: Vec<RawElement>,
    /// Fingerprint of the source text the grain was read from.
    #[serde(skip)]
    pub fingerprint: Fingerprint,
}

impl RawGrain {
    /// Creates an empty grain declaration.
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            elements: Vec::new(),
            fingerprint: Fingerprint::default(),
        }
    }

    /// Appends an element.
    #[must_use]
    pub fn element(mut self, element: RawElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Sets the source fingerprint.
    #[must_use]
    pub const fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Parses a JSON declaration and fingerprints its bytes.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let grain: Self = serde_json::from_str(text)?;
        Ok(grain.with_fingerprint(Fingerprint::of(text.as_bytes())))
    }

    /// Returns the names of other grains referenced by foreign keys and views.
    #[must_use]
    pub fn referenced_grains(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for element in &self.elements {
            let referenced: Vec<Option<&str>> = match element {
                RawElement::Table(t) => t
                    .foreign_keys
                    .iter()
                    .map(|fk| fk.references.grain.as_deref())
                    .collect(),
                RawElement::View(v) | RawElement::MaterializedView(v) => {
                    v.select.from.iter().map(|r| r.grain.as_deref()).collect()
                }
                RawElement::ParameterizedView(v) => {
                    v.select.from.iter().map(|r| r.grain.as_deref()).collect()
                }
                RawElement::Sequence(_) | RawElement::Index(_) => Vec::new(),
            };
            for grain in referenced.into_iter().flatten() {
                if !grain.is_empty() && grain != self.name && !names.contains(&grain) {
                    names.push(grain);
                }
            }
        }
        names
    }
}

/// Any element that can appear in a grain.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawElement {
    /// CREATE TABLE.
    Table(RawTable),
    /// CREATE SEQUENCE.
    Sequence(RawSequence),
    /// CREATE INDEX.
    Index(RawIndex),
    /// CREATE VIEW.
    View(RawView),
    /// CREATE MATERIALIZED VIEW.
    MaterializedView(RawView),
    /// CREATE FUNCTION.
    ParameterizedView(RawParameterizedView),
}

/// A column declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawColumn {
    /// Column name.
    pub name: String,
    /// Type tag (`INT`, `VARCHAR`, `DECIMAL`, ...).
    #[serde(rename = "type")]
    pub type_tag: String,
    /// VARCHAR length; absent or `MAX` means unbounded text.
    #[serde(default)]
    pub length: Option<u32>,
    /// DECIMAL precision.
    #[serde(default)]
    pub precision: Option<u32>,
    /// DECIMAL scale.
    #[serde(default)]
    pub scale: Option<u32>,
    /// Whether NULL is allowed.
    #[serde(default = "yes")]
    pub nullable: bool,
    /// Default value lexeme.
    #[serde(default)]
    pub default: Option<String>,
    /// Inline PRIMARY KEY marker.
    #[serde(default)]
    pub primary_key: bool,
}

impl RawColumn {
    /// Declares a nullable column.
    #[must_use]
    pub fn new(name: &str, type_tag: &str) -> Self {
        Self {
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            length: None,
            precision: None,
            scale: None,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    /// Marks the column NOT NULL PRIMARY KEY.
    #[must_use]
    pub const fn pk(mut self) -> Self {
        self.nullable = false;
        self.primary_key = true;
        self
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the VARCHAR length.
    #[must_use]
    pub const fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the default lexeme.
    #[must_use]
    pub fn default_lexeme(mut self, lexeme: &str) -> Self {
        self.default = Some(lexeme.to_string());
        self
    }
}

/// A table-level PRIMARY KEY clause.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawPrimaryKey {
    /// Constraint name.
    #[serde(default)]
    pub name: Option<String>,
    /// Key columns in order.
    pub columns: Vec<String>,
}

/// Target of a FOREIGN KEY clause.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawReference {
    /// Referenced grain; absent or empty means the declaring grain.
    #[serde(default)]
    pub grain: Option<String>,
    /// Referenced table.
    pub table: String,
    /// Referenced columns; empty means the primary key.
    #[serde(default)]
    pub columns: Vec<String>,
}

/// A FOREIGN KEY clause.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawForeignKey {
    /// Constraint name.
    #[serde(default)]
    pub name: Option<String>,
    /// Owning columns in order.
    pub columns: Vec<String>,
    /// Target.
    pub references: RawReference,
    /// ON DELETE rule.
    #[serde(default)]
    pub on_delete: Option<String>,
    /// ON UPDATE rule.
    #[serde(default)]
    pub on_update: Option<String>,
}

impl RawForeignKey {
    /// Declares a key on `columns` referencing the primary key of `grain.table`.
    #[must_use]
    pub fn new(columns: &[&str], grain: Option<&str>, table: &str) -> Self {
        Self {
            name: None,
            columns: columns.iter().map(ToString::to_string).collect(),
            references: RawReference {
                grain: grain.map(ToString::to_string),
                table: table.to_string(),
                columns: Vec::new(),
            },
            on_delete: None,
            on_update: None,
        }
    }
}

/// A CREATE TABLE declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawTable {
    /// Table name.
    pub name: String,
    /// Columns in order.
    pub columns: Vec<RawColumn>,
    /// Table-level primary key.
    #[serde(default)]
    pub primary_key: Option<RawPrimaryKey>,
    /// Foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<RawForeignKey>,
    /// WITH options.
    #[serde(default)]
    pub options: TableOptions,
}

impl RawTable {
    /// Declares a table with default options.
    #[must_use]
    pub fn new(name: &str, columns: Vec<RawColumn>) -> Self {
        Self {
            name: name.to_string(),
            columns,
            primary_key: None,
            foreign_keys: Vec::new(),
            options: TableOptions::default(),
        }
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: RawForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }
}

/// A CREATE INDEX declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawIndex {
    /// Index name.
    pub name: String,
    /// Indexed table of the same grain.
    pub table: String,
    /// Columns in order.
    pub columns: Vec<String>,
}

/// A CREATE SEQUENCE declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawSequence {
    /// Sequence name.
    pub name: String,
    /// START WITH.
    #[serde(default)]
    pub start_with: Option<i64>,
    /// INCREMENT BY.
    #[serde(default)]
    pub increment_by: Option<i64>,
    /// MINVALUE.
    #[serde(default)]
    pub min_value: Option<i64>,
    /// MAXVALUE.
    #[serde(default)]
    pub max_value: Option<i64>,
    /// CYCLE.
    #[serde(default)]
    pub cycle: bool,
}

/// One projected column.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSelectColumn {
    /// Column alias; may be omitted for plain field references.
    #[serde(default)]
    pub alias: Option<String>,
    /// Column expression.
    pub expr: Expr,
}

/// One table of the FROM clause.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTableRef {
    /// Grain of the table; absent or empty means the declaring grain.
    #[serde(default)]
    pub grain: Option<String>,
    /// Table name.
    pub table: String,
    /// Alias; defaults to the table name.
    #[serde(default)]
    pub alias: Option<String>,
    /// Join kind; absent for the first table.
    #[serde(default)]
    pub join: Option<JoinKind>,
    /// Join condition.
    #[serde(default)]
    pub on: Option<Expr>,
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSelect {
    /// SELECT DISTINCT.
    #[serde(default)]
    pub distinct: bool,
    /// Projected columns.
    pub columns: Vec<RawSelectColumn>,
    /// FROM clause.
    pub from: Vec<RawTableRef>,
    /// WHERE condition.
    #[serde(default, rename = "where")]
    pub where_clause: Option<Expr>,
    /// GROUP BY column aliases.
    #[serde(default)]
    pub group_by: Vec<String>,
}

/// A CREATE VIEW or CREATE MATERIALIZED VIEW declaration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawView {
    /// View name.
    pub name: String,
    /// Query.
    pub select: RawSelect,
}

/// A declared parameter of a parameterized view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawParameter {
    /// Parameter name.
    pub name: String,
    /// Type tag.
    #[serde(rename = "type")]
    pub type_tag: String,
    /// VARCHAR length.
    #[serde(default)]
    pub length: Option<u32>,
    /// DECIMAL precision.
    #[serde(default)]
    pub precision: Option<u32>,
    /// DECIMAL scale.
    #[serde(default)]
    pub scale: Option<u32>,
}

/// A CREATE FUNCTION declaration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawParameterizedView {
    /// Function name.
    pub name: String,
    /// Parameters in order.
    pub parameters: Vec<RawParameter>,
    /// Query.
    pub select: RawSelect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grain_json() {
        let json = r#"{
            "name": "b",
            "elements": [
                {"kind": "table", "name": "t2", "columns": [
                    {"name": "id", "type": "INT", "nullable": false, "primary_key": true},
                    {"name": "ref", "type": "INT"}
                ], "foreign_keys": [
                    {"columns": ["ref"], "references": {"grain": "a", "table": "t1"}, "on_delete": "CASCADE"}
                ], "options": {"with_version_check": false}},
                {"kind": "sequence", "name": "s", "start_with": 5},
                {"kind": "view", "name": "v", "select": {
                    "columns": [{"expr": {"field": {"column": "id"}}}],
                    "from": [{"grain": "c", "table": "t3"}]
                }}
            ]
        }"#;
        let grain = RawGrain::from_json(json).unwrap();
        assert_eq!(grain.version, "1.00");
        assert_eq!(grain.fingerprint, Fingerprint::of(json.as_bytes()));
        assert_eq!(grain.elements.len(), 3);
        let RawElement::Table(table) = &grain.elements[0] else {
            panic!("expected a table");
        };
        assert!(table.columns[1].nullable);
        assert!(!table.options.with_version_check);
        assert!(table.options.auto_update);
        assert_eq!(grain.referenced_grains(), vec!["a", "c"]);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"name": "a", "elements": [{"kind": "trigger", "name": "x"}]}"#;
        assert!(RawGrain::from_json(json).is_err());
    }

    #[test]
    fn test_own_grain_is_not_a_reference() {
        let grain = RawGrain::new("a", "1.0").element(RawElement::Table(
            RawTable::new("t", vec![RawColumn::new("id", "INT").pk()])
                .foreign_key(RawForeignKey::new(&["id"], Some("a"), "t")),
        ));
        assert!(grain.referenced_grains().is_empty());
    }
}
