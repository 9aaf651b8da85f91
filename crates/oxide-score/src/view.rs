//! Views, materialized views and parameterized views.
//!
//! All three share one validated [`SelectStmt`]. Building it resolves every
//! table and field reference, infers column types and enforces the aggregate
//! rules. The kinds then add their own restrictions on top.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::checksum::Fingerprint;
use crate::column::{Column, ColumnType, DefaultValue};
use crate::error::{ErrorKind, Result, ScoreError};
use crate::expr::{
    AggregateFunc, CelestaSqlGenerator, Expr, ExprMeta, Scope, ScopeTable, SqlGenerator,
    ViewColumnType,
};
use crate::identifier::check_identifier;
use crate::raw::{RawParameterizedView, RawSelect, RawView};
use crate::table::{Table, TableOptions};

/// Name of the row counter kept in every materialized view table.
pub const SURROGATE_COUNT: &str = "surrogate_count";

const CHECKSUM_OPEN: &str = "/*CHECKSUM";
const CHECKSUM_CLOSE: &str = "CHECKSUM*/";

/// Resolves table references made from view definitions.
pub trait TableLookup {
    /// Finds `table` in `grain`; `None` means the grain being built.
    ///
    /// Returns a message describing why the table is not available.
    fn lookup_table(&self, grain: Option<&str>, table: &str) -> std::result::Result<&Table, String>;
}

/// Join kinds of the FROM clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// INNER JOIN.
    Inner,
    /// LEFT JOIN.
    Left,
    /// RIGHT JOIN.
    Right,
}

impl JoinKind {
    /// Returns the SQL spelling.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "inner join",
            Self::Left => "left join",
            Self::Right => "right join",
        }
    }
}

/// A resolved table of the FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    /// Alias used by field references.
    pub alias: String,
    /// Grain of the table.
    pub grain: String,
    /// Table name.
    pub table: String,
    /// Join kind; `None` for the first table.
    pub join: Option<JoinKind>,
    /// Join condition.
    pub on: Option<Expr>,
}

/// A projected column with its inferred meta.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewColumn {
    /// Column expression.
    pub expr: Expr,
    /// Inferred type, nullability and length.
    pub meta: ExprMeta,
}

/// A validated SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    /// SELECT DISTINCT.
    pub distinct: bool,
    /// Columns by alias, in projection order.
    pub columns: IndexMap<String, ViewColumn>,
    /// FROM clause.
    pub tables: Vec<TableRef>,
    /// WHERE condition.
    pub where_clause: Option<Expr>,
    /// GROUP BY column aliases.
    pub group_by: Vec<String>,
}

impl SelectStmt {
    /// Validates `raw` as the query of view `element` in `grain`.
    pub fn build(
        grain: &str,
        element: &str,
        raw: RawSelect,
        lookup: &dyn TableLookup,
        params: &IndexMap<String, ExprMeta>,
    ) -> Result<Self> {
        let fail = |kind, message: String| ScoreError::element(kind, grain, element, message);

        if raw.from.is_empty() {
            return Err(fail(
                ErrorKind::IllegalDefinition,
                format!("View '{element}' must select from at least one table."),
            ));
        }

        let mut aliases = Vec::with_capacity(raw.from.len());
        let mut targets = Vec::with_capacity(raw.from.len());
        let mut joins = Vec::with_capacity(raw.from.len());
        let mut conditions = Vec::with_capacity(raw.from.len());
        for (position, table_ref) in raw.from.into_iter().enumerate() {
            let alias = table_ref.alias.unwrap_or_else(|| table_ref.table.clone());
            check_identifier(grain, &alias)?;
            if aliases.contains(&alias) {
                return Err(fail(
                    ErrorKind::DuplicateName,
                    format!("Table alias '{alias}' is used more than once in view '{element}'."),
                ));
            }
            match (position, table_ref.join, &table_ref.on) {
                (0, None, None) | (1.., Some(_), Some(_)) => {}
                (0, _, _) => {
                    return Err(fail(
                        ErrorKind::IllegalDefinition,
                        format!("The first table '{alias}' of view '{element}' cannot be joined."),
                    ));
                }
                _ => {
                    return Err(fail(
                        ErrorKind::IllegalDefinition,
                        format!("Table '{alias}' must be joined with a join kind and an ON condition."),
                    ));
                }
            }
            let target = lookup
                .lookup_table(
                    table_ref.grain.as_deref().filter(|g| !g.is_empty()),
                    &table_ref.table,
                )
                .map_err(|message| fail(ErrorKind::Unresolved, message))?;
            aliases.push(alias);
            targets.push(target);
            joins.push(table_ref.join);
            conditions.push(table_ref.on);
        }

        let mut outer = vec![false; targets.len()];
        for (position, join) in joins.iter().enumerate() {
            match join {
                Some(JoinKind::Left) => outer[position] = true,
                Some(JoinKind::Right) => outer[..position].iter_mut().for_each(|o| *o = true),
                Some(JoinKind::Inner) | None => {}
            }
        }
        let scope = Scope {
            tables: aliases
                .iter()
                .zip(&targets)
                .zip(&outer)
                .map(|((alias, table), outer)| ScopeTable {
                    alias,
                    table,
                    outer: *outer,
                })
                .collect(),
            params: params.clone(),
        };

        for (position, condition) in conditions.iter_mut().enumerate() {
            if let Some(condition) = condition {
                let join_scope = Scope {
                    tables: scope.tables[..=position].to_vec(),
                    params: scope.params.clone(),
                };
                condition
                    .resolve(&join_scope)
                    .map_err(|message| fail(ErrorKind::Unresolved, message))?;
                expect_condition(condition).map_err(|message| fail(ErrorKind::TypeMismatch, message))?;
            }
        }

        let mut columns: IndexMap<String, ViewColumn> = IndexMap::new();
        for raw_column in raw.columns {
            let alias = match (raw_column.alias, &raw_column.expr) {
                (Some(alias), _) => alias,
                (None, Expr::Field(field)) => field.column.clone(),
                (None, expr) => {
                    return Err(fail(
                        ErrorKind::IllegalDefinition,
                        format!("Expression '{}' requires an alias.", expr.celesta_sql()),
                    ));
                }
            };
            check_identifier(grain, &alias)?;
            if columns.contains_key(&alias) {
                return Err(fail(
                    ErrorKind::DuplicateName,
                    format!("Column '{alias}' is defined more than once in view '{element}'."),
                ));
            }
            let mut expr = raw_column.expr;
            expr.resolve(&scope)
                .map_err(|message| fail(ErrorKind::Unresolved, message))?;
            if !expr.is_aggregate() && expr.contains_aggregate() {
                return Err(fail(
                    ErrorKind::IllegalDefinition,
                    format!("Aggregate functions in column '{alias}' are only allowed at the top level."),
                ));
            }
            let meta = expr
                .meta()
                .map_err(|message| fail(ErrorKind::TypeMismatch, message))?;
            columns.insert(alias, ViewColumn { expr, meta });
        }

        let mut where_clause = raw.where_clause;
        if let Some(condition) = &mut where_clause {
            condition
                .resolve(&scope)
                .map_err(|message| fail(ErrorKind::Unresolved, message))?;
            if condition.contains_aggregate() {
                return Err(fail(
                    ErrorKind::IllegalDefinition,
                    "Aggregate functions are not allowed in WHERE condition.".to_string(),
                ));
            }
            expect_condition(condition).map_err(|message| fail(ErrorKind::TypeMismatch, message))?;
        }

        let mut group_by: Vec<String> = Vec::with_capacity(raw.group_by.len());
        for name in raw.group_by {
            if group_by.contains(&name) {
                return Err(fail(
                    ErrorKind::DuplicateName,
                    format!("Column '{name}' is repeated in GROUP BY clause."),
                ));
            }
            let Some(column) = columns.get(&name) else {
                return Err(fail(
                    ErrorKind::Unresolved,
                    format!("GROUP BY column '{name}' is not a column of view '{element}'."),
                ));
            };
            if column.expr.is_aggregate() {
                return Err(fail(
                    ErrorKind::IllegalDefinition,
                    format!("Aggregate column '{name}' cannot be used in GROUP BY clause."),
                ));
            }
            group_by.push(name);
        }
        let has_aggregates = columns.values().any(|c| c.expr.is_aggregate());
        if has_aggregates || !group_by.is_empty() {
            if let Some(alias) = columns.iter().find_map(|(alias, c)| {
                (!c.expr.is_aggregate() && !c.expr.is_constant() && !group_by.contains(alias))
                    .then_some(alias)
            }) {
                return Err(fail(
                    ErrorKind::IllegalDefinition,
                    format!("Column '{alias}' of view '{element}' must be listed in GROUP BY clause."),
                ));
            }
        }

        let tables = aliases
            .into_iter()
            .zip(targets)
            .zip(joins.into_iter().zip(conditions))
            .map(|((alias, target), (join, on))| TableRef {
                alias,
                grain: target.grain().to_string(),
                table: target.name().to_string(),
                join,
                on,
            })
            .collect();

        Ok(Self {
            distinct: raw.distinct,
            columns,
            tables,
            where_clause,
            group_by,
        })
    }

    /// Returns whether any column is an aggregate call.
    #[must_use]
    pub fn has_aggregates(&self) -> bool {
        self.columns.values().any(|c| c.expr.is_aggregate())
    }

    /// Returns the names of all referenced parameters.
    #[must_use]
    pub fn param_names(&self) -> BTreeSet<&str> {
        self.columns
            .values()
            .map(|c| &c.expr)
            .chain(self.tables.iter().filter_map(|t| t.on.as_ref()))
            .chain(self.where_clause.as_ref())
            .flat_map(Expr::param_names)
            .collect()
    }

    /// Renders the statement with the given dialect hooks.
    #[must_use]
    pub fn to_sql(&self, gen: &dyn SqlGenerator) -> String {
        let columns = self
            .columns
            .iter()
            .map(|(alias, c)| format!("{} as {}", c.expr.to_sql(gen), gen.quote(alias)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "select {}{columns} from ",
            if self.distinct { "distinct " } else { "" }
        );
        for table in &self.tables {
            let source = format!(
                "{} as {}",
                gen.table_name(&table.grain, &table.table),
                gen.quote(&table.alias)
            );
            match (&table.join, &table.on) {
                (Some(join), Some(on)) => {
                    sql.push_str(&format!(" {} {source} on {}", join.as_sql(), on.to_sql(gen)));
                }
                _ => sql.push_str(&source),
            }
        }
        if let Some(condition) = &self.where_clause {
            sql.push_str(" where ");
            sql.push_str(&condition.to_sql(gen));
        }
        if !self.group_by.is_empty() {
            let keys = self
                .group_by
                .iter()
                .filter_map(|alias| self.columns.get(alias))
                .map(|c| c.expr.to_sql(gen))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" group by ");
            sql.push_str(&keys);
        }
        sql
    }

    /// Renders canonical grain-script text.
    #[must_use]
    pub fn celesta_sql(&self) -> String {
        self.to_sql(&CelestaSqlGenerator)
    }
}

fn expect_condition(expr: &Expr) -> std::result::Result<(), String> {
    let meta = expr.meta()?;
    if meta.ty == ViewColumnType::Logic {
        Ok(())
    } else {
        Err(format!(
            "Expression '{}' is expected to be a logical condition, but it is {}",
            expr.celesta_sql(),
            meta.ty
        ))
    }
}

/// A plain view.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    grain: String,
    name: String,
    select: SelectStmt,
}

impl View {
    /// Validates a view declaration.
    pub fn new(grain: &str, raw: RawView, lookup: &dyn TableLookup) -> Result<Self> {
        check_identifier(grain, &raw.name)?;
        let select = SelectStmt::build(grain, &raw.name, raw.select, lookup, &IndexMap::new())?;
        Ok(Self {
            grain: grain.to_string(),
            name: raw.name,
            select,
        })
    }

    /// Returns the view name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning grain name.
    #[must_use]
    pub fn grain(&self) -> &str {
        &self.grain
    }

    /// Returns the validated query.
    #[must_use]
    pub const fn select(&self) -> &SelectStmt {
        &self.select
    }

    /// Renders the canonical CREATE VIEW text.
    #[must_use]
    pub fn celesta_sql(&self) -> String {
        format!("create view {} as {}", self.name, self.select.celesta_sql())
    }
}

/// A view taking typed parameters (`$name` in expressions).
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizedView {
    grain: String,
    name: String,
    parameters: IndexMap<String, ColumnType>,
    select: SelectStmt,
}

impl ParameterizedView {
    /// Validates a parameterized view declaration.
    ///
    /// Every declared parameter must be referenced by the query.
    pub fn new(grain: &str, raw: RawParameterizedView, lookup: &dyn TableLookup) -> Result<Self> {
        check_identifier(grain, &raw.name)?;
        let name = raw.name;
        let fail = |kind, message: String| ScoreError::element(kind, grain, &name, message);

        let mut parameters = IndexMap::new();
        for parameter in raw.parameters {
            check_identifier(grain, &parameter.name)?;
            if parameters.contains_key(&parameter.name) {
                return Err(fail(
                    ErrorKind::DuplicateName,
                    format!("Parameter '{}' is declared more than once.", parameter.name),
                ));
            }
            let ty = ColumnType::from_tag(
                &parameter.type_tag,
                parameter.length,
                parameter.precision,
                parameter.scale,
            )
            .map_err(|message| fail(ErrorKind::IllegalDefinition, message))?;
            parameters.insert(parameter.name, ty);
        }
        let metas = parameters
            .iter()
            .map(|(name, ty)| (name.clone(), ExprMeta::of_column(ty, true)))
            .collect();

        let select = SelectStmt::build(grain, &name, raw.select, lookup, &metas)?;
        let used = select.param_names();
        if let Some(unused) = parameters.keys().find(|p| !used.contains(p.as_str())) {
            return Err(fail(
                ErrorKind::IllegalDefinition,
                format!("Parameter '{unused}' of function '{name}' is declared but never used."),
            ));
        }
        Ok(Self {
            grain: grain.to_string(),
            name,
            parameters,
            select,
        })
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning grain name.
    #[must_use]
    pub fn grain(&self) -> &str {
        &self.grain
    }

    /// Returns the declared parameters in order.
    #[must_use]
    pub const fn parameters(&self) -> &IndexMap<String, ColumnType> {
        &self.parameters
    }

    /// Returns the validated query.
    #[must_use]
    pub const fn select(&self) -> &SelectStmt {
        &self.select
    }

    /// Renders the canonical CREATE FUNCTION text.
    #[must_use]
    pub fn celesta_sql(&self) -> String {
        let parameters = self
            .parameters
            .iter()
            .map(|(name, ty)| format!("{name} {ty}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "create function {}({parameters}) as {}",
            self.name,
            self.select.celesta_sql()
        )
    }
}

/// How a materialized view column is maintained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MvColumn {
    /// Grouping key copied from a source column.
    GroupBy {
        /// Source column.
        source: String,
    },
    /// Running SUM of a source column.
    Sum {
        /// Source column.
        source: String,
    },
    /// Row count.
    Count,
}

/// An aggregate view stored in its own table and kept current by triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedView {
    grain: String,
    name: String,
    select: SelectStmt,
    source_table: String,
    columns: IndexMap<String, MvColumn>,
    table: Table,
}

impl MaterializedView {
    /// Validates a materialized view declaration and derives its table.
    pub fn new(grain: &str, raw: RawView, lookup: &dyn TableLookup) -> Result<Self> {
        check_identifier(grain, &raw.name)?;
        let name = raw.name;
        let fail = |kind, message: String| ScoreError::element(kind, grain, &name, message);
        let illegal = |message: String| fail(ErrorKind::IllegalDefinition, message);

        if raw.select.where_clause.is_some() {
            return Err(illegal(format!(
                "WHERE condition is not allowed in materialized view '{name}'."
            )));
        }
        if raw.select.from.len() != 1 {
            return Err(illegal(format!(
                "Materialized view '{name}' must select from exactly one table."
            )));
        }
        let source_grain = raw.select.from[0].grain.clone().filter(|g| !g.is_empty());
        if source_grain.as_deref().is_some_and(|g| g != grain) {
            return Err(illegal(format!(
                "Materialized view '{name}' cannot reference tables of another grain."
            )));
        }
        let source = lookup
            .lookup_table(None, &raw.select.from[0].table)
            .map_err(|message| fail(ErrorKind::Unresolved, message))?;

        let select = SelectStmt::build(grain, &name, raw.select, lookup, &IndexMap::new())?;
        if !select.has_aggregates() {
            return Err(illegal(format!(
                "Materialized view '{name}' must contain at least one aggregate column."
            )));
        }
        if select.group_by.is_empty() {
            return Err(illegal(format!(
                "Materialized view '{name}' must contain at least one GROUP BY column."
            )));
        }

        let mut table = Table::new(
            grain,
            &name,
            TableOptions {
                with_version_check: false,
                read_only: false,
                auto_update: true,
            },
        )?;
        let mut columns = IndexMap::new();
        for (alias, column) in &select.columns {
            if alias == SURROGATE_COUNT {
                return Err(illegal(format!(
                    "Column name '{SURROGATE_COUNT}' is reserved for materialized view needs."
                )));
            }
            let (mv_column, declared) = match &column.expr {
                Expr::Field(field) => {
                    let source_column = source
                        .column(&field.column)
                        .ok_or_else(|| fail(ErrorKind::Unresolved, format!("Column '{field}' not found.")))?;
                    if source_column.nullable {
                        return Err(illegal(format!(
                            "Nullable column '{}' cannot be used in GROUP BY of materialized view '{name}'.",
                            field.column
                        )));
                    }
                    (
                        MvColumn::GroupBy {
                            source: field.column.clone(),
                        },
                        Column::new(alias.as_str(), source_column.ty).not_null(),
                    )
                }
                Expr::Aggregate {
                    func: AggregateFunc::Sum,
                    arg: Some(arg),
                } => match arg.as_ref() {
                    Expr::Field(field) => {
                        let source_column = source.column(&field.column).ok_or_else(|| {
                            fail(ErrorKind::Unresolved, format!("Column '{field}' not found."))
                        })?;
                        (
                            MvColumn::Sum {
                                source: field.column.clone(),
                            },
                            Column::new(alias.as_str(), source_column.ty),
                        )
                    }
                    other => {
                        return Err(illegal(format!(
                            "SUM argument '{}' of materialized view '{name}' must be a column.",
                            other.celesta_sql()
                        )));
                    }
                },
                Expr::Aggregate {
                    func: AggregateFunc::Count,
                    arg: None,
                } => (
                    MvColumn::Count,
                    Column::new(alias.as_str(), ColumnType::Int).not_null(),
                ),
                other => {
                    return Err(illegal(format!(
                        "Expression '{}' is not supported in materialized view '{name}'.",
                        other.celesta_sql()
                    )));
                }
            };
            if matches!(declared.ty, ColumnType::Text | ColumnType::Blob) {
                return Err(illegal(format!(
                    "Column '{alias}' of type {} is not supported in materialized view '{name}'.",
                    declared.ty
                )));
            }
            table.add_column(declared)?;
            columns.insert(alias.clone(), mv_column);
        }
        table.add_column(
            Column::new(SURROGATE_COUNT, ColumnType::Int)
                .not_null()
                .default_value(DefaultValue::Int(0)),
        )?;
        for alias in &select.group_by {
            table.add_pk_column(alias)?;
        }
        table.finalize_pk()?;

        Ok(Self {
            grain: grain.to_string(),
            source_table: source.name().to_string(),
            name,
            select,
            columns,
            table,
        })
    }

    /// Returns the view name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning grain name.
    #[must_use]
    pub fn grain(&self) -> &str {
        &self.grain
    }

    /// Returns the validated query.
    #[must_use]
    pub const fn select(&self) -> &SelectStmt {
        &self.select
    }

    /// Returns the table the view aggregates.
    #[must_use]
    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    /// Returns the maintained columns by alias.
    #[must_use]
    pub const fn mv_columns(&self) -> &IndexMap<String, MvColumn> {
        &self.columns
    }

    /// Returns the table that stores the view rows.
    #[must_use]
    pub const fn table(&self) -> &Table {
        &self.table
    }

    /// Renders the canonical CREATE MATERIALIZED VIEW text.
    #[must_use]
    pub fn celesta_sql(&self) -> String {
        format!(
            "create materialized view {} as {}",
            self.name,
            self.select.celesta_sql()
        )
    }

    /// Returns the CRC32 of the canonical text as eight hex digits.
    #[must_use]
    pub fn checksum(&self) -> String {
        Fingerprint::of(self.celesta_sql().as_bytes()).checksum_hex()
    }

    /// Returns the comment embedded into the maintenance trigger.
    #[must_use]
    pub fn checksum_comment(&self) -> String {
        format!("{CHECKSUM_OPEN}{}{CHECKSUM_CLOSE}", self.checksum())
    }

    /// Extracts the checksum from a trigger body carrying a checksum comment.
    #[must_use]
    pub fn extract_checksum(body: &str) -> Option<&str> {
        let start = body.find(CHECKSUM_OPEN)? + CHECKSUM_OPEN.len();
        let length = body[start..].find(CHECKSUM_CLOSE)?;
        Some(&body[start..start + length])
    }
}
