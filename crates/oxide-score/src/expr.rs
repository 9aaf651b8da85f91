//! Expression trees used in view definitions.
//!
//! [`Expr`] is a plain sum type. Each concern is a separate pass with an
//! exhaustive match:
//!
//! - **Field resolution** binds [`FieldRef`]s and [`ParamRef`]s against a [`Scope`].
//! - **Type checking** computes the [`ExprMeta`] of every node.
//! - **SQL generation** renders the tree through a [`SqlGenerator`].

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::column::{quote, ColumnType};
use crate::table::Table;

/// Type of an expression or view column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ViewColumnType {
    /// Result of a condition.
    Logic,
    /// Floating point.
    Real,
    /// Fixed point.
    Decimal,
    /// Integer.
    Int,
    /// Character data.
    Text,
    /// Date-time.
    Date,
    /// Boolean column value.
    Bit,
    /// Binary data.
    Blob,
}

impl ViewColumnType {
    /// Returns whether this is one of the numeric types.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Real | Self::Decimal | Self::Int)
    }

    /// Returns whether values of the two types can be compared with each other.
    ///
    /// Numeric types compare among themselves; every other type only with itself.
    #[must_use]
    pub fn is_comparable_with(self, other: Self) -> bool {
        if self.is_numeric() {
            other.is_numeric()
        } else {
            self == other
        }
    }
}

impl fmt::Display for ViewColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Logic => "LOGIC",
            Self::Real => "REAL",
            Self::Decimal => "DECIMAL",
            Self::Int => "INT",
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::Bit => "BIT",
            Self::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

/// Inferred type, nullability and (for text) length of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprMeta {
    /// Expression type.
    pub ty: ViewColumnType,
    /// Whether the expression may evaluate to NULL.
    pub nullable: bool,
    /// Maximum length of text values, when bounded.
    pub length: Option<u32>,
}

impl ExprMeta {
    /// Creates a meta without length information.
    #[must_use]
    pub const fn new(ty: ViewColumnType, nullable: bool) -> Self {
        Self {
            ty,
            nullable,
            length: None,
        }
    }

    /// Describes a value of a column of the given type.
    #[must_use]
    pub const fn of_column(ty: &ColumnType, nullable: bool) -> Self {
        Self {
            ty: ty.view_type(),
            nullable,
            length: ty.length(),
        }
    }

    const fn logic() -> Self {
        Self::new(ViewColumnType::Logic, false)
    }
}

/// Arithmetic and concatenation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    /// `+`
    #[serde(rename = "+")]
    Plus,
    /// `-`
    #[serde(rename = "-")]
    Minus,
    /// `*`
    #[serde(rename = "*")]
    Times,
    /// `/`
    #[serde(rename = "/")]
    Over,
    /// `||`
    #[serde(rename = "||")]
    Concat,
}

impl ArithOp {
    /// Returns the SQL spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Times => "*",
            Self::Over => "/",
            Self::Concat => "||",
        }
    }
}

/// Relational operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelOp {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `<>`
    #[serde(rename = "<>")]
    NotEq,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    LtEq,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    GtEq,
    /// `LIKE`
    #[serde(rename = "LIKE")]
    Like,
}

impl RelOp {
    /// Returns the SQL spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
        }
    }
}

/// Logical connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl LogicalOp {
    /// Returns the SQL spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunc {
    /// `COUNT(*)`
    Count,
    /// `SUM(x)`
    Sum,
    /// `MAX(x)`
    Max,
    /// `MIN(x)`
    Min,
}

impl AggregateFunc {
    /// Returns the SQL function name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Max => "MAX",
            Self::Min => "MIN",
        }
    }
}

/// The column a field reference was bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    /// Alias of the table in the FROM clause.
    pub alias: String,
    /// Grain of the source table.
    pub grain: String,
    /// Source table.
    pub table: String,
    /// Declared type of the source column.
    pub column_type: ColumnType,
    /// Meta of the reference, including outer-join nullability.
    pub meta: ExprMeta,
}

/// A reference to a table column, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    /// Table name or alias qualifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Column name.
    pub column: String,
    /// Binding established by field resolution.
    #[serde(skip)]
    pub resolved: Option<ResolvedField>,
}

impl FieldRef {
    /// Creates an unresolved reference.
    #[must_use]
    pub fn new(table: Option<&str>, column: &str) -> Self {
        Self {
            table: table.map(ToString::to_string),
            column: column.to_string(),
            resolved: None,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// A reference to a parameter of a parameterized view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRef {
    /// Parameter name.
    pub name: String,
    /// Meta of the parameter, set by field resolution.
    #[serde(skip)]
    pub resolved: Option<ExprMeta>,
}

/// A view expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Column reference.
    Field(FieldRef),
    /// Parameter reference (`$name`).
    Param(ParamRef),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Real(f64),
    /// String literal.
    Text(String),
    /// Boolean literal.
    Bool(bool),
    /// Current date-time.
    GetDate,
    /// Parenthesized expression.
    Paren(Box<Expr>),
    /// Unary minus.
    Neg(Box<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Chain of operands joined by the same arithmetic or concatenation operator.
    Arith {
        /// Operator.
        op: ArithOp,
        /// At least two operands.
        operands: Vec<Expr>,
    },
    /// Comparison.
    Compare {
        /// Operator.
        op: RelOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Chain of conditions joined by AND or OR.
    Logical {
        /// Connective.
        op: LogicalOp,
        /// At least two operands.
        operands: Vec<Expr>,
    },
    /// `expr BETWEEN low AND high`.
    Between {
        /// Tested value.
        expr: Box<Expr>,
        /// Lower bound.
        low: Box<Expr>,
        /// Upper bound.
        high: Box<Expr>,
    },
    /// `expr IN (list)`.
    In {
        /// Tested value.
        expr: Box<Expr>,
        /// Candidates.
        list: Vec<Expr>,
    },
    /// `expr IS NULL`.
    IsNull(Box<Expr>),
    /// `UPPER(expr)`.
    Upper(Box<Expr>),
    /// `LOWER(expr)`.
    Lower(Box<Expr>),
    /// Aggregate function call. `COUNT` takes no argument.
    Aggregate {
        /// Function.
        func: AggregateFunc,
        /// Argument, absent for `COUNT(*)`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<Box<Expr>>,
    },
}

/// A table visible to field references.
#[derive(Debug, Clone, Copy)]
pub struct ScopeTable<'a> {
    /// Alias in the FROM clause.
    pub alias: &'a str,
    /// The table itself.
    pub table: &'a Table,
    /// Set when an outer join may produce NULL rows for this table.
    pub outer: bool,
}

/// Names visible while resolving an expression.
#[derive(Debug, Clone, Default)]
pub struct Scope<'a> {
    /// Tables in FROM order.
    pub tables: Vec<ScopeTable<'a>>,
    /// Parameters of a parameterized view.
    pub params: IndexMap<String, ExprMeta>,
}

/// Dialect hooks for rendering expressions and select statements.
pub trait SqlGenerator {
    /// Quotes an identifier.
    fn quote(&self, ident: &str) -> String;

    /// Renders a table reference.
    fn table_name(&self, grain: &str, table: &str) -> String;

    /// Renders a boolean literal.
    fn bool_literal(&self, value: bool) -> &'static str;

    /// Renders the current date-time function.
    fn current_date(&self) -> &'static str;

    /// Renders a parameter placeholder.
    fn param(&self, name: &str) -> String;
}

/// Renders canonical grain-script text; used for checksums and diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CelestaSqlGenerator;

impl SqlGenerator for CelestaSqlGenerator {
    fn quote(&self, ident: &str) -> String {
        ident.to_string()
    }

    fn table_name(&self, grain: &str, table: &str) -> String {
        format!("{grain}.{table}")
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn current_date(&self) -> &'static str {
        "GETDATE()"
    }

    fn param(&self, name: &str) -> String {
        format!("${name}")
    }
}

impl Expr {
    /// Shorthand for a field reference.
    #[must_use]
    pub fn field(table: Option<&str>, column: &str) -> Self {
        Self::Field(FieldRef::new(table, column))
    }

    /// Shorthand for a parameter reference.
    #[must_use]
    pub fn param(name: &str) -> Self {
        Self::Param(ParamRef {
            name: name.to_string(),
            resolved: None,
        })
    }

    /// Shorthand for a comparison.
    #[must_use]
    pub fn compare(op: RelOp, left: Self, right: Self) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Shorthand for an aggregate call.
    #[must_use]
    pub fn aggregate(func: AggregateFunc, arg: Option<Self>) -> Self {
        Self::Aggregate {
            func,
            arg: arg.map(Box::new),
        }
    }

    /// Returns the direct sub-expressions.
    #[must_use]
    pub fn children(&self) -> Vec<&Self> {
        match self {
            Self::Field(_)
            | Self::Param(_)
            | Self::Int(_)
            | Self::Real(_)
            | Self::Text(_)
            | Self::Bool(_)
            | Self::GetDate => Vec::new(),
            Self::Paren(e)
            | Self::Neg(e)
            | Self::Not(e)
            | Self::IsNull(e)
            | Self::Upper(e)
            | Self::Lower(e) => vec![e.as_ref()],
            Self::Arith { operands, .. } | Self::Logical { operands, .. } => {
                operands.iter().collect()
            }
            Self::Compare { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::Between { expr, low, high } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
            Self::In { expr, list } => std::iter::once(expr.as_ref()).chain(list).collect(),
            Self::Aggregate { arg, .. } => arg.iter().map(|a| &**a).collect(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Self> {
        match self {
            Self::Field(_)
            | Self::Param(_)
            | Self::Int(_)
            | Self::Real(_)
            | Self::Text(_)
            | Self::Bool(_)
            | Self::GetDate => Vec::new(),
            Self::Paren(e)
            | Self::Neg(e)
            | Self::Not(e)
            | Self::IsNull(e)
            | Self::Upper(e)
            | Self::Lower(e) => vec![e.as_mut()],
            Self::Arith { operands, .. } | Self::Logical { operands, .. } => {
                operands.iter_mut().collect()
            }
            Self::Compare { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Self::Between { expr, low, high } => vec![expr.as_mut(), low.as_mut(), high.as_mut()],
            Self::In { expr, list } => std::iter::once(expr.as_mut()).chain(list.iter_mut()).collect(),
            Self::Aggregate { arg, .. } => arg.iter_mut().map(|a| &mut **a).collect(),
        }
    }

    /// Visits this node and all its descendants in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Returns whether the expression is an aggregate call.
    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate { .. })
    }

    /// Returns whether any node of the tree is an aggregate call.
    #[must_use]
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= e.is_aggregate());
        found
    }

    /// Returns whether the expression references no columns.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        let mut constant = true;
        self.walk(&mut |e| {
            if matches!(e, Self::Field(_) | Self::Aggregate { .. }) {
                constant = false;
            }
        });
        constant
    }

    /// Returns the names of all referenced parameters.
    #[must_use]
    pub fn param_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |e| {
            if let Self::Param(p) = e {
                names.push(p.name.as_str());
            }
        });
        names
    }

    /// Returns all field references of the tree.
    #[must_use]
    pub fn field_refs(&self) -> Vec<&FieldRef> {
        let mut refs = Vec::new();
        self.walk(&mut |e| {
            if let Self::Field(f) = e {
                refs.push(f);
            }
        });
        refs
    }

    // ========================================================================
    // Field resolution
    // ========================================================================

    /// Binds every field and parameter reference against `scope`.
    ///
    /// Fails when a reference matches no column or more than one column.
    pub fn resolve(&mut self, scope: &Scope<'_>) -> Result<(), String> {
        match self {
            Self::Field(field) => {
                let candidates: Vec<_> = scope
                    .tables
                    .iter()
                    .filter(|t| field.table.as_deref().is_none_or(|q| q == t.alias))
                    .filter_map(|t| t.table.column(&field.column).map(|c| (t, c)))
                    .collect();
                let (found, column) = match candidates.as_slice() {
                    [single] => *single,
                    [] => return Err(format!("Cannot resolve field reference '{field}'")),
                    _ => return Err(format!("Ambiguous field reference '{field}'")),
                };
                field.resolved = Some(ResolvedField {
                    alias: found.alias.to_string(),
                    grain: found.table.grain().to_string(),
                    table: found.table.name().to_string(),
                    column_type: column.ty,
                    meta: ExprMeta::of_column(&column.ty, column.nullable || found.outer),
                });
                Ok(())
            }
            Self::Param(param) => {
                let meta = scope
                    .params
                    .get(&param.name)
                    .ok_or_else(|| format!("Parameter '{}' was not declared", param.name))?;
                param.resolved = Some(*meta);
                Ok(())
            }
            other => other
                .children_mut()
                .into_iter()
                .try_for_each(|child| child.resolve(scope)),
        }
    }

    // ========================================================================
    // Type checking
    // ========================================================================

    /// Type-checks the tree and returns the meta of its root.
    ///
    /// Field references must have been resolved first.
    pub fn meta(&self) -> Result<ExprMeta, String> {
        match self {
            Self::Field(field) => field
                .resolved
                .as_ref()
                .map(|r| r.meta)
                .ok_or_else(|| format!("Field reference '{field}' is not resolved")),
            Self::Param(param) => param
                .resolved
                .ok_or_else(|| format!("Parameter '{}' is not resolved", param.name)),
            Self::Int(_) => Ok(ExprMeta::new(ViewColumnType::Int, false)),
            Self::Real(_) => Ok(ExprMeta::new(ViewColumnType::Real, false)),
            Self::Text(text) => Ok(ExprMeta {
                ty: ViewColumnType::Text,
                nullable: false,
                length: u32::try_from(text.chars().count()).ok(),
            }),
            Self::Bool(_) => Ok(ExprMeta::new(ViewColumnType::Bit, false)),
            Self::GetDate => Ok(ExprMeta::new(ViewColumnType::Date, false)),
            Self::Paren(inner) => inner.meta(),
            Self::Neg(inner) => {
                let meta = inner.meta()?;
                expect_numeric(inner, &meta)?;
                Ok(meta)
            }
            Self::Not(inner) => {
                let meta = inner.meta()?;
                expect_type(inner, &meta, ViewColumnType::Logic)?;
                Ok(ExprMeta::logic())
            }
            Self::Arith { op, operands } => arith_meta(*op, operands),
            Self::Compare { op, left, right } => {
                let l = left.meta()?;
                let r = right.meta()?;
                match (op, l.ty) {
                    (RelOp::Like, _) => {
                        expect_type(left, &l, ViewColumnType::Text)?;
                        expect_type(right, &r, ViewColumnType::Text)?;
                    }
                    (RelOp::Eq, ViewColumnType::Bit) => {
                        expect_type(right, &r, ViewColumnType::Bit)?;
                    }
                    (
                        _,
                        ViewColumnType::Int
                        | ViewColumnType::Real
                        | ViewColumnType::Decimal
                        | ViewColumnType::Date
                        | ViewColumnType::Text,
                    ) => {
                        if !l.ty.is_comparable_with(r.ty) {
                            return Err(format!(
                                "Expression '{}' of type {} cannot be compared with '{}' of type {}",
                                left.celesta_sql(),
                                l.ty,
                                right.celesta_sql(),
                                r.ty
                            ));
                        }
                    }
                    _ => {
                        return Err(format!(
                            "Wrong expression '{}': type {} cannot be used in comparisons with '{}'",
                            left.celesta_sql(),
                            l.ty,
                            op.as_str()
                        ));
                    }
                }
                Ok(ExprMeta::logic())
            }
            Self::Logical { operands, .. } => {
                for operand in operands {
                    let meta = operand.meta()?;
                    expect_type(operand, &meta, ViewColumnType::Logic)?;
                }
                Ok(ExprMeta::logic())
            }
            Self::Between { expr, low, high } => {
                let meta = expect_range_operand(expr)?;
                for bound in [low, high] {
                    expect_comparable(bound, &bound.meta()?, meta.ty)?;
                }
                Ok(ExprMeta::logic())
            }
            Self::In { expr, list } => {
                let meta = expect_range_operand(expr)?;
                for item in list {
                    expect_comparable(item, &item.meta()?, meta.ty)?;
                }
                Ok(ExprMeta::logic())
            }
            Self::IsNull(inner) => {
                let meta = inner.meta()?;
                if meta.ty == ViewColumnType::Logic {
                    return Err(format!(
                        "Expression '{}' is logical condition and cannot be tested for NULL",
                        inner.celesta_sql()
                    ));
                }
                Ok(ExprMeta::logic())
            }
            Self::Upper(inner) | Self::Lower(inner) => {
                let meta = inner.meta()?;
                expect_type(inner, &meta, ViewColumnType::Text)?;
                Ok(meta)
            }
            Self::Aggregate { func, arg } => match (func, arg) {
                (AggregateFunc::Count, None) => Ok(ExprMeta::new(ViewColumnType::Int, false)),
                (AggregateFunc::Count, Some(_)) => {
                    Err("Only COUNT(*) is supported".to_string())
                }
                (_, None) => Err(format!("{} requires an argument", func.as_str())),
                (_, Some(inner)) => {
                    if inner.contains_aggregate() {
                        return Err("Aggregate functions cannot be nested".to_string());
                    }
                    let meta = inner.meta()?;
                    if *func == AggregateFunc::Sum {
                        expect_numeric(inner, &meta)?;
                    } else if matches!(meta.ty, ViewColumnType::Logic | ViewColumnType::Blob) {
                        return Err(format!(
                            "{} cannot be applied to '{}' of type {}",
                            func.as_str(),
                            inner.celesta_sql(),
                            meta.ty
                        ));
                    }
                    Ok(ExprMeta { nullable: true, ..meta })
                }
            },
        }
    }

    // ========================================================================
    // SQL generation
    // ========================================================================

    /// Renders the expression with the given dialect hooks.
    #[must_use]
    pub fn to_sql(&self, gen: &dyn SqlGenerator) -> String {
        let join = |items: &[Self], sep: &str| {
            items
                .iter()
                .map(|e| e.to_sql(gen))
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self {
            Self::Field(field) => match &field.table {
                Some(table) => format!("{}.{}", gen.quote(table), gen.quote(&field.column)),
                None => gen.quote(&field.column),
            },
            Self::Param(param) => gen.param(&param.name),
            Self::Int(v) => v.to_string(),
            Self::Real(v) => format!("{v:?}"),
            Self::Text(v) => quote(v),
            Self::Bool(v) => gen.bool_literal(*v).to_string(),
            Self::GetDate => gen.current_date().to_string(),
            Self::Paren(inner) => format!("({})", inner.to_sql(gen)),
            Self::Neg(inner) => format!("-{}", inner.to_sql(gen)),
            Self::Not(inner) => format!("NOT {}", inner.to_sql(gen)),
            Self::Arith { op, operands } => join(operands, &format!(" {} ", op.as_str())),
            Self::Compare { op, left, right } => {
                format!("{} {} {}", left.to_sql(gen), op.as_str(), right.to_sql(gen))
            }
            Self::Logical { op, operands } => join(operands, &format!(" {} ", op.as_str())),
            Self::Between { expr, low, high } => format!(
                "{} BETWEEN {} AND {}",
                expr.to_sql(gen),
                low.to_sql(gen),
                high.to_sql(gen)
            ),
            Self::In { expr, list } => format!("{} IN ({})", expr.to_sql(gen), join(list, ", ")),
            Self::IsNull(inner) => format!("{} IS NULL", inner.to_sql(gen)),
            Self::Upper(inner) => format!("UPPER({})", inner.to_sql(gen)),
            Self::Lower(inner) => format!("LOWER({})", inner.to_sql(gen)),
            Self::Aggregate { func, arg } => match arg {
                Some(inner) => format!("{}({})", func.as_str(), inner.to_sql(gen)),
                None => format!("{}(*)", func.as_str()),
            },
        }
    }

    /// Renders canonical grain-script text.
    #[must_use]
    pub fn celesta_sql(&self) -> String {
        self.to_sql(&CelestaSqlGenerator)
    }
}

fn expect_type(expr: &Expr, meta: &ExprMeta, expected: ViewColumnType) -> Result<(), String> {
    if meta.ty == expected {
        Ok(())
    } else {
        Err(format!(
            "Expression '{}' is expected to be of {expected} type, but it is {}",
            expr.celesta_sql(),
            meta.ty
        ))
    }
}

fn expect_numeric(expr: &Expr, meta: &ExprMeta) -> Result<(), String> {
    if meta.ty.is_numeric() {
        Ok(())
    } else {
        Err(format!(
            "Expression '{}' is expected to be of numeric type, but it is {}",
            expr.celesta_sql(),
            meta.ty
        ))
    }
}

fn expect_comparable(expr: &Expr, meta: &ExprMeta, with: ViewColumnType) -> Result<(), String> {
    if meta.ty.is_comparable_with(with) {
        Ok(())
    } else {
        Err(format!(
            "Expression '{}' of type {} cannot be compared with {with}",
            expr.celesta_sql(),
            meta.ty
        ))
    }
}

fn expect_range_operand(expr: &Expr) -> Result<ExprMeta, String> {
    let meta = expr.meta()?;
    if meta.ty.is_numeric() || matches!(meta.ty, ViewColumnType::Date | ViewColumnType::Text) {
        Ok(meta)
    } else {
        Err(format!(
            "Wrong expression '{}' of type {}: only numeric, date and text values can be used here",
            expr.celesta_sql(),
            meta.ty
        ))
    }
}

fn arith_meta(op: ArithOp, operands: &[Expr]) -> Result<ExprMeta, String> {
    let mut metas = Vec::with_capacity(operands.len());
    for operand in operands {
        let meta = operand.meta()?;
        if op == ArithOp::Concat {
            expect_type(operand, &meta, ViewColumnType::Text)?;
        } else {
            expect_numeric(operand, &meta)?;
        }
        metas.push(meta);
    }
    let nullable = metas.iter().any(|m| m.nullable);
    let ty = if op == ArithOp::Concat {
        ViewColumnType::Text
    } else if op == ArithOp::Over || metas.iter().any(|m| m.ty == ViewColumnType::Real) {
        ViewColumnType::Real
    } else if metas.iter().any(|m| m.ty == ViewColumnType::Decimal) {
        ViewColumnType::Decimal
    } else {
        ViewColumnType::Int
    };
    Ok(ExprMeta::new(ty, nullable))
}
