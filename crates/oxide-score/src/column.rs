//! Column definitions, column types and default values.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::expr::ViewColumnType;

/// Name of the system column used for optimistic row versioning.
pub const REC_VERSION: &str = "recversion";

static DECIMAL_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").expect("Invalid decimal literal regex")
});

static NEXTVAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^NEXTVAL\s*\(\s*([a-zA-Z_][0-9a-zA-Z_]*)\s*\)$").expect("Invalid NEXTVAL regex")
});

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 32-bit integer.
    Int,
    /// Floating point number.
    Real,
    /// Fixed point number.
    Decimal {
        /// Total number of digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Bounded string.
    Varchar {
        /// Maximum number of characters.
        length: u32,
    },
    /// Unbounded string (`VARCHAR(MAX)` / `TEXT`).
    Text,
    /// Binary large object.
    Blob,
    /// Date and time without time zone.
    DateTime,
    /// Date and time with time zone.
    ZonedDateTime,
    /// Boolean.
    Bit,
}

/// Column class, ignoring size parameters. Foreign keys match on class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnClass {
    /// Integer columns.
    Int,
    /// Floating point columns.
    Real,
    /// Fixed point columns.
    Decimal,
    /// Bounded and unbounded string columns.
    String,
    /// Binary columns.
    Blob,
    /// Date-time columns.
    DateTime,
    /// Zoned date-time columns.
    ZonedDateTime,
    /// Boolean columns.
    Bit,
}

impl ColumnType {
    /// Builds a column type from a declaration tag such as `VARCHAR` or `DECIMAL`.
    ///
    /// Returns a human-readable error when the tag or its parameters are invalid.
    pub fn from_tag(
        tag: &str,
        length: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> Result<Self, String> {
        let normalized = tag.trim().to_ascii_uppercase();
        let ty = match normalized.as_str() {
            "INT" | "INTEGER" => Self::Int,
            "REAL" => Self::Real,
            "DECIMAL" => {
                let precision = precision.unwrap_or(15);
                let scale = scale.unwrap_or(0);
                if precision == 0 {
                    return Err("Decimal precision must be positive.".to_string());
                }
                if scale > precision {
                    return Err(format!(
                        "Decimal scale {scale} must not exceed precision {precision}."
                    ));
                }
                Self::Decimal { precision, scale }
            }
            "VARCHAR" | "NVARCHAR" => match length {
                Some(0) => return Err("String column length must be positive.".to_string()),
                Some(length) => Self::Varchar { length },
                None => Self::Text,
            },
            "TEXT" => Self::Text,
            "BLOB" => Self::Blob,
            "DATETIME" => Self::DateTime,
            "DATETIME WITH TIME ZONE" => Self::ZonedDateTime,
            "BIT" => Self::Bit,
            other => return Err(format!("Unknown column type '{other}'.")),
        };
        Ok(ty)
    }

    /// Returns the class of this type.
    #[must_use]
    pub const fn class(&self) -> ColumnClass {
        match self {
            Self::Int => ColumnClass::Int,
            Self::Real => ColumnClass::Real,
            Self::Decimal { .. } => ColumnClass::Decimal,
            Self::Varchar { .. } | Self::Text => ColumnClass::String,
            Self::Blob => ColumnClass::Blob,
            Self::DateTime => ColumnClass::DateTime,
            Self::ZonedDateTime => ColumnClass::ZonedDateTime,
            Self::Bit => ColumnClass::Bit,
        }
    }

    /// Returns whether values of this type may take part in keys and indices.
    #[must_use]
    pub const fn is_indexable(&self) -> bool {
        !matches!(self, Self::Blob | Self::Text)
    }

    /// Returns the string length for bounded string types.
    #[must_use]
    pub const fn length(&self) -> Option<u32> {
        match self {
            Self::Varchar { length } => Some(*length),
            _ => None,
        }
    }

    /// Returns the type seen by expressions that reference a column of this type.
    #[must_use]
    pub const fn view_type(&self) -> ViewColumnType {
        match self {
            Self::Int => ViewColumnType::Int,
            Self::Real => ViewColumnType::Real,
            Self::Decimal { .. } => ViewColumnType::Decimal,
            Self::Varchar { .. } | Self::Text => ViewColumnType::Text,
            Self::Blob => ViewColumnType::Blob,
            Self::DateTime | Self::ZonedDateTime => ViewColumnType::Date,
            Self::Bit => ViewColumnType::Bit,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => f.write_str("INT"),
            Self::Real => f.write_str("REAL"),
            Self::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            Self::Varchar { length } => write!(f, "VARCHAR({length})"),
            Self::Text => f.write_str("TEXT"),
            Self::Blob => f.write_str("BLOB"),
            Self::DateTime => f.write_str("DATETIME"),
            Self::ZonedDateTime => f.write_str("DATETIME WITH TIME ZONE"),
            Self::Bit => f.write_str("BIT"),
        }
    }
}

/// Parsed default value of a column.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Integer literal.
    Int(i64),
    /// Next value of a sequence declared in the same grain.
    NextVal(String),
    /// Floating point literal.
    Real(f64),
    /// Fixed point literal, normalized (no trailing zeros in the fraction).
    Decimal(String),
    /// String literal, unquoted.
    Text(String),
    /// Binary literal as upper-case hex digits.
    Blob(String),
    /// Current date and time at insertion.
    GetDate,
    /// Fixed date.
    Date(NaiveDate),
    /// Boolean literal.
    Bit(bool),
}

impl DefaultValue {
    /// Parses a default-value lexeme for a column of type `ty`.
    pub fn parse(ty: &ColumnType, lexeme: &str) -> Result<Self, String> {
        let lexeme = lexeme.trim();
        let invalid = || format!("Invalid default value {lexeme} for a {ty} column.");
        match ty {
            ColumnType::Int => {
                if let Some(caps) = NEXTVAL.captures(lexeme) {
                    return Ok(Self::NextVal(caps[1].to_string()));
                }
                lexeme.parse().map(Self::Int).map_err(|_| invalid())
            }
            ColumnType::Real => lexeme.parse().map(Self::Real).map_err(|_| invalid()),
            ColumnType::Decimal { scale, .. } => {
                if !DECIMAL_LITERAL.is_match(lexeme) {
                    return Err(invalid());
                }
                let normalized = normalize_decimal(lexeme);
                let fraction = normalized.split_once('.').map_or(0, |(_, f)| f.len());
                if fraction > *scale as usize {
                    return Err(format!(
                        "Default value {lexeme} has more fractional digits than scale {scale}."
                    ));
                }
                Ok(Self::Decimal(normalized))
            }
            ColumnType::Varchar { .. } | ColumnType::Text => {
                let text = unquote(lexeme).ok_or_else(invalid)?;
                if let Some(length) = ty.length() {
                    if text.chars().count() > length as usize {
                        return Err(format!(
                            "Default value {lexeme} is longer than column length {length}."
                        ));
                    }
                }
                Ok(Self::Text(text))
            }
            ColumnType::Blob => {
                let hex = lexeme
                    .strip_prefix("0x")
                    .or_else(|| lexeme.strip_prefix("0X"))
                    .ok_or_else(invalid)?;
                if hex.len() % 2 != 0 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(invalid());
                }
                Ok(Self::Blob(hex.to_ascii_uppercase()))
            }
            ColumnType::DateTime => {
                if lexeme.eq_ignore_ascii_case("GETDATE()") {
                    return Ok(Self::GetDate);
                }
                let text = unquote(lexeme).ok_or_else(invalid)?;
                NaiveDate::parse_from_str(&text, "%Y%m%d")
                    .map(Self::Date)
                    .map_err(|_| invalid())
            }
            ColumnType::ZonedDateTime => Err(format!(
                "Default values are not supported for {ty} columns."
            )),
            ColumnType::Bit => match lexeme.to_ascii_uppercase().as_str() {
                "TRUE" | "1" => Ok(Self::Bit(true)),
                "FALSE" | "0" => Ok(Self::Bit(false)),
                _ => Err(invalid()),
            },
        }
    }

    /// Returns the canonical lexeme of this default.
    #[must_use]
    pub fn lexeme(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::NextVal(seq) => format!("NEXTVAL({seq})"),
            Self::Real(v) => format!("{v:?}"),
            Self::Decimal(v) => v.clone(),
            Self::Blob(v) => format!("0x{v}"),
            Self::Text(v) => quote(v),
            Self::GetDate => "GETDATE()".to_string(),
            Self::Date(d) => format!("'{}'", d.format("%Y%m%d")),
            Self::Bit(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        }
    }
}

/// Quotes a string literal, doubling embedded quotes.
#[must_use]
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Removes surrounding quotes from a string literal, undoubling embedded quotes.
#[must_use]
pub fn unquote(lexeme: &str) -> Option<String> {
    let inner = lexeme.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

fn normalize_decimal(lexeme: &str) -> String {
    match lexeme.split_once('.') {
        Some((int, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                int.to_string()
            } else {
                format!("{int}.{frac}")
            }
        }
        None => lexeme.to_string(),
    }
}

/// A table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub ty: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Declared default.
    pub default: Option<DefaultValue>,
}

impl Column {
    /// Creates a nullable column without default.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
        }
    }

    /// Makes the column NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Returns the sequence backing this column's default, if any.
    #[must_use]
    pub fn sequence(&self) -> Option<&str> {
        match &self.default {
            Some(DefaultValue::NextVal(seq)) => Some(seq),
            _ => None,
        }
    }

    /// The row-version column added to versioned tables.
    #[must_use]
    pub fn rec_version() -> Self {
        Self::new(REC_VERSION, ColumnType::Int)
            .not_null()
            .default_value(DefaultValue::Int(1))
    }
}
