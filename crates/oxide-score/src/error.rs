//! Error types for schema validation.

use std::fmt;

/// Category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced grain, table, column, sequence or parameter cannot be found.
    Unresolved,
    /// A name is already taken inside its namespace.
    DuplicateName,
    /// Operand or column types are incompatible.
    TypeMismatch,
    /// A primary key, foreign key or index violates key rules.
    IllegalKey,
    /// An identifier does not match the identifier grammar.
    IllegalIdentifier,
    /// A version string cannot be parsed.
    MalformedVersion,
    /// Any other semantic problem in an element definition.
    IllegalDefinition,
    /// Grains reference each other.
    CyclicReference,
    /// An attempt to change the system grain after it was validated.
    ReadOnlyGrain,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unresolved => "unresolved reference",
            Self::DuplicateName => "duplicate name",
            Self::TypeMismatch => "type mismatch",
            Self::IllegalKey => "illegal key",
            Self::IllegalIdentifier => "illegal identifier",
            Self::MalformedVersion => "malformed version",
            Self::IllegalDefinition => "illegal definition",
            Self::CyclicReference => "cyclic reference",
            Self::ReadOnlyGrain => "read-only grain",
        };
        f.write_str(name)
    }
}

/// A single validation failure, attributed to a grain and (usually) an element.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.render())]
pub struct ScoreError {
    /// Grain the failure belongs to.
    pub grain: String,
    /// Element inside the grain, when the failure is element-local.
    pub element: Option<String>,
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable cause.
    pub message: String,
}

impl ScoreError {
    /// Creates an error attributed to a grain only.
    #[must_use]
    pub fn grain(kind: ErrorKind, grain: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            grain: grain.into(),
            element: None,
            kind,
            message: message.into(),
        }
    }

    /// Creates an error attributed to an element of a grain.
    #[must_use]
    pub fn element(
        kind: ErrorKind,
        grain: impl Into<String>,
        element: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            grain: grain.into(),
            element: Some(element.into()),
            kind,
            message: message.into(),
        }
    }

    fn render(&self) -> String {
        match &self.element {
            Some(element) => format!(
                "[{}] grain '{}', element '{}': {}",
                self.kind, self.grain, element, self.message
            ),
            None => format!("[{}] grain '{}': {}", self.kind, self.grain, self.message),
        }
    }
}

/// All failures collected while building a score.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n\n"))]
pub struct ScoreBuildError {
    /// Failures in the order they were detected.
    pub errors: Vec<ScoreError>,
}

impl ScoreBuildError {
    /// Returns the failures attributed to `grain`.
    pub fn for_grain<'a>(&'a self, grain: &'a str) -> impl Iterator<Item = &'a ScoreError> + 'a {
        self.errors.iter().filter(move |e| e.grain == grain)
    }

    /// Returns whether any failure has the given kind.
    #[must_use]
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}

/// Result type for element-level validation.
pub type Result<T> = std::result::Result<T, ScoreError>;
