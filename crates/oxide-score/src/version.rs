//! Multi-branch version strings.
//!
//! A version string is a comma-separated list of components such as
//! `1.02,TITAN3.34`. Each component has an upper-case label (empty for the main
//! branch) and a numeric value. Versions form a partial order: two versions are
//! comparable only when every label moves in the same direction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

/// Version assigned to grains that do not declare one.
pub const DEFAULT_VERSION: &str = "1.00";

static COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z_]*)([0-9]+\.[0-9]+)$").expect("Invalid version component regex")
});

/// Result of comparing two version strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionOrdering {
    /// Same labels, equal values.
    Equals,
    /// Every label is greater or equal, at least one strictly.
    Greater,
    /// Every label is lower or equal, at least one strictly.
    Lower,
    /// Labels move in different directions.
    Inconsistent,
}

impl VersionOrdering {
    fn merge(self, next: Self) -> Self {
        match (self, next) {
            (Self::Inconsistent, _) | (_, Self::Inconsistent) => Self::Inconsistent,
            (Self::Equals, other) | (other, Self::Equals) => other,
            (a, b) if a == b => a,
            _ => Self::Inconsistent,
        }
    }
}

impl fmt::Display for VersionOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Equals => "EQUALS",
            Self::Greater => "GREATER",
            Self::Lower => "LOWER",
            Self::Inconsistent => "INCONSISTENT",
        };
        f.write_str(text)
    }
}

/// Error returned for malformed version strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// The version string is empty.
    #[error("Empty string is not a valid version.")]
    Empty,
    /// A component does not match `LABEL<digits>.<digits>`.
    #[error("Invalid version string component: '{0}'.")]
    InvalidComponent(String),
    /// A label occurs twice.
    #[error("Duplicate version tag '{0}'.")]
    DuplicateTag(String),
}

/// A parsed version string.
#[derive(Debug, Clone)]
pub struct VersionString {
    text: String,
    components: BTreeMap<String, f64>,
}

impl VersionString {
    /// Parses a version string.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        if text.trim().is_empty() {
            return Err(VersionError::Empty);
        }
        let mut components = BTreeMap::new();
        for part in text.split(',') {
            let part = part.trim();
            let caps = COMPONENT
                .captures(part)
                .ok_or_else(|| VersionError::InvalidComponent(part.to_string()))?;
            let tag = caps[1].to_string();
            let value: f64 = caps[2]
                .parse()
                .map_err(|_| VersionError::InvalidComponent(part.to_string()))?;
            if components.insert(tag.clone(), value).is_some() {
                return Err(VersionError::DuplicateTag(tag));
            }
        }
        Ok(Self {
            text: text.to_string(),
            components,
        })
    }

    /// Returns the value of a labelled component. The main branch has the empty label.
    #[must_use]
    pub fn component(&self, tag: &str) -> Option<f64> {
        self.components.get(tag).copied()
    }

    /// Compares `self` (the declared version) against `other` (the persisted one).
    #[must_use]
    pub fn compare(&self, other: &Self) -> VersionOrdering {
        let tags: BTreeSet<&String> = self
            .components
            .keys()
            .chain(other.components.keys())
            .collect();

        tags.into_iter()
            .fold(VersionOrdering::Equals, |acc, tag| {
                let step = match (self.components.get(tag), other.components.get(tag)) {
                    (Some(_), None) => VersionOrdering::Greater,
                    (None, Some(_)) => VersionOrdering::Lower,
                    (Some(a), Some(b)) if a > b => VersionOrdering::Greater,
                    (Some(a), Some(b)) if a < b => VersionOrdering::Lower,
                    _ => VersionOrdering::Equals,
                };
                acc.merge(step)
            })
    }
}

impl Default for VersionString {
    fn default() -> Self {
        let mut components = BTreeMap::new();
        components.insert(String::new(), 1.0);
        Self {
            text: DEFAULT_VERSION.to_string(),
            components,
        }
    }
}

impl PartialEq for VersionString {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == VersionOrdering::Equals
    }
}

impl FromStr for VersionString {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
