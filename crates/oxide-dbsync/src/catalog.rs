//! Persisted catalog records: grain states and the table catalog.

use std::fmt;

use chrono::{NaiveDateTime, Utc};
use oxide_score::checksum::Fingerprint;
use oxide_score::grain::Grain;

/// Name of the grains catalog table inside the system grain.
pub const GRAINS_TABLE: &str = "grains";

/// Name of the table catalog inside the system grain.
pub const TABLES_TABLE: &str = "tables";

/// Name of the emulated sequences table inside the system grain.
pub const SEQUENCES_TABLE: &str = "sequences";

/// Name of the stored functions table inside the system grain.
pub const FUNCTIONS_TABLE: &str = "functions";

/// Upgrade state of a grain, as stored in `celesta_grains.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrainState {
    /// Database structure matches the recorded version.
    Ready,
    /// An upgrade is in progress.
    Upgrading,
    /// The last upgrade failed.
    Error,
    /// The grain must be upgraded on the next run.
    Recover,
    /// The grain is never touched.
    Lock,
}

impl GrainState {
    /// Returns the stored code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Ready => 0,
            Self::Upgrading => 1,
            Self::Error => 2,
            Self::Recover => 3,
            Self::Lock => 4,
        }
    }

    /// Parses a stored code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Ready),
            1 => Some(Self::Upgrading),
            2 => Some(Self::Error),
            3 => Some(Self::Recover),
            4 => Some(Self::Lock),
            _ => None,
        }
    }
}

impl fmt::Display for GrainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::Upgrading => "upgrading",
            Self::Error => "error",
            Self::Recover => "recover",
            Self::Lock => "lock",
        };
        f.write_str(name)
    }
}

/// A row of `celesta_grains`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrainRecord {
    /// Grain name.
    pub id: String,
    /// Version string of the last applied definition.
    pub version: String,
    /// Byte length of the grain source.
    pub length: i64,
    /// CRC32 of the grain source, 8 upper-case hex digits.
    pub checksum: String,
    /// Upgrade state.
    pub state: GrainState,
    /// Time of the last state change.
    pub lastmodified: NaiveDateTime,
    /// Error description for failed upgrades.
    pub message: String,
}

impl GrainRecord {
    /// Creates a record describing the declared grain.
    #[must_use]
    pub fn for_grain(grain: &Grain, state: GrainState) -> Self {
        let fingerprint = grain.fingerprint();
        Self {
            id: grain.name().to_string(),
            version: grain.version().to_string(),
            length: i64::try_from(fingerprint.length).unwrap_or(i64::MAX),
            checksum: fingerprint.checksum_hex(),
            state,
            lastmodified: Utc::now().naive_utc(),
            message: String::new(),
        }
    }

    /// Returns true when length and checksum match `fingerprint`.
    #[must_use]
    pub fn matches(&self, fingerprint: Fingerprint) -> bool {
        u64::try_from(self.length).is_ok_and(|length| length == fingerprint.length)
            && Fingerprint::parse_checksum(&self.checksum) == Some(fingerprint.crc32)
    }

    /// Moves the record to `state`, touching the modification time.
    #[must_use]
    pub fn with_state(mut self, state: GrainState) -> Self {
        self.state = state;
        self.lastmodified = Utc::now().naive_utc();
        self
    }

    /// Builds the error message stored when an upgrade of `grain` fails.
    #[must_use]
    pub fn failure_message(grain: &Grain, cause: &str) -> String {
        let fingerprint = grain.fingerprint();
        format!(
            "{}/{}/{:08X}: {cause}",
            grain.version(),
            fingerprint.length,
            fingerprint.crc32
        )
    }
}

/// Kind of a catalogued object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableType {
    /// Ordinary table.
    Table,
    /// View.
    View,
    /// Materialized view.
    MaterializedView,
    /// Parameterized view.
    Function,
}

impl TableType {
    /// Returns the one-letter stored code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Table => "T",
            Self::View => "V",
            Self::MaterializedView => "M",
            Self::Function => "F",
        }
    }

    /// Parses a stored code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "T" => Some(Self::Table),
            "V" => Some(Self::View),
            "M" => Some(Self::MaterializedView),
            "F" => Some(Self::Function),
            _ => None,
        }
    }
}

/// A row of `celesta_tables`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCatalogEntry {
    /// Owning grain.
    pub grain: String,
    /// Object name.
    pub name: String,
    /// Object kind.
    pub table_type: TableType,
    /// Whether the object is no longer declared.
    pub orphaned: bool,
}

impl TableCatalogEntry {
    /// Creates a non-orphaned entry.
    #[must_use]
    pub fn new(grain: &str, name: &str, table_type: TableType) -> Self {
        Self {
            grain: grain.to_string(),
            name: name.to_string(),
            table_type,
            orphaned: false,
        }
    }
}

/// Lists every object `grain` declares, with its catalog kind.
#[must_use]
pub fn declared_objects(grain: &Grain) -> Vec<TableCatalogEntry> {
    let name = grain.name();
    grain
        .tables()
        .keys()
        .map(|t| TableCatalogEntry::new(name, t, TableType::Table))
        .chain(
            grain
                .views()
                .keys()
                .map(|v| TableCatalogEntry::new(name, v, TableType::View)),
        )
        .chain(
            grain
                .materialized_views()
                .keys()
                .map(|v| TableCatalogEntry::new(name, v, TableType::MaterializedView)),
        )
        .chain(
            grain
                .parameterized_views()
                .keys()
                .map(|v| TableCatalogEntry::new(name, v, TableType::Function)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes_round_trip() {
        for state in [
            GrainState::Ready,
            GrainState::Upgrading,
            GrainState::Error,
            GrainState::Recover,
            GrainState::Lock,
        ] {
            assert_eq!(GrainState::from_code(state.code()), Some(state));
        }
        assert_eq!(GrainState::from_code(7), None);
        assert_eq!(GrainState::Recover.code(), 3);
        assert_eq!(GrainState::Lock.to_string(), "lock");
    }

    #[test]
    fn test_table_type_codes() {
        assert_eq!(TableType::MaterializedView.code(), "M");
        assert_eq!(TableType::from_code("F"), Some(TableType::Function));
        assert_eq!(TableType::from_code("X"), None);
    }

    #[test]
    fn test_record_for_grain() {
        let grain = Grain::new("shop", "1.02")
            .unwrap()
            .with_fingerprint(Fingerprint::new(0xAB, 12));
        let record = GrainRecord::for_grain(&grain, GrainState::Recover);
        assert_eq!(record.id, "shop");
        assert_eq!(record.version, "1.02");
        assert_eq!(record.length, 12);
        assert_eq!(record.checksum, "000000AB");
        assert!(record.matches(Fingerprint::new(0xAB, 12)));
        assert!(!record.matches(Fingerprint::new(0xAB, 13)));
        assert!(!record.matches(Fingerprint::new(0xAC, 12)));
    }

    #[test]
    fn test_failure_message_format() {
        let grain = Grain::new("shop", "2.0")
            .unwrap()
            .with_fingerprint(Fingerprint::new(0x1F, 40));
        assert_eq!(
            GrainRecord::failure_message(&grain, "boom"),
            "2.0/40/0000001F: boom"
        );
    }
}
