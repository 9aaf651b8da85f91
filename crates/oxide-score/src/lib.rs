//! Validated schema graph for grain-based database definitions.
//!
//! `oxide-score` turns raw grain declarations into a checked, fully
//! cross-referenced object model:
//! - Column types, defaults and identifiers are validated per element
//! - Primary keys, foreign keys and indices are checked for legality
//! - View expressions are resolved and type-checked
//! - Grains are ordered by their references and cycles are rejected
//!
//! # Architecture
//!
//! - **Raw declarations** - serde-deserializable input produced by a front end
//! - **Elements** - `Table`, `Index`, `ForeignKey`, `Sequence` and the view kinds
//! - **Grain** - a named, versioned container with a flattened element namespace
//! - **Score** - all grains, built in dependency order
//! - **Checksums** - streaming CRC32 fingerprints of grain sources
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_score::prelude::*;
//!
//! let shop = RawGrain::new("shop", "1.0").element(RawElement::Table(RawTable::new(
//!     "orders",
//!     vec![RawColumn::new("id", "INT").pk(), RawColumn::new("total", "REAL")],
//! )));
//!
//! let score = Score::build(vec![shop])?;
//! for grain in score.grains() {
//!     println!("{} {}", grain.name(), grain.version());
//! }
//! ```

pub mod checksum;
pub mod column;
pub mod error;
pub mod expr;
pub mod foreign_key;
pub mod grain;
pub mod identifier;
pub mod index;
pub mod raw;
pub mod score;
pub mod sequence;
pub mod table;
pub mod version;
pub mod view;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::checksum::{ChecksumReader, Fingerprint};
    pub use crate::column::{Column, ColumnClass, ColumnType, DefaultValue, REC_VERSION};
    pub use crate::error::{ErrorKind, Result, ScoreBuildError, ScoreError};
    pub use crate::expr::{Expr, ExprMeta, SqlGenerator, ViewColumnType};
    pub use crate::foreign_key::{FkRule, ForeignKey};
    pub use crate::grain::{Grain, SYSTEM_GRAIN};
    pub use crate::identifier::{limit_name, limit_name_with_postfix};
    pub use crate::index::Index;
    pub use crate::raw::{
        RawColumn, RawElement, RawForeignKey, RawGrain, RawIndex, RawSelect, RawTable, RawView,
    };
    pub use crate::score::Score;
    pub use crate::sequence::Sequence;
    pub use crate::table::{Table, TableOptions};
    pub use crate::version::{VersionOrdering, VersionString};
    pub use crate::view::{MaterializedView, MvColumn, ParameterizedView, View, SURROGATE_COUNT};
}
