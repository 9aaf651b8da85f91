//! Database reconciliation for grain-based schemas.
//!
//! `oxide-dbsync` compares a live database against a validated
//! [`oxide_score::score::Score`] and applies the DDL that brings the two in
//! line, grain by grain:
//! - Each grain's version, checksum and state are tracked in `celesta.grains`
//! - Tables, columns, keys, indices, sequences and views are diffed, not recreated
//! - A failing grain is rolled back and marked `ERROR` while the others proceed
//!
//! # Architecture
//!
//! - **Loader** - reads grain files from a score directory, fingerprinting their bytes
//! - **Catalog** - the system tables and their records
//! - **Meta** - live-schema descriptors and their comparison with declarations
//! - **Adaptor** - the database seam: introspection and DDL per dialect
//! - **Updater** - the per-grain decision and reconciliation steps
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_dbsync::prelude::*;
//! use oxide_score::score::Score;
//!
//! let score = Score::build(load_score_dir(Path::new("score"))?)?;
//! let adaptor = SqliteAdaptor::connect("sqlite:app.db").await?;
//! let mut updater = DbUpdater::new(adaptor).config(UpdaterConfig::new().force_init(false));
//! updater.update_db(&score).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Validate the score and print the grain order
//! oxide-dbsync --score-dir score check
//!
//! # Bring the database up to date
//! oxide-dbsync --database sqlite:app.db update
//!
//! # Show the recorded state of every grain
//! oxide-dbsync status
//! ```

pub mod adaptor;
pub mod catalog;
pub mod error;
pub mod loader;
pub mod meta;
pub mod updater;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::adaptor::{DbAdaptor, SqliteAdaptor, SqliteSqlGenerator};
    pub use crate::catalog::{GrainRecord, GrainState, TableCatalogEntry, TableType};
    pub use crate::error::{DbSyncError, Result};
    pub use crate::loader::{load_grain, load_score_dir};
    pub use crate::meta::{
        DbColumnInfo, DbFkInfo, DbIndexInfo, DbPkInfo, DbSequenceInfo, DialectQuirks,
    };
    pub use crate::updater::{DbUpdater, UpdaterConfig};
}
