//! Database adaptors.
//!
//! An adaptor reads the live structure of one database into `Db*Info`
//! records and issues the DDL the updater asks for. The updater never builds
//! SQL itself.

mod sqlite;
mod sqlite_ddl;

pub use sqlite::SqliteAdaptor;
pub use sqlite_ddl::SqliteSqlGenerator;

use indexmap::IndexMap;
use oxide_score::column::Column;
use oxide_score::foreign_key::ForeignKey;
use oxide_score::index::Index;
use oxide_score::sequence::Sequence;
use oxide_score::table::Table;
use oxide_score::view::{MaterializedView, ParameterizedView, View};

use crate::catalog::{GrainRecord, TableCatalogEntry};
use crate::error::Result;
use crate::meta::{DbColumnInfo, DbFkInfo, DbIndexInfo, DbPkInfo, DbSequenceInfo, DialectQuirks};

/// Operations the updater needs from a database.
///
/// Implementations run every call on one connection, so that `begin`,
/// `commit` and `rollback` scope everything issued in between.
#[allow(async_fn_in_trait)]
pub trait DbAdaptor {
    /// Returns the adaptor name.
    fn name(&self) -> &'static str;

    /// Returns the dialect behaviours relevant to column comparison.
    fn quirks(&self) -> DialectQuirks;

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Returns whether `grain.table` exists.
    async fn table_exists(&mut self, grain: &str, table: &str) -> Result<bool>;

    /// Returns whether the database holds any table at all.
    async fn user_tables_exist(&mut self) -> Result<bool>;

    /// Creates the namespace of `grain` when the dialect has one.
    async fn create_schema_if_not_exists(&mut self, grain: &str) -> Result<()>;

    /// Reads the record of `grain`.
    async fn grain_record(&mut self, grain: &str) -> Result<Option<GrainRecord>>;

    /// Reads all grain records, ordered by name.
    async fn grain_records(&mut self) -> Result<Vec<GrainRecord>>;

    /// Inserts a new grain record.
    async fn insert_grain_record(&mut self, record: &GrainRecord) -> Result<()>;

    /// Overwrites an existing grain record.
    async fn update_grain_record(&mut self, record: &GrainRecord) -> Result<()>;

    /// Reads the table catalog of `grain`.
    async fn table_catalog(&mut self, grain: &str) -> Result<Vec<TableCatalogEntry>>;

    /// Inserts or replaces a table catalog entry.
    async fn upsert_table_catalog(&mut self, entry: &TableCatalogEntry) -> Result<()>;

    // ------------------------------------------------------------------
    // Live metadata
    // ------------------------------------------------------------------

    /// Reads the columns of `grain.table` by name.
    async fn columns(&mut self, grain: &str, table: &str) -> Result<IndexMap<String, DbColumnInfo>>;

    /// Reads the primary key of `grain.table`.
    async fn primary_key(&mut self, grain: &str, table: &str) -> Result<DbPkInfo>;

    /// Reads the indices on tables of `grain`.
    async fn indices(&mut self, grain: &str) -> Result<Vec<DbIndexInfo>>;

    /// Reads the foreign keys declared on tables of `grain`.
    async fn foreign_keys(&mut self, grain: &str) -> Result<Vec<DbFkInfo>>;

    /// Reads the foreign keys of any grain that reference `grain.table`.
    async fn foreign_keys_referencing(&mut self, grain: &str, table: &str) -> Result<Vec<DbFkInfo>>;

    /// Reads the view names of `grain`.
    async fn views(&mut self, grain: &str) -> Result<Vec<String>>;

    /// Reads the parameterized view names of `grain`.
    async fn parameterized_views(&mut self, grain: &str) -> Result<Vec<String>>;

    /// Reads the sequences of `grain`.
    async fn sequences(&mut self, grain: &str) -> Result<Vec<DbSequenceInfo>>;

    /// Reads the full text of the insert trigger maintaining `view`.
    async fn mv_trigger_body(&mut self, view: &MaterializedView) -> Result<Option<String>>;

    // ------------------------------------------------------------------
    // Tables and columns
    // ------------------------------------------------------------------

    /// Creates `table` with its columns and primary key.
    async fn create_table(&mut self, table: &Table) -> Result<()>;

    /// Drops `grain.table`.
    async fn drop_table(&mut self, grain: &str, table: &str) -> Result<()>;

    /// Adds a missing column.
    async fn add_column(&mut self, table: &Table, column: &Column) -> Result<()>;

    /// Changes a live column to match its declaration.
    async fn update_column(&mut self, table: &Table, column: &Column) -> Result<()>;

    /// Drops a live column.
    async fn drop_column(&mut self, table: &Table, column: &str) -> Result<()>;

    /// Creates the declared primary key of `table`.
    async fn create_primary_key(&mut self, table: &Table) -> Result<()>;

    /// Drops the live primary key of `table`.
    async fn drop_primary_key(&mut self, table: &Table, name: &str) -> Result<()>;

    /// Creates or drops the row-versioning trigger to match `table`.
    async fn update_versioning_trigger(&mut self, table: &Table) -> Result<()>;

    // ------------------------------------------------------------------
    // Indices and foreign keys
    // ------------------------------------------------------------------

    /// Creates `index`.
    async fn create_index(&mut self, index: &Index) -> Result<()>;

    /// Drops a live index of `grain`.
    async fn drop_index(&mut self, grain: &str, index: &DbIndexInfo) -> Result<()>;

    /// Creates `fk`.
    async fn create_foreign_key(&mut self, fk: &ForeignKey) -> Result<()>;

    /// Drops a live foreign key.
    async fn drop_foreign_key(&mut self, fk: &DbFkInfo) -> Result<()>;

    // ------------------------------------------------------------------
    // Sequences
    // ------------------------------------------------------------------

    /// Creates `sequence` at its start value.
    async fn create_sequence(&mut self, sequence: &Sequence) -> Result<()>;

    /// Changes the parameters of a live sequence, keeping its current value.
    async fn alter_sequence(&mut self, sequence: &Sequence) -> Result<()>;

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Creates `view`.
    async fn create_view(&mut self, view: &View) -> Result<()>;

    /// Drops view `grain.view`.
    async fn drop_view(&mut self, grain: &str, view: &str) -> Result<()>;

    /// Creates `view`.
    async fn create_parameterized_view(&mut self, view: &ParameterizedView) -> Result<()>;

    /// Drops parameterized view `grain.view`.
    async fn drop_parameterized_view(&mut self, grain: &str, view: &str) -> Result<()>;

    /// Fills the table of `view` from its source table.
    async fn init_mv_data(&mut self, view: &MaterializedView) -> Result<()>;

    /// Creates the maintenance triggers of `view`.
    async fn create_mv_triggers(&mut self, view: &MaterializedView) -> Result<()>;

    /// Drops the maintenance triggers of `view` if present.
    async fn drop_mv_triggers(&mut self, view: &MaterializedView) -> Result<()>;

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Starts a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commits the current transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the current transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Returns the DDL statements issued so far.
    fn executed_ddl(&self) -> &[String];

    /// Returns and clears the DDL log.
    fn take_executed_ddl(&mut self) -> Vec<String>;
}
